//! SQL Renderer (§4.4): a pure mapping from typed schema/operation data to
//! ClickHouse DDL text. Table and view bodies go through `handlebars`
//! templates; single-clause ALTERs are built directly since a template adds
//! nothing over a one-line `format!`.

use crate::engine::keyexpr::flatten_key_columns;
use crate::engine::model::{Column, DefaultValue, MaterializedView, Table, TableIndex, Projection, View};
use handlebars::Handlebars;
use lazy_static::lazy_static;
use serde_json::json;

const CREATE_TABLE_TEMPLATE: &str = r#"CREATE TABLE {{qualified}}
(
{{#each columns}}    {{this.decl}}{{#unless @last}},{{/unless}}
{{/each}}{{#each indexes}}    , INDEX {{this.decl}}
{{/each}}{{#each projections}}    , PROJECTION {{this.name}} ({{this.query}})
{{/each}})
ENGINE = {{engine}}
{{#if primary_key}}PRIMARY KEY ({{primary_key}})
{{/if}}ORDER BY ({{order_by}})
{{#if unique_key}}UNIQUE KEY ({{unique_key}})
{{/if}}{{#if partition_by}}PARTITION BY {{partition_by}}
{{/if}}{{#if ttl}}TTL {{ttl}}
{{/if}}{{#if settings}}SETTINGS {{settings}}{{/if}}"#;

lazy_static! {
    static ref HANDLEBARS: Handlebars<'static> = {
        let mut hb = Handlebars::new();
        hb.set_strict_mode(false);
        hb.register_template_string("create_table", CREATE_TABLE_TEMPLATE)
            .expect("static template must compile");
        hb
    };
}

/// `[A-Za-z_][A-Za-z0-9_]*`
fn is_simple_identifier(ident: &str) -> bool {
    let mut chars = ident.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub fn quote_ident(ident: &str) -> String {
    if is_simple_identifier(ident) {
        ident.to_string()
    } else {
        format!("`{}`", ident.replace('`', "``"))
    }
}

pub fn quote_qualified(database: &str, name: &str) -> String {
    format!("{}.{}", quote_ident(database), quote_ident(name))
}

/// Split each entry on top-level commas and quote the resulting flat columns.
fn render_key_clause(entries: &[String]) -> String {
    flatten_key_columns(entries)
        .iter()
        .map(|col| quote_ident(col))
        .collect::<Vec<_>>()
        .join(", ")
}

fn render_default(d: &DefaultValue) -> String {
    match d {
        DefaultValue::String(s) => {
            if let Some(expr) = s.strip_prefix("fn:") {
                expr.to_string()
            } else {
                format!("'{}'", s.replace('\'', "''"))
            }
        }
        DefaultValue::Number(n) => n.to_string(),
        DefaultValue::Bool(b) => b.to_string(),
    }
}

fn column_decl(col: &Column) -> String {
    let mut decl = format!("{} {}", quote_ident(&col.name), col.type_);
    if col.nullable == Some(true) && !col.type_.starts_with("Nullable(") {
        decl = format!("{} {}", quote_ident(&col.name), format!("Nullable({})", col.type_));
    }
    if let Some(default) = &col.default {
        decl.push_str(&format!(" DEFAULT {}", render_default(default)));
    }
    if let Some(comment) = &col.comment {
        decl.push_str(&format!(" COMMENT '{}'", comment.replace('\'', "''")));
    }
    decl
}

fn index_decl(idx: &TableIndex) -> String {
    let type_name = match idx.type_ {
        crate::engine::model::IndexType::MinMax => "minmax",
        crate::engine::model::IndexType::Set => "set",
        crate::engine::model::IndexType::BloomFilter => "bloom_filter",
        crate::engine::model::IndexType::TokenBf => "tokenbf_v1",
        crate::engine::model::IndexType::NgramBf => "ngrambf_v1",
    };
    format!(
        "{} {} TYPE {} GRANULARITY {}",
        quote_ident(&idx.name),
        idx.expression,
        type_name,
        idx.granularity
    )
}

pub fn render_create_table(t: &Table) -> String {
    let columns: Vec<_> = t
        .columns
        .iter()
        .map(|c| json!({ "decl": column_decl(c) }))
        .collect();
    let indexes: Vec<_> = t
        .indexes
        .iter()
        .map(|i| json!({ "decl": index_decl(i) }))
        .collect();
    let projections: Vec<_> = t
        .projections
        .iter()
        .map(|p| json!({ "name": quote_ident(&p.name), "query": p.query }))
        .collect();
    let settings = if t.settings.is_empty() {
        None
    } else {
        Some(
            t.settings
                .iter()
                .map(|(k, v)| format!("{k} = {v}"))
                .collect::<Vec<_>>()
                .join(", "),
        )
    };

    let data = json!({
        "qualified": quote_qualified(&t.database, &t.name),
        "columns": columns,
        "indexes": indexes,
        "projections": projections,
        "engine": t.engine,
        "primary_key": if t.primary_key.is_empty() { None } else { Some(render_key_clause(&t.primary_key)) },
        "order_by": render_key_clause(&t.order_by),
        "unique_key": t.unique_key.as_ref().map(|k| render_key_clause(k)),
        "partition_by": t.partition_by,
        "ttl": t.ttl,
        "settings": settings,
    });

    HANDLEBARS
        .render("create_table", &data)
        .expect("create_table template is statically valid")
}

pub fn render_drop_table(database: &str, name: &str) -> String {
    format!("DROP TABLE {}", quote_qualified(database, name))
}

pub fn render_create_view(v: &View) -> String {
    format!(
        "CREATE VIEW {} AS {}",
        quote_qualified(&v.database, &v.name),
        v.as_
    )
}

pub fn render_drop_view(database: &str, name: &str) -> String {
    format!("DROP VIEW {}", quote_qualified(database, name))
}

pub fn render_create_materialized_view(m: &MaterializedView) -> String {
    format!(
        "CREATE MATERIALIZED VIEW {} TO {} AS {}",
        quote_qualified(&m.database, &m.name),
        quote_qualified(&m.to.database, &m.to.name),
        m.as_
    )
}

pub fn render_drop_materialized_view(database: &str, name: &str) -> String {
    format!("DROP VIEW {}", quote_qualified(database, name))
}

pub fn render_create_database(database: &str) -> String {
    format!("CREATE DATABASE IF NOT EXISTS {}", quote_ident(database))
}

pub fn render_add_column(database: &str, table: &str, col: &Column) -> String {
    format!(
        "ALTER TABLE {} ADD COLUMN IF NOT EXISTS {}",
        quote_qualified(database, table),
        column_decl(col)
    )
}

pub fn render_modify_column(database: &str, table: &str, col: &Column) -> String {
    format!(
        "ALTER TABLE {} MODIFY COLUMN {}",
        quote_qualified(database, table),
        column_decl(col)
    )
}

pub fn render_drop_column(database: &str, table: &str, name: &str) -> String {
    format!(
        "ALTER TABLE {} DROP COLUMN IF EXISTS {}",
        quote_qualified(database, table),
        quote_ident(name)
    )
}

pub fn render_rename_column(database: &str, table: &str, from: &str, to: &str) -> String {
    format!(
        "ALTER TABLE {} RENAME COLUMN {} TO {}",
        quote_qualified(database, table),
        quote_ident(from),
        quote_ident(to)
    )
}

pub fn render_rename_table(old_database: &str, old_name: &str, new_database: &str, new_name: &str) -> String {
    format!(
        "RENAME TABLE {} TO {}",
        quote_qualified(old_database, old_name),
        quote_qualified(new_database, new_name)
    )
}

pub fn render_add_index(database: &str, table: &str, idx: &TableIndex) -> String {
    format!(
        "ALTER TABLE {} ADD INDEX IF NOT EXISTS {}",
        quote_qualified(database, table),
        index_decl(idx),
    )
}

pub fn render_drop_index(database: &str, table: &str, name: &str) -> String {
    format!(
        "ALTER TABLE {} DROP INDEX IF EXISTS {}",
        quote_qualified(database, table),
        quote_ident(name)
    )
}

pub fn render_add_projection(database: &str, table: &str, proj: &Projection) -> String {
    format!(
        "ALTER TABLE {} ADD PROJECTION IF NOT EXISTS {} ({})",
        quote_qualified(database, table),
        quote_ident(&proj.name),
        proj.query
    )
}

pub fn render_drop_projection(database: &str, table: &str, name: &str) -> String {
    format!(
        "ALTER TABLE {} DROP PROJECTION IF EXISTS {}",
        quote_qualified(database, table),
        quote_ident(name)
    )
}

pub fn render_modify_setting(database: &str, table: &str, key: &str, value: &str) -> String {
    format!(
        "ALTER TABLE {} MODIFY SETTING {} = {}",
        quote_qualified(database, table),
        key,
        value
    )
}

pub fn render_reset_setting(database: &str, table: &str, key: &str) -> String {
    format!(
        "ALTER TABLE {} RESET SETTING {}",
        quote_qualified(database, table),
        key
    )
}

pub fn render_modify_ttl(ttl: Option<&str>) -> String {
    match ttl {
        Some(expr) => format!("TTL {expr}"),
        None => "REMOVE TTL".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::model::IndexType;
    use std::collections::BTreeMap;

    fn sample_table() -> Table {
        Table {
            database: "app".into(),
            name: "users".into(),
            columns: vec![
                Column {
                    name: "id".into(),
                    type_: "UInt64".into(),
                    nullable: None,
                    default: None,
                    comment: None,
                    renamed_from: None,
                },
                Column {
                    name: "email".into(),
                    type_: "String".into(),
                    nullable: Some(true),
                    default: None,
                    comment: Some("contact address".into()),
                    renamed_from: None,
                },
            ],
            engine: "MergeTree".into(),
            primary_key: vec!["id".into()],
            order_by: vec!["id".into()],
            unique_key: None,
            partition_by: Some("toYYYYMM(ts)".into()),
            ttl: None,
            settings: BTreeMap::new(),
            indexes: vec![],
            projections: vec![],
            renamed_from: None,
        }
    }

    #[test]
    fn create_table_includes_engine_and_order_by() {
        let sql = render_create_table(&sample_table());
        assert!(sql.contains("CREATE TABLE app.users"));
        assert!(sql.contains("ENGINE = MergeTree"));
        assert!(sql.contains("ORDER BY (id)"));
        assert!(sql.contains("PARTITION BY toYYYYMM(ts)"));
    }

    #[test]
    fn nullable_column_wraps_type() {
        let sql = render_create_table(&sample_table());
        assert!(sql.contains("Nullable(String)"));
        assert!(sql.contains("COMMENT 'contact address'"));
    }

    #[test]
    fn fn_prefixed_default_renders_raw() {
        let col = Column {
            name: "created_at".into(),
            type_: "DateTime".into(),
            nullable: None,
            default: Some(DefaultValue::String("fn:now()".into())),
            comment: None,
            renamed_from: None,
        };
        assert_eq!(
            render_add_column("app", "users", &col),
            "ALTER TABLE app.users ADD COLUMN IF NOT EXISTS created_at DateTime DEFAULT now()"
        );
    }

    #[test]
    fn string_default_is_quoted() {
        let col = Column {
            name: "status".into(),
            type_: "String".into(),
            nullable: None,
            default: Some(DefaultValue::String("active".into())),
            comment: None,
            renamed_from: None,
        };
        assert_eq!(
            render_add_column("app", "users", &col),
            "ALTER TABLE app.users ADD COLUMN IF NOT EXISTS status String DEFAULT 'active'"
        );
    }

    #[test]
    fn index_declaration_includes_type_and_granularity() {
        let idx = TableIndex {
            name: "email_idx".into(),
            expression: "email".into(),
            type_: IndexType::BloomFilter,
            granularity: 4,
        };
        let sql = render_add_index("app", "users", &idx);
        assert_eq!(
            sql,
            "ALTER TABLE app.users ADD INDEX IF NOT EXISTS email_idx email TYPE bloom_filter GRANULARITY 4"
        );
    }

    #[test]
    fn rename_table_uses_rename_statement() {
        assert_eq!(
            render_rename_table("app", "accounts", "app", "users"),
            "RENAME TABLE app.accounts TO app.users"
        );
    }

    #[test]
    fn modify_ttl_none_removes_ttl() {
        assert_eq!(render_modify_ttl(None), "REMOVE TTL");
    }

    #[test]
    fn simple_identifiers_are_emitted_bare() {
        assert_eq!(quote_ident("users"), "users");
        assert_eq!(quote_ident("_hidden"), "_hidden");
    }

    #[test]
    fn non_simple_identifiers_are_backtick_quoted() {
        assert_eq!(quote_ident("order-date"), "`order-date`");
        assert_eq!(quote_ident("has backtick`"), "`has backtick```");
    }

    #[test]
    fn compound_order_by_flattens_and_quotes_each_column() {
        let mut t = sample_table();
        t.order_by = vec!["id, region".to_string()];
        let sql = render_create_table(&t);
        assert!(sql.contains("ORDER BY (id, region)"));
    }

    #[test]
    fn drop_column_uses_if_exists() {
        assert_eq!(
            render_drop_column("app", "users", "status"),
            "ALTER TABLE app.users DROP COLUMN IF EXISTS status"
        );
    }

    #[test]
    fn drop_index_uses_if_exists() {
        assert_eq!(
            render_drop_index("app", "users", "email_idx"),
            "ALTER TABLE app.users DROP INDEX IF EXISTS email_idx"
        );
    }

    #[test]
    fn add_and_drop_projection_use_if_not_exists_and_if_exists() {
        let proj = Projection {
            name: "by_region".to_string(),
            query: "SELECT region, count() FROM users GROUP BY region".to_string(),
        };
        assert_eq!(
            render_add_projection("app", "users", &proj),
            "ALTER TABLE app.users ADD PROJECTION IF NOT EXISTS by_region (SELECT region, count() FROM users GROUP BY region)"
        );
        assert_eq!(
            render_drop_projection("app", "users", "by_region"),
            "ALTER TABLE app.users DROP PROJECTION IF EXISTS by_region"
        );
    }
}
