//! Diff-to-plan engine (§4.3): the largest single component. Turns two
//! canonicalized definition sets into an ordered, risk-annotated
//! `MigrationPlan`, with conservative rename inference and explicit rename
//! application layered on top.

use crate::engine::model::{Kind, SchemaDefinition, Table};
use crate::engine::render;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Risk {
    Safe,
    Caution,
    Danger,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    CreateDatabase,
    CreateTable,
    DropTable,
    CreateView,
    DropView,
    CreateMaterializedView,
    DropMaterializedView,
    AlterTableAddColumn,
    AlterTableModifyColumn,
    AlterTableDropColumn,
    AlterTableRenameColumn,
    AlterTableRenameTable,
    AlterTableAddIndex,
    AlterTableDropIndex,
    AlterTableAddProjection,
    AlterTableDropProjection,
    AlterTableModifySetting,
    AlterTableResetSetting,
    AlterTableModifyTtl,
}

impl OperationType {
    /// Coarse ordering rank used by the operation sort in step 5: drops
    /// first, then alters, then database creation, then object creation.
    pub fn rank(self) -> u8 {
        use OperationType::*;
        match self {
            DropTable | DropView | DropMaterializedView => 0,
            AlterTableAddColumn
            | AlterTableModifyColumn
            | AlterTableDropColumn
            | AlterTableRenameColumn
            | AlterTableRenameTable
            | AlterTableAddIndex
            | AlterTableDropIndex
            | AlterTableAddProjection
            | AlterTableDropProjection
            | AlterTableModifySetting
            | AlterTableResetSetting
            | AlterTableModifyTtl => 1,
            CreateDatabase => 2,
            CreateTable | CreateView | CreateMaterializedView => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        use OperationType::*;
        match self {
            CreateDatabase => "create_database",
            CreateTable => "create_table",
            DropTable => "drop_table",
            CreateView => "create_view",
            DropView => "drop_view",
            CreateMaterializedView => "create_materialized_view",
            DropMaterializedView => "drop_materialized_view",
            AlterTableAddColumn => "alter_table_add_column",
            AlterTableModifyColumn => "alter_table_modify_column",
            AlterTableDropColumn => "alter_table_drop_column",
            AlterTableRenameColumn => "alter_table_rename_column",
            AlterTableRenameTable => "alter_table_rename_table",
            AlterTableAddIndex => "alter_table_add_index",
            AlterTableDropIndex => "alter_table_drop_index",
            AlterTableAddProjection => "alter_table_add_projection",
            AlterTableDropProjection => "alter_table_drop_projection",
            AlterTableModifySetting => "alter_table_modify_setting",
            AlterTableResetSetting => "alter_table_reset_setting",
            AlterTableModifyTtl => "alter_table_modify_ttl",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Operation {
    #[serde(rename = "type")]
    pub type_: OperationType,
    pub key: String,
    pub risk: Risk,
    pub sql: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RiskSummary {
    pub safe: u32,
    pub caution: u32,
    pub danger: u32,
}

impl RiskSummary {
    pub fn bump(&mut self, risk: Risk) {
        match risk {
            Risk::Safe => self.safe += 1,
            Risk::Caution => self.caution += 1,
            Risk::Danger => self.danger += 1,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RenameSuggestion {
    pub database: String,
    pub table: String,
    pub from: String,
    pub to: String,
    pub confidence: &'static str,
    pub reason: String,
    #[serde(rename = "dropOperationKey")]
    pub drop_operation_key: String,
    #[serde(rename = "addOperationKey")]
    pub add_operation_key: String,
    #[serde(rename = "confirmationSQL")]
    pub confirmation_sql: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationPlan {
    pub operations: Vec<Operation>,
    #[serde(rename = "riskSummary")]
    pub risk_summary: RiskSummary,
    #[serde(rename = "renameSuggestions")]
    pub rename_suggestions: Vec<RenameSuggestion>,
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum PlannerError {
    #[error("schema validation failed")]
    ValidationFailed {
        issues: Vec<crate::engine::validate::Issue>,
    },
    #[error("unresolvable rename mapping: {message}")]
    UnresolvableRename { message: String },
}

fn table_key(db: &str, name: &str) -> String {
    format!("table:{db}.{name}")
}

fn view_key(db: &str, name: &str) -> String {
    format!("view:{db}.{name}")
}

fn mv_key(db: &str, name: &str) -> String {
    format!("materialized_view:{db}.{name}")
}

fn database_key(db: &str) -> String {
    format!("database:{db}")
}

type IdentityKey = (Kind, String, String);

fn index_by_identity(defs: &[SchemaDefinition]) -> BTreeMap<IdentityKey, &SchemaDefinition> {
    defs.iter().map(|d| (d.identity(), d)).collect()
}

struct ColumnDiff<'a> {
    ops: Vec<Operation>,
    dropped: Vec<&'a crate::engine::model::Column>,
    added: Vec<&'a crate::engine::model::Column>,
}

fn diff_columns<'a>(db: &str, name: &str, old: &'a Table, new: &'a Table) -> ColumnDiff<'a> {
    let old_cols: HashMap<&str, &crate::engine::model::Column> =
        old.columns.iter().map(|c| (c.name.as_str(), c)).collect();
    let new_cols: HashMap<&str, &crate::engine::model::Column> =
        new.columns.iter().map(|c| (c.name.as_str(), c)).collect();

    let mut ops = Vec::new();
    let mut dropped = Vec::new();
    let mut added = Vec::new();

    for col in &new.columns {
        if !old_cols.contains_key(col.name.as_str()) {
            let key = format!("{}:column:{}", table_key(db, name), col.name);
            ops.push(Operation {
                type_: OperationType::AlterTableAddColumn,
                sql: render::render_add_column(db, name, col),
                key,
                risk: Risk::Safe,
            });
            added.push(col);
        }
    }

    for col in &old.columns {
        match new_cols.get(col.name.as_str()) {
            Some(new_col) => {
                if col.shape() != new_col.shape() {
                    let key = format!("{}:column:{}", table_key(db, name), col.name);
                    ops.push(Operation {
                        type_: OperationType::AlterTableModifyColumn,
                        sql: render::render_modify_column(db, name, new_col),
                        key,
                        risk: Risk::Caution,
                    });
                }
            }
            None => {
                let key = format!("{}:column:{}", table_key(db, name), col.name);
                ops.push(Operation {
                    type_: OperationType::AlterTableDropColumn,
                    sql: render::render_drop_column(db, name, &col.name),
                    key,
                    risk: Risk::Danger,
                });
                dropped.push(col);
            }
        }
    }

    ColumnDiff { ops, dropped, added }
}

fn diff_indexes(db: &str, name: &str, old: &Table, new: &Table) -> Vec<Operation> {
    let old_idx: HashMap<&str, &crate::engine::model::TableIndex> =
        old.indexes.iter().map(|i| (i.name.as_str(), i)).collect();
    let new_idx: HashMap<&str, &crate::engine::model::TableIndex> =
        new.indexes.iter().map(|i| (i.name.as_str(), i)).collect();
    let mut ops = Vec::new();

    for idx in &old.indexes {
        let key = format!("{}:index:{}", table_key(db, name), idx.name);
        match new_idx.get(idx.name.as_str()) {
            Some(new_i) if (new_i.expression.clone(), new_i.type_.clone(), new_i.granularity)
                != (idx.expression.clone(), idx.type_.clone(), idx.granularity) =>
            {
                ops.push(Operation {
                    type_: OperationType::AlterTableDropIndex,
                    sql: render::render_drop_index(db, name, &idx.name),
                    key: key.clone(),
                    risk: Risk::Caution,
                });
                ops.push(Operation {
                    type_: OperationType::AlterTableAddIndex,
                    sql: render::render_add_index(db, name, new_i),
                    key,
                    risk: Risk::Caution,
                });
            }
            Some(_) => {}
            None => {
                ops.push(Operation {
                    type_: OperationType::AlterTableDropIndex,
                    sql: render::render_drop_index(db, name, &idx.name),
                    key,
                    risk: Risk::Caution,
                });
            }
        }
    }
    for idx in &new.indexes {
        if !old_idx.contains_key(idx.name.as_str()) {
            let key = format!("{}:index:{}", table_key(db, name), idx.name);
            ops.push(Operation {
                type_: OperationType::AlterTableAddIndex,
                sql: render::render_add_index(db, name, idx),
                key,
                risk: Risk::Caution,
            });
        }
    }
    ops
}

fn diff_projections(db: &str, name: &str, old: &Table, new: &Table) -> Vec<Operation> {
    let old_p: HashMap<&str, &crate::engine::model::Projection> =
        old.projections.iter().map(|p| (p.name.as_str(), p)).collect();
    let new_p: HashMap<&str, &crate::engine::model::Projection> =
        new.projections.iter().map(|p| (p.name.as_str(), p)).collect();
    let mut ops = Vec::new();

    for proj in &old.projections {
        let key = format!("{}:projection:{}", table_key(db, name), proj.name);
        match new_p.get(proj.name.as_str()) {
            Some(new_pr) if new_pr.query != proj.query => {
                ops.push(Operation {
                    type_: OperationType::AlterTableDropProjection,
                    sql: render::render_drop_projection(db, name, &proj.name),
                    key: key.clone(),
                    risk: Risk::Caution,
                });
                ops.push(Operation {
                    type_: OperationType::AlterTableAddProjection,
                    sql: render::render_add_projection(db, name, new_pr),
                    key,
                    risk: Risk::Caution,
                });
            }
            Some(_) => {}
            None => {
                ops.push(Operation {
                    type_: OperationType::AlterTableDropProjection,
                    sql: render::render_drop_projection(db, name, &proj.name),
                    key,
                    risk: Risk::Caution,
                });
            }
        }
    }
    for proj in &new.projections {
        if !old_p.contains_key(proj.name.as_str()) {
            let key = format!("{}:projection:{}", table_key(db, name), proj.name);
            ops.push(Operation {
                type_: OperationType::AlterTableAddProjection,
                sql: render::render_add_projection(db, name, proj),
                key,
                risk: Risk::Caution,
            });
        }
    }
    ops
}

fn diff_settings(db: &str, name: &str, old: &Table, new: &Table) -> Vec<Operation> {
    let mut ops = Vec::new();
    for (k, v) in &new.settings {
        if old.settings.get(k) != Some(v) {
            let key = format!("{}:setting:{}", table_key(db, name), k);
            ops.push(Operation {
                type_: OperationType::AlterTableModifySetting,
                sql: render::render_modify_setting(db, name, k, v),
                key,
                risk: Risk::Caution,
            });
        }
    }
    for k in old.settings.keys() {
        if !new.settings.contains_key(k) {
            let key = format!("{}:setting:{}", table_key(db, name), k);
            ops.push(Operation {
                type_: OperationType::AlterTableResetSetting,
                sql: render::render_reset_setting(db, name, k),
                key,
                risk: Risk::Caution,
            });
        }
    }
    ops
}

fn recreate_needed(old: &Table, new: &Table) -> bool {
    old.engine != new.engine
        || old.primary_key != new.primary_key
        || old.order_by != new.order_by
        || old.partition_by != new.partition_by
        || old.unique_key != new.unique_key
}

/// Diff two canonicalized definition sets into an ordered, risk-annotated
/// plan (§4.3 steps 1-6), plus conservative column rename suggestions.
pub fn diff(old_defs: &[SchemaDefinition], new_defs: &[SchemaDefinition]) -> MigrationPlan {
    let old_map = index_by_identity(old_defs);
    let new_map = index_by_identity(new_defs);

    let mut ops: Vec<Operation> = Vec::new();
    let mut rename_suggestions: Vec<RenameSuggestion> = Vec::new();
    let mut created_databases: BTreeSet<String> = BTreeSet::new();

    // Step 1: drops.
    for (identity, def) in &old_map {
        if new_map.contains_key(identity) {
            continue;
        }
        match def {
            SchemaDefinition::Table(t) => ops.push(Operation {
                key: table_key(&t.database, &t.name),
                sql: render::render_drop_table(&t.database, &t.name),
                type_: OperationType::DropTable,
                risk: Risk::Danger,
            }),
            SchemaDefinition::View(v) => ops.push(Operation {
                key: view_key(&v.database, &v.name),
                sql: render::render_drop_view(&v.database, &v.name),
                type_: OperationType::DropView,
                risk: Risk::Caution,
            }),
            SchemaDefinition::MaterializedView(m) => ops.push(Operation {
                key: mv_key(&m.database, &m.name),
                sql: render::render_drop_materialized_view(&m.database, &m.name),
                type_: OperationType::DropMaterializedView,
                risk: Risk::Caution,
            }),
        }
    }

    // Step 2: entities present in both.
    for (identity, new_def) in &new_map {
        let Some(old_def) = old_map.get(identity) else {
            continue;
        };
        match (old_def, new_def) {
            (SchemaDefinition::Table(old_t), SchemaDefinition::Table(new_t)) => {
                if recreate_needed(old_t, new_t) {
                    ops.push(Operation {
                        key: table_key(&old_t.database, &old_t.name),
                        sql: render::render_drop_table(&old_t.database, &old_t.name),
                        type_: OperationType::DropTable,
                        risk: Risk::Danger,
                    });
                    ops.push(Operation {
                        key: table_key(&new_t.database, &new_t.name),
                        sql: render::render_create_table(new_t),
                        type_: OperationType::CreateTable,
                        risk: Risk::Safe,
                    });
                } else {
                    let col_diff = diff_columns(&new_t.database, &new_t.name, old_t, new_t);
                    ops.extend(col_diff.ops);
                    ops.extend(diff_indexes(&new_t.database, &new_t.name, old_t, new_t));
                    ops.extend(diff_projections(&new_t.database, &new_t.name, old_t, new_t));
                    ops.extend(diff_settings(&new_t.database, &new_t.name, old_t, new_t));
                    if old_t.ttl != new_t.ttl {
                        let key = format!("{}:ttl", table_key(&new_t.database, &new_t.name));
                        ops.push(Operation {
                            sql: render::render_modify_ttl(new_t.ttl.as_deref()),
                            key,
                            type_: OperationType::AlterTableModifyTtl,
                            risk: Risk::Caution,
                        });
                    }
                    rename_suggestions.extend(infer_column_renames(
                        &new_t.database,
                        &new_t.name,
                        &col_diff.dropped,
                        &col_diff.added,
                    ));
                }
            }
            (SchemaDefinition::View(old_v), SchemaDefinition::View(new_v)) => {
                if old_v.as_ != new_v.as_ || old_v.comment != new_v.comment {
                    ops.push(Operation {
                        key: view_key(&old_v.database, &old_v.name),
                        sql: render::render_drop_view(&old_v.database, &old_v.name),
                        type_: OperationType::DropView,
                        risk: Risk::Caution,
                    });
                    ops.push(Operation {
                        key: view_key(&new_v.database, &new_v.name),
                        sql: render::render_create_view(new_v),
                        type_: OperationType::CreateView,
                        risk: Risk::Caution,
                    });
                }
            }
            (SchemaDefinition::MaterializedView(old_m), SchemaDefinition::MaterializedView(new_m)) => {
                if old_m.as_ != new_m.as_ || old_m.comment != new_m.comment || old_m.to != new_m.to {
                    ops.push(Operation {
                        key: mv_key(&old_m.database, &old_m.name),
                        sql: render::render_drop_materialized_view(&old_m.database, &old_m.name),
                        type_: OperationType::DropMaterializedView,
                        risk: Risk::Caution,
                    });
                    ops.push(Operation {
                        key: mv_key(&new_m.database, &new_m.name),
                        sql: render::render_create_materialized_view(new_m),
                        type_: OperationType::CreateMaterializedView,
                        risk: Risk::Caution,
                    });
                }
            }
            _ => unreachable!("identity includes kind; mismatched kinds can't share an identity"),
        }
    }

    // Step 3: pure creates.
    for (identity, new_def) in &new_map {
        if old_map.contains_key(identity) {
            continue;
        }
        match new_def {
            SchemaDefinition::Table(t) => {
                created_databases.insert(t.database.clone());
                ops.push(Operation {
                    key: table_key(&t.database, &t.name),
                    sql: render::render_create_table(t),
                    type_: OperationType::CreateTable,
                    risk: Risk::Safe,
                });
            }
            SchemaDefinition::View(v) => {
                created_databases.insert(v.database.clone());
                ops.push(Operation {
                    key: view_key(&v.database, &v.name),
                    sql: render::render_create_view(v),
                    type_: OperationType::CreateView,
                    risk: Risk::Safe,
                });
            }
            SchemaDefinition::MaterializedView(m) => {
                created_databases.insert(m.database.clone());
                ops.push(Operation {
                    key: mv_key(&m.database, &m.name),
                    sql: render::render_create_materialized_view(m),
                    type_: OperationType::CreateMaterializedView,
                    risk: Risk::Safe,
                });
            }
        }
    }

    // Step 4: one create_database per accumulated database, lexicographic.
    for db in &created_databases {
        ops.push(Operation {
            key: database_key(db),
            sql: render::render_create_database(db),
            type_: OperationType::CreateDatabase,
            risk: Risk::Safe,
        });
    }

    // Step 5: order by (coarse rank, key).
    ops.sort_by(|a, b| (a.type_.rank(), &a.key).cmp(&(b.type_.rank(), &b.key)));

    // Step 6: risk summary.
    let mut risk_summary = RiskSummary::default();
    for op in &ops {
        risk_summary.bump(op.risk);
    }

    rename_suggestions.sort_by(|a, b| {
        (a.database.as_str(), a.table.as_str(), a.from.as_str())
            .cmp(&(b.database.as_str(), b.table.as_str(), b.from.as_str()))
    });

    MigrationPlan {
        operations: ops,
        risk_summary,
        rename_suggestions,
    }
}

fn infer_column_renames(
    db: &str,
    table: &str,
    dropped: &[&crate::engine::model::Column],
    added: &[&crate::engine::model::Column],
) -> Vec<RenameSuggestion> {
    let mut by_shape_dropped: HashMap<_, Vec<&crate::engine::model::Column>> = HashMap::new();
    for c in dropped {
        by_shape_dropped.entry(c.shape()).or_default().push(c);
    }
    let mut by_shape_added: HashMap<_, Vec<&crate::engine::model::Column>> = HashMap::new();
    for c in added {
        by_shape_added.entry(c.shape()).or_default().push(c);
    }

    let mut suggestions = Vec::new();
    for (shape, drop_candidates) in &by_shape_dropped {
        if drop_candidates.len() != 1 {
            continue;
        }
        let Some(add_candidates) = by_shape_added.get(shape) else {
            continue;
        };
        if add_candidates.len() != 1 {
            continue;
        }
        let from = drop_candidates[0].name.clone();
        let to = add_candidates[0].name.clone();
        let drop_key = format!("{}:column:{}", table_key(db, table), from);
        let add_key = format!("{}:column:{}", table_key(db, table), to);
        suggestions.push(RenameSuggestion {
            database: db.to_string(),
            table: table.to_string(),
            from: from.clone(),
            to: to.clone(),
            confidence: "high",
            reason: "identical type, nullability, default, and comment".to_string(),
            drop_operation_key: drop_key,
            add_operation_key: add_key,
            confirmation_sql: format!(
                "ALTER TABLE {} RENAME COLUMN `{}` TO `{}`",
                crate::engine::render::quote_qualified(db, table),
                from,
                to
            ),
        });
    }
    suggestions
}

/// A requested `--rename-table old_db.old_name=new_db.new_name` mapping.
#[derive(Debug, Clone)]
pub struct TableRenameMapping {
    pub old_database: String,
    pub old_name: String,
    pub new_database: String,
    pub new_name: String,
}

/// A requested `--rename-column db.table.old=new` mapping.
#[derive(Debug, Clone)]
pub struct ColumnRenameMapping {
    pub database: String,
    pub table: String,
    pub from: String,
    pub to: String,
}

fn schema_declared_table_renames(new_defs: &[SchemaDefinition]) -> Vec<TableRenameMapping> {
    let mut out = Vec::new();
    for def in new_defs {
        if let SchemaDefinition::Table(t) = def {
            if let Some(renamed_from) = &t.renamed_from {
                out.push(TableRenameMapping {
                    old_database: renamed_from
                        .database
                        .clone()
                        .unwrap_or_else(|| t.database.clone()),
                    old_name: renamed_from.name.clone(),
                    new_database: t.database.clone(),
                    new_name: t.name.clone(),
                });
            }
        }
    }
    out
}

fn schema_declared_column_renames(new_defs: &[SchemaDefinition]) -> Vec<ColumnRenameMapping> {
    let mut out = Vec::new();
    for def in new_defs {
        if let SchemaDefinition::Table(t) = def {
            for col in &t.columns {
                if let Some(from) = &col.renamed_from {
                    out.push(ColumnRenameMapping {
                        database: t.database.clone(),
                        table: t.name.clone(),
                        from: from.clone(),
                        to: col.name.clone(),
                    });
                }
            }
        }
    }
    out
}

/// Merge schema-declared mappings with CLI mappings, CLI winning on a
/// source- or target-key conflict (the schema mapping is discarded
/// silently). Returns an error if the CLI mappings conflict with each other
/// (non-injective, or chained/cyclic).
fn merge_table_renames(
    schema: Vec<TableRenameMapping>,
    cli: Vec<TableRenameMapping>,
) -> Result<Vec<TableRenameMapping>, PlannerError> {
    // CLI mappings must be injective among themselves first.
    let mut by_source: HashMap<(String, String), usize> = HashMap::new();
    let mut by_target: HashMap<(String, String), usize> = HashMap::new();
    for (i, m) in cli.iter().enumerate() {
        let src = (m.old_database.clone(), m.old_name.clone());
        let tgt = (m.new_database.clone(), m.new_name.clone());
        if by_source.insert(src, i).is_some() {
            return Err(PlannerError::UnresolvableRename {
                message: format!(
                    "two --rename-table mappings share source {}.{}",
                    m.old_database, m.old_name
                ),
            });
        }
        if by_target.insert(tgt, i).is_some() {
            return Err(PlannerError::UnresolvableRename {
                message: format!(
                    "two --rename-table mappings share target {}.{}",
                    m.new_database, m.new_name
                ),
            });
        }
    }

    // Chained/cyclic: a CLI target that is also a CLI source.
    let cli_sources: BTreeSet<(String, String)> = cli
        .iter()
        .map(|m| (m.old_database.clone(), m.old_name.clone()))
        .collect();
    for m in &cli {
        let tgt = (m.new_database.clone(), m.new_name.clone());
        if cli_sources.contains(&tgt) {
            return Err(PlannerError::UnresolvableRename {
                message: format!(
                    "chained rename mapping: {}.{} is both a source and a target",
                    m.new_database, m.new_name
                ),
            });
        }
    }

    let cli_source_keys: BTreeSet<(String, String)> = cli
        .iter()
        .map(|m| (m.old_database.clone(), m.old_name.clone()))
        .collect();
    let cli_target_keys: BTreeSet<(String, String)> = cli
        .iter()
        .map(|m| (m.new_database.clone(), m.new_name.clone()))
        .collect();

    let mut merged = cli;
    for s in schema {
        let src = (s.old_database.clone(), s.old_name.clone());
        let tgt = (s.new_database.clone(), s.new_name.clone());
        if cli_source_keys.contains(&src) || cli_target_keys.contains(&tgt) {
            continue; // CLI wins; schema mapping discarded silently.
        }
        merged.push(s);
    }
    Ok(merged)
}

fn merge_column_renames(
    schema: Vec<ColumnRenameMapping>,
    cli: Vec<ColumnRenameMapping>,
) -> Result<Vec<ColumnRenameMapping>, PlannerError> {
    let mut by_source: HashMap<(String, String, String), usize> = HashMap::new();
    let mut by_target: HashMap<(String, String, String), usize> = HashMap::new();
    for (i, m) in cli.iter().enumerate() {
        let src = (m.database.clone(), m.table.clone(), m.from.clone());
        let tgt = (m.database.clone(), m.table.clone(), m.to.clone());
        if by_source.insert(src, i).is_some() {
            return Err(PlannerError::UnresolvableRename {
                message: format!(
                    "two --rename-column mappings share source {}.{}.{}",
                    m.database, m.table, m.from
                ),
            });
        }
        if by_target.insert(tgt, i).is_some() {
            return Err(PlannerError::UnresolvableRename {
                message: format!(
                    "two --rename-column mappings share target {}.{}.{}",
                    m.database, m.table, m.to
                ),
            });
        }
    }

    let cli_source_keys: BTreeSet<(String, String, String)> = cli
        .iter()
        .map(|m| (m.database.clone(), m.table.clone(), m.from.clone()))
        .collect();
    let cli_target_keys: BTreeSet<(String, String, String)> = cli
        .iter()
        .map(|m| (m.database.clone(), m.table.clone(), m.to.clone()))
        .collect();

    let mut merged = cli;
    for s in schema {
        let src = (s.database.clone(), s.table.clone(), s.from.clone());
        let tgt = (s.database.clone(), s.table.clone(), s.to.clone());
        if cli_source_keys.contains(&src) || cli_target_keys.contains(&tgt) {
            continue;
        }
        merged.push(s);
    }
    Ok(merged)
}

/// Rewrite `old_defs` so tables named in `table_renames` appear under their
/// new identity, run resolvability pre-checks, diff, then fold the rename
/// mappings into the plan (§4.3 "Explicit rename application").
pub fn diff_with_renames(
    old_defs: Vec<SchemaDefinition>,
    new_defs: &[SchemaDefinition],
    cli_table_renames: Vec<TableRenameMapping>,
    cli_column_renames: Vec<ColumnRenameMapping>,
) -> Result<MigrationPlan, PlannerError> {
    let table_renames = merge_table_renames(
        schema_declared_table_renames(new_defs),
        cli_table_renames,
    )?;
    let column_renames = merge_column_renames(
        schema_declared_column_renames(new_defs),
        cli_column_renames,
    )?;

    let old_identities: BTreeSet<(String, String)> = old_defs
        .iter()
        .filter_map(|d| d.as_table().map(|t| (t.database.clone(), t.name.clone())))
        .collect();
    let new_identities: BTreeSet<(String, String)> = new_defs
        .iter()
        .filter_map(|d| d.as_table().map(|t| (t.database.clone(), t.name.clone())))
        .collect();

    for m in &table_renames {
        if !old_identities.contains(&(m.old_database.clone(), m.old_name.clone())) {
            return Err(PlannerError::UnresolvableRename {
                message: format!(
                    "--rename-table source {}.{} does not exist in the old schema",
                    m.old_database, m.old_name
                ),
            });
        }
        if !new_identities.contains(&(m.new_database.clone(), m.new_name.clone())) {
            return Err(PlannerError::UnresolvableRename {
                message: format!(
                    "--rename-table target {}.{} does not exist in the new schema",
                    m.new_database, m.new_name
                ),
            });
        }
    }

    let mut rewritten_old = old_defs;
    for def in &mut rewritten_old {
        if let SchemaDefinition::Table(t) = def {
            if let Some(m) = table_renames
                .iter()
                .find(|m| m.old_database == t.database && m.old_name == t.name)
            {
                t.database = m.new_database.clone();
                t.name = m.new_name.clone();
            }
        }
    }

    let mut plan = diff(&rewritten_old, new_defs);

    for m in &table_renames {
        let new_key = table_key(&m.new_database, &m.new_name);
        // Defensive: the rewrite above should already prevent the generic
        // diff from emitting a drop/create pair for this identity. Remove
        // one if present before inserting the explicit rename operation.
        plan.operations
            .retain(|op| !(op.key == new_key && matches!(op.type_, OperationType::DropTable | OperationType::CreateTable)));

        let rename_key = format!("{new_key}:rename_table");
        plan.operations.push(Operation {
            key: rename_key,
            sql: render::render_rename_table(&m.old_database, &m.old_name, &m.new_database, &m.new_name),
            type_: OperationType::AlterTableRenameTable,
            risk: Risk::Caution,
        });

        if m.new_database != m.old_database {
            let db_key = database_key(&m.new_database);
            if !plan.operations.iter().any(|op| op.key == db_key) {
                plan.operations.push(Operation {
                    key: db_key,
                    sql: render::render_create_database(&m.new_database),
                    type_: OperationType::CreateDatabase,
                    risk: Risk::Safe,
                });
            }
        }
    }

    for m in &column_renames {
        let drop_key = format!("{}:column:{}", table_key(&m.database, &m.table), m.from);
        let add_key = format!("{}:column:{}", table_key(&m.database, &m.table), m.to);
        let has_drop = plan
            .operations
            .iter()
            .any(|op| op.key == drop_key && matches!(op.type_, OperationType::AlterTableDropColumn));
        let has_add = plan
            .operations
            .iter()
            .any(|op| op.key == add_key && matches!(op.type_, OperationType::AlterTableAddColumn));
        if !has_drop || !has_add {
            return Err(PlannerError::UnresolvableRename {
                message: format!(
                    "--rename-column {}.{}.{}={} has no matching drop+add pair in the plan",
                    m.database, m.table, m.from, m.to
                ),
            });
        }
        plan.operations
            .retain(|op| op.key != drop_key && op.key != add_key);
        plan.rename_suggestions
            .retain(|s| !(s.database == m.database && s.table == m.table && s.from == m.from));

        let rename_key = format!(
            "{}:column_rename:{}:{}",
            table_key(&m.database, &m.table),
            m.from,
            m.to
        );
        plan.operations.push(Operation {
            key: rename_key,
            sql: render::render_rename_column(&m.database, &m.table, &m.from, &m.to),
            type_: OperationType::AlterTableRenameColumn,
            risk: Risk::Caution,
        });
    }

    plan.operations
        .sort_by(|a, b| (a.type_.rank(), &a.key).cmp(&(b.type_.rank(), &b.key)));

    let mut risk_summary = RiskSummary::default();
    for op in &plan.operations {
        risk_summary.bump(op.risk);
    }
    plan.risk_summary = risk_summary;

    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::canon::canonicalize;
    use crate::engine::model::Column;
    use std::collections::BTreeMap;

    fn base_table(engine: &str) -> Table {
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
                    nullable: None,
                    default: None,
                    comment: None,
                    renamed_from: None,
                },
            ],
            engine: engine.into(),
            primary_key: vec!["id".into()],
            order_by: vec!["id".into()],
            unique_key: None,
            partition_by: None,
            ttl: None,
            settings: BTreeMap::new(),
            indexes: vec![],
            projections: vec![],
            renamed_from: None,
        }
    }

    // S1 — Add table from empty.
    #[test]
    fn s1_add_table_from_empty() {
        let new_defs = canonicalize(vec![SchemaDefinition::Table({
            let mut t = base_table("MergeTree");
            t.columns.truncate(1);
            t
        })]);
        let plan = diff(&[], &new_defs);
        assert_eq!(plan.operations.len(), 2);
        assert_eq!(plan.operations[0].key, "database:app");
        assert_eq!(plan.operations[1].key, "table:app.users");
        assert_eq!(plan.risk_summary.safe, 2);
        assert_eq!(plan.risk_summary.caution, 0);
        assert_eq!(plan.risk_summary.danger, 0);
    }

    // S2 — Add safe column.
    #[test]
    fn s2_add_safe_column() {
        let old_defs = canonicalize(vec![SchemaDefinition::Table(base_table("MergeTree"))]);
        let mut new_table = base_table("MergeTree");
        new_table.columns.push(Column {
            name: "source".into(),
            type_: "String".into(),
            nullable: None,
            default: None,
            comment: None,
            renamed_from: None,
        });
        let new_defs = canonicalize(vec![SchemaDefinition::Table(new_table)]);

        let plan = diff(&old_defs, &new_defs);
        assert_eq!(plan.operations.len(), 1);
        assert_eq!(plan.operations[0].key, "table:app.users:column:source");
        assert_eq!(plan.operations[0].risk, Risk::Safe);
        assert!(plan.rename_suggestions.is_empty());
    }

    // S3 — Heuristic rename.
    #[test]
    fn s3_heuristic_rename_suggestion() {
        let old_defs = canonicalize(vec![SchemaDefinition::Table(base_table("MergeTree"))]);
        let mut new_table = base_table("MergeTree");
        new_table.columns[1].name = "user_email".into();
        let new_defs = canonicalize(vec![SchemaDefinition::Table(new_table)]);

        let plan = diff(&old_defs, &new_defs);
        assert!(plan
            .operations
            .iter()
            .any(|o| matches!(o.type_, OperationType::AlterTableDropColumn) && o.risk == Risk::Danger));
        assert!(plan
            .operations
            .iter()
            .any(|o| matches!(o.type_, OperationType::AlterTableAddColumn) && o.risk == Risk::Safe));
        assert_eq!(plan.rename_suggestions.len(), 1);
        let suggestion = &plan.rename_suggestions[0];
        assert_eq!(suggestion.from, "email");
        assert_eq!(suggestion.to, "user_email");
        assert_eq!(suggestion.confidence, "high");
    }

    // S4 — Explicit column rename merges plan.
    #[test]
    fn s4_explicit_column_rename_merges_plan() {
        let old_defs = canonicalize(vec![SchemaDefinition::Table(base_table("MergeTree"))]);
        let mut new_table = base_table("MergeTree");
        new_table.columns[1].name = "user_email".into();
        let new_defs = canonicalize(vec![SchemaDefinition::Table(new_table)]);

        let plan = diff_with_renames(
            old_defs,
            &new_defs,
            vec![],
            vec![ColumnRenameMapping {
                database: "app".into(),
                table: "users".into(),
                from: "email".into(),
                to: "user_email".into(),
            }],
        )
        .unwrap();

        assert_eq!(plan.operations.len(), 1);
        assert_eq!(
            plan.operations[0].key,
            "table:app.users:column_rename:email:user_email"
        );
        assert!(plan.rename_suggestions.is_empty());
    }

    // S5 — Table recreate on engine change.
    #[test]
    fn s5_table_recreate_on_engine_change() {
        let old_defs = canonicalize(vec![SchemaDefinition::Table(base_table("MergeTree"))]);
        let new_defs = canonicalize(vec![SchemaDefinition::Table(base_table("ReplacingMergeTree"))]);

        let plan = diff(&old_defs, &new_defs);
        assert!(plan
            .operations
            .iter()
            .any(|o| matches!(o.type_, OperationType::DropTable) && o.risk == Risk::Danger));
        assert!(plan
            .operations
            .iter()
            .any(|o| matches!(o.type_, OperationType::CreateTable) && o.risk == Risk::Safe));
    }

    #[test]
    fn identical_schemas_produce_empty_plan() {
        let defs = canonicalize(vec![SchemaDefinition::Table(base_table("MergeTree"))]);
        let plan = diff(&defs, &defs);
        assert!(plan.operations.is_empty());
        assert_eq!(plan.risk_summary.safe, 0);
        assert_eq!(plan.risk_summary.caution, 0);
        assert_eq!(plan.risk_summary.danger, 0);
    }

    #[test]
    fn operation_keys_are_unique_and_sorted() {
        let old_defs = canonicalize(vec![SchemaDefinition::Table(base_table("MergeTree"))]);
        let mut new_table = base_table("MergeTree");
        new_table.columns.push(Column {
            name: "a".into(),
            type_: "String".into(),
            nullable: None,
            default: None,
            comment: None,
            renamed_from: None,
        });
        new_table.columns.push(Column {
            name: "b".into(),
            type_: "String".into(),
            nullable: None,
            default: None,
            comment: None,
            renamed_from: None,
        });
        let new_defs = canonicalize(vec![SchemaDefinition::Table(new_table)]);
        let plan = diff(&old_defs, &new_defs);

        let mut keys: Vec<&str> = plan.operations.iter().map(|o| o.key.as_str()).collect();
        let unique: BTreeSet<&str> = keys.iter().copied().collect();
        assert_eq!(keys.len(), unique.len());

        let sorted_copy = {
            let mut k = keys.clone();
            k.sort();
            k
        };
        keys.sort_by(|a, b| a.cmp(b));
        assert_eq!(keys, sorted_copy);
    }
}
