//! Drift Comparer (§4.5): compares an expected snapshot to already-fetched
//! actual shapes. Pure — introspection itself lives in the ClickHouse client
//! boundary (§10.4), so this module is testable without a live server.

use crate::engine::keyexpr::flatten_key_columns;
use crate::engine::model::{DefaultValue, Kind, SchemaDefinition, Table};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

/// A table shape as introspected from `system.tables`/`system.columns`.
#[derive(Debug, Clone)]
pub struct ActualTableShape {
    pub database: String,
    pub name: String,
    pub engine: String,
    pub columns: Vec<ActualColumn>,
    pub settings: BTreeMap<String, String>,
    pub index_names: Vec<String>,
    pub projection_names: Vec<String>,
    /// Raw clause text as ClickHouse reports it, e.g. `"(id, email)"`.
    pub primary_key: String,
    pub order_by: String,
    pub unique_key: Option<String>,
    pub partition_by: Option<String>,
    pub ttl: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ActualColumn {
    pub name: String,
    pub type_: String,
    pub nullable: Option<bool>,
    /// Raw default expression text, already unwrapped from `system.columns`.
    pub default: Option<String>,
    pub comment: Option<String>,
}

/// A bare object identity as seen by introspection, for kinds that are not
/// deep-compared (views, materialized views) plus every table.
#[derive(Debug, Clone)]
pub struct ActualObject {
    pub kind: Kind,
    pub database: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectDriftCode {
    MissingObject,
    ExtraObject,
    KindMismatch,
}

#[derive(Debug, Clone, Serialize)]
pub struct ObjectDriftItem {
    pub code: ObjectDriftCode,
    pub object: String,
    #[serde(rename = "expectedKind", skip_serializing_if = "Option::is_none")]
    pub expected_kind: Option<String>,
    #[serde(rename = "actualKind", skip_serializing_if = "Option::is_none")]
    pub actual_kind: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TableDrift {
    pub object: String,
    #[serde(rename = "reasonCodes")]
    pub reason_codes: Vec<String>,
    pub columns: Vec<String>,
    pub settings: Vec<String>,
    pub indexes: Vec<String>,
    pub projections: Vec<String>,
    #[serde(rename = "ttlMismatch")]
    pub ttl_mismatch: bool,
    #[serde(rename = "engineMismatch")]
    pub engine_mismatch: bool,
    #[serde(rename = "primaryKeyMismatch")]
    pub primary_key_mismatch: bool,
    #[serde(rename = "orderByMismatch")]
    pub order_by_mismatch: bool,
    #[serde(rename = "uniqueKeyMismatch")]
    pub unique_key_mismatch: bool,
    #[serde(rename = "partitionByMismatch")]
    pub partition_by_mismatch: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DriftReport {
    pub drifted: bool,
    #[serde(rename = "objectDrift")]
    pub object_drift: Vec<ObjectDriftItem>,
    #[serde(rename = "tableDrift")]
    pub table_drift: Vec<TableDrift>,
}

fn object_label(kind: Kind, database: &str, name: &str) -> String {
    format!("{}:{database}.{name}", kind.as_str())
}

fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn unquote(s: &str) -> String {
    let t = s.trim();
    if t.len() >= 2 && t.starts_with('\'') && t.ends_with('\'') {
        t[1..t.len() - 1].replace("''", "'")
    } else {
        t.to_string()
    }
}

fn normalize_key_clause(raw: &str) -> String {
    let no_backticks = raw.replace('`', "");
    let trimmed = no_backticks.trim();
    let stripped = if trimmed.starts_with('(') && trimmed.ends_with(')') {
        &trimmed[1..trimmed.len() - 1]
    } else {
        trimmed
    };
    stripped
        .split(',')
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

fn expected_key_clause(entries: &[String]) -> String {
    flatten_key_columns(entries).join(", ")
}

/// Engine families `SharedMergeTree`/`MergeTree` are treated as equivalent;
/// the comparison strips a leading `Shared` and appends `()` if absent.
fn normalize_engine(engine: &str) -> String {
    let base = engine.strip_prefix("Shared").unwrap_or(engine);
    if base.contains('(') {
        base.to_string()
    } else {
        format!("{base}()")
    }
}

fn render_expected_default(d: &DefaultValue) -> String {
    match d {
        DefaultValue::String(s) => s.strip_prefix("fn:").unwrap_or(s).to_string(),
        DefaultValue::Number(n) => n.to_string(),
        DefaultValue::Bool(b) => b.to_string(),
    }
}

fn defaults_match(expected: Option<&DefaultValue>, actual: Option<&str>) -> bool {
    match (expected, actual) {
        (None, None) => true,
        (None, Some(_)) | (Some(_), None) => false,
        (Some(d), Some(a)) => {
            collapse_ws(&unquote(&render_expected_default(d))) == collapse_ws(&unquote(a))
        }
    }
}

/// Deep-compare one expected table against its introspected actual shape.
/// Returns `None` if the two agree on every dimension.
pub fn compare_table(expected: &Table, actual: &ActualTableShape) -> Option<TableDrift> {
    let object = object_label(Kind::Table, &expected.database, &expected.name);
    let mut drift = TableDrift {
        object,
        ..Default::default()
    };

    let expected_cols: HashMap<&str, &crate::engine::model::Column> =
        expected.columns.iter().map(|c| (c.name.as_str(), c)).collect();
    let actual_cols: HashMap<&str, &ActualColumn> =
        actual.columns.iter().map(|c| (c.name.as_str(), c)).collect();

    for col in &expected.columns {
        match actual_cols.get(col.name.as_str()) {
            None => {
                drift.columns.push(format!("missing column `{}`", col.name));
                drift.reason_codes.push("missing_column".to_string());
            }
            Some(a) => {
                let type_matches = col.type_ == a.type_;
                let nullable_matches = col.nullable.unwrap_or(false) == a.nullable.unwrap_or(false);
                let default_matches = defaults_match(col.default.as_ref(), a.default.as_deref());
                let comment_matches = col.comment.as_deref().unwrap_or("") == a.comment.as_deref().unwrap_or("");
                if !(type_matches && nullable_matches && default_matches && comment_matches) {
                    drift.columns.push(format!("column `{}` shape mismatch", col.name));
                    drift.reason_codes.push("column_type_mismatch".to_string());
                }
            }
        }
    }
    for col in &actual.columns {
        if !expected_cols.contains_key(col.name.as_str()) {
            drift.columns.push(format!("extra column `{}`", col.name));
            drift.reason_codes.push("extra_column".to_string());
        }
    }

    for (k, v) in &expected.settings {
        match actual.settings.get(k) {
            None => {
                drift.settings.push(format!("missing setting `{k}`"));
                drift.reason_codes.push("missing_setting".to_string());
            }
            Some(av) if av != v => {
                drift.settings.push(format!("setting `{k}` value mismatch"));
                drift.reason_codes.push("setting_value_mismatch".to_string());
            }
            Some(_) => {}
        }
    }
    for k in actual.settings.keys() {
        if !expected.settings.contains_key(k) {
            drift.settings.push(format!("extra setting `{k}`"));
            drift.reason_codes.push("extra_setting".to_string());
        }
    }

    let expected_idx: HashSet<&str> = expected.indexes.iter().map(|i| i.name.as_str()).collect();
    let actual_idx: HashSet<&str> = actual.index_names.iter().map(|s| s.as_str()).collect();
    for name in &expected_idx {
        if !actual_idx.contains(name) {
            drift.indexes.push(format!("missing index `{name}`"));
            drift.reason_codes.push("missing_index".to_string());
        }
    }
    for name in &actual_idx {
        if !expected_idx.contains(name) {
            drift.indexes.push(format!("extra index `{name}`"));
            drift.reason_codes.push("extra_index".to_string());
        }
    }

    let expected_proj: HashSet<&str> = expected.projections.iter().map(|p| p.name.as_str()).collect();
    let actual_proj: HashSet<&str> = actual.projection_names.iter().map(|s| s.as_str()).collect();
    for name in &expected_proj {
        if !actual_proj.contains(name) {
            drift.projections.push(format!("missing projection `{name}`"));
            drift.reason_codes.push("missing_projection".to_string());
        }
    }
    for name in &actual_proj {
        if !expected_proj.contains(name) {
            drift.projections.push(format!("extra projection `{name}`"));
            drift.reason_codes.push("extra_projection".to_string());
        }
    }

    let expected_ttl = expected.ttl.as_deref().map(collapse_ws).unwrap_or_default();
    let actual_ttl = actual.ttl.as_deref().map(collapse_ws).unwrap_or_default();
    if expected_ttl != actual_ttl {
        drift.ttl_mismatch = true;
        drift.reason_codes.push("ttl_mismatch".to_string());
    }

    if normalize_engine(&expected.engine) != normalize_engine(&actual.engine) {
        drift.engine_mismatch = true;
        drift.reason_codes.push("engine_mismatch".to_string());
    }

    if expected_key_clause(&expected.primary_key) != normalize_key_clause(&actual.primary_key) {
        drift.primary_key_mismatch = true;
        drift.reason_codes.push("primary_key_mismatch".to_string());
    }
    if expected_key_clause(&expected.order_by) != normalize_key_clause(&actual.order_by) {
        drift.order_by_mismatch = true;
        drift.reason_codes.push("order_by_mismatch".to_string());
    }
    let expected_unique = expected.unique_key.as_ref().map(|k| expected_key_clause(k));
    let actual_unique = actual.unique_key.as_deref().map(normalize_key_clause);
    if expected_unique != actual_unique {
        drift.unique_key_mismatch = true;
        drift.reason_codes.push("unique_key_mismatch".to_string());
    }
    let expected_partition = expected.partition_by.as_deref().map(collapse_ws);
    let actual_partition = actual.partition_by.as_deref().map(collapse_ws);
    if expected_partition != actual_partition {
        drift.partition_by_mismatch = true;
        drift.reason_codes.push("partition_by_mismatch".to_string());
    }

    if drift.reason_codes.is_empty() {
        None
    } else {
        Some(drift)
    }
}

/// Compare an expected, canonicalized definition set to already-fetched
/// actual objects/tables. Actual objects outside `expected`'s databases are
/// never considered (by-database scope).
pub fn compare(
    expected: &[SchemaDefinition],
    actual_objects: &[ActualObject],
    actual_tables: &[ActualTableShape],
) -> DriftReport {
    let expected_databases: HashSet<&str> = expected.iter().map(|d| d.database()).collect();

    let expected_by_name: HashMap<(String, String), Kind> = expected
        .iter()
        .map(|d| ((d.database().to_string(), d.name().to_string()), d.kind()))
        .collect();

    let actual_by_name: HashMap<(String, String), Kind> = actual_objects
        .iter()
        .filter(|o| expected_databases.contains(o.database.as_str()))
        .map(|o| ((o.database.clone(), o.name.clone()), o.kind))
        .collect();

    let mut object_drift = Vec::new();

    for (key, kind) in &expected_by_name {
        match actual_by_name.get(key) {
            None => object_drift.push(ObjectDriftItem {
                code: ObjectDriftCode::MissingObject,
                object: object_label(*kind, &key.0, &key.1),
                expected_kind: Some(kind.as_str().to_string()),
                actual_kind: None,
            }),
            Some(actual_kind) if actual_kind != kind => object_drift.push(ObjectDriftItem {
                code: ObjectDriftCode::KindMismatch,
                object: format!("{}.{}", key.0, key.1),
                expected_kind: Some(kind.as_str().to_string()),
                actual_kind: Some(actual_kind.as_str().to_string()),
            }),
            Some(_) => {}
        }
    }
    for (key, kind) in &actual_by_name {
        if !expected_by_name.contains_key(key) {
            object_drift.push(ObjectDriftItem {
                code: ObjectDriftCode::ExtraObject,
                object: object_label(*kind, &key.0, &key.1),
                expected_kind: None,
                actual_kind: Some(kind.as_str().to_string()),
            });
        }
    }
    object_drift.sort_by(|a, b| a.object.cmp(&b.object));

    let actual_table_map: HashMap<(String, String), &ActualTableShape> = actual_tables
        .iter()
        .map(|t| ((t.database.clone(), t.name.clone()), t))
        .collect();

    let mut table_drift = Vec::new();
    for def in expected {
        let Some(table) = def.as_table() else { continue };
        let key = (table.database.clone(), table.name.clone());
        if actual_by_name.get(&key) != Some(&Kind::Table) {
            continue;
        }
        if let Some(actual) = actual_table_map.get(&key) {
            if let Some(d) = compare_table(table, actual) {
                table_drift.push(d);
            }
        }
    }
    table_drift.sort_by(|a, b| a.object.cmp(&b.object));

    let drifted = !object_drift.is_empty() || !table_drift.is_empty();
    DriftReport {
        drifted,
        object_drift,
        table_drift,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::model::Column;
    use std::collections::BTreeMap;

    fn expected_table() -> Table {
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
            engine: "MergeTree".into(),
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

    fn matching_actual() -> ActualTableShape {
        ActualTableShape {
            database: "app".into(),
            name: "users".into(),
            engine: "MergeTree()".into(),
            columns: vec![
                ActualColumn {
                    name: "id".into(),
                    type_: "UInt64".into(),
                    nullable: None,
                    default: None,
                    comment: None,
                },
                ActualColumn {
                    name: "email".into(),
                    type_: "String".into(),
                    nullable: None,
                    default: None,
                    comment: None,
                },
            ],
            settings: BTreeMap::new(),
            index_names: vec![],
            projection_names: vec![],
            primary_key: "(id)".into(),
            order_by: "(id)".into(),
            unique_key: None,
            partition_by: None,
            ttl: None,
        }
    }

    #[test]
    fn matching_shapes_yield_no_drift() {
        assert!(compare_table(&expected_table(), &matching_actual()).is_none());
    }

    #[test]
    fn engine_family_equivalence_is_narrow() {
        let mut actual = matching_actual();
        actual.engine = "SharedMergeTree".into();
        assert!(compare_table(&expected_table(), &actual).is_none());
    }

    #[test]
    fn s8_drift_detection() {
        let mut actual = matching_actual();
        actual.columns.push(ActualColumn {
            name: "rogue".into(),
            type_: "String".into(),
            nullable: None,
            default: None,
            comment: None,
        });

        let expected_defs = vec![SchemaDefinition::Table(expected_table())];
        let actual_objects = vec![
            ActualObject {
                kind: Kind::Table,
                database: "app".into(),
                name: "users".into(),
            },
            ActualObject {
                kind: Kind::View,
                database: "app".into(),
                name: "manual_view".into(),
            },
        ];
        let report = compare(&expected_defs, &actual_objects, std::slice::from_ref(&actual));

        assert!(report.drifted);
        assert!(report
            .object_drift
            .iter()
            .any(|o| o.code == ObjectDriftCode::ExtraObject && o.object == "view:app.manual_view"));
        let table_drift = report
            .table_drift
            .iter()
            .find(|t| t.object == "table:app.users")
            .unwrap();
        assert!(table_drift
            .reason_codes
            .iter()
            .any(|c| c == "extra_column"));
    }

    #[test]
    fn identical_snapshot_round_trip_has_no_drift() {
        let expected_defs = vec![SchemaDefinition::Table(expected_table())];
        let actual_objects = vec![ActualObject {
            kind: Kind::Table,
            database: "app".into(),
            name: "users".into(),
        }];
        let report = compare(&expected_defs, &actual_objects, &[matching_actual()]);
        assert!(!report.drifted);
    }

    #[test]
    fn default_unquoting_treats_web_and_quoted_web_as_equal() {
        let mut expected = expected_table();
        expected.columns[1].default = Some(DefaultValue::String("web".into()));
        let mut actual = matching_actual();
        actual.columns[1].default = Some("'web'".into());
        assert!(compare_table(&expected, &actual).is_none());
    }
}
