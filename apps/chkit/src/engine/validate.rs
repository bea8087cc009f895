//! Structural invariants over a canonicalized definition set (§4.2).

use crate::engine::keyexpr::flatten_key_columns;
use crate::engine::model::SchemaDefinition;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCode {
    DuplicateObjectName,
    DuplicateColumnName,
    DuplicateIndexName,
    DuplicateProjectionName,
    PrimaryKeyMissingColumn,
    OrderByMissingColumn,
}

#[derive(Debug, Clone, Serialize)]
pub struct Issue {
    pub code: IssueCode,
    pub object: String,
    pub message: String,
}

fn object_label(def: &SchemaDefinition) -> String {
    format!("{}:{}.{}", def.kind().as_str(), def.database(), def.name())
}

/// Validate a canonicalized set. Pure: never touches the filesystem or a
/// live connection. An empty return means the set satisfies every §3
/// invariant.
pub fn validate(defs: &[SchemaDefinition]) -> Vec<Issue> {
    let mut issues = Vec::new();

    let mut seen_objects: HashSet<(crate::engine::model::Kind, String, String)> = HashSet::new();
    for def in defs {
        if !seen_objects.insert(def.identity()) {
            issues.push(Issue {
                code: IssueCode::DuplicateObjectName,
                object: object_label(def),
                message: format!("duplicate object identity: {}", object_label(def)),
            });
        }
    }

    for def in defs {
        let Some(table) = def.as_table() else {
            continue;
        };
        let label = object_label(def);

        let mut seen_columns: HashMap<&str, usize> = HashMap::new();
        for col in &table.columns {
            *seen_columns.entry(col.name.as_str()).or_insert(0) += 1;
        }
        for (name, count) in &seen_columns {
            if *count > 1 {
                issues.push(Issue {
                    code: IssueCode::DuplicateColumnName,
                    object: label.clone(),
                    message: format!("duplicate column `{name}` on {label}"),
                });
            }
        }

        let mut seen_indexes: HashMap<&str, usize> = HashMap::new();
        for idx in &table.indexes {
            *seen_indexes.entry(idx.name.as_str()).or_insert(0) += 1;
        }
        for (name, count) in &seen_indexes {
            if *count > 1 {
                issues.push(Issue {
                    code: IssueCode::DuplicateIndexName,
                    object: label.clone(),
                    message: format!("duplicate index `{name}` on {label}"),
                });
            }
        }

        let mut seen_projections: HashMap<&str, usize> = HashMap::new();
        for proj in &table.projections {
            *seen_projections.entry(proj.name.as_str()).or_insert(0) += 1;
        }
        for (name, count) in &seen_projections {
            if *count > 1 {
                issues.push(Issue {
                    code: IssueCode::DuplicateProjectionName,
                    object: label.clone(),
                    message: format!("duplicate projection `{name}` on {label}"),
                });
            }
        }

        let declared: HashSet<&str> = table.columns.iter().map(|c| c.name.as_str()).collect();

        for col in flatten_key_columns(&table.primary_key) {
            if !declared.contains(col.as_str()) {
                issues.push(Issue {
                    code: IssueCode::PrimaryKeyMissingColumn,
                    object: label.clone(),
                    message: format!("primaryKey references undeclared column `{col}` on {label}"),
                });
            }
        }

        for col in flatten_key_columns(&table.order_by) {
            if !declared.contains(col.as_str()) {
                issues.push(Issue {
                    code: IssueCode::OrderByMissingColumn,
                    object: label.clone(),
                    message: format!("orderBy references undeclared column `{col}` on {label}"),
                });
            }
        }
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::canon::canonicalize;
    use crate::engine::model::{Column, Table};
    use std::collections::BTreeMap;

    fn valid_table() -> Table {
        Table {
            database: "app".into(),
            name: "users".into(),
            columns: vec![Column {
                name: "id".into(),
                type_: "UInt64".into(),
                nullable: None,
                default: None,
                comment: None,
                renamed_from: None,
            }],
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

    #[test]
    fn valid_schema_has_no_issues() {
        let defs = canonicalize(vec![SchemaDefinition::Table(valid_table())]);
        assert!(validate(&defs).is_empty());
    }

    #[test]
    fn primary_key_missing_column_is_flagged() {
        let mut t = valid_table();
        t.primary_key = vec!["ghost".into()];
        let issues = validate(&[SchemaDefinition::Table(t)]);
        assert!(issues
            .iter()
            .any(|i| i.code == IssueCode::PrimaryKeyMissingColumn));
    }

    #[test]
    fn order_by_missing_column_is_flagged() {
        let mut t = valid_table();
        t.order_by = vec!["ghost".into()];
        let issues = validate(&[SchemaDefinition::Table(t)]);
        assert!(issues
            .iter()
            .any(|i| i.code == IssueCode::OrderByMissingColumn));
    }

    #[test]
    fn duplicate_column_name_is_flagged() {
        let mut t = valid_table();
        let id = t.columns[0].clone();
        t.columns.push(id);
        let issues = validate(&[SchemaDefinition::Table(t)]);
        assert!(issues
            .iter()
            .any(|i| i.code == IssueCode::DuplicateColumnName));
    }

    #[test]
    fn compound_key_clause_with_tuple_is_respected() {
        let mut t = valid_table();
        t.columns.push(Column {
            name: "region".into(),
            type_: "String".into(),
            nullable: None,
            default: None,
            comment: None,
            renamed_from: None,
        });
        t.order_by = vec!["id, region".into()];
        let issues = validate(&[SchemaDefinition::Table(t)]);
        assert!(issues.is_empty());
    }
}
