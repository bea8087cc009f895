//! Safety-Marker Parser (§4.10): extracts `-- operation: <type> key=<key>
//! risk=<risk>` comment lines from a migration file body.

use crate::engine::plan::{OperationType, Risk};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationMarker {
    #[serde(rename = "type")]
    pub type_: String,
    pub key: String,
    pub risk: Risk,
}

fn parse_operation_type(s: &str) -> Option<OperationType> {
    use OperationType::*;
    Some(match s {
        "create_database" => CreateDatabase,
        "create_table" => CreateTable,
        "drop_table" => DropTable,
        "create_view" => CreateView,
        "drop_view" => DropView,
        "create_materialized_view" => CreateMaterializedView,
        "drop_materialized_view" => DropMaterializedView,
        "alter_table_add_column" => AlterTableAddColumn,
        "alter_table_modify_column" => AlterTableModifyColumn,
        "alter_table_drop_column" => AlterTableDropColumn,
        "alter_table_rename_column" => AlterTableRenameColumn,
        "alter_table_rename_table" => AlterTableRenameTable,
        "alter_table_add_index" => AlterTableAddIndex,
        "alter_table_drop_index" => AlterTableDropIndex,
        "alter_table_add_projection" => AlterTableAddProjection,
        "alter_table_drop_projection" => AlterTableDropProjection,
        "alter_table_modify_setting" => AlterTableModifySetting,
        "alter_table_reset_setting" => AlterTableResetSetting,
        "alter_table_modify_ttl" => AlterTableModifyTtl,
        _ => return None,
    })
}

fn parse_risk(s: &str) -> Option<Risk> {
    match s {
        "safe" => Some(Risk::Safe),
        "caution" => Some(Risk::Caution),
        "danger" => Some(Risk::Danger),
        _ => None,
    }
}

/// Parse one `-- operation: ...` line, tolerant of leading whitespace.
/// Returns `None` for non-matching lines; they are silently ignored.
fn parse_marker_line(line: &str) -> Option<OperationMarker> {
    let trimmed = line.trim_start();
    let rest = trimmed.strip_prefix("-- operation:")?.trim();

    let mut type_str = None;
    let mut key = None;
    let mut risk = None;

    let mut parts = rest.split_whitespace();
    type_str = parts.next().or(type_str);
    for part in parts {
        if let Some(v) = part.strip_prefix("key=") {
            key = Some(v.to_string());
        } else if let Some(v) = part.strip_prefix("risk=") {
            risk = parse_risk(v);
        }
    }

    let type_str = type_str?;
    parse_operation_type(type_str)?;
    Some(OperationMarker {
        type_: type_str.to_string(),
        key: key?,
        risk: risk?,
    })
}

/// Extract every recognizable marker from a migration file's full text, in
/// the order they appear (which is plan order, per §4.3 step 5).
pub fn parse_markers(content: &str) -> Vec<OperationMarker> {
    content.lines().filter_map(parse_marker_line).collect()
}
