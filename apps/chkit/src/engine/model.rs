//! Schema model: the typed objects a project declares and the toolkit diffs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A scalar default value attached to a column.
///
/// String values prefixed with `fn:` render as raw SQL in the generated DDL
/// (the prefix itself is never persisted in the rendered output); any other
/// string is quoted literally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DefaultValue {
    String(String),
    Number(f64),
    Bool(bool),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenamedFrom {
    pub database: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default)]
    pub nullable: Option<bool>,
    #[serde(default)]
    pub default: Option<DefaultValue>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default, rename = "renamedFrom")]
    pub renamed_from: Option<String>,
}

impl Column {
    /// The subset of fields that must match for two columns (possibly under
    /// different names) to be considered the same shape by rename inference
    /// and drift comparison.
    pub fn shape(&self) -> (String, Option<bool>, Option<String>, Option<String>) {
        (
            self.type_.clone(),
            self.nullable,
            self.default.as_ref().map(default_shape_key),
            self.comment.clone(),
        )
    }
}

fn default_shape_key(d: &DefaultValue) -> String {
    match d {
        DefaultValue::String(s) => s.clone(),
        DefaultValue::Number(n) => n.to_string(),
        DefaultValue::Bool(b) => b.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IndexType {
    #[serde(rename = "minmax")]
    MinMax,
    #[serde(rename = "set")]
    Set,
    #[serde(rename = "bloom_filter")]
    BloomFilter,
    #[serde(rename = "tokenbf_v1")]
    TokenBf,
    #[serde(rename = "ngrambf_v1")]
    NgramBf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableIndex {
    pub name: String,
    pub expression: String,
    #[serde(rename = "type")]
    pub type_: IndexType,
    pub granularity: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    pub name: String,
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub database: String,
    pub name: String,
    pub columns: Vec<Column>,
    pub engine: String,
    #[serde(rename = "primaryKey")]
    pub primary_key: Vec<String>,
    #[serde(rename = "orderBy")]
    pub order_by: Vec<String>,
    #[serde(default, rename = "uniqueKey")]
    pub unique_key: Option<Vec<String>>,
    #[serde(default, rename = "partitionBy")]
    pub partition_by: Option<String>,
    #[serde(default)]
    pub ttl: Option<String>,
    #[serde(default)]
    pub settings: BTreeMap<String, String>,
    #[serde(default)]
    pub indexes: Vec<TableIndex>,
    #[serde(default)]
    pub projections: Vec<Projection>,
    #[serde(default, rename = "renamedFrom")]
    pub renamed_from: Option<RenamedFrom>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct View {
    pub database: String,
    pub name: String,
    #[serde(rename = "as")]
    pub as_: String,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterializedViewTarget {
    pub database: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterializedView {
    pub database: String,
    pub name: String,
    pub to: MaterializedViewTarget,
    #[serde(rename = "as")]
    pub as_: String,
    #[serde(default)]
    pub comment: Option<String>,
}

/// A single declared schema object. The `(kind, database, name)` triple is
/// its identity across canonicalization, diffing, and drift comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SchemaDefinition {
    Table(Table),
    View(View),
    MaterializedView(MaterializedView),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Kind {
    Table,
    View,
    MaterializedView,
}

impl Kind {
    /// Canonical sort rank: table=0, view=1, materialized_view=2 (§4.1).
    pub fn rank(self) -> u8 {
        match self {
            Kind::Table => 0,
            Kind::View => 1,
            Kind::MaterializedView => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Kind::Table => "table",
            Kind::View => "view",
            Kind::MaterializedView => "materialized_view",
        }
    }
}

impl SchemaDefinition {
    pub fn kind(&self) -> Kind {
        match self {
            SchemaDefinition::Table(_) => Kind::Table,
            SchemaDefinition::View(_) => Kind::View,
            SchemaDefinition::MaterializedView(_) => Kind::MaterializedView,
        }
    }

    pub fn database(&self) -> &str {
        match self {
            SchemaDefinition::Table(t) => &t.database,
            SchemaDefinition::View(v) => &v.database,
            SchemaDefinition::MaterializedView(m) => &m.database,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            SchemaDefinition::Table(t) => &t.name,
            SchemaDefinition::View(v) => &v.name,
            SchemaDefinition::MaterializedView(m) => &m.name,
        }
    }

    /// Identity key `(kind, database, name)` used throughout the planner and
    /// drift comparer to match entities between two definition sets.
    pub fn identity(&self) -> (Kind, String, String) {
        (self.kind(), self.database().to_string(), self.name().to_string())
    }

    pub fn as_table(&self) -> Option<&Table> {
        match self {
            SchemaDefinition::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_view(&self) -> Option<&View> {
        match self {
            SchemaDefinition::View(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_materialized_view(&self) -> Option<&MaterializedView> {
        match self {
            SchemaDefinition::MaterializedView(m) => Some(m),
            _ => None,
        }
    }
}

/// The persisted, canonicalized definition set written after a successful
/// `generate` (§3, §6.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    #[serde(rename = "generatedAt")]
    pub generated_at: String,
    pub definitions: Vec<SchemaDefinition>,
}

impl Snapshot {
    pub fn new(generated_at: String, definitions: Vec<SchemaDefinition>) -> Self {
        Self {
            version: 1,
            generated_at,
            definitions,
        }
    }
}
