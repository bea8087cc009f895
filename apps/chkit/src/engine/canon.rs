//! Deterministic normal form for a definition set (§4.1).
//!
//! `canon(canon(x)) == canon(x)` must hold: canonicalization never looks at
//! anything besides the definitions themselves, so running it twice is a
//! no-op once the set is already sorted, deduplicated, and whitespace-normalized.

use crate::engine::model::{MaterializedView, SchemaDefinition, Table, View};

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn canon_table(mut t: Table) -> Table {
    t.database = t.database.trim().to_string();
    t.name = t.name.trim().to_string();
    t.engine = t.engine.trim().to_string();

    for col in &mut t.columns {
        col.name = col.name.trim().to_string();
        col.type_ = col.type_.trim().to_string();
    }

    t.primary_key = t.primary_key.iter().map(|e| e.trim().to_string()).collect();
    t.order_by = t.order_by.iter().map(|e| e.trim().to_string()).collect();
    t.unique_key = t
        .unique_key
        .map(|keys| keys.iter().map(|e| e.trim().to_string()).collect());

    t.partition_by = t.partition_by.map(|p| collapse_whitespace(&p));
    t.ttl = t.ttl.map(|ttl| collapse_whitespace(&ttl));

    t.indexes.sort_by(|a, b| a.name.cmp(&b.name));
    for idx in &mut t.indexes {
        idx.name = idx.name.trim().to_string();
        idx.expression = collapse_whitespace(&idx.expression);
    }

    t.projections.sort_by(|a, b| a.name.cmp(&b.name));
    for proj in &mut t.projections {
        proj.name = proj.name.trim().to_string();
        proj.query = collapse_whitespace(&proj.query);
    }

    // BTreeMap already iterates and serializes in key order; nothing further
    // is needed to "sort settings by key".
    t
}

fn canon_view(mut v: View) -> View {
    v.database = v.database.trim().to_string();
    v.name = v.name.trim().to_string();
    v.as_ = collapse_whitespace(&v.as_);
    v
}

fn canon_materialized_view(mut m: MaterializedView) -> MaterializedView {
    m.database = m.database.trim().to_string();
    m.name = m.name.trim().to_string();
    m.to.database = m.to.database.trim().to_string();
    m.to.name = m.to.name.trim().to_string();
    m.as_ = collapse_whitespace(&m.as_);
    m
}

fn canon_one(def: SchemaDefinition) -> SchemaDefinition {
    match def {
        SchemaDefinition::Table(t) => SchemaDefinition::Table(canon_table(t)),
        SchemaDefinition::View(v) => SchemaDefinition::View(canon_view(v)),
        SchemaDefinition::MaterializedView(m) => {
            SchemaDefinition::MaterializedView(canon_materialized_view(m))
        }
    }
}

/// Canonicalize a full definition set: normalize every definition, sort by
/// `(kind-rank, database, name)`, and deduplicate on identity with the last
/// occurrence winning.
pub fn canonicalize(defs: Vec<SchemaDefinition>) -> Vec<SchemaDefinition> {
    let normalized: Vec<SchemaDefinition> = defs.into_iter().map(canon_one).collect();

    // Last occurrence wins: walk in order, overwrite earlier entries in a
    // map keyed by identity, then re-sort for a stable final order.
    let mut by_identity: std::collections::BTreeMap<(u8, String, String), SchemaDefinition> =
        std::collections::BTreeMap::new();

    for def in normalized {
        let (kind, db, name) = def.identity();
        by_identity.insert((kind.rank(), db, name), def);
    }

    by_identity.into_values().collect()
}
