//! Migration Runner (§4.7): orders pending migrations, enforces the
//! checksum and destructive gates, applies statements, and journals.

use crate::engine::markers::{parse_markers, OperationMarker};
use crate::engine::plan::Risk;
use crate::engine::store::{
    checksum_sql, find_checksum_mismatches, list_migrations, read_journal, write_journal,
    ChecksumMismatch, Journal, JournalEntry, StoreError,
};
use globset::{Glob, GlobMatcher};
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RunnerError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("checksum mismatch")]
    ChecksumMismatch { mismatches: Vec<ChecksumMismatch> },
    #[error("destructive operations blocked")]
    DestructiveBlocked {
        destructive_migrations: Vec<String>,
        operations: Vec<OperationMarker>,
    },
    #[error("migration {name} failed: {source}")]
    MigrationFailed {
        name: String,
        #[source]
        source: anyhow::Error,
    },
}

fn compile_matcher(pattern: &str) -> anyhow::Result<GlobMatcher> {
    Ok(Glob::new(pattern)
        .map_err(|e| anyhow::anyhow!("invalid glob pattern `{pattern}`: {e}"))?
        .compile_matcher())
}

/// One `db.name` entry from `--table`, each side a compiled glob so that
/// either segment may be a literal or a pattern like `events_*`.
#[derive(Debug, Clone)]
struct TableSelector {
    database: GlobMatcher,
    name: GlobMatcher,
}

/// A scope restriction derived from `--table db.name[,db.name...]` (glob or
/// literal on either side of the `.`).
#[derive(Debug, Clone, Default)]
pub struct TableScope {
    selectors: Vec<TableSelector>,
}

impl TableScope {
    /// Build a scope from `(database_pattern, name_pattern)` pairs.
    pub fn new(entries: impl IntoIterator<Item = (String, String)>) -> anyhow::Result<Self> {
        let selectors = entries
            .into_iter()
            .map(|(db, name)| {
                Ok(TableSelector {
                    database: compile_matcher(&db)?,
                    name: compile_matcher(&name)?,
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(TableScope { selectors })
    }

    pub fn is_empty(&self) -> bool {
        self.selectors.is_empty()
    }

    fn matches_table(&self, db: &str, name: &str) -> bool {
        self.selectors
            .iter()
            .any(|s| s.database.is_match(db) && s.name.is_match(name))
    }

    fn matches_database(&self, db: &str) -> bool {
        self.selectors.iter().any(|s| s.database.is_match(db))
    }

    pub fn matches_key(&self, key: &str) -> bool {
        if let Some(rest) = key.strip_prefix("table:") {
            let qualified = rest.split(':').next().unwrap_or(rest);
            if let Some((db, name)) = qualified.split_once('.') {
                return self.matches_table(db, name);
            }
            return false;
        }
        if let Some(db) = key.strip_prefix("database:") {
            return self.matches_database(db);
        }
        false
    }
}

pub fn compute_pending(migrations_dir: &Path, journal: &Journal) -> Result<Vec<String>, StoreError> {
    let all = list_migrations(migrations_dir)?;
    let applied = journal.applied_names();
    Ok(all.into_iter().filter(|n| !applied.contains(n.as_str())).collect())
}

/// Filter `pending` file names by a `--table` scope (§4.7 step 3):
/// unannotated files pass through as a safety fallback.
pub fn filter_by_scope(
    migrations_dir: &Path,
    pending: &[String],
    scope: &TableScope,
) -> Result<(Vec<String>, Vec<String>), std::io::Error> {
    let mut matched = Vec::new();
    let mut fallback_warnings = Vec::new();

    for name in pending {
        let text = std::fs::read_to_string(migrations_dir.join(name))?;
        let markers = parse_markers(&text);
        if markers.is_empty() {
            matched.push(name.clone());
            fallback_warnings.push(format!(
                "{name} has no operation markers; included as a safety fallback"
            ));
            continue;
        }
        if markers.iter().any(|m| scope.matches_key(&m.key)) {
            matched.push(name.clone());
        }
    }
    Ok((matched, fallback_warnings))
}

#[derive(Debug, Clone)]
pub struct DestructiveOperation {
    pub migration: String,
    pub key: String,
    #[allow(dead_code)]
    pub warning_code: &'static str,
}

/// Check the destructive gate over a set of pending migrations' markers.
/// Returns the list of blocking operations (empty if the gate passes).
pub fn destructive_operations(
    migrations_dir: &Path,
    pending: &[String],
) -> Result<Vec<DestructiveOperation>, std::io::Error> {
    let mut found = Vec::new();
    for name in pending {
        let text = std::fs::read_to_string(migrations_dir.join(name))?;
        for marker in parse_markers(&text) {
            if marker.risk == Risk::Danger {
                found.push(DestructiveOperation {
                    migration: name.clone(),
                    key: marker.key,
                    warning_code: "drop_table_data_loss",
                });
            }
        }
    }
    Ok(found)
}

/// Split a migration file's body into executable statements: drop
/// `--`-prefixed comment lines, split on `;` respecting single-quote and
/// backtick quoting, trim, drop empties.
pub fn extract_statements(body: &str) -> Vec<String> {
    let without_comments: String = body
        .lines()
        .filter(|line| !line.trim_start().starts_with("--"))
        .collect::<Vec<_>>()
        .join("\n");

    let mut statements = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for c in without_comments.chars() {
        match quote {
            Some(q) => {
                current.push(c);
                if c == q {
                    quote = None;
                }
            }
            None => match c {
                '\'' | '`' => {
                    quote = Some(c);
                    current.push(c);
                }
                ';' => {
                    statements.push(current.trim().to_string());
                    current.clear();
                }
                _ => current.push(c),
            },
        }
    }
    if !current.trim().is_empty() {
        statements.push(current.trim().to_string());
    }
    statements.into_iter().filter(|s| !s.is_empty()).collect()
}

/// Abstraction over "apply one DDL statement", so the runner can be tested
/// without a live ClickHouse connection.
#[async_trait::async_trait]
pub trait DdlExecutor: Send + Sync {
    async fn execute(&self, sql: &str) -> anyhow::Result<()>;
}

pub struct ExecuteOutcome {
    pub applied: Vec<String>,
}

/// Execute mode (§4.7 step 5): checksum gate, then for each pending file in
/// order, split statements, run them, and journal before moving on. Any
/// statement failure stops the run with the in-progress file NOT journaled.
pub async fn execute_pending(
    migrations_dir: &Path,
    meta_dir: &Path,
    executor: &dyn DdlExecutor,
    pending: &[String],
    now_iso8601: impl Fn() -> String,
) -> Result<ExecuteOutcome, RunnerError> {
    let mut journal = read_journal(meta_dir)?;
    let mut applied = Vec::new();

    for name in pending {
        let path = migrations_dir.join(name);
        let text = std::fs::read_to_string(&path).map_err(|source| {
            RunnerError::Store(StoreError::Io {
                path: path.clone(),
                source,
            })
        })?;
        let statements = extract_statements(&text);

        for statement in &statements {
            executor
                .execute(statement)
                .await
                .map_err(|source| RunnerError::MigrationFailed {
                    name: name.clone(),
                    source,
                })?;
        }

        journal.applied.push(JournalEntry {
            name: name.clone(),
            applied_at: now_iso8601(),
            checksum: checksum_sql(&text),
        });
        write_journal(meta_dir, &journal)?;
        applied.push(name.clone());
    }

    Ok(ExecuteOutcome { applied })
}

/// Pre-execute gate chain: checksum mismatches first, then (if scoped) the
/// table-scope filter, then the destructive gate.
pub struct GateCheck {
    pub pending: Vec<String>,
    pub fallback_warnings: Vec<String>,
}

pub fn run_gates(
    migrations_dir: &Path,
    meta_dir: &Path,
    scope: Option<&TableScope>,
    allow_destructive: bool,
) -> Result<GateCheck, RunnerError> {
    let journal = read_journal(meta_dir)?;
    let mismatches = find_checksum_mismatches(migrations_dir, &journal)?;
    if !mismatches.is_empty() {
        return Err(RunnerError::ChecksumMismatch { mismatches });
    }

    let pending = compute_pending(migrations_dir, &journal)?;
    let (pending, fallback_warnings) = match scope {
        Some(scope) => filter_by_scope(migrations_dir, &pending, scope)
            .map_err(|source| RunnerError::Store(StoreError::Io {
                path: migrations_dir.to_path_buf(),
                source,
            }))?,
        None => (pending, Vec::new()),
    };

    if !allow_destructive {
        let destructive = destructive_operations(migrations_dir, &pending)
            .map_err(|source| RunnerError::Store(StoreError::Io {
                path: migrations_dir.to_path_buf(),
                source,
            }))?;
        if !destructive.is_empty() {
            let destructive_migrations: Vec<String> = destructive
                .iter()
                .map(|d| d.migration.clone())
                .collect::<HashSet<_>>()
                .into_iter()
                .collect();
            let operations: Vec<OperationMarker> = destructive
                .iter()
                .map(|d| OperationMarker {
                    type_: "drop_table".to_string(),
                    key: d.key.clone(),
                    risk: Risk::Danger,
                })
                .collect();
            return Err(RunnerError::DestructiveBlocked {
                destructive_migrations,
                operations,
            });
        }
    }

    Ok(GateCheck {
        pending,
        fallback_warnings,
    })
}
