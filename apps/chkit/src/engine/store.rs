//! Migration Store (§4.6): on-disk migration files, snapshot, journal, and
//! checksums. Every write goes through write-to-temp-then-rename so a crash
//! mid-write never leaves a torn file on disk.

use crate::engine::markers::parse_markers;
use crate::engine::model::{SchemaDefinition, Snapshot};
use crate::engine::plan::MigrationPlan;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StoreError {
    #[error("invalid journal JSON in {path}: {source}")]
    InvalidJournal {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid snapshot JSON in {path}: {source}")]
    InvalidSnapshot {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("I/O failure on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub name: String,
    #[serde(rename = "appliedAt")]
    pub applied_at: String,
    pub checksum: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Journal {
    pub version: u32,
    pub applied: Vec<JournalEntry>,
}

impl Journal {
    pub fn empty() -> Self {
        Journal {
            version: 1,
            applied: Vec::new(),
        }
    }

    pub fn applied_names(&self) -> HashSet<&str> {
        self.applied.iter().map(|e| e.name.as_str()).collect()
    }
}

/// Backing for journal persistence: a local JSON file (default) or a
/// ClickHouse table (selected via `CHKIT_JOURNAL_TABLE`, §6.5). Both modes
/// implement the same read/write contract.
#[async_trait::async_trait]
pub trait JournalStore: Send + Sync {
    async fn read(&self) -> Result<Journal, StoreError>;
    async fn write(&self, journal: &Journal) -> Result<(), StoreError>;
}

pub struct FileJournalStore {
    pub meta_dir: PathBuf,
}

#[async_trait::async_trait]
impl JournalStore for FileJournalStore {
    async fn read(&self) -> Result<Journal, StoreError> {
        read_journal(&self.meta_dir)
    }

    async fn write(&self, journal: &Journal) -> Result<(), StoreError> {
        write_journal(&self.meta_dir, journal)
    }
}

fn atomic_write(path: &Path, contents: &[u8]) -> Result<(), StoreError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(|source| StoreError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let tmp_path = dir.join(format!(
        ".{}.tmp",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("write")
    ));
    fs::write(&tmp_path, contents).map_err(|source| StoreError::Io {
        path: tmp_path.clone(),
        source,
    })?;
    fs::rename(&tmp_path, path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// Sorted `*.sql` filenames under `dir`.
pub fn list_migrations(dir: &Path) -> Result<Vec<String>, StoreError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut names: Vec<String> = fs::read_dir(dir)
        .map_err(|source| StoreError::Io {
            path: dir.to_path_buf(),
            source,
        })?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            name.ends_with(".sql").then_some(name)
        })
        .collect();
    names.sort();
    Ok(names)
}

fn snapshot_path(meta_dir: &Path) -> PathBuf {
    meta_dir.join("snapshot.json")
}

fn journal_path(meta_dir: &Path) -> PathBuf {
    meta_dir.join("journal.json")
}

pub fn read_snapshot(meta_dir: &Path) -> Result<Option<Snapshot>, StoreError> {
    let path = snapshot_path(meta_dir);
    if !path.exists() {
        return Ok(None);
    }
    let text = fs::read_to_string(&path).map_err(|source| StoreError::Io {
        path: path.clone(),
        source,
    })?;
    let snapshot = serde_json::from_str(&text).map_err(|source| StoreError::InvalidSnapshot {
        path: path.clone(),
        source,
    })?;
    Ok(Some(snapshot))
}

pub fn write_snapshot(meta_dir: &Path, snapshot: &Snapshot) -> Result<(), StoreError> {
    let path = snapshot_path(meta_dir);
    let text = crate::utilities::json::to_string_pretty_sorted(snapshot).map_err(|source| {
        StoreError::InvalidSnapshot {
            path: path.clone(),
            source,
        }
    })?;
    atomic_write(&path, text.as_bytes())
}

pub fn read_journal(meta_dir: &Path) -> Result<Journal, StoreError> {
    let path = journal_path(meta_dir);
    if !path.exists() {
        return Ok(Journal::empty());
    }
    let text = fs::read_to_string(&path).map_err(|source| StoreError::Io {
        path: path.clone(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| StoreError::InvalidJournal {
        path: path.clone(),
        source,
    })
}

pub fn write_journal(meta_dir: &Path, journal: &Journal) -> Result<(), StoreError> {
    let path = journal_path(meta_dir);
    let text = crate::utilities::json::to_string_pretty_sorted(journal).map_err(|source| {
        StoreError::InvalidJournal {
            path: path.clone(),
            source,
        }
    })?;
    atomic_write(&path, text.as_bytes())
}

/// Deterministic content hash over normalized SQL bytes (LF endings,
/// trailing newline).
pub fn checksum_sql(text: &str) -> String {
    let normalized = normalize_sql_bytes(text);
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hex::encode(hasher.finalize())
}

fn normalize_sql_bytes(text: &str) -> String {
    let lf_only = text.replace("\r\n", "\n");
    if lf_only.ends_with('\n') {
        lf_only
    } else {
        format!("{lf_only}\n")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChecksumMismatch {
    pub name: String,
    #[serde(rename = "journaledChecksum")]
    pub journaled_checksum: String,
    #[serde(rename = "actualChecksum")]
    pub actual_checksum: String,
}

/// Recompute checksums for all journaled names whose files still exist.
pub fn find_checksum_mismatches(
    migrations_dir: &Path,
    journal: &Journal,
) -> Result<Vec<ChecksumMismatch>, StoreError> {
    let mut mismatches = Vec::new();
    for entry in &journal.applied {
        let path = migrations_dir.join(&entry.name);
        if !path.exists() {
            continue;
        }
        let text = fs::read_to_string(&path).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;
        let actual = checksum_sql(&text);
        if actual != entry.checksum {
            mismatches.push(ChecksumMismatch {
                name: entry.name.clone(),
                journaled_checksum: entry.checksum.clone(),
                actual_checksum: actual,
            });
        }
    }
    Ok(mismatches)
}

pub struct GenerateArtifactsInput<'a> {
    pub definitions: Vec<SchemaDefinition>,
    pub migrations_dir: &'a Path,
    pub meta_dir: &'a Path,
    pub migration_name: Option<String>,
    pub migration_id: Option<String>,
    pub plan: &'a MigrationPlan,
    pub cli_version: &'a str,
    pub generated_at: String,
}

#[derive(Debug, Clone)]
pub struct GenerateArtifactsOutput {
    pub migration_file: Option<String>,
}

/// Write the migration file (if the plan is non-empty) and the new
/// snapshot, atomically.
pub fn generate_artifacts(input: GenerateArtifactsInput<'_>) -> Result<GenerateArtifactsOutput, StoreError> {
    let snapshot = Snapshot::new(input.generated_at, input.definitions);

    if input.plan.operations.is_empty() {
        write_snapshot(input.meta_dir, &snapshot)?;
        return Ok(GenerateArtifactsOutput {
            migration_file: None,
        });
    }

    let migration_id = input.migration_id.unwrap_or_else(|| "00000000000000".to_string());
    let slug = input.migration_name.unwrap_or_else(|| "auto".to_string());
    let filename = format!("{migration_id}_{slug}.sql");

    let mut body = String::new();
    body.push_str(&format!("-- chkit migration {}\n", input.cli_version));
    for op in &input.plan.operations {
        body.push_str(&format!(
            "-- operation: {} key={} risk={}\n",
            op.type_.as_str(),
            op.key,
            match op.risk {
                crate::engine::plan::Risk::Safe => "safe",
                crate::engine::plan::Risk::Caution => "caution",
                crate::engine::plan::Risk::Danger => "danger",
            }
        ));
    }
    body.push('\n');
    for op in &input.plan.operations {
        body.push_str(&op.sql);
        body.push_str(";\n\n");
    }

    let path = input.migrations_dir.join(&filename);
    atomic_write(&path, body.as_bytes())?;
    write_snapshot(input.meta_dir, &snapshot)?;

    Ok(GenerateArtifactsOutput {
        migration_file: Some(filename),
    })
}

/// Parse the operation markers embedded in a migration file's text, for
/// scope filtering and the destructive gate (§4.7).
pub fn markers_in_file(text: &str) -> Vec<crate::engine::markers::OperationMarker> {
    parse_markers(text)
}
