//! Configuration (§10.2): a single `ChkitConfig` loaded from a TOML file at
//! a path resolved by `--config`, then `CHKIT_CONFIG`, then `./chkit.toml`.
//! Discovery/merge beyond this single file is out of scope (§1).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn default_true() -> bool {
    true
}

fn default_false() -> bool {
    false
}

fn default_migrations_dir() -> String {
    "migrations".to_string()
}

fn default_meta_dir() -> String {
    ".chkit".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClickHouseConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        ClickHouseConfig {
            url: None,
            database: None,
            user: None,
            password: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckConfig {
    #[serde(default = "default_true", rename = "failOnPending")]
    pub fail_on_pending: bool,
    #[serde(default = "default_true", rename = "failOnChecksumMismatch")]
    pub fail_on_checksum_mismatch: bool,
    #[serde(default = "default_true", rename = "failOnDrift")]
    pub fail_on_drift: bool,
}

impl Default for CheckConfig {
    fn default() -> Self {
        CheckConfig {
            fail_on_pending: true,
            fail_on_checksum_mismatch: true,
            fail_on_drift: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SafetyConfig {
    #[serde(default = "default_false", rename = "allowDestructive")]
    pub allow_destructive: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct JournalConfig {
    #[serde(default)]
    pub table: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChkitConfig {
    #[serde(default = "default_migrations_dir", rename = "migrationsDir")]
    pub migrations_dir: String,
    #[serde(default = "default_meta_dir", rename = "metaDir")]
    pub meta_dir: String,
    #[serde(default)]
    pub clickhouse: ClickHouseConfig,
    #[serde(default)]
    pub check: CheckConfig,
    #[serde(default)]
    pub safety: SafetyConfig,
    #[serde(default)]
    pub journal: JournalConfig,
}

impl Default for ChkitConfig {
    fn default() -> Self {
        ChkitConfig {
            migrations_dir: default_migrations_dir(),
            meta_dir: default_meta_dir(),
            clickhouse: ClickHouseConfig::default(),
            check: CheckConfig::default(),
            safety: SafetyConfig::default(),
            journal: JournalConfig::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("failed to load config file {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: config::ConfigError,
    },
}

/// Resolve the config path: `--config`, then `CHKIT_JOURNAL_TABLE`'s sibling
/// env var `CHKIT_CONFIG`, then `./chkit.toml`.
pub fn resolve_config_path(cli_flag: Option<&Path>) -> PathBuf {
    if let Some(path) = cli_flag {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var("CHKIT_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from("chkit.toml")
}

/// Load config from `path` if it exists, falling back to defaults
/// otherwise (a missing config file is not an error — only a malformed
/// one is, per §7 `IOFailure`).
pub fn load(path: &Path) -> Result<ChkitConfig, ConfigError> {
    if !path.exists() {
        return Ok(ChkitConfig::default());
    }
    let built = config::Config::builder()
        .add_source(config::File::from(path).format(config::FileFormat::Toml))
        .build()
        .map_err(|source| ConfigError::Load {
            path: path.to_path_buf(),
            source,
        })?;
    built.try_deserialize().map_err(|source| ConfigError::Load {
        path: path.to_path_buf(),
        source,
    })
}

/// Apply the `CHKIT_JOURNAL_TABLE` env override on top of a loaded config.
pub fn apply_env_overrides(mut config: ChkitConfig) -> ChkitConfig {
    if let Ok(table) = std::env::var("CHKIT_JOURNAL_TABLE") {
        config.journal.table = Some(table);
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config = ChkitConfig::default();
        assert!(config.check.fail_on_pending);
        assert!(config.check.fail_on_checksum_mismatch);
        assert!(config.check.fail_on_drift);
        assert!(!config.safety.allow_destructive);
        assert!(config.journal.table.is_none());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = load(Path::new("/nonexistent/chkit.toml")).unwrap();
        assert_eq!(config.migrations_dir, "migrations");
    }

    #[test]
    fn parses_partial_toml_with_defaults_filled_in() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("chkit.toml");
        std::fs::write(
            &path,
            r#"
migrationsDir = "db/migrations"

[clickhouse]
url = "http://localhost:8123"
database = "app"
"#,
        )
        .unwrap();
        let config = load(&path).unwrap();
        assert_eq!(config.migrations_dir, "db/migrations");
        assert_eq!(config.clickhouse.url.as_deref(), Some("http://localhost:8123"));
        assert!(config.check.fail_on_pending);
    }

    #[test]
    fn cli_flag_takes_precedence_over_env() {
        std::env::set_var("CHKIT_CONFIG", "/should/not/be/used.toml");
        let resolved = resolve_config_path(Some(Path::new("/explicit/chkit.toml")));
        assert_eq!(resolved, PathBuf::from("/explicit/chkit.toml"));
        std::env::remove_var("CHKIT_CONFIG");
    }
}
