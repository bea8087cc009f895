//! Top-level error type (§7, §10.3): composes every component's typed error
//! via `#[from]` and carries the exit-code mapping. Command-glue code
//! threads `anyhow::Result` and only matches into `ChkitError` at the point
//! an exit code must be chosen.

use crate::clickhouse::errors::ClickhouseError;
use crate::config::ConfigError;
use crate::engine::plan::PlannerError;
use crate::engine::runner::RunnerError;
use crate::engine::store::StoreError;
use crate::engine::validate::Issue;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ChkitError {
    #[error("schema validation failed")]
    ValidationFailed { issues: Vec<Issue> },

    #[error(transparent)]
    UnresolvableRename(#[from] PlannerError),

    #[error(transparent)]
    Runner(#[from] RunnerError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Clickhouse(#[from] ClickhouseError),

    #[error("plugin `{name}` rejected its options: {message}")]
    PluginOptionInvalid { name: String, message: String },

    #[error("operation requires a live ClickHouse connection but none is configured")]
    MissingClickHouseConfig,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ChkitError {
    /// Exit code mapping per §6.2/§7.
    pub fn exit_code(&self) -> i32 {
        match self {
            ChkitError::ValidationFailed { .. } => 1,
            ChkitError::UnresolvableRename(_) => 1,
            ChkitError::Runner(RunnerError::ChecksumMismatch { .. }) => 1,
            ChkitError::Runner(RunnerError::DestructiveBlocked { .. }) => 3,
            ChkitError::Runner(_) => 1,
            ChkitError::Store(_) => 1,
            ChkitError::Config(_) => 1,
            ChkitError::Clickhouse(_) => 1,
            ChkitError::PluginOptionInvalid { .. } => 2,
            ChkitError::MissingClickHouseConfig => 1,
            ChkitError::Internal(_) => 1,
        }
    }
}
