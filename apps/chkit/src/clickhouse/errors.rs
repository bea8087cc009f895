//! Error taxonomy for the ClickHouse client boundary (§10.4), mirroring the
//! rest of the stack's `thiserror`-per-component shape.

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ClickhouseError {
    #[error("clickhouse request failed: {0}")]
    Request(#[from] ::clickhouse::error::Error),

    #[error("clickhouse request to {database}.{table} timed out after {timeout_secs}s")]
    Timeout {
        database: String,
        table: String,
        timeout_secs: u64,
    },

    #[error("unsupported data type `{type_name}` on {database}.{table}.{column}")]
    UnsupportedDataType {
        database: String,
        table: String,
        column: String,
        type_name: String,
    },

    #[error("invalid identifier `{identifier}`: {reason}")]
    InvalidIdentifier { identifier: String, reason: String },
}
