use std::path::Path;

use async_trait::async_trait;

use dbsync_core::{Column, DatabaseSchema, Record, Table};

use crate::error::StoreError;

/// Bookkeeping table maintained by the migrator; never copied or cleared.
pub const MIGRATIONS_TABLE: &str = "_sqlx_migrations";

/// Operations the synchronizer needs from one endpoint.
///
/// Implementations own their connection pool; every method talks to the
/// same physical store.
#[async_trait]
pub trait Store: Send + Sync {
    /// Returns the engine identifier (e.g. `postgres`).
    fn engine(&self) -> &'static str;

    /// Maximum number of bind parameters in a single statement.
    fn max_bind_params(&self) -> usize;

    /// Whether the engine keeps sequences that must be reset after import.
    fn supports_sequences(&self) -> bool;

    /// Read the table catalog, excluding engine internals and migration history.
    async fn introspect(&self) -> Result<DatabaseSchema, StoreError>;

    /// Apply pending migrations from `dir`; returns the number of known migrations.
    async fn run_migrations(&self, dir: &Path) -> Result<usize, StoreError>;

    /// Remove every row from `tables`. The caller orders tables children first.
    async fn clear_tables(&self, tables: &[String]) -> Result<(), StoreError>;

    async fn count_rows(&self, table: &str) -> Result<i64, StoreError>;

    /// Read every writable column of every row, in storage order.
    async fn read_rows(&self, table: &Table) -> Result<Vec<Record>, StoreError>;

    /// Insert `rows` in one multi-row statement inside its own transaction,
    /// with foreign-key checks deferred to commit.
    async fn insert_rows(
        &self,
        table: &Table,
        columns: &[Column],
        rows: &[Record],
    ) -> Result<u64, StoreError>;

    async fn max_primary_key(&self, table: &Table) -> Result<Option<i64>, StoreError>;

    /// Make the next generated key equal `next_value`. Returns false when the
    /// table owns no sequence.
    async fn reset_sequence(&self, table: &Table, next_value: i64) -> Result<bool, StoreError>;

    /// Create the key/value cache table if missing; returns true when created.
    async fn ensure_cache_table(&self, name: &str) -> Result<bool, StoreError>;

    async fn close(&self);
}

/// Quote an identifier for both supported dialects.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Comma-separated list of quoted column names.
pub fn column_list(columns: &[Column]) -> String {
    columns
        .iter()
        .map(|column| quote_ident(&column.name))
        .collect::<Vec<_>>()
        .join(", ")
}
