use std::io;
use std::path::Path;

use sqlx::SqlitePool;
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use dbsync_core::{Column, DatabaseSchema, Record, Table, Value};

use crate::adapter::{MIGRATIONS_TABLE, Store, column_list, quote_ident};
use crate::error::StoreError;
use crate::options::{Access, ConnectOptions};

mod mapper;
mod queries;

/// `SQLITE_MAX_VARIABLE_NUMBER` of the bundled library.
const MAX_BIND_PARAMS: usize = 32_766;

/// High-water marks of AUTOINCREMENT tables.
const SEQUENCE_TABLE: &str = "sqlite_sequence";

/// Store backed by a single SQLite database file.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open the database file.
    ///
    /// Read-only stores never create the file. Foreign keys are enforced and
    /// a single connection is used so pragmas apply to every statement.
    pub async fn connect(
        path: &Path,
        access: Access,
        opts: &ConnectOptions,
    ) -> Result<Self, StoreError> {
        if access == Access::ReadOnly && !path.exists() {
            return Err(StoreError::MissingFile(path.display().to_string()));
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(access == Access::ReadWrite)
            .read_only(access == Access::ReadOnly)
            .foreign_keys(true)
            .busy_timeout(opts.busy_timeout);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(opts.acquire_timeout)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Delete a database file and its journal companions.
///
/// Returns true when the main file existed.
pub fn remove_database_files(path: &Path) -> io::Result<bool> {
    let existed = remove_if_present(path)?;
    for suffix in ["-wal", "-shm", "-journal"] {
        let mut companion = path.as_os_str().to_owned();
        companion.push(suffix);
        remove_if_present(Path::new(&companion))?;
    }
    Ok(existed)
}

fn remove_if_present(path: &Path) -> io::Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

#[async_trait::async_trait]
impl Store for SqliteStore {
    fn engine(&self) -> &'static str {
        "sqlite"
    }

    fn max_bind_params(&self) -> usize {
        MAX_BIND_PARAMS
    }

    fn supports_sequences(&self) -> bool {
        true
    }

    async fn introspect(&self) -> Result<DatabaseSchema, StoreError> {
        let raw_tables = queries::list_tables(&self.pool).await?;
        let mut tables = Vec::with_capacity(raw_tables.len());
        let mut raw_fks = Vec::with_capacity(raw_tables.len());

        for raw in raw_tables.iter().filter(|raw| raw.name != MIGRATIONS_TABLE) {
            let columns = queries::list_columns(&self.pool, &raw.name).await?;
            tables.push(mapper::map_table(raw, columns));
            raw_fks.push(queries::list_foreign_keys(&self.pool, &raw.name).await?);
        }

        let foreign_keys: Vec<_> = raw_fks
            .into_iter()
            .map(|raw| mapper::map_foreign_keys(raw, &tables))
            .collect();
        for (table, fks) in tables.iter_mut().zip(foreign_keys) {
            table.foreign_keys = fks;
        }

        Ok(DatabaseSchema {
            engine: self.engine().to_string(),
            namespace: None,
            tables,
        })
    }

    async fn run_migrations(&self, dir: &Path) -> Result<usize, StoreError> {
        let migrator = Migrator::new(dir).await?;
        migrator.run(&self.pool).await?;
        Ok(migrator.iter().count())
    }

    async fn clear_tables(&self, tables: &[String]) -> Result<(), StoreError> {
        if tables.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        sqlx::query("PRAGMA defer_foreign_keys = ON")
            .execute(&mut *tx)
            .await?;
        for table in tables {
            sqlx::query(&format!("DELETE FROM {}", quote_ident(table)))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn count_rows(&self, table: &str) -> Result<i64, StoreError> {
        let sql = format!("SELECT count(*) FROM {}", quote_ident(table));
        Ok(sqlx::query_scalar::<_, i64>(&sql)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn read_rows(&self, table: &Table) -> Result<Vec<Record>, StoreError> {
        let columns: Vec<Column> = table.writable_columns().cloned().collect();
        if columns.is_empty() {
            return Ok(Vec::new());
        }
        let create_sql = queries::table_sql(&self.pool, &table.name).await?;
        let order = if mapper::is_without_rowid(&create_sql) {
            ""
        } else {
            " ORDER BY rowid"
        };
        let sql = format!(
            "SELECT {} FROM {}{order}",
            column_list(&columns),
            quote_ident(&table.name)
        );

        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| mapper::decode_row(row, &columns))
            .collect()
    }

    async fn insert_rows(
        &self,
        table: &Table,
        columns: &[Column],
        rows: &[Record],
    ) -> Result<u64, StoreError> {
        if rows.is_empty() || columns.is_empty() {
            return Ok(0);
        }

        let tuple = format!("({})", vec!["?"; columns.len()].join(", "));
        let sql = format!(
            "INSERT INTO {} ({}) VALUES {}",
            quote_ident(&table.name),
            column_list(columns),
            vec![tuple.as_str(); rows.len()].join(", ")
        );

        let mut query = sqlx::query(&sql);
        for row in rows {
            for column in columns {
                let value = row.get(&column.name).unwrap_or(&Value::Null);
                query = mapper::bind_value(query, value);
            }
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query("PRAGMA defer_foreign_keys = ON")
            .execute(&mut *tx)
            .await?;
        let result = query.execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(result.rows_affected())
    }

    async fn max_primary_key(&self, table: &Table) -> Result<Option<i64>, StoreError> {
        let Some(column) = table.single_primary_key() else {
            return Ok(None);
        };
        let sql = format!(
            "SELECT max({}) FROM {}",
            quote_ident(&column.name),
            quote_ident(&table.name)
        );
        Ok(sqlx::query_scalar::<_, Option<i64>>(&sql)
            .fetch_one(&self.pool)
            .await?)
    }

    /// Rewind the `sqlite_sequence` high-water mark of an AUTOINCREMENT
    /// table. Plain rowid tables derive the next key from the stored maximum
    /// and report false.
    async fn reset_sequence(&self, table: &Table, next_value: i64) -> Result<bool, StoreError> {
        if !queries::table_exists(&self.pool, SEQUENCE_TABLE).await? {
            return Ok(false);
        }
        let result = sqlx::query("UPDATE sqlite_sequence SET seq = ? WHERE name = ?")
            .bind(next_value - 1)
            .bind(&table.name)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn ensure_cache_table(&self, name: &str) -> Result<bool, StoreError> {
        if queries::table_exists(&self.pool, name).await? {
            return Ok(false);
        }
        let table = quote_ident(name);
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (\
             \"cache_key\" varchar(255) NOT NULL PRIMARY KEY, \
             \"value\" text NOT NULL, \
             \"expires\" datetime NOT NULL)"
        ))
        .execute(&self.pool)
        .await?;
        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS {} ON {table} (\"expires\")",
            quote_ident(&format!("{name}_expires"))
        ))
        .execute(&self.pool)
        .await?;
        Ok(true)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
