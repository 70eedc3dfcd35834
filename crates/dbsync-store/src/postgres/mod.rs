use std::path::Path;

use sqlx::PgPool;
use sqlx::migrate::Migrator;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};

use dbsync_core::{
    Column, ConnectionDescriptor, DatabaseSchema, Record, SslMode, Table, Value,
    connection::DEFAULT_SERVER_SCHEMA,
};

use crate::adapter::{MIGRATIONS_TABLE, Store, column_list, quote_ident};
use crate::error::StoreError;
use crate::options::ConnectOptions;

mod mapper;
mod queries;

/// Postgres caps a statement at 65535 bind parameters.
const MAX_BIND_PARAMS: usize = 65_535;

/// Store backed by a PostgreSQL database.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
    schema: String,
}

impl PostgresStore {
    /// Create a new store using a pre-configured pool.
    pub fn new(pool: PgPool, schema: impl Into<String>) -> Self {
        Self {
            pool,
            schema: schema.into(),
        }
    }

    /// Open a pool for a server descriptor.
    ///
    /// Sessions run with `timezone = UTC` so naive timestamps are read and
    /// written as UTC, and with `search_path` set to the descriptor's schema.
    pub async fn connect(
        descriptor: &ConnectionDescriptor,
        opts: &ConnectOptions,
    ) -> Result<Self, StoreError> {
        let schema = descriptor
            .schema
            .clone()
            .unwrap_or_else(|| DEFAULT_SERVER_SCHEMA.to_string());
        let pool = PgPoolOptions::new()
            .max_connections(opts.max_connections)
            .acquire_timeout(opts.acquire_timeout)
            .max_lifetime(descriptor.lifetime.max_lifetime)
            .test_before_acquire(descriptor.lifetime.health_checks)
            .connect_with(connect_options(descriptor, &schema))
            .await?;
        Ok(Self::new(pool, schema))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn qualified(&self, table: &str) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(table))
    }
}

pub(crate) fn connect_options(descriptor: &ConnectionDescriptor, schema: &str) -> PgConnectOptions {
    let mut options = PgConnectOptions::new()
        .database(&descriptor.name)
        .options([("timezone", "UTC"), ("search_path", schema)]);
    if let Some(host) = &descriptor.host {
        options = options.host(host);
    }
    if let Some(port) = descriptor.port {
        options = options.port(port);
    }
    if let Some(user) = &descriptor.user {
        options = options.username(user);
    }
    if let Some(password) = &descriptor.password {
        options = options.password(password.expose());
    }
    if let Some(mode) = descriptor.sslmode {
        options = options.ssl_mode(ssl_mode(mode));
    }
    options
}

fn ssl_mode(mode: SslMode) -> PgSslMode {
    match mode {
        SslMode::Disable => PgSslMode::Disable,
        SslMode::Allow => PgSslMode::Allow,
        SslMode::Prefer => PgSslMode::Prefer,
        SslMode::Require => PgSslMode::Require,
        SslMode::VerifyCa => PgSslMode::VerifyCa,
        SslMode::VerifyFull => PgSslMode::VerifyFull,
    }
}

#[async_trait::async_trait]
impl Store for PostgresStore {
    fn engine(&self) -> &'static str {
        "postgres"
    }

    fn max_bind_params(&self) -> usize {
        MAX_BIND_PARAMS
    }

    fn supports_sequences(&self) -> bool {
        true
    }

    async fn introspect(&self) -> Result<DatabaseSchema, StoreError> {
        let raw_tables = queries::list_tables(&self.pool, &self.schema).await?;
        let mut tables = Vec::with_capacity(raw_tables.len());

        for raw in raw_tables {
            if raw.name == MIGRATIONS_TABLE {
                continue;
            }
            let columns = queries::list_columns(&self.pool, &self.schema, &raw.name).await?;
            let primary_key =
                queries::get_primary_key(&self.pool, &self.schema, &raw.name).await?;
            let foreign_keys =
                queries::list_foreign_keys(&self.pool, &self.schema, &raw.name).await?;
            tables.push(mapper::map_table(
                raw,
                columns,
                primary_key,
                foreign_keys,
                &self.schema,
            ));
        }

        tables.sort_by(|left, right| left.name.cmp(&right.name));
        Ok(DatabaseSchema {
            engine: self.engine().to_string(),
            namespace: Some(self.schema.clone()),
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
        let list = tables
            .iter()
            .map(|table| self.qualified(table))
            .collect::<Vec<_>>()
            .join(", ");
        sqlx::query(&format!("TRUNCATE TABLE {list} CASCADE"))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn count_rows(&self, table: &str) -> Result<i64, StoreError> {
        let sql = format!("SELECT count(*) FROM {}", self.qualified(table));
        Ok(sqlx::query_scalar::<_, i64>(&sql)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn read_rows(&self, table: &Table) -> Result<Vec<Record>, StoreError> {
        let columns: Vec<Column> = table.writable_columns().cloned().collect();
        if columns.is_empty() {
            return Ok(Vec::new());
        }
        let select = columns
            .iter()
            .map(mapper::select_expr)
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("SELECT {select} FROM {}", self.qualified(&table.name));

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

        let mut index = 0;
        let tuples: Vec<String> = rows
            .iter()
            .map(|_| {
                let slots: Vec<String> = columns
                    .iter()
                    .map(|column| {
                        index += 1;
                        mapper::placeholder(index, column)
                    })
                    .collect();
                format!("({})", slots.join(", "))
            })
            .collect();

        let overriding = if columns.iter().any(|column| column.is_identity_always) {
            " OVERRIDING SYSTEM VALUE"
        } else {
            ""
        };
        let sql = format!(
            "INSERT INTO {} ({}){overriding} VALUES {}",
            self.qualified(&table.name),
            column_list(columns),
            tuples.join(", ")
        );

        let mut query = sqlx::query(&sql);
        for row in rows {
            for column in columns {
                let value = row.get(&column.name).unwrap_or(&Value::Null);
                query = mapper::bind_value(query, value);
            }
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query("SET CONSTRAINTS ALL DEFERRED")
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
            "SELECT max({})::int8 FROM {}",
            quote_ident(&column.name),
            self.qualified(&table.name)
        );
        Ok(sqlx::query_scalar::<_, Option<i64>>(&sql)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn reset_sequence(&self, table: &Table, next_value: i64) -> Result<bool, StoreError> {
        let Some(column) = table.single_primary_key() else {
            return Ok(false);
        };
        let qualified = self.qualified(&table.name);
        let Some(sequence) = queries::serial_sequence(&self.pool, &qualified, &column.name).await?
        else {
            return Ok(false);
        };

        sqlx::query("SELECT setval($1::regclass, $2, false)")
            .bind(&sequence)
            .bind(next_value)
            .execute(&self.pool)
            .await?;
        tracing::debug!(
            event = "sequence.reset",
            table = %table.name,
            sequence = %sequence,
            next_value
        );
        Ok(true)
    }

    async fn ensure_cache_table(&self, name: &str) -> Result<bool, StoreError> {
        if queries::table_exists(&self.pool, &self.schema, name).await? {
            return Ok(false);
        }
        let table = self.qualified(name);
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (\
             \"cache_key\" varchar(255) NOT NULL PRIMARY KEY, \
             \"value\" text NOT NULL, \
             \"expires\" timestamp NOT NULL)"
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
