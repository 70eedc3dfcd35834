use std::path::Path;

use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{ConnectOptions as _, Connection};

use dbsync_core::{ConnectionDescriptor, EngineKind, connection::DEFAULT_SERVER_SCHEMA};

use crate::adapter::Store;
use crate::error::StoreError;
use crate::options::{Access, ConnectOptions};
use crate::postgres::{self, PostgresStore};
use crate::sqlite::SqliteStore;

/// Open the store described by `descriptor`.
pub async fn open_store(
    descriptor: &ConnectionDescriptor,
    access: Access,
    opts: &ConnectOptions,
) -> Result<Box<dyn Store>, StoreError> {
    match descriptor.engine {
        EngineKind::File => {
            let store = SqliteStore::connect(Path::new(&descriptor.name), access, opts).await?;
            Ok(Box::new(store))
        }
        EngineKind::Server => Ok(Box::new(PostgresStore::connect(descriptor, opts).await?)),
    }
}

/// Outcome of a successful probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Reachable,
    /// The file store does not exist yet and will be created on first write.
    MissingFile,
}

/// Connect, run `SELECT 1`, and close within `opts.probe_timeout`.
///
/// File stores are opened read-only and never created. A missing file is
/// reported as [`ProbeOutcome::MissingFile`] when `allow_missing` is set and
/// as an error otherwise.
pub async fn probe(
    descriptor: &ConnectionDescriptor,
    allow_missing: bool,
    opts: &ConnectOptions,
) -> Result<ProbeOutcome, StoreError> {
    let attempt = async {
        match descriptor.engine {
            EngineKind::File => probe_file(Path::new(&descriptor.name), allow_missing).await,
            EngineKind::Server => probe_server(descriptor).await,
        }
    };
    tokio::time::timeout(opts.probe_timeout, attempt)
        .await
        .map_err(|_| StoreError::Timeout(opts.probe_timeout))?
}

async fn probe_file(path: &Path, allow_missing: bool) -> Result<ProbeOutcome, StoreError> {
    if !path.exists() {
        return if allow_missing {
            Ok(ProbeOutcome::MissingFile)
        } else {
            Err(StoreError::MissingFile(path.display().to_string()))
        };
    }
    let mut conn = SqliteConnectOptions::new()
        .filename(path)
        .read_only(true)
        .create_if_missing(false)
        .connect()
        .await?;
    sqlx::query("SELECT 1").execute(&mut conn).await?;
    conn.close().await?;
    Ok(ProbeOutcome::Reachable)
}

async fn probe_server(descriptor: &ConnectionDescriptor) -> Result<ProbeOutcome, StoreError> {
    let schema = descriptor.schema.as_deref().unwrap_or(DEFAULT_SERVER_SCHEMA);
    let mut conn = postgres::connect_options(descriptor, schema)
        .connect()
        .await?;
    sqlx::query("SELECT 1").execute(&mut conn).await?;
    conn.close().await?;
    Ok(ProbeOutcome::Reachable)
}
