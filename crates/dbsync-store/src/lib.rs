//! Store adapters for PostgreSQL and SQLite.

pub mod adapter;
pub mod connect;
pub mod error;
pub mod options;
pub mod postgres;
pub mod sqlite;

pub use adapter::{MIGRATIONS_TABLE, Store, quote_ident};
pub use connect::{ProbeOutcome, open_store, probe};
pub use error::StoreError;
pub use options::{Access, ConnectOptions};
pub use postgres::PostgresStore;
pub use sqlite::{SqliteStore, remove_database_files};

pub use dbsync_core::DatabaseSchema;
