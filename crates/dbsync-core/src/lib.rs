//! Core contracts and helpers for dbsync.
//!
//! This crate defines the table catalog, row values, the sync manifest, and
//! connection resolution shared by the stores, the sync engine, and the CLI.

pub mod atomic;
pub mod connection;
pub mod constraints;
pub mod error;
pub mod graph;
pub mod manifest;
pub mod redaction;
pub mod schema;
pub mod sequence;
pub mod settings;
pub mod types;
pub mod validation;
pub mod value;

pub use connection::{
    ConnectionDescriptor, Direction, EngineKind, Endpoint, LifetimePolicy, Provenance,
    ResolvedConnections, Secret, SslMode, resolve_connections,
};
pub use constraints::{ForeignKey, PrimaryKey};
pub use error::{AuxiliaryTableError, InvalidSchema, Result, SyncError};
pub use graph::{
    DependencyOrder, FkGraphReport, FkGraphSummary, build_fk_graph_report, dependency_order,
};
pub use manifest::{
    ColumnSpec, ExclusionSet, MANIFEST_VERSION, ManifestDocument, ManifestError, Record,
    SyncManifest, TableDocument, TableSnapshot, manifest_json_schema, read_manifest,
    write_manifest,
};
pub use redaction::{RedactedConnection, scrub_secret};
pub use schema::{Column, DatabaseSchema, Table};
pub use sequence::{SequenceEntry, SequencePlan};
pub use settings::{Environment, Settings, load_settings};
pub use types::ColumnKind;
pub use validation::validate_schema;
pub use value::{Value, ValueError};
