//! Direction-agnostic bulk copy between a server store and a local file.
//!
//! The pipeline runs strictly in order: connectivity probe, confirmation
//! gate, target preparation, auxiliary tables, export, import, sequence
//! reset, cleanup.

pub mod auxiliary;
pub mod confirm;
pub mod engine;
pub mod export;
pub mod import;
pub mod model;
pub mod prepare;
pub mod sequences;

pub use auxiliary::CacheConfig;
pub use confirm::{AssumeYes, CONFIRMATION_PHRASE, Confirm, PromptConfirm};
pub use engine::{ProbeReport, SyncEngine, SyncOutcome, check_connectivity, inspect_source};
pub use model::{
    DEFAULT_BATCH_SIZE, DEFAULT_MANIFEST_PATH, DEFAULT_VOLATILE_TABLES, RunStatus, SyncIssue,
    SyncOptions, SyncReport, TableReport,
};
