use thiserror::Error;

/// Fatal error taxonomy for a sync run.
///
/// Every variant aborts the run immediately. Non-fatal problems are reported
/// as [`AuxiliaryTableError`] warnings instead.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Bad or missing connection parameters, detected before any I/O.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// An endpoint could not be reached within the probe timeout.
    #[error("connectivity error ({endpoint}): {message}")]
    Connectivity { endpoint: String, message: String },
    /// Migration or clearing of the target failed; no data has moved yet.
    #[error("schema preparation failed: {0}")]
    SchemaPrep(String),
    /// The source could not be read; no manifest is retained.
    #[error("export failed: {0}")]
    Export(String),
    /// The importer found rows where the prepared target should be empty.
    #[error("target not empty: {0}")]
    TargetNotEmpty(String),
    /// A write failed mid-import; the target may hold partial data.
    #[error("import failed: {0}")]
    Import(String),
    /// The operator declined the confirmation gate.
    #[error("aborted: {0}")]
    Aborted(String),
}

impl SyncError {
    /// Process exit code for this failure.
    ///
    /// `1` covers user aborts and precondition failures, `2` covers runtime
    /// and connectivity failures.
    pub fn exit_code(&self) -> u8 {
        match self {
            SyncError::Aborted(_)
            | SyncError::Configuration(_)
            | SyncError::TargetNotEmpty(_) => 1,
            SyncError::Connectivity { .. }
            | SyncError::SchemaPrep(_)
            | SyncError::Export(_)
            | SyncError::Import(_) => 2,
        }
    }

    /// Short machine-friendly label used in logs and reports.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::Configuration(_) => "configuration",
            SyncError::Connectivity { .. } => "connectivity",
            SyncError::SchemaPrep(_) => "schema_prep",
            SyncError::Export(_) => "export",
            SyncError::TargetNotEmpty(_) => "target_not_empty",
            SyncError::Import(_) => "import",
            SyncError::Aborted(_) => "aborted",
        }
    }
}

/// Non-fatal failure while ensuring an auxiliary table on the target.
#[derive(Debug, Clone, Error)]
#[error("auxiliary table {table}: {message}")]
pub struct AuxiliaryTableError {
    pub table: String,
    pub message: String,
}

/// The schema violates internal invariants.
#[derive(Debug, Clone, Error)]
#[error("invalid schema: {0}")]
pub struct InvalidSchema(pub String);

/// Convenience alias for results returned by dbsync crates.
pub type Result<T> = std::result::Result<T, SyncError>;
