use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use dbsync_core::{Direction, Environment, ExclusionSet, RedactedConnection, Settings, SyncError};
use dbsync_store::ConnectOptions;

use crate::auxiliary::CacheConfig;

/// Rows per insert statement unless overridden.
pub const DEFAULT_BATCH_SIZE: usize = 500;
pub const DEFAULT_MANIFEST_PATH: &str = "sync_manifest.json";
/// Tables that `--exclude-volatile` leaves out unless the settings file
/// names others.
pub const DEFAULT_VOLATILE_TABLES: &[&str] = &["django_session", "django_content_type"];

/// Options for one sync run.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub direction: Direction,
    /// Skip the interactive confirmation.
    pub assume_yes: bool,
    /// Delete and recreate a file target instead of clearing it in place.
    pub wipe: bool,
    pub keep_manifest: bool,
    pub manifest_path: PathBuf,
    pub exclusions: ExclusionSet,
    pub batch_size: usize,
    /// Migration scripts; an engine-named subdirectory wins when present.
    pub migrations_dir: Option<PathBuf>,
    pub cache: CacheConfig,
    pub connect: ConnectOptions,
}

impl SyncOptions {
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            assume_yes: false,
            wipe: true,
            keep_manifest: false,
            manifest_path: PathBuf::from(DEFAULT_MANIFEST_PATH),
            exclusions: ExclusionSet::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            migrations_dir: None,
            cache: CacheConfig::default(),
            connect: ConnectOptions::default(),
        }
    }

    /// Defaults overlaid with the settings file and the environment.
    pub fn from_settings(direction: Direction, settings: &Settings, env: &Environment) -> Self {
        let sync = &settings.sync;
        let mut options = Self::new(direction);
        if let Some(batch_size) = sync.batch_size {
            options.batch_size = batch_size;
        }
        if let Some(path) = &sync.manifest_path {
            options.manifest_path = path.clone();
        }
        options.migrations_dir = sync.migrations_dir.clone();
        options.exclusions = ExclusionSet::new(sync.exclude.iter().cloned());
        options.cache = CacheConfig::resolve(settings, env);
        options
    }

    /// Add the configured volatile tables to the exclusion set.
    pub fn exclude_volatile(&mut self, settings: &Settings) {
        match &settings.sync.volatile_tables {
            Some(tables) => self.exclusions.extend(tables.iter().cloned()),
            None => self
                .exclusions
                .extend(DEFAULT_VOLATILE_TABLES.iter().copied()),
        }
    }

    pub fn validate(&self) -> Result<(), SyncError> {
        if self.batch_size == 0 {
            return Err(SyncError::Configuration(
                "batch size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Failed,
    Aborted,
}

/// Per-table outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableReport {
    pub table: String,
    pub rank: usize,
    pub rows_exported: u64,
    pub rows_imported: u64,
    pub batches: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_next_value: Option<i64>,
}

/// Non-fatal problem recorded during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncIssue {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
}

/// Fatal error summary carried by a failed report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorSummary {
    pub kind: String,
    pub message: String,
    pub exit_code: u8,
}

/// Report for a sync run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncReport {
    pub run_id: String,
    pub direction: Direction,
    pub status: RunStatus,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub duration_ms: u128,
    pub source: RedactedConnection,
    pub target: RedactedConnection,
    pub excluded: Vec<String>,
    pub migrations_known: usize,
    pub tables_cleared: usize,
    pub tables: Vec<TableReport>,
    pub tables_processed: usize,
    pub rows_moved: u64,
    pub sequences_reset: usize,
    pub manifest_path: Option<String>,
    pub warnings: Vec<SyncIssue>,
    pub error: Option<ErrorSummary>,
}

impl SyncReport {
    pub fn new(
        run_id: String,
        direction: Direction,
        source: RedactedConnection,
        target: RedactedConnection,
    ) -> Self {
        Self {
            run_id,
            direction,
            status: RunStatus::Failed,
            started_at: chrono::Utc::now().to_rfc3339(),
            finished_at: None,
            duration_ms: 0,
            source,
            target,
            excluded: Vec::new(),
            migrations_known: 0,
            tables_cleared: 0,
            tables: Vec::new(),
            tables_processed: 0,
            rows_moved: 0,
            sequences_reset: 0,
            manifest_path: None,
            warnings: Vec::new(),
            error: None,
        }
    }

    pub fn warn(&mut self, code: &str, message: impl Into<String>, table: Option<&str>) {
        self.warnings.push(SyncIssue {
            code: code.to_string(),
            message: message.into(),
            table: table.map(str::to_string),
        });
    }

    pub fn table_mut(&mut self, table: &str) -> Option<&mut TableReport> {
        self.tables.iter_mut().find(|report| report.table == table)
    }

    pub fn fail(&mut self, error: &SyncError) {
        self.status = match error {
            SyncError::Aborted(_) => RunStatus::Aborted,
            _ => RunStatus::Failed,
        };
        self.error = Some(ErrorSummary {
            kind: error.kind().to_string(),
            message: error.to_string(),
            exit_code: error.exit_code(),
        });
    }

    /// One-line pass/fail summary with counts.
    pub fn summary_line(&self) -> String {
        let status = match self.status {
            RunStatus::Success => "PASS",
            RunStatus::Failed => "FAIL",
            RunStatus::Aborted => "ABORTED",
        };
        format!(
            "{status} {}: {} tables, {} rows, {} sequences reset, {} warnings",
            self.direction,
            self.tables_processed,
            self.rows_moved,
            self.sequences_reset,
            self.warnings.len()
        )
    }
}
