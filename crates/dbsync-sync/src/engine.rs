use std::path::Path;
use std::time::Instant;

use tracing::{info, warn};

use dbsync_core::{
    ConnectionDescriptor, EngineKind, ExclusionSet, FkGraphReport, RedactedConnection,
    ResolvedConnections, SyncError, build_fk_graph_report, read_manifest, scrub_secret,
    validate_schema, write_manifest,
};
use dbsync_store::{Access, ConnectOptions, ProbeOutcome, Store, StoreError, open_store, probe};

use crate::auxiliary::ensure_auxiliary_tables;
use crate::confirm::Confirm;
use crate::export::export_manifest;
use crate::import::import_manifest;
use crate::model::{RunStatus, SyncOptions, SyncReport, TableReport};
use crate::prepare::{prepare_target, resolve_migrations_dir, wipe_file_target, wipes_target};
use crate::sequences::reset_sequences;

/// Report of a run together with its fatal error, if any.
#[derive(Debug)]
pub struct SyncOutcome {
    pub report: SyncReport,
    pub result: Result<(), SyncError>,
}

impl SyncOutcome {
    pub fn exit_code(&self) -> u8 {
        match &self.result {
            Ok(()) => 0,
            Err(err) => err.exit_code(),
        }
    }
}

/// Probe results for both endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeReport {
    pub source: ProbeOutcome,
    pub target: ProbeOutcome,
}

/// Probe both endpoints without writing anything.
///
/// A missing source file is an error; a missing target file is reported and
/// accepted since preparation creates it.
pub async fn check_connectivity(
    connections: &ResolvedConnections,
    opts: &ConnectOptions,
) -> Result<ProbeReport, SyncError> {
    let source = probe(&connections.source, false, opts)
        .await
        .map_err(|err| connectivity_error(&connections.source, err))?;
    let target = probe(&connections.target, true, opts)
        .await
        .map_err(|err| connectivity_error(&connections.target, err))?;

    info!(
        event = "connectivity_ok",
        source = %RedactedConnection::from_descriptor(&connections.source).redacted,
        target = %RedactedConnection::from_descriptor(&connections.target).redacted,
        target_missing = target == ProbeOutcome::MissingFile
    );
    Ok(ProbeReport { source, target })
}

/// Read the source catalog and summarize its foreign key graph. Read-only.
pub async fn inspect_source(
    connections: &ResolvedConnections,
    opts: &ConnectOptions,
) -> Result<FkGraphReport, SyncError> {
    let source = open_store(&connections.source, Access::ReadOnly, opts)
        .await
        .map_err(|err| connectivity_error(&connections.source, err))?;
    let schema = source.introspect().await;
    source.close().await;

    let schema = schema.map_err(|err| SyncError::Export(format!("reading source schema: {err}")))?;
    validate_schema(&schema).map_err(|err| SyncError::Export(err.to_string()))?;
    let report = build_fk_graph_report(&schema);
    info!(
        event = "source_inspected",
        tables = report.summary.nodes,
        foreign_keys = report.summary.edges,
        cycle = report.cycle.is_some()
    );
    Ok(report)
}

fn connectivity_error(descriptor: &ConnectionDescriptor, err: StoreError) -> SyncError {
    let secret = descriptor.password.as_ref().map(|secret| secret.expose());
    SyncError::Connectivity {
        endpoint: descriptor.endpoint.as_str().to_string(),
        message: scrub_secret(&err.to_string(), secret),
    }
}

/// Entry point for a one-shot sync between two resolved endpoints.
#[derive(Debug, Clone)]
pub struct SyncEngine {
    options: SyncOptions,
}

impl SyncEngine {
    pub fn new(options: SyncOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Run the whole pipeline. Never panics on failure: the error travels
    /// in the outcome alongside a report of everything done up to it.
    pub async fn run(
        &self,
        connections: &ResolvedConnections,
        confirm: &mut dyn Confirm,
    ) -> SyncOutcome {
        let start = Instant::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        let mut report = SyncReport::new(
            run_id.clone(),
            connections.direction,
            RedactedConnection::from_descriptor(&connections.source),
            RedactedConnection::from_descriptor(&connections.target),
        );
        report.excluded = self.options.exclusions.iter().map(str::to_string).collect();

        info!(
            event = "sync_started",
            run_id = %run_id,
            direction = %connections.direction,
            source = %report.source.redacted,
            target = %report.target.redacted,
            excluded = report.excluded.len()
        );

        let result = self.execute(connections, confirm, &mut report).await;
        match &result {
            Ok(()) => report.status = RunStatus::Success,
            Err(err) => {
                report.fail(err);
                warn!(event = "sync_failed", run_id = %run_id, kind = err.kind(), error = %err);
            }
        }
        report.finished_at = Some(chrono::Utc::now().to_rfc3339());
        report.duration_ms = start.elapsed().as_millis();

        info!(
            event = "sync_finished",
            run_id = %run_id,
            status = ?report.status,
            tables = report.tables_processed,
            rows = report.rows_moved,
            sequences = report.sequences_reset,
            warnings = report.warnings.len(),
            duration_ms = report.duration_ms as u64
        );
        SyncOutcome { report, result }
    }

    async fn execute(
        &self,
        connections: &ResolvedConnections,
        confirm: &mut dyn Confirm,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        self.options.validate()?;
        check_connectivity(connections, &self.options.connect).await?;

        let target_engine = connections.target.engine;
        let migrations =
            resolve_migrations_dir(self.options.migrations_dir.as_deref(), target_engine.as_str());
        let wipe = wipes_target(self.options.wipe, target_engine, &self.options.exclusions);
        if self.options.wipe && target_engine == EngineKind::File && !wipe {
            info!(event = "wipe_skipped", excluded = self.options.exclusions.len());
            report.warn(
                "wipe_skipped",
                "excluded tables are kept, so the target file is cleared in place".to_string(),
                None,
            );
        }
        if wipe && migrations.is_none() {
            return Err(SyncError::SchemaPrep(
                "wiping the target file requires a migrations directory to rebuild its schema"
                    .to_string(),
            ));
        }

        if !self.options.assume_yes {
            let prompt = format!(
                "All data in {} will be replaced with data from {}.",
                report.target.redacted, report.source.redacted
            );
            if !confirm.confirm(&prompt) {
                info!(event = "confirmation_declined");
                return Err(SyncError::Aborted(
                    "confirmation declined; the target was not modified".to_string(),
                ));
            }
        }
        info!(event = "confirmation_passed", assumed = self.options.assume_yes);

        let source = open_store(&connections.source, Access::ReadOnly, &self.options.connect)
            .await
            .map_err(|err| connectivity_error(&connections.source, err))?;
        let result = self
            .transfer(source.as_ref(), connections, migrations.as_deref(), wipe, report)
            .await;
        source.close().await;
        result
    }

    async fn transfer(
        &self,
        source: &dyn Store,
        connections: &ResolvedConnections,
        migrations: Option<&Path>,
        wipe: bool,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        if wipe {
            if let Some(path) = connections.target.file_path() {
                wipe_file_target(path)?;
            }
        }

        let target = open_store(&connections.target, Access::ReadWrite, &self.options.connect)
            .await
            .map_err(|err| connectivity_error(&connections.target, err))?;
        let result = self
            .load(source, target.as_ref(), migrations, report)
            .await;
        target.close().await;
        result
    }

    async fn load(
        &self,
        source: &dyn Store,
        target: &dyn Store,
        migrations: Option<&Path>,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        let options = &self.options;

        let prepared = prepare_target(target, migrations, &options.exclusions).await?;
        match prepared.migrations_known {
            Some(known) => report.migrations_known = known,
            None => report.warn(
                "migrations_skipped",
                format!("no migrations directory for {}; existing schema used", target.engine()),
                None,
            ),
        }
        report.tables_cleared = prepared.cleared.len();

        for error in ensure_auxiliary_tables(target, &options.cache).await {
            report.warn("auxiliary_table", error.to_string(), Some(&error.table));
        }

        let mut skip = ExclusionSet::new(options.exclusions.iter());
        skip.extend([options.cache.table.as_str()]);
        let exported = export_manifest(source, &skip).await?;
        if let Some(cycle) = &exported.cycle {
            report.warn(
                "fk_cycle",
                format!("foreign key cycle between {}", cycle.join(", ")),
                None,
            );
        }
        report.tables = exported
            .manifest
            .tables
            .iter()
            .map(|snapshot| TableReport {
                table: snapshot.table.clone(),
                rank: snapshot.rank,
                rows_exported: snapshot.row_count() as u64,
                rows_imported: 0,
                batches: 0,
                sequence_next_value: None,
            })
            .collect();

        write_manifest(&options.manifest_path, &exported.manifest)
            .map_err(|err| SyncError::Export(format!("writing manifest: {err}")))?;
        report.manifest_path = Some(options.manifest_path.display().to_string());
        info!(event = "manifest_written", path = %options.manifest_path.display());

        let manifest = read_manifest(&options.manifest_path)
            .map_err(|err| SyncError::Import(format!("reading manifest: {err}")))?;
        let target_schema = target
            .introspect()
            .await
            .map_err(|err| SyncError::Import(format!("reading target schema: {err}")))?;
        let imported =
            import_manifest(target, &target_schema, &manifest, options.batch_size).await?;
        for (table, message) in imported.warnings {
            report.warn("generated_column_skipped", message, Some(&table));
        }
        for table in &imported.tables {
            if let Some(entry) = report.table_mut(&table.table) {
                entry.rows_imported = table.rows;
                entry.batches = table.batches;
            }
        }
        report.tables_processed = imported.tables.len();
        report.rows_moved = imported.tables.iter().map(|table| table.rows).sum();

        let plan = reset_sequences(target, &target_schema, &manifest).await?;
        for (table, entry) in plan.iter() {
            if let Some(report_table) = report.table_mut(table) {
                report_table.sequence_next_value = Some(entry.next_value);
            }
        }
        report.sequences_reset = plan.len();

        if !options.keep_manifest {
            remove_manifest(&options.manifest_path, report);
        }
        Ok(())
    }
}

fn remove_manifest(path: &Path, report: &mut SyncReport) {
    match std::fs::remove_file(path) {
        Ok(()) => {
            report.manifest_path = None;
            info!(event = "manifest_removed", path = %path.display());
        }
        Err(err) => {
            warn!(event = "manifest_remove_failed", path = %path.display(), error = %err);
            report.warn(
                "manifest_cleanup",
                format!("could not remove {}: {err}", path.display()),
                None,
            );
        }
    }
}
