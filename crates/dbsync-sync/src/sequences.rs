use dbsync_core::{DatabaseSchema, SequencePlan, SyncError, SyncManifest};
use dbsync_store::Store;

/// Point every auto-increment counter past the imported keys.
///
/// Only tables with a single auto-increment primary key are considered; the
/// next value is `max(pk) + 1`, or `1` for an empty table. Running it twice
/// yields the same plan. Stores without sequences return an empty plan.
pub async fn reset_sequences(
    store: &dyn Store,
    target: &DatabaseSchema,
    manifest: &SyncManifest,
) -> Result<SequencePlan, SyncError> {
    let mut plan = SequencePlan::new();
    if !store.supports_sequences() {
        tracing::debug!(event = "sequences_skipped", engine = store.engine());
        return Ok(plan);
    }

    for snapshot in &manifest.tables {
        let Some(table) = target.table(&snapshot.table) else {
            continue;
        };
        let Some(column) = table.single_primary_key().filter(|column| column.is_auto_increment)
        else {
            continue;
        };

        let max = store
            .max_primary_key(table)
            .await
            .map_err(|err| SyncError::Import(format!("reading max key of {}: {err}", table.name)))?;
        let next_value = SequencePlan::next_value(max);
        let reset = store
            .reset_sequence(table, next_value)
            .await
            .map_err(|err| {
                SyncError::Import(format!("resetting sequence of {}: {err}", table.name))
            })?;
        if reset {
            tracing::info!(
                event = "sequence_reset",
                table = %table.name,
                column = %column.name,
                next_value
            );
            plan.record(&table.name, &column.name, max);
        }
    }

    Ok(plan)
}
