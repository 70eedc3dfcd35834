use dbsync_core::{
    ColumnSpec, DatabaseSchema, ExclusionSet, SyncError, SyncManifest, TableSnapshot,
    dependency_order, validate_schema,
};
use dbsync_store::Store;

/// Manifest produced by one export, plus the tables caught in a foreign key
/// cycle, if any.
#[derive(Debug)]
pub struct ExportOutcome {
    pub manifest: SyncManifest,
    pub cycle: Option<Vec<String>>,
}

/// Snapshot every exportable source table, parents first.
///
/// `skip` holds the tables that never travel: the exclusion set plus the
/// cache table. The caller serializes the returned manifest only after this
/// returns, so a failed read leaves no file behind.
pub async fn export_manifest(
    store: &dyn Store,
    skip: &ExclusionSet,
) -> Result<ExportOutcome, SyncError> {
    let mut schema = store
        .introspect()
        .await
        .map_err(|err| SyncError::Export(format!("reading source schema: {err}")))?;
    validate_schema(&schema).map_err(|err| SyncError::Export(err.to_string()))?;
    schema.retain_tables(|table| !skip.contains(&table.name));

    let (order, cycle) = export_order(&schema);
    if let Some(cycle) = &cycle {
        tracing::warn!(
            event = "fk_cycle",
            tables = ?cycle,
            "foreign keys form a cycle; cyclic tables are written together in name order"
        );
    }

    let mut manifest = SyncManifest::new(store.engine(), skip);
    for (rank, name) in order.iter().enumerate() {
        let Some(table) = schema.table(name) else {
            continue;
        };
        let rows = store
            .read_rows(table)
            .await
            .map_err(|err| SyncError::Export(format!("reading {name}: {err}")))?;
        tracing::info!(event = "table_exported", table = %name, rank, rows = rows.len());

        manifest.tables.push(TableSnapshot {
            table: name.clone(),
            rank,
            columns: table
                .writable_columns()
                .map(|column| ColumnSpec {
                    name: column.name.clone(),
                    kind: column.kind,
                })
                .collect(),
            primary_key: table.primary_key_columns(),
            rows,
        });
    }

    tracing::info!(
        event = "export_complete",
        tables = manifest.tables.len(),
        rows = manifest.total_rows()
    );
    Ok(ExportOutcome { manifest, cycle })
}

fn export_order(schema: &DatabaseSchema) -> (Vec<String>, Option<Vec<String>>) {
    let order = dependency_order(schema);
    (order.order, order.cycle)
}
