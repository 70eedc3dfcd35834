use dbsync_core::{Column, DatabaseSchema, Record, SyncError, SyncManifest, Table, TableSnapshot};
use dbsync_store::{Store, StoreError};

/// Rows written into one target table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableImport {
    pub table: String,
    pub rows: u64,
    pub batches: u64,
}

/// Result of a complete import.
#[derive(Debug, Clone, Default)]
pub struct ImportOutcome {
    pub tables: Vec<TableImport>,
    /// `(table, message)` pairs for columns that could not be written.
    pub warnings: Vec<(String, String)>,
}

const RETRY_HINT: &str = "the target may hold partial data; re-run the preparer before retrying";

/// Insert every manifest row into the same-named target table, in manifest
/// order, preserving primary keys.
///
/// Each table must be empty when its turn comes. Rows are written in
/// multi-row batches no larger than `batch_size` and never above the
/// engine's bind-parameter limit. Values are reshaped to the target's column
/// kinds only when the manifest came from another engine.
pub async fn import_manifest(
    store: &dyn Store,
    target: &DatabaseSchema,
    manifest: &SyncManifest,
    batch_size: usize,
) -> Result<ImportOutcome, SyncError> {
    let mut outcome = ImportOutcome::default();
    let reshape = manifest.source_engine != store.engine();

    for snapshot in &manifest.tables {
        let table = target.table(&snapshot.table).ok_or_else(|| {
            SyncError::Import(format!("table {} does not exist on the target", snapshot.table))
        })?;
        let columns = insert_columns(snapshot, table, &mut outcome.warnings)?;

        let existing = store.count_rows(&table.name).await.map_err(|err| {
            SyncError::Import(format!("counting rows in {}: {err}", table.name))
        })?;
        if existing > 0 {
            return Err(SyncError::TargetNotEmpty(format!(
                "{} already holds {existing} rows",
                table.name
            )));
        }

        let imported = import_table(store, table, &columns, snapshot, batch_size, reshape).await?;
        tracing::info!(
            event = "table_imported",
            table = %table.name,
            rows = imported.rows,
            batches = imported.batches
        );
        outcome.tables.push(imported);
    }

    Ok(outcome)
}

async fn import_table(
    store: &dyn Store,
    table: &Table,
    columns: &[Column],
    snapshot: &TableSnapshot,
    batch_size: usize,
    reshape: bool,
) -> Result<TableImport, SyncError> {
    let mut imported = TableImport {
        table: table.name.clone(),
        rows: 0,
        batches: 0,
    };
    if columns.is_empty() || snapshot.rows.is_empty() {
        return Ok(imported);
    }

    let rows_per_batch = rows_per_batch(batch_size, store.max_bind_params(), columns.len());
    for chunk in snapshot.rows.chunks(rows_per_batch) {
        let batch: Vec<Record> = if reshape {
            chunk.iter().map(|row| conform_row(row, columns)).collect()
        } else {
            chunk.to_vec()
        };
        let written = store
            .insert_rows(table, columns, &batch)
            .await
            .map_err(|err| insert_error(&table.name, imported.rows, err))?;
        imported.rows += written;
        imported.batches += 1;
        tracing::debug!(
            event = "batch_imported",
            table = %table.name,
            batch = imported.batches,
            rows = written
        );
    }
    Ok(imported)
}

/// Target columns matching the manifest's, in manifest order.
///
/// Generated target columns are skipped; their values are computed by the
/// target.
fn insert_columns(
    snapshot: &TableSnapshot,
    table: &Table,
    warnings: &mut Vec<(String, String)>,
) -> Result<Vec<Column>, SyncError> {
    let mut columns = Vec::with_capacity(snapshot.columns.len());
    for exported in &snapshot.columns {
        let column = table.column(&exported.name).ok_or_else(|| {
            SyncError::Import(format!(
                "column {}.{} does not exist on the target",
                table.name, exported.name
            ))
        })?;
        if column.is_generated {
            let message = format!("skipping generated column {}", column.name);
            tracing::warn!(event = "generated_column_skipped", table = %table.name, column = %column.name);
            warnings.push((table.name.clone(), message));
            continue;
        }
        columns.push(column.clone());
    }
    Ok(columns)
}

fn conform_row(row: &Record, columns: &[Column]) -> Record {
    columns
        .iter()
        .filter_map(|column| {
            row.get(&column.name)
                .map(|value| (column.name.clone(), value.clone().conform(column.kind)))
        })
        .collect()
}

fn rows_per_batch(batch_size: usize, max_bind_params: usize, column_count: usize) -> usize {
    let bind_cap = max_bind_params / column_count.max(1);
    batch_size.min(bind_cap).max(1)
}

fn insert_error(table: &str, written: u64, err: StoreError) -> SyncError {
    tracing::error!(
        event = "import_failed",
        table = %table,
        rows_written = written,
        error = %err,
        "{RETRY_HINT}"
    );
    if err.is_unique_violation() {
        SyncError::TargetNotEmpty(format!("{table}: duplicate key ({err}); {RETRY_HINT}"))
    } else {
        SyncError::Import(format!("{table}: {err}; {RETRY_HINT}"))
    }
}

#[cfg(test)]
mod tests {
    use dbsync_core::{ColumnKind, ColumnSpec, Value};

    use super::*;

    fn column(name: &str, kind: ColumnKind, generated: bool) -> Column {
        Column {
            ordinal_position: 1,
            name: name.to_string(),
            kind,
            native_type: "integer".to_string(),
            is_nullable: true,
            is_auto_increment: false,
            is_identity_always: false,
            is_generated: generated,
        }
    }

    fn snapshot(columns: &[&str]) -> TableSnapshot {
        TableSnapshot {
            table: "users".to_string(),
            rank: 0,
            columns: columns
                .iter()
                .map(|name| ColumnSpec {
                    name: name.to_string(),
                    kind: ColumnKind::Integer,
                })
                .collect(),
            primary_key: vec!["id".to_string()],
            rows: Vec::new(),
        }
    }

    fn users() -> Table {
        Table {
            name: "users".to_string(),
            columns: vec![
                column("id", ColumnKind::Integer, false),
                column("active", ColumnKind::Boolean, false),
                column("total", ColumnKind::Integer, true),
            ],
            primary_key: None,
            foreign_keys: Vec::new(),
        }
    }

    #[test]
    fn batch_size_respects_bind_limit() {
        assert_eq!(rows_per_batch(500, 32_766, 4), 500);
        assert_eq!(rows_per_batch(500, 65_535, 200), 327);
        assert_eq!(rows_per_batch(500, 10, 40), 1);
    }

    #[test]
    fn missing_target_column_is_an_import_error() {
        let mut warnings = Vec::new();
        let err = insert_columns(&snapshot(&["id", "email"]), &users(), &mut warnings)
            .expect_err("missing column");
        assert!(matches!(err, SyncError::Import(message) if message.contains("users.email")));
    }

    #[test]
    fn generated_target_columns_are_skipped_with_a_warning() {
        let mut warnings = Vec::new();
        let columns = insert_columns(&snapshot(&["id", "total"]), &users(), &mut warnings)
            .expect("columns");
        assert_eq!(columns.len(), 1);
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn rows_follow_target_kinds() {
        let table = users();
        let columns = vec![table.columns[0].clone(), table.columns[1].clone()];
        let row: Record = [
            ("id".to_string(), Value::Int(3)),
            ("active".to_string(), Value::Int(1)),
        ]
        .into_iter()
        .collect();
        let conformed = conform_row(&row, &columns);
        assert_eq!(conformed.get("active"), Some(&Value::Bool(true)));
        assert_eq!(conformed.get("id"), Some(&Value::Int(3)));
    }
}
