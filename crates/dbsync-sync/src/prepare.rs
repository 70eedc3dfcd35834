use std::path::{Path, PathBuf};

use dbsync_core::{DatabaseSchema, EngineKind, ExclusionSet, SyncError, dependency_order};
use dbsync_store::{Store, remove_database_files};

/// What the preparer did to the target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrepareOutcome {
    /// Migrations known to the migrator, `None` when migration was skipped.
    pub migrations_known: Option<usize>,
    /// Tables emptied, in the order they were cleared (children first).
    pub cleared: Vec<String>,
}

/// Migration directory for `engine`: `<base>/<engine>` when it exists,
/// otherwise `<base>` itself.
pub fn resolve_migrations_dir(base: Option<&Path>, engine: &str) -> Option<PathBuf> {
    let base = base?;
    let engine_dir = base.join(engine);
    if engine_dir.is_dir() {
        Some(engine_dir)
    } else if base.is_dir() {
        Some(base.to_path_buf())
    } else {
        None
    }
}

/// Whether a file target is deleted and rebuilt rather than cleared in place.
///
/// Excluded tables live inside the target file, so any exclusion forces an
/// in-place clear.
pub fn wipes_target(wipe: bool, engine: EngineKind, exclusions: &ExclusionSet) -> bool {
    wipe && engine == EngineKind::File && exclusions.is_empty()
}

/// Delete a file target so migrations rebuild it from scratch.
pub fn wipe_file_target(path: &Path) -> Result<bool, SyncError> {
    let existed = remove_database_files(path).map_err(|err| {
        SyncError::SchemaPrep(format!("removing {}: {err}", path.display()))
    })?;
    tracing::info!(event = "target_wiped", path = %path.display(), existed);
    Ok(existed)
}

/// Bring the target to a schema-current, empty state.
///
/// Migrations run first (or are skipped with a warning when no directory
/// exists); then every target table outside `exclusions` is emptied in one
/// call, children first. Migration history is never listed by the store and
/// therefore never cleared.
pub async fn prepare_target(
    store: &dyn Store,
    migrations_dir: Option<&Path>,
    exclusions: &ExclusionSet,
) -> Result<PrepareOutcome, SyncError> {
    let mut outcome = PrepareOutcome::default();

    match migrations_dir {
        Some(dir) => {
            let known = store.run_migrations(dir).await.map_err(|err| {
                SyncError::SchemaPrep(format!("applying migrations from {}: {err}", dir.display()))
            })?;
            tracing::info!(
                event = "migrations_applied",
                dir = %dir.display(),
                migrations = known
            );
            outcome.migrations_known = Some(known);
        }
        None => {
            tracing::warn!(
                event = "migrations_skipped",
                engine = store.engine(),
                "no migrations directory for the target engine; using the existing schema"
            );
        }
    }

    let schema = store
        .introspect()
        .await
        .map_err(|err| SyncError::SchemaPrep(format!("reading target schema: {err}")))?;

    check_excluded_references(&schema, exclusions)?;
    let tables = clear_order(&schema, exclusions);
    store
        .clear_tables(&tables)
        .await
        .map_err(|err| SyncError::SchemaPrep(format!("clearing target tables: {err}")))?;
    tracing::info!(event = "tables_cleared", tables = tables.len());

    outcome.cleared = tables;
    Ok(outcome)
}

/// Fail when an excluded table references a table that would be cleared:
/// clearing would either cascade into the excluded table or break its
/// references.
pub fn check_excluded_references(
    schema: &DatabaseSchema,
    exclusions: &ExclusionSet,
) -> Result<(), SyncError> {
    for table in schema.tables.iter().filter(|table| exclusions.contains(&table.name)) {
        if let Some(fk) = table.foreign_keys.iter().find(|fk| {
            !fk.is_self_reference(&table.name) && !exclusions.contains(&fk.referenced_table)
                && schema.table(&fk.referenced_table).is_some()
        }) {
            return Err(SyncError::SchemaPrep(format!(
                "excluded table {} references {}, which would be cleared; \
                 exclude {} as well or drop the exclusion",
                table.name, fk.referenced_table, fk.referenced_table
            )));
        }
    }
    Ok(())
}

/// Tables to clear, children before parents.
pub fn clear_order(schema: &DatabaseSchema, exclusions: &ExclusionSet) -> Vec<String> {
    dependency_order(schema)
        .order
        .into_iter()
        .rev()
        .filter(|table| !exclusions.contains(table))
        .collect()
}

#[cfg(test)]
mod tests {
    use dbsync_core::{Column, ColumnKind, ForeignKey, PrimaryKey, Table};

    use super::*;

    fn table(name: &str, parent: Option<&str>) -> Table {
        Table {
            name: name.to_string(),
            columns: vec![Column {
                ordinal_position: 1,
                name: "id".to_string(),
                kind: ColumnKind::Integer,
                native_type: "integer".to_string(),
                is_nullable: false,
                is_auto_increment: true,
                is_identity_always: false,
                is_generated: false,
            }],
            primary_key: Some(PrimaryKey {
                name: None,
                columns: vec!["id".to_string()],
            }),
            foreign_keys: parent
                .map(|parent| {
                    vec![ForeignKey {
                        name: None,
                        columns: vec!["parent_id".to_string()],
                        referenced_table: parent.to_string(),
                        referenced_columns: vec!["id".to_string()],
                    }]
                })
                .unwrap_or_default(),
        }
    }

    fn schema(tables: Vec<Table>) -> DatabaseSchema {
        DatabaseSchema {
            engine: "postgres".to_string(),
            namespace: Some("public".to_string()),
            tables,
        }
    }

    #[test]
    fn clears_children_before_parents() {
        let schema = schema(vec![
            table("flashcards", Some("users")),
            table("users", None),
            table("reviews", Some("flashcards")),
        ]);
        let order = clear_order(&schema, &ExclusionSet::default());
        assert_eq!(order, vec!["reviews", "flashcards", "users"]);
    }

    #[test]
    fn excluded_tables_are_left_alone() {
        let schema = schema(vec![table("users", None), table("django_session", None)]);
        let order = clear_order(&schema, &ExclusionSet::new(["django_session"]));
        assert_eq!(order, vec!["users"]);
    }

    #[test]
    fn excluded_child_of_cleared_parent_is_refused() {
        let schema = schema(vec![table("users", None), table("audit", Some("users"))]);
        let err = check_excluded_references(&schema, &ExclusionSet::new(["audit"]))
            .expect_err("cascade");
        assert!(matches!(err, SyncError::SchemaPrep(_)));

        let both = ExclusionSet::new(["audit", "users"]);
        assert!(check_excluded_references(&schema, &both).is_ok());
        assert!(clear_order(&schema, &both).is_empty());
    }

    #[test]
    fn exclusions_keep_a_file_target_in_place() {
        let none = ExclusionSet::default();
        let sessions = ExclusionSet::new(["django_session"]);
        assert!(wipes_target(true, EngineKind::File, &none));
        assert!(!wipes_target(true, EngineKind::File, &sessions));
        assert!(!wipes_target(false, EngineKind::File, &none));
        assert!(!wipes_target(true, EngineKind::Server, &none));
    }

    #[test]
    fn migrations_dir_prefers_engine_subdirectory() {
        let base = std::env::temp_dir().join(format!("dbsync-mig-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(base.join("sqlite")).expect("mkdir");

        assert_eq!(
            resolve_migrations_dir(Some(&base), "sqlite"),
            Some(base.join("sqlite"))
        );
        assert_eq!(resolve_migrations_dir(Some(&base), "postgres"), Some(base.clone()));
        assert_eq!(resolve_migrations_dir(Some(&base.join("missing")), "sqlite"), None);
        assert_eq!(resolve_migrations_dir(None, "sqlite"), None);

        let _ = std::fs::remove_dir_all(&base);
    }
}
