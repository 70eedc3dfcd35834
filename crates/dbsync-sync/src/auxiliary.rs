use dbsync_core::{AuxiliaryTableError, Environment, Settings};
use dbsync_store::Store;

pub const DEFAULT_CACHE_TABLE: &str = "cache_table";

/// Cache backend settings that decide whether the target needs a cache table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    pub backend: Option<String>,
    pub table: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: None,
            table: DEFAULT_CACHE_TABLE.to_string(),
        }
    }
}

impl CacheConfig {
    /// `CACHE_BACKEND`/`CACHE_TABLE` override the `[cache]` settings section.
    pub fn resolve(settings: &Settings, env: &Environment) -> Self {
        let backend = env
            .get("CACHE_BACKEND")
            .map(str::to_string)
            .or_else(|| settings.cache.backend.clone());
        let table = env
            .get("CACHE_TABLE")
            .map(str::to_string)
            .or_else(|| settings.cache.table.clone())
            .unwrap_or_else(|| DEFAULT_CACHE_TABLE.to_string());
        Self { backend, table }
    }

    pub fn is_database_backed(&self) -> bool {
        let Some(backend) = self.backend.as_deref() else {
            return false;
        };
        let backend = backend.trim().to_ascii_lowercase();
        matches!(backend.as_str(), "db" | "database")
            || backend.ends_with(".databasecache")
            || backend.contains("backends.db")
    }
}

/// Create the cache table on the target when the cache lives in the database.
///
/// Failures never abort the run; they are returned for the summary.
pub async fn ensure_auxiliary_tables(
    store: &dyn Store,
    cache: &CacheConfig,
) -> Vec<AuxiliaryTableError> {
    if !cache.is_database_backed() {
        tracing::debug!(event = "cache_table_skipped", backend = ?cache.backend);
        return Vec::new();
    }

    match store.ensure_cache_table(&cache.table).await {
        Ok(true) => {
            tracing::info!(event = "cache_table_created", table = %cache.table);
            Vec::new()
        }
        Ok(false) => {
            tracing::info!(event = "cache_table_present", table = %cache.table);
            Vec::new()
        }
        Err(err) => {
            let error = AuxiliaryTableError {
                table: cache.table.clone(),
                message: err.to_string(),
            };
            tracing::warn!(event = "auxiliary_table_failed", table = %cache.table, error = %error);
            vec![error]
        }
    }
}
