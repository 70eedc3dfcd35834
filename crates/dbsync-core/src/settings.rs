use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

/// Settings file looked up in the working directory when `--config` is absent.
pub const DEFAULT_SETTINGS_FILE: &str = "dbsync.toml";

/// Environment variables the resolver reads.
pub const ENV_KEYS: &[&str] = &[
    "DB_ENGINE",
    "DB_NAME",
    "DB_USER",
    "DB_PASSWORD",
    "DB_HOST",
    "DB_PORT",
    "DB_SSLMODE",
    "DB_SCHEMA",
    "DB_CONN_MAX_AGE",
    "DB_CONN_HEALTH_CHECKS",
    "LOCAL_DB_PATH",
    "CACHE_BACKEND",
    "CACHE_TABLE",
];

/// Optional TOML settings layered between built-in defaults and the environment.
///
/// Passwords are deliberately not accepted here; see [`Settings::validate`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub local: LocalSettings,
    pub server: ServerSettings,
    pub sync: SyncSettings,
    pub cache: CacheSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LocalSettings {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSettings {
    pub engine: Option<String>,
    pub name: Option<String>,
    pub user: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub sslmode: Option<String>,
    pub schema: Option<String>,
    pub conn_max_age: Option<u64>,
    pub conn_health_checks: Option<bool>,
    /// Present only so it can be rejected with a clear message.
    #[serde(skip_serializing)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncSettings {
    pub batch_size: Option<usize>,
    pub exclude: Vec<String>,
    pub volatile_tables: Option<Vec<String>>,
    pub migrations_dir: Option<PathBuf>,
    pub manifest_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheSettings {
    pub backend: Option<String>,
    pub table: Option<String>,
}

impl Settings {
    /// Parse settings from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(content)
            .map_err(|err| SyncError::Configuration(format!("invalid settings file: {err}")))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings that would embed secrets.
    pub fn validate(&self) -> Result<()> {
        if self.server.password.is_some() {
            return Err(SyncError::Configuration(
                "passwords are not read from the settings file; set DB_PASSWORD".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load settings from an explicit path, or from `dbsync.toml` when present.
///
/// An explicit path that does not exist is a configuration error; a missing
/// default file just yields empty settings.
pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let (path, explicit) = match path {
        Some(path) => (path.to_path_buf(), true),
        None => (PathBuf::from(DEFAULT_SETTINGS_FILE), false),
    };

    if !path.exists() {
        if explicit {
            return Err(SyncError::Configuration(format!(
                "settings file not found: {}",
                path.display()
            )));
        }
        return Ok(Settings::default());
    }

    let content = std::fs::read_to_string(&path).map_err(|err| {
        SyncError::Configuration(format!("reading {}: {err}", path.display()))
    })?;
    Settings::from_toml(&content)
}

/// Snapshot of the environment variables relevant to a run.
///
/// Components receive this explicitly instead of reading the process
/// environment, which keeps resolution deterministic under test.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    vars: BTreeMap<String, String>,
}

impl Environment {
    /// Capture the known keys from the process environment.
    pub fn from_process() -> Self {
        let vars = ENV_KEYS
            .iter()
            .filter_map(|key| std::env::var(key).ok().map(|value| (key.to_string(), value)))
            .collect();
        Self { vars }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars = pairs
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();
        Self { vars }
    }

    /// Value of `key`; empty strings count as unset.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sections() {
        let settings = Settings::from_toml(
            r#"
            [local]
            path = "data/dev.sqlite3"

            [server]
            host = "db.internal"
            port = 6543
            name = "vocab"
            user = "vocab"
            sslmode = "require"

            [sync]
            batch_size = 250
            exclude = ["audit_log"]

            [cache]
            backend = "database"
            "#,
        )
        .expect("parse settings");

        assert_eq!(settings.local.path, Some(PathBuf::from("data/dev.sqlite3")));
        assert_eq!(settings.server.port, Some(6543));
        assert_eq!(settings.sync.batch_size, Some(250));
        assert_eq!(settings.sync.exclude, vec!["audit_log".to_string()]);
        assert_eq!(settings.cache.backend.as_deref(), Some("database"));
    }

    #[test]
    fn rejects_passwords_in_file() {
        let err = Settings::from_toml("[server]\npassword = \"hunter2\"\n").expect_err("password");
        assert!(matches!(err, SyncError::Configuration(_)));
        assert!(!err.to_string().contains("hunter2"));
    }

    #[test]
    fn rejects_unknown_keys() {
        assert!(Settings::from_toml("[server]\nhots = \"x\"\n").is_err());
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let missing = std::env::temp_dir().join(format!("dbsync_{}.toml", uuid::Uuid::new_v4()));
        assert!(load_settings(Some(&missing)).is_err());
    }

    #[test]
    fn empty_env_values_are_unset() {
        let env = Environment::from_pairs([("DB_HOST", "  "), ("DB_NAME", "vocab")]);
        assert_eq!(env.get("DB_HOST"), None);
        assert_eq!(env.get("DB_NAME"), Some("vocab"));
    }
}
