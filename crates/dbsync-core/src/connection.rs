use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};
use crate::settings::{Environment, Settings};

pub const DEFAULT_LOCAL_PATH: &str = "db.sqlite3";
pub const DEFAULT_SERVER_HOST: &str = "localhost";
pub const DEFAULT_SERVER_PORT: u16 = 5432;
pub const DEFAULT_SERVER_USER: &str = "postgres";
pub const DEFAULT_SERVER_NAME: &str = "postgres";
pub const DEFAULT_SERVER_SCHEMA: &str = "public";

/// Storage engine family of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    /// A single database file (SQLite).
    File,
    /// A database server (PostgreSQL).
    Server,
}

impl EngineKind {
    /// Parse the engine names accepted in `DB_ENGINE`.
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" | "django.db.backends.sqlite3" => Ok(EngineKind::File),
            "postgres"
            | "postgresql"
            | "django.db.backends.postgresql"
            | "django.db.backends.postgresql_psycopg2" => Ok(EngineKind::Server),
            other => Err(SyncError::Configuration(format!(
                "unsupported engine: {other}"
            ))),
        }
    }

    /// Engine identifier used in manifests and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::File => "sqlite",
            EngineKind::Server => "postgres",
        }
    }
}

/// Which way rows flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Direction {
    /// Server endpoint → local file.
    ToLocal,
    /// Local file → server endpoint.
    ToServer,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::ToLocal => "to-local",
            Direction::ToServer => "to-server",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = SyncError;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "to-local" => Ok(Direction::ToLocal),
            "to-server" => Ok(Direction::ToServer),
            other => Err(SyncError::Configuration(format!(
                "unknown direction: {other} (expected to-local or to-server)"
            ))),
        }
    }
}

/// Logical endpoint a descriptor was built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    Server,
    Local,
}

impl Endpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Endpoint::Server => "server",
            Endpoint::Local => "local",
        }
    }
}

/// Postgres `sslmode` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SslMode {
    Disable,
    Allow,
    Prefer,
    Require,
    VerifyCa,
    VerifyFull,
}

impl SslMode {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "disable" => Ok(SslMode::Disable),
            "allow" => Ok(SslMode::Allow),
            "prefer" => Ok(SslMode::Prefer),
            "require" => Ok(SslMode::Require),
            "verify-ca" => Ok(SslMode::VerifyCa),
            "verify-full" => Ok(SslMode::VerifyFull),
            other => Err(SyncError::Configuration(format!("invalid sslmode: {other}"))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SslMode::Disable => "disable",
            SslMode::Allow => "allow",
            SslMode::Prefer => "prefer",
            SslMode::Require => "require",
            SslMode::VerifyCa => "verify-ca",
            SslMode::VerifyFull => "verify-full",
        }
    }
}

/// Where a resolved field came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Default,
    SettingsFile,
    Environment,
}

/// Connection reuse policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LifetimePolicy {
    /// Maximum age of a pooled connection; `None` keeps connections open.
    pub max_lifetime: Option<Duration>,
    /// Ping connections before handing them out.
    pub health_checks: bool,
}

/// Secret value that never shows up in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Resolved, immutable connection parameters for one endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionDescriptor {
    pub endpoint: Endpoint,
    pub engine: EngineKind,
    /// Database name, or the file path for file stores.
    pub name: String,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<Secret>,
    pub sslmode: Option<SslMode>,
    /// Namespace holding the synchronized tables (server stores only).
    pub schema: Option<String>,
    pub lifetime: LifetimePolicy,
    pub host_source: Provenance,
    pub name_source: Provenance,
    pub user_source: Provenance,
}

impl ConnectionDescriptor {
    /// File path of a file store.
    pub fn file_path(&self) -> Option<&Path> {
        match self.engine {
            EngineKind::File => Some(Path::new(&self.name)),
            EngineKind::Server => None,
        }
    }

    /// Identity of the physical store, used to refuse self-syncs.
    ///
    /// File stores compare by absolute (canonical when it exists) path, server
    /// stores by `host:port/name`.
    pub fn store_identity(&self) -> String {
        match self.engine {
            EngineKind::File => {
                let path = Path::new(&self.name);
                let resolved = path
                    .canonicalize()
                    .or_else(|_| std::path::absolute(path))
                    .unwrap_or_else(|_| path.to_path_buf());
                format!("file:{}", resolved.display())
            }
            EngineKind::Server => format!(
                "server:{}:{}/{}",
                self.host
                    .as_deref()
                    .unwrap_or(DEFAULT_SERVER_HOST)
                    .to_ascii_lowercase(),
                self.port.unwrap_or(DEFAULT_SERVER_PORT),
                self.name
            ),
        }
    }

    /// Fields that still carry built-in defaults.
    pub fn defaulted_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.engine == EngineKind::Server {
            if self.host_source == Provenance::Default {
                fields.push("host");
            }
            if self.name_source == Provenance::Default {
                fields.push("name");
            }
            if self.user_source == Provenance::Default {
                fields.push("user");
            }
        }
        fields
    }
}

/// Source and target for one run.
#[derive(Debug, Clone)]
pub struct ResolvedConnections {
    pub direction: Direction,
    pub source: ConnectionDescriptor,
    pub target: ConnectionDescriptor,
}

/// Build source and target descriptors for a direction.
///
/// `interactive` is false when the run skips the confirmation prompt; such
/// runs refuse server endpoints that still rely on built-in defaults.
pub fn resolve_connections(
    direction: Direction,
    settings: &Settings,
    env: &Environment,
    interactive: bool,
) -> Result<ResolvedConnections> {
    settings.validate()?;

    let server = resolve_server(settings, env)?;
    let local = resolve_local(settings, env);

    if !interactive {
        let defaulted = server.defaulted_fields();
        if !defaulted.is_empty() {
            return Err(SyncError::Configuration(format!(
                "refusing a non-interactive run against defaulted server settings ({}); \
                 set DB_HOST, DB_NAME and DB_USER explicitly",
                defaulted.join(", ")
            )));
        }
    }

    let (source, target) = match direction {
        Direction::ToLocal => (server, local),
        Direction::ToServer => (local, server),
    };

    if source.store_identity() == target.store_identity() {
        return Err(SyncError::Configuration(format!(
            "source and target are the same store ({})",
            source.store_identity()
        )));
    }

    Ok(ResolvedConnections {
        direction,
        source,
        target,
    })
}

fn resolve_server(settings: &Settings, env: &Environment) -> Result<ConnectionDescriptor> {
    let server = &settings.server;

    let engine = match env.get("DB_ENGINE").or(server.engine.as_deref()) {
        Some(value) => EngineKind::parse(value)?,
        None => EngineKind::Server,
    };

    let (name, name_source) = layered(
        env.get("DB_NAME"),
        server.name.as_deref(),
        DEFAULT_SERVER_NAME,
    );
    let lifetime = resolve_lifetime(settings, env)?;

    if engine == EngineKind::File {
        if name_source == Provenance::Default {
            return Err(SyncError::Configuration(
                "DB_NAME must name the database file when DB_ENGINE is sqlite".to_string(),
            ));
        }
        return Ok(ConnectionDescriptor {
            endpoint: Endpoint::Server,
            engine,
            name,
            host: None,
            port: None,
            user: None,
            password: None,
            sslmode: None,
            schema: None,
            lifetime,
            host_source: Provenance::Default,
            name_source,
            user_source: Provenance::Default,
        });
    }

    let (host, host_source) = layered(
        env.get("DB_HOST"),
        server.host.as_deref(),
        DEFAULT_SERVER_HOST,
    );
    let (user, user_source) = layered(
        env.get("DB_USER"),
        server.user.as_deref(),
        DEFAULT_SERVER_USER,
    );

    let port = match env.get("DB_PORT") {
        Some(value) => value
            .parse::<u16>()
            .map_err(|_| SyncError::Configuration(format!("invalid DB_PORT: {value}")))?,
        None => server.port.unwrap_or(DEFAULT_SERVER_PORT),
    };

    let sslmode = env
        .get("DB_SSLMODE")
        .or(server.sslmode.as_deref())
        .map(SslMode::parse)
        .transpose()?;

    let password = env.get("DB_PASSWORD").map(Secret::new).ok_or_else(|| {
        SyncError::Configuration("DB_PASSWORD is required for the server endpoint".to_string())
    })?;

    let (schema, _) = layered(
        env.get("DB_SCHEMA"),
        server.schema.as_deref(),
        DEFAULT_SERVER_SCHEMA,
    );

    Ok(ConnectionDescriptor {
        endpoint: Endpoint::Server,
        engine,
        name,
        host: Some(host),
        port: Some(port),
        user: Some(user),
        password: Some(password),
        sslmode,
        schema: Some(schema),
        lifetime,
        host_source,
        name_source,
        user_source,
    })
}

fn resolve_local(settings: &Settings, env: &Environment) -> ConnectionDescriptor {
    let (name, name_source) = match (env.get("LOCAL_DB_PATH"), settings.local.path.as_ref()) {
        (Some(path), _) => (path.to_string(), Provenance::Environment),
        (None, Some(path)) => (path.display().to_string(), Provenance::SettingsFile),
        (None, None) => (DEFAULT_LOCAL_PATH.to_string(), Provenance::Default),
    };

    ConnectionDescriptor {
        endpoint: Endpoint::Local,
        engine: EngineKind::File,
        name,
        host: None,
        port: None,
        user: None,
        password: None,
        sslmode: None,
        schema: None,
        lifetime: LifetimePolicy::default(),
        host_source: Provenance::Default,
        name_source,
        user_source: Provenance::Default,
    }
}

fn resolve_lifetime(settings: &Settings, env: &Environment) -> Result<LifetimePolicy> {
    let max_age = match env.get("DB_CONN_MAX_AGE") {
        Some(value) => Some(value.parse::<u64>().map_err(|_| {
            SyncError::Configuration(format!("invalid DB_CONN_MAX_AGE: {value}"))
        })?),
        None => settings.server.conn_max_age,
    };

    let health_checks = match env.get("DB_CONN_HEALTH_CHECKS") {
        Some(value) => parse_bool(value).ok_or_else(|| {
            SyncError::Configuration(format!("invalid DB_CONN_HEALTH_CHECKS: {value}"))
        })?,
        None => settings.server.conn_health_checks.unwrap_or(false),
    };

    Ok(LifetimePolicy {
        max_lifetime: max_age
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs),
        health_checks,
    })
}

fn layered(env: Option<&str>, file: Option<&str>, default: &str) -> (String, Provenance) {
    match (env, file) {
        (Some(value), _) => (value.to_string(), Provenance::Environment),
        (None, Some(value)) => (value.to_string(), Provenance::SettingsFile),
        (None, None) => (default.to_string(), Provenance::Default),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn server_env() -> Vec<(&'static str, &'static str)> {
        vec![
            ("DB_HOST", "db.internal"),
            ("DB_NAME", "vocab"),
            ("DB_USER", "vocab_app"),
            ("DB_PASSWORD", "s3cret"),
        ]
    }

    #[test]
    fn to_local_reads_from_server() {
        let env = Environment::from_pairs(server_env());
        let resolved =
            resolve_connections(Direction::ToLocal, &Settings::default(), &env, false)
                .expect("resolve");

        assert_eq!(resolved.source.endpoint, Endpoint::Server);
        assert_eq!(resolved.source.engine, EngineKind::Server);
        assert_eq!(resolved.source.host.as_deref(), Some("db.internal"));
        assert_eq!(resolved.source.port, Some(DEFAULT_SERVER_PORT));
        assert_eq!(resolved.source.schema.as_deref(), Some("public"));
        assert_eq!(resolved.target.engine, EngineKind::File);
        assert_eq!(resolved.target.name, DEFAULT_LOCAL_PATH);
    }

    #[test]
    fn to_server_swaps_roles() {
        let env = Environment::from_pairs(server_env());
        let resolved =
            resolve_connections(Direction::ToServer, &Settings::default(), &env, false)
                .expect("resolve");

        assert_eq!(resolved.source.endpoint, Endpoint::Local);
        assert_eq!(resolved.target.endpoint, Endpoint::Server);
    }

    #[test]
    fn missing_password_is_a_configuration_error() {
        let env = Environment::from_pairs([("DB_HOST", "db"), ("DB_NAME", "x"), ("DB_USER", "u")]);
        let err = resolve_connections(Direction::ToLocal, &Settings::default(), &env, true)
            .expect_err("missing password");
        assert!(matches!(err, SyncError::Configuration(_)));
    }

    #[test]
    fn non_interactive_runs_refuse_defaulted_server_fields() {
        let env = Environment::from_pairs([("DB_PASSWORD", "pw"), ("DB_NAME", "vocab")]);
        let err = resolve_connections(Direction::ToServer, &Settings::default(), &env, false)
            .expect_err("defaulted host");
        let message = err.to_string();
        assert!(message.contains("host"));
        assert!(message.contains("user"));
        assert!(!message.contains("pw"));

        resolve_connections(Direction::ToServer, &Settings::default(), &env, true)
            .expect("interactive runs may use defaults");
    }

    #[test]
    fn settings_file_counts_as_explicit() {
        let mut settings = Settings::default();
        settings.server.host = Some("db.internal".to_string());
        settings.server.name = Some("vocab".to_string());
        settings.server.user = Some("vocab".to_string());
        let env = Environment::from_pairs([("DB_PASSWORD", "pw")]);

        let resolved = resolve_connections(Direction::ToLocal, &settings, &env, false)
            .expect("resolve");
        assert_eq!(resolved.source.host_source, Provenance::SettingsFile);
    }

    #[test]
    fn environment_overrides_settings_file() {
        let mut settings = Settings::default();
        settings.server.port = Some(6000);
        settings.local.path = Some(PathBuf::from("file.sqlite3"));
        let mut pairs = server_env();
        pairs.push(("DB_PORT", "6543"));
        pairs.push(("LOCAL_DB_PATH", "env.sqlite3"));
        pairs.push(("DB_SSLMODE", "require"));
        let env = Environment::from_pairs(pairs);

        let resolved = resolve_connections(Direction::ToLocal, &settings, &env, false)
            .expect("resolve");
        assert_eq!(resolved.source.port, Some(6543));
        assert_eq!(resolved.source.sslmode, Some(SslMode::Require));
        assert_eq!(resolved.target.name, "env.sqlite3");
    }

    #[test]
    fn invalid_port_and_sslmode_are_rejected() {
        let mut pairs = server_env();
        pairs.push(("DB_PORT", "not-a-port"));
        let env = Environment::from_pairs(pairs);
        assert!(resolve_connections(Direction::ToLocal, &Settings::default(), &env, true).is_err());

        let mut pairs = server_env();
        pairs.push(("DB_SSLMODE", "sometimes"));
        let env = Environment::from_pairs(pairs);
        assert!(resolve_connections(Direction::ToLocal, &Settings::default(), &env, true).is_err());
    }

    #[test]
    fn same_file_on_both_sides_is_rejected() {
        let env = Environment::from_pairs([
            ("DB_ENGINE", "sqlite3"),
            ("DB_NAME", "same.sqlite3"),
            ("LOCAL_DB_PATH", "same.sqlite3"),
        ]);
        let err = resolve_connections(Direction::ToLocal, &Settings::default(), &env, false)
            .expect_err("same store");
        assert!(err.to_string().contains("same store"));
    }

    #[test]
    fn file_engine_on_server_side_needs_a_name() {
        let env = Environment::from_pairs([("DB_ENGINE", "django.db.backends.sqlite3")]);
        assert!(resolve_connections(Direction::ToLocal, &Settings::default(), &env, true).is_err());
    }

    #[test]
    fn lifetime_policy_from_env() {
        let mut pairs = server_env();
        pairs.push(("DB_CONN_MAX_AGE", "600"));
        pairs.push(("DB_CONN_HEALTH_CHECKS", "true"));
        let env = Environment::from_pairs(pairs);

        let resolved = resolve_connections(Direction::ToLocal, &Settings::default(), &env, true)
            .expect("resolve");
        assert_eq!(
            resolved.source.lifetime.max_lifetime,
            Some(Duration::from_secs(600))
        );
        assert!(resolved.source.lifetime.health_checks);
    }

    #[test]
    fn unsupported_engine() {
        let env = Environment::from_pairs([("DB_ENGINE", "mysql")]);
        let err = resolve_connections(Direction::ToLocal, &Settings::default(), &env, true)
            .expect_err("mysql");
        assert!(err.to_string().contains("unsupported engine"));
    }

    #[test]
    fn secrets_are_hidden_from_debug() {
        let env = Environment::from_pairs(server_env());
        let resolved = resolve_connections(Direction::ToLocal, &Settings::default(), &env, true)
            .expect("resolve");
        assert!(!format!("{:?}", resolved.source).contains("s3cret"));
    }
}
