use serde::{Deserialize, Serialize};

use crate::connection::{ConnectionDescriptor, EngineKind};

/// Connection metadata with secrets redacted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedactedConnection {
    pub endpoint: String,
    pub engine: String,
    pub user: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: String,
    pub redacted: String,
}

impl RedactedConnection {
    /// Extract non-sensitive metadata and a display URL with the password masked.
    pub fn from_descriptor(descriptor: &ConnectionDescriptor) -> Self {
        let redacted = match descriptor.engine {
            EngineKind::File => format!("sqlite://{}", descriptor.name),
            EngineKind::Server => {
                let auth = match (&descriptor.user, &descriptor.password) {
                    (Some(user), Some(_)) => format!("{user}:***@"),
                    (Some(user), None) => format!("{user}@"),
                    (None, _) => String::new(),
                };
                let host = descriptor.host.as_deref().unwrap_or("");
                let port = descriptor
                    .port
                    .map(|port| format!(":{port}"))
                    .unwrap_or_default();
                let query = descriptor
                    .sslmode
                    .map(|mode| format!("?sslmode={}", mode.as_str()))
                    .unwrap_or_default();
                format!("postgres://{auth}{host}{port}/{}{query}", descriptor.name)
            }
        };

        Self {
            endpoint: descriptor.endpoint.as_str().to_string(),
            engine: descriptor.engine.as_str().to_string(),
            user: descriptor.user.clone(),
            host: descriptor.host.clone(),
            port: descriptor.port,
            database: descriptor.name.clone(),
            redacted,
        }
    }
}

/// Replace every occurrence of `secret` in free-form text (driver errors can
/// echo connection parameters back).
pub fn scrub_secret(text: &str, secret: Option<&str>) -> String {
    match secret {
        Some(secret) if !secret.is_empty() => text.replace(secret, "***"),
        _ => text.to_string(),
    }
}
