use std::time::Duration;

/// Whether a store is opened for reading only or for writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadOnly,
    ReadWrite,
}

/// Options that control how stores are opened and probed.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Upper bound for a connectivity probe.
    pub probe_timeout: Duration,
    pub acquire_timeout: Duration,
    /// How long SQLite waits on a locked database file.
    pub busy_timeout: Duration,
    pub max_connections: u32,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(10),
            acquire_timeout: Duration::from_secs(10),
            busy_timeout: Duration::from_secs(5),
            max_connections: 2,
        }
    }
}
