use std::path::Path;

use dbsync_core::atomic::write_json_atomic;
use dbsync_sync::SyncReport;

use super::RegistryResult;

/// Write the run report as pretty JSON; a crash never leaves half a file.
pub fn write_report(path: &Path, report: &SyncReport) -> RegistryResult<()> {
    write_json_atomic(path, report)?;
    tracing::info!(event = "report_written", path = %path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use dbsync_core::{ConnectionDescriptor, Direction, EngineKind, Endpoint, RedactedConnection};

    use super::*;

    fn local(name: &str) -> RedactedConnection {
        RedactedConnection::from_descriptor(&ConnectionDescriptor {
            endpoint: Endpoint::Local,
            engine: EngineKind::File,
            name: name.to_string(),
            host: None,
            port: None,
            user: None,
            password: None,
            sslmode: None,
            schema: None,
            lifetime: Default::default(),
            host_source: dbsync_core::Provenance::Default,
            name_source: dbsync_core::Provenance::Default,
            user_source: dbsync_core::Provenance::Default,
        })
    }

    #[test]
    fn report_lands_as_json() {
        let dir = std::env::temp_dir().join(format!("dbsync-report-{}", uuid::Uuid::new_v4()));
        let path = dir.join("nested").join("report.json");
        let report = SyncReport::new(
            "run-1".to_string(),
            Direction::ToLocal,
            local("a.sqlite3"),
            local("b.sqlite3"),
        );

        write_report(&path, &report).expect("write report");
        let written: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).expect("read")).expect("json");
        assert_eq!(written["run_id"], "run-1");
        assert_eq!(written["direction"], "to-local");
        assert_eq!(written["status"], "failed");

        let _ = std::fs::remove_dir_all(&dir);
    }
}
