//! Server error taxonomy.
//!
//! Only definite failures live here. Transient file absence (mailbox or
//! bundle momentarily missing mid-rebuild) is recovered where it happens and
//! never becomes a `ServerError`. A lost mailbox append from two external
//! writers racing is a documented protocol limitation, not an error this
//! type can represent.

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the server core.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Another live server already owns this project directory.
    #[error(
        "another server is already running at {interface}:{port} (pid {pid}); stop it first or remove {record_path}"
    )]
    StartupConflict {
        interface: String,
        port: u16,
        pid: u32,
        record_path: PathBuf,
    },

    /// Production mode refuses to fall back to another port.
    #[error(
        "port {port} is already in use; free it or configure a different port in drydock.toml"
    )]
    PortInUse { port: u16 },

    /// Development probing exhausted its attempt budget.
    #[error("no free port found in range {start}-{end}")]
    NoFreePort { start: u16, end: u16 },

    /// The handler bundle file does not exist; the build has not produced
    /// output yet. Serving with no handlers is not a safe degraded mode.
    #[error("no handler bundle available at {path} (has the build produced one yet?)")]
    BundleUnavailable { path: PathBuf },

    /// The bundle bytes exist but failed to load or instantiate. The
    /// previously loaded registry stays in service.
    #[error("failed to load handler bundle {path}: {reason}")]
    ReloadFailure { path: PathBuf, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_startup_conflict_names_port_and_pid() {
        let err = ServerError::StartupConflict {
            interface: "127.0.0.1".to_string(),
            port: 8080,
            pid: 4242,
            record_path: PathBuf::from(".drydock/server/state.json"),
        };
        let display = format!("{err}");
        assert!(display.contains("127.0.0.1:8080"));
        assert!(display.contains("pid 4242"));
        assert!(display.contains("state.json"));
    }

    #[test]
    fn test_port_in_use_suggests_configuration() {
        let err = ServerError::PortInUse { port: 9000 };
        let display = format!("{err}");
        assert!(display.contains("9000"));
        assert!(display.contains("drydock.toml"));
    }

    #[test]
    fn test_reload_failure_keeps_reason() {
        let err = ServerError::ReloadFailure {
            path: PathBuf::from("handlers.so"),
            reason: "missing entry symbol".to_string(),
        };
        assert!(format!("{err}").contains("missing entry symbol"));
    }
}
