//! Server record file and singleton guard.
//!
//! The running server publishes `{environment, port, pid}` so external
//! processes can discover it. At most one live record may exist per project
//! directory; liveness is decided by the pid, not by file existence, so a
//! record left behind by a crashed server never blocks the next startup.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::Environment;
use crate::debug;
use crate::error::ServerError;

/// Self-description published by a running server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerRecord {
    pub environment: Environment,
    pub port: u16,
    pub pid: u32,
}

impl ServerRecord {
    /// Record for the current process.
    pub fn for_current_process(environment: Environment, port: u16) -> Self {
        Self {
            environment,
            port,
            pid: std::process::id(),
        }
    }

    /// Whether the recorded pid refers to a running process.
    pub fn is_live(&self) -> bool {
        pid_alive(self.pid)
    }
}

/// Read the record, or `None` if absent.
///
/// A corrupt record is treated like a stale one: the owning server cannot
/// have exited cleanly, so it is discarded rather than reported.
pub fn read(path: &Path) -> Option<ServerRecord> {
    let content = fs::read_to_string(path).ok()?;
    match serde_json::from_str(&content) {
        Ok(record) => Some(record),
        Err(e) => {
            debug!("record"; "discarding unreadable server record: {e}");
            None
        }
    }
}

/// Write the record atomically (temp file + rename), creating the state
/// directory on first use.
pub fn write(path: &Path, record: &ServerRecord) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let content = serde_json::to_string_pretty(record).context("failed to serialize record")?;

    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, content).with_context(|| format!("failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("failed to publish record {}", path.display()))?;
    Ok(())
}

/// Delete the record (clean shutdown). Absence is not an error.
pub fn delete(path: &Path) {
    let _ = fs::remove_file(path);
}

/// Refuse to start while another live server owns this project directory.
///
/// A stale record (dead pid) is discarded and startup proceeds; a live one
/// fails with an actionable conflict naming the existing port and pid.
pub fn guard_startup(path: &Path, interface: &str) -> Result<(), ServerError> {
    let Some(existing) = read(path) else {
        return Ok(());
    };

    if existing.is_live() {
        return Err(ServerError::StartupConflict {
            interface: interface.to_string(),
            port: existing.port,
            pid: existing.pid,
            record_path: path.to_path_buf(),
        });
    }

    debug!("record"; "discarding stale record (pid {} is gone)", existing.pid);
    delete(path);
    Ok(())
}

/// Whether a process with the given pid is currently running.
///
/// `kill(pid, 0)` performs the existence check without delivering a signal;
/// `EPERM` still means the process exists.
#[cfg(unix)]
pub fn pid_alive(pid: u32) -> bool {
    if pid == 0 {
        return false;
    }
    let Ok(pid) = i32::try_from(pid) else {
        return false;
    };
    if unsafe { libc::kill(pid, 0) } == 0 {
        return true;
    }
    std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

/// Non-Unix platforms have no cheap liveness probe; assume alive so the
/// guard errs on the side of refusing a second server.
#[cfg(not(unix))]
pub fn pid_alive(pid: u32) -> bool {
    pid != 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record_path(dir: &TempDir) -> std::path::PathBuf {
        dir.path().join("server").join("state.json")
    }

    #[test]
    fn test_read_absent() {
        let dir = TempDir::new().unwrap();
        assert!(read(&record_path(&dir)).is_none());
    }

    #[test]
    fn test_write_read_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = record_path(&dir);

        let record = ServerRecord {
            environment: Environment::Development,
            port: 8081,
            pid: 1234,
        };
        write(&path, &record).unwrap();
        assert_eq!(read(&path), Some(record));
    }

    #[test]
    fn test_corrupt_record_reads_as_absent() {
        let dir = TempDir::new().unwrap();
        let path = record_path(&dir);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "not json at all").unwrap();
        assert!(read(&path).is_none());
    }

    #[test]
    fn test_pid_alive_for_current_process() {
        assert!(pid_alive(std::process::id()));
    }

    #[test]
    fn test_pid_alive_rejects_zero() {
        assert!(!pid_alive(0));
    }

    #[test]
    fn test_guard_refuses_live_record() {
        let dir = TempDir::new().unwrap();
        let path = record_path(&dir);

        // The test process itself is the "already running" server
        let record = ServerRecord::for_current_process(Environment::Development, 8080);
        write(&path, &record).unwrap();

        let err = guard_startup(&path, "127.0.0.1").unwrap_err();
        match err {
            ServerError::StartupConflict { port, pid, .. } => {
                assert_eq!(port, 8080);
                assert_eq!(pid, std::process::id());
            }
            other => panic!("expected StartupConflict, got {other}"),
        }
        // The live record is left untouched
        assert!(path.exists());
    }

    #[test]
    fn test_guard_discards_stale_record() {
        let dir = TempDir::new().unwrap();
        let path = record_path(&dir);

        let record = ServerRecord {
            environment: Environment::Production,
            port: 8080,
            pid: 0, // no live process ever has pid 0
        };
        write(&path, &record).unwrap();

        guard_startup(&path, "127.0.0.1").unwrap();
        assert!(!path.exists());

        // A fresh record can now be written over it
        let fresh = ServerRecord::for_current_process(Environment::Development, 8082);
        write(&path, &fresh).unwrap();
        assert_eq!(read(&path), Some(fresh));
    }

    #[test]
    fn test_delete_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = record_path(&dir);
        delete(&path);
        write(
            &path,
            &ServerRecord {
                environment: Environment::Development,
                port: 1,
                pid: 1,
            },
        )
        .unwrap();
        delete(&path);
        delete(&path);
        assert!(!path.exists());
    }
}
