//! On-disk command mailbox.
//!
//! Any number of external processes (build tool, CLI invocations) append
//! commands; the one running server drains them. The file is the protocol:
//! one JSON object per line, in append order.
//!
//! Writers use `O_APPEND` single-line writes. Two writers appending in the
//! same narrow window can still interleave pathologically; this lost-append
//! race is an accepted protocol limitation (commands are low-frequency
//! operator signals), deliberately not papered over with a lock file.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::debug;

/// A command addressed to the running server.
///
/// Immutable once written; applied in file order within one drain. The only
/// cross-writer ordering guarantee is "append happens before the next drain
/// that observes it".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    /// Shut the server down after the current batch is applied.
    Stop,
    /// Set the status line shown to connected clients.
    SetStatus {
        text: String,
        #[serde(default)]
        is_error: bool,
        /// Auto-clear after this many milliseconds; absent means never.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },
    /// Reset the status line to its cleared default.
    ClearStatus,
    /// Bump the version counter consumed by live-reload clients.
    IncrementVersion,
    /// Suppress client event broadcasting.
    PauseClientEvents,
    /// Re-enable client event broadcasting.
    ResumeClientEvents,
}

/// Append one command to the mailbox file.
///
/// Creates the state directory and file on first use.
pub fn enqueue(path: &Path, command: &Command) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let mut line = serde_json::to_string(command).context("failed to serialize command")?;
    line.push('\n');

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open mailbox {}", path.display()))?;
    file.write_all(line.as_bytes())
        .with_context(|| format!("failed to append to mailbox {}", path.display()))?;
    Ok(())
}

/// Destructively drain the mailbox: take every pending command, in file
/// order, and reset the mailbox to empty.
///
/// The file is renamed aside before reading, so an append landing mid-drain
/// starts a fresh mailbox instead of being deleted unread. A drained command
/// is never re-observed. An absent mailbox yields an empty batch.
pub fn drain(path: &Path) -> Vec<Command> {
    let side_path = drain_side_path(path);

    // Atomic take: rename fails if the mailbox is absent
    if fs::rename(path, &side_path).is_err() {
        return Vec::new();
    }

    let content = fs::read_to_string(&side_path).unwrap_or_default();
    let _ = fs::remove_file(&side_path);

    let mut commands = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Command>(line) {
            Ok(command) => commands.push(command),
            Err(e) => {
                // A torn append poisons only its own line, not the batch
                crate::log!("mailbox"; "skipping malformed command line: {e}");
            }
        }
    }

    if !commands.is_empty() {
        debug!("mailbox"; "drained {} command(s)", commands.len());
    }
    commands
}

/// Side path used while a drain is in flight.
fn drain_side_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".drain");
    PathBuf::from(name)
}
