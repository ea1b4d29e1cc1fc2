//! The server's own polling loop.
//!
//! A single thread drains the command mailbox at a fixed tick interval,
//! applies the drained commands to the runtime state, expires finite
//! statuses, and decides when the server exits. All runtime-state mutation
//! happens on this thread; everything else reads published snapshots.

mod state;

pub use state::{RuntimeSnapshot, RuntimeState, StatusLine};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam::channel::{Receiver, RecvTimeoutError};

use crate::mailbox::{self, Command};
use crate::{debug, log, logger, record};

/// Fixed interval between mailbox polls.
pub const TICK_INTERVAL: Duration = Duration::from_millis(300);

/// Coordinator lifecycle. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Stopped,
}

/// Owner of all runtime-state mutation.
pub struct Coordinator {
    mailbox_path: PathBuf,
    record_path: PathBuf,
    state: Arc<RuntimeState>,
    loop_state: LoopState,
}

impl Coordinator {
    pub fn new(mailbox_path: PathBuf, record_path: PathBuf, state: Arc<RuntimeState>) -> Self {
        Self {
            mailbox_path,
            record_path,
            state,
            loop_state: LoopState::Running,
        }
    }

    pub fn loop_state(&self) -> LoopState {
        self.loop_state
    }

    /// One poll tick: drain, apply, expire.
    ///
    /// `now` is passed in so tests can drive expiry with simulated time.
    pub fn tick(&mut self, now: Instant) {
        let commands = mailbox::drain(&self.mailbox_path);
        self.apply(commands, now);
        self.expire_status(now);
    }

    /// Apply one drained batch in file order.
    ///
    /// `Stop` takes effect only after the batch's remaining commands, so a
    /// final status queued alongside it still lands before exit.
    fn apply(&mut self, commands: Vec<Command>, now: Instant) {
        if commands.is_empty() {
            return;
        }

        let mut snapshot = (*self.state.snapshot()).clone();
        let mut stop_requested = false;

        for command in commands {
            match command {
                Command::Stop => stop_requested = true,
                Command::IncrementVersion => {
                    snapshot.version += 1;
                    debug!("coord"; "version -> {}", snapshot.version);
                }
                Command::SetStatus {
                    text,
                    is_error,
                    timeout_ms,
                } => {
                    logger::status_message(&text, is_error);
                    snapshot.status = StatusLine {
                        text,
                        is_error,
                        expires_at: timeout_ms.map(|ms| now + Duration::from_millis(ms)),
                    };
                }
                Command::ClearStatus => {
                    logger::status_clear();
                    snapshot.status = StatusLine::cleared();
                }
                Command::PauseClientEvents => {
                    snapshot.broadcast_enabled = false;
                    debug!("coord"; "client events paused");
                }
                Command::ResumeClientEvents => {
                    snapshot.broadcast_enabled = true;
                    debug!("coord"; "client events resumed");
                }
            }
        }

        self.state.publish(snapshot);
        if stop_requested {
            self.loop_state = LoopState::Stopped;
        }
    }

    /// Auto-clear a finite-deadline status once its deadline passes, even
    /// with no new command arriving.
    fn expire_status(&mut self, now: Instant) {
        let snapshot = self.state.snapshot();
        let Some(expires_at) = snapshot.status.expires_at else {
            return;
        };
        if expires_at > now {
            return;
        }

        let mut next = (*snapshot).clone();
        next.status = StatusLine::cleared();
        self.state.publish(next);
        logger::status_clear();
    }

    /// Run until stopped, then clean up the on-disk coordination files.
    ///
    /// The only suspension point is the inter-tick wait, which doubles as
    /// the shutdown-signal receive (Ctrl+C handler sends on `shutdown_rx`).
    pub fn run(mut self, shutdown_rx: &Receiver<()>) {
        loop {
            self.tick(Instant::now());
            if self.loop_state == LoopState::Stopped {
                break;
            }

            match shutdown_rx.recv_timeout(TICK_INTERVAL) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    self.loop_state = LoopState::Stopped;
                    break;
                }
            }
        }
        self.cleanup();
        crate::serve::request_shutdown();
        log!("coord"; "server stopped");
    }

    /// Delete the mailbox (so a fresh server never replays stale commands)
    /// and the server record.
    fn cleanup(&self) {
        let _ = std::fs::remove_file(&self.mailbox_path);
        record::delete(&self.record_path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Environment;
    use crate::record::ServerRecord;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        coordinator: Coordinator,
        state: Arc<RuntimeState>,
        mailbox_path: PathBuf,
        record_path: PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let mailbox_path = dir.path().join("requests.jsonl");
        let record_path = dir.path().join("state.json");
        let state = Arc::new(RuntimeState::new());
        let coordinator = Coordinator::new(
            mailbox_path.clone(),
            record_path.clone(),
            Arc::clone(&state),
        );
        Fixture {
            _dir: dir,
            coordinator,
            state,
            mailbox_path,
            record_path,
        }
    }

    #[test]
    fn test_increment_version() {
        let mut f = fixture();
        mailbox::enqueue(&f.mailbox_path, &Command::IncrementVersion).unwrap();
        mailbox::enqueue(&f.mailbox_path, &Command::IncrementVersion).unwrap();

        f.coordinator.tick(Instant::now());
        assert_eq!(f.state.snapshot().version, 2);
        assert_eq!(f.coordinator.loop_state(), LoopState::Running);
    }

    #[test]
    fn test_stop_applies_remaining_batch_first() {
        let mut f = fixture();
        mailbox::enqueue(
            &f.mailbox_path,
            &Command::SetStatus {
                text: "bye".to_string(),
                is_error: false,
                timeout_ms: None,
            },
        )
        .unwrap();
        mailbox::enqueue(&f.mailbox_path, &Command::Stop).unwrap();

        f.coordinator.tick(Instant::now());

        // The status landed even though the same batch carried the stop
        assert_eq!(f.state.snapshot().status.text, "bye");
        assert_eq!(f.coordinator.loop_state(), LoopState::Stopped);
    }

    #[test]
    fn test_commands_after_stop_in_batch_still_apply() {
        let mut f = fixture();
        mailbox::enqueue(&f.mailbox_path, &Command::Stop).unwrap();
        mailbox::enqueue(&f.mailbox_path, &Command::IncrementVersion).unwrap();

        f.coordinator.tick(Instant::now());
        assert_eq!(f.state.snapshot().version, 1);
        assert_eq!(f.coordinator.loop_state(), LoopState::Stopped);
    }

    #[test]
    fn test_status_expiry() {
        let mut f = fixture();
        let start = Instant::now();
        mailbox::enqueue(
            &f.mailbox_path,
            &Command::SetStatus {
                text: "x".to_string(),
                is_error: false,
                timeout_ms: Some(100),
            },
        )
        .unwrap();

        f.coordinator.tick(start);
        assert_eq!(f.state.snapshot().status.text, "x");

        // Before the deadline: untouched
        f.coordinator.tick(start + Duration::from_millis(50));
        assert_eq!(f.state.snapshot().status.text, "x");

        // Past the deadline: cleared without any new command
        f.coordinator.tick(start + Duration::from_millis(150));
        assert!(f.state.snapshot().status.is_cleared());
    }

    #[test]
    fn test_status_without_timeout_never_expires() {
        let mut f = fixture();
        let start = Instant::now();
        mailbox::enqueue(
            &f.mailbox_path,
            &Command::SetStatus {
                text: "sticky".to_string(),
                is_error: true,
                timeout_ms: None,
            },
        )
        .unwrap();

        f.coordinator.tick(start);
        f.coordinator.tick(start + Duration::from_secs(3600));

        let snapshot = f.state.snapshot();
        assert_eq!(snapshot.status.text, "sticky");
        assert!(snapshot.status.is_error);
    }

    #[test]
    fn test_clear_status() {
        let mut f = fixture();
        mailbox::enqueue(
            &f.mailbox_path,
            &Command::SetStatus {
                text: "x".to_string(),
                is_error: false,
                timeout_ms: None,
            },
        )
        .unwrap();
        f.coordinator.tick(Instant::now());

        mailbox::enqueue(&f.mailbox_path, &Command::ClearStatus).unwrap();
        f.coordinator.tick(Instant::now());
        assert!(f.state.snapshot().status.is_cleared());
    }

    #[test]
    fn test_pause_resume_broadcast() {
        let mut f = fixture();
        mailbox::enqueue(&f.mailbox_path, &Command::PauseClientEvents).unwrap();
        f.coordinator.tick(Instant::now());
        assert!(!f.state.snapshot().broadcast_enabled);

        mailbox::enqueue(&f.mailbox_path, &Command::ResumeClientEvents).unwrap();
        f.coordinator.tick(Instant::now());
        assert!(f.state.snapshot().broadcast_enabled);
    }

    #[test]
    fn test_empty_tick_is_a_no_op() {
        let mut f = fixture();
        let before = f.state.snapshot();
        f.coordinator.tick(Instant::now());
        let after = f.state.snapshot();
        assert!(Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn test_cleanup_removes_coordination_files() {
        let f = fixture();
        mailbox::enqueue(&f.mailbox_path, &Command::IncrementVersion).unwrap();
        record::write(
            &f.record_path,
            &ServerRecord {
                environment: Environment::Development,
                port: 8080,
                pid: std::process::id(),
            },
        )
        .unwrap();

        f.coordinator.cleanup();
        assert!(!f.mailbox_path.exists());
        assert!(!f.record_path.exists());
    }
}
