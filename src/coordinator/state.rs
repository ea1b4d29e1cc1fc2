//! Shared runtime state, published as immutable snapshots.
//!
//! Only the coordinator thread builds new snapshots; every other thread
//! (request workers, the status endpoint) reads through the `ArcSwap`, so a
//! reader always observes a complete snapshot, never a half-written one.

use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;

/// The server status line broadcast to connected clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub text: String,
    pub is_error: bool,
    /// `None` means the status stays until explicitly cleared.
    pub expires_at: Option<Instant>,
}

impl StatusLine {
    /// The default, empty status.
    pub fn cleared() -> Self {
        Self {
            text: String::new(),
            is_error: false,
            expires_at: None,
        }
    }

    pub fn is_cleared(&self) -> bool {
        self.text.is_empty() && !self.is_error && self.expires_at.is_none()
    }
}

/// One complete view of the server's mutable runtime state.
#[derive(Debug, Clone)]
pub struct RuntimeSnapshot {
    /// Counter bumped on every content rebuild; live-reload clients refresh
    /// when it moves.
    pub version: u64,
    pub status: StatusLine,
    /// Whether client event broadcasting is currently enabled.
    pub broadcast_enabled: bool,
}

impl Default for RuntimeSnapshot {
    fn default() -> Self {
        Self {
            version: 0,
            status: StatusLine::cleared(),
            broadcast_enabled: true,
        }
    }
}

/// Atomically swappable handle to the current snapshot.
pub struct RuntimeState(ArcSwap<RuntimeSnapshot>);

impl RuntimeState {
    pub fn new() -> Self {
        Self(ArcSwap::from_pointee(RuntimeSnapshot::default()))
    }

    /// The current snapshot (lock-free).
    #[inline]
    pub fn snapshot(&self) -> Arc<RuntimeSnapshot> {
        self.0.load_full()
    }

    /// Publish a new snapshot wholesale.
    pub fn publish(&self, snapshot: RuntimeSnapshot) {
        self.0.store(Arc::new(snapshot));
    }
}

impl Default for RuntimeState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_snapshot() {
        let state = RuntimeState::new();
        let snapshot = state.snapshot();
        assert_eq!(snapshot.version, 0);
        assert!(snapshot.status.is_cleared());
        assert!(snapshot.broadcast_enabled);
    }

    #[test]
    fn test_publish_replaces_whole_snapshot() {
        let state = RuntimeState::new();
        let before = state.snapshot();

        let mut next = (*before).clone();
        next.version = 7;
        state.publish(next);

        let after = state.snapshot();
        assert_eq!(after.version, 7);
        // The old snapshot is unchanged for anyone still holding it
        assert_eq!(before.version, 0);
    }

    #[test]
    fn test_status_cleared() {
        assert!(StatusLine::cleared().is_cleared());

        let set = StatusLine {
            text: "building".to_string(),
            is_error: false,
            expires_at: None,
        };
        assert!(!set.is_cleared());
    }
}
