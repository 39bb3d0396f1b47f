//! Pending-validation registry used to suppress duplicate runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

struct Pending {
    token: u64,
    accepted_at: Instant,
}

/// Keys currently being validated. Accept and complete are atomic per key.
#[derive(Default)]
pub struct PendingRegistry {
    entries: Mutex<HashMap<String, Pending>>,
    next_token: AtomicU64,
}

impl PendingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `key` was accepted less than `window` ago and has not completed.
    pub fn is_pending(&self, key: &str, window: Duration) -> bool {
        self.entries
            .lock()
            .get(key)
            .is_some_and(|p| p.accepted_at.elapsed() < window)
    }

    /// Record `key` as pending unless a fresh record already exists. Returns
    /// the token to pass to [`complete`](Self::complete). A record older than
    /// `window` is considered stale and replaced.
    pub fn try_accept(&self, key: &str, window: Duration) -> Option<u64> {
        let mut entries = self.entries.lock();
        if entries
            .get(key)
            .is_some_and(|p| p.accepted_at.elapsed() < window)
        {
            return None;
        }
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        entries.insert(
            key.to_string(),
            Pending {
                token,
                accepted_at: Instant::now(),
            },
        );
        Some(token)
    }

    /// Record `key` as pending unconditionally, replacing any existing record.
    /// The previous holder's [`complete`](Self::complete) then leaves the new
    /// record in place.
    pub fn claim(&self, key: &str) -> u64 {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        self.entries.lock().insert(
            key.to_string(),
            Pending {
                token,
                accepted_at: Instant::now(),
            },
        );
        token
    }

    /// Remove the record for `key` if it still belongs to `token`.
    pub fn complete(&self, key: &str, token: u64) {
        let mut entries = self.entries.lock();
        if entries.get(key).is_some_and(|p| p.token == token) {
            entries.remove(key);
        }
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
