//! Per-key cancelable debounce timers.
//!
//! Scheduling a key that already has a timer aborts the old timer and
//! installs a new one under a single lock, so only the last action for a key
//! within the delay ever runs.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

struct Timer {
    token: u64,
    request_id: String,
    handle: JoinHandle<()>,
}

#[derive(Clone, Default)]
pub struct Debouncer {
    timers: Arc<Mutex<HashMap<String, Timer>>>,
    next_token: Arc<AtomicU64>,
}

impl Debouncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `action` after `delay` unless `key` is rescheduled or cancelled first.
    /// Returns `true` if an earlier timer for `key` was replaced.
    pub fn schedule<F>(&self, key: String, request_id: String, delay: Duration, action: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let timers = self.timers.clone();
        let fire_key = key.clone();

        let mut guard = self.timers.lock();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut timers = timers.lock();
                match timers.get(&fire_key) {
                    Some(timer) if timer.token == token => {
                        timers.remove(&fire_key);
                    }
                    _ => return,
                }
            }
            action.await;
        });

        let replaced = guard.insert(
            key,
            Timer {
                token,
                request_id,
                handle,
            },
        );
        match replaced {
            Some(old) => {
                old.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Cancel the timer for `key`. Returns `true` if one was pending.
    pub fn cancel(&self, key: &str) -> bool {
        match self.timers.lock().remove(key) {
            Some(timer) => {
                timer.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Cancel the pending timer that would run `request_id`.
    pub fn cancel_request(&self, request_id: &str) -> bool {
        let mut timers = self.timers.lock();
        let key = timers
            .iter()
            .find(|(_, t)| t.request_id == request_id)
            .map(|(k, _)| k.clone());
        match key.and_then(|k| timers.remove(&k)) {
            Some(timer) => {
                timer.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Cancel every pending timer. Returns how many were dropped.
    pub fn cancel_all(&self) -> usize {
        let mut timers = self.timers.lock();
        let count = timers.len();
        for (_, timer) in timers.drain() {
            timer.handle.abort();
        }
        count
    }

    pub fn pending_count(&self) -> usize {
        self.timers.lock().len()
    }
}
