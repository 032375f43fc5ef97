//! Per-session mutual exclusion for the append path.
//!
//! Appends to one session run one at a time; appends to different sessions
//! never contend. Entries are dropped from the map once the last holder or
//! waiter releases them, so the map only holds sessions with appends in
//! flight.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Default, Clone)]
pub struct SessionLocks {
    inner: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

/// Held for the duration of one append. Releases and prunes on drop.
pub struct SessionGuard {
    session_id: String,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, session_id: &str) -> SessionGuard {
        let lock = self
            .inner
            .entry(session_id.to_string())
            .or_default()
            .value()
            .clone();

        let guard = lock.lock_owned().await;
        SessionGuard {
            session_id: session_id.to_string(),
            guard: Some(guard),
            locks: Arc::clone(&self.inner),
        }
    }

    /// Number of sessions currently tracked.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        // Release first so the map entry is the only remaining reference
        // when nobody else is queued on this session.
        self.guard.take();
        self.locks
            .remove_if(&self.session_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}
