//! Correlation registry - matches responses to waiting callers.
//!
//! Flow:
//! 1. Caller calls `create()` and gets a [`Task`] with a fresh id
//! 2. The outbound payload carries the id to the server
//! 3. Whoever sees the answer first calls `take(id)` and resolves it
//! 4. A caller giving up (timeout, stop) calls `take(id)` too, so the entry
//!    never outlives the caller
//!
//! `take` succeeds at most once per id; the loser of the race gets `None`.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::domain::task::{Resolver, Task};

/// Request identifier, unique for the lifetime of one service.
///
/// Strictly increasing and never 0; 0 is how the wire says "no request".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CorrelationId(u64);

impl CorrelationId {
    /// Wraps a raw wire value. Returns `None` for the unset value.
    pub fn from_raw(raw: u64) -> Option<Self> {
        (raw != 0).then_some(Self(raw))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<CorrelationId> for u64 {
    fn from(id: CorrelationId) -> Self {
        id.0
    }
}

/// Statistics for the correlation registry
#[derive(Debug, Default)]
pub struct RegistryStats {
    /// Tasks created
    pub total_registered: AtomicU64,
    /// Tasks taken for resolution
    pub total_taken: AtomicU64,
    /// `take` calls that found nothing (late or duplicate answers)
    pub total_missed: AtomicU64,
}

struct RegistryInner<R> {
    last_id: u64,
    pending: HashMap<CorrelationId, Resolver<R>>,
}

/// Pending task set keyed by correlation id.
///
/// Critical sections are a counter bump and one map operation; the lock is
/// never held across I/O or an await.
pub struct CorrelationRegistry<R> {
    inner: Mutex<RegistryInner<R>>,
    stats: RegistryStats,
}

impl<R> Default for CorrelationRegistry<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> CorrelationRegistry<R> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                last_id: 0,
                pending: HashMap::new(),
            }),
            stats: RegistryStats::default(),
        }
    }

    /// Registers a new task for `outbound`.
    pub fn create<O>(&self, label: impl Into<String>, outbound: O, timeout: Duration) -> Task<O, R> {
        let label = label.into();
        let (tx, rx) = oneshot::channel();

        let id = {
            let mut inner = self.inner.lock();
            inner.last_id = inner.last_id.wrapping_add(1);
            if inner.last_id == 0 {
                inner.last_id = 1;
            }
            let id = CorrelationId(inner.last_id);
            inner.pending.insert(id, Resolver::new(id, tx, label.clone()));
            id
        };
        self.stats.total_registered.fetch_add(1, Ordering::Relaxed);

        trace!(correlation_id = %id, label = %label, "Registered task");
        Task::new(id, outbound, timeout, rx)
    }

    /// Removes and returns the resolver for `id`.
    ///
    /// `None` means someone else already took it, which is normal for an
    /// answer arriving after the caller timed out.
    pub fn take(&self, id: CorrelationId) -> Option<Resolver<R>> {
        let taken = self.inner.lock().pending.remove(&id);
        if taken.is_some() {
            self.stats.total_taken.fetch_add(1, Ordering::Relaxed);
        } else {
            self.stats.total_missed.fetch_add(1, Ordering::Relaxed);
            debug!(correlation_id = %id, "No pending task for correlation id");
        }
        taken
    }

    /// Drops the entry for `id` if it is still pending. Used by a caller
    /// that gave up; returns whether anything was removed.
    pub fn discard(&self, id: CorrelationId) -> bool {
        let removed = self.inner.lock().pending.remove(&id).is_some();
        if removed {
            trace!(correlation_id = %id, "Discarded abandoned task");
        }
        removed
    }

    /// Removes every pending task, e.g. when the connection is gone.
    pub fn drain(&self) -> Vec<Resolver<R>> {
        let drained: Vec<_> = self.inner.lock().pending.drain().map(|(_, r)| r).collect();
        self.stats
            .total_taken
            .fetch_add(drained.len() as u64, Ordering::Relaxed);
        drained
    }

    pub fn is_pending(&self, id: CorrelationId) -> bool {
        self.inner.lock().pending.contains_key(&id)
    }

    pub fn pending_count(&self) -> usize {
        self.inner.lock().pending.len()
    }

    pub fn stats(&self) -> &RegistryStats {
        &self.stats
    }
}
