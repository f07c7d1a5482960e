//! Process-wide counters for the dispatcher and the search index.
//! Read with [`snapshot`]; the `start` command logs them periodically.
use std::sync::atomic::{AtomicU64, Ordering};

static EVENTS_SENT: AtomicU64 = AtomicU64::new(0);
static EVENTS_PROCESSED: AtomicU64 = AtomicU64::new(0);
static EVENTS_PRUNED: AtomicU64 = AtomicU64::new(0);
static SUBSCRIBER_FAILURES: AtomicU64 = AtomicU64::new(0);
static WAITERS_REGISTERED: AtomicU64 = AtomicU64::new(0);
static WAITERS_FULFILLED: AtomicU64 = AtomicU64::new(0);
static WAITERS_EXPIRED: AtomicU64 = AtomicU64::new(0);
static SEARCHES: AtomicU64 = AtomicU64::new(0);
static REINDEXES: AtomicU64 = AtomicU64::new(0);
static POSTS_SKIPPED: AtomicU64 = AtomicU64::new(0);

pub fn inc_events_sent() {
    EVENTS_SENT.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_events_processed() {
    EVENTS_PROCESSED.fetch_add(1, Ordering::Relaxed);
}
pub fn add_events_pruned(n: usize) {
    EVENTS_PRUNED.fetch_add(n as u64, Ordering::Relaxed);
}
pub fn inc_subscriber_failures() {
    SUBSCRIBER_FAILURES.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_waiters_registered() {
    WAITERS_REGISTERED.fetch_add(1, Ordering::Relaxed);
}
pub fn add_waiters_fulfilled(n: usize) {
    WAITERS_FULFILLED.fetch_add(n as u64, Ordering::Relaxed);
}
pub fn add_waiters_expired(n: usize) {
    WAITERS_EXPIRED.fetch_add(n as u64, Ordering::Relaxed);
}
pub fn inc_searches() {
    SEARCHES.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_reindexes() {
    REINDEXES.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_posts_skipped() {
    POSTS_SKIPPED.fetch_add(1, Ordering::Relaxed);
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub events_sent: u64,
    pub events_processed: u64,
    pub events_pruned: u64,
    pub subscriber_failures: u64,
    pub waiters_registered: u64,
    pub waiters_fulfilled: u64,
    pub waiters_expired: u64,
    pub searches: u64,
    pub reindexes: u64,
    pub posts_skipped: u64,
}

impl Snapshot {
    /// Waiters registered but not yet answered by an event or a timeout.
    pub fn waiters_outstanding(&self) -> u64 {
        self.waiters_registered
            .saturating_sub(self.waiters_fulfilled + self.waiters_expired)
    }
}

pub fn snapshot() -> Snapshot {
    Snapshot {
        events_sent: EVENTS_SENT.load(Ordering::Relaxed),
        events_processed: EVENTS_PROCESSED.load(Ordering::Relaxed),
        events_pruned: EVENTS_PRUNED.load(Ordering::Relaxed),
        subscriber_failures: SUBSCRIBER_FAILURES.load(Ordering::Relaxed),
        waiters_registered: WAITERS_REGISTERED.load(Ordering::Relaxed),
        waiters_fulfilled: WAITERS_FULFILLED.load(Ordering::Relaxed),
        waiters_expired: WAITERS_EXPIRED.load(Ordering::Relaxed),
        searches: SEARCHES.load(Ordering::Relaxed),
        reindexes: REINDEXES.load(Ordering::Relaxed),
        posts_skipped: POSTS_SKIPPED.load(Ordering::Relaxed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Counters are shared with every other test in the process, so only check deltas.
    #[test]
    fn counters_only_move_forward() {
        let before = snapshot();
        inc_searches();
        inc_reindexes();
        add_waiters_expired(2);
        let after = snapshot();
        assert!(after.searches >= before.searches + 1);
        assert!(after.reindexes >= before.reindexes + 1);
        assert!(after.waiters_expired >= before.waiters_expired + 2);
    }

    #[test]
    fn outstanding_never_underflows() {
        let snap = Snapshot {
            waiters_registered: 1,
            waiters_fulfilled: 3,
            ..Default::default()
        };
        assert_eq!(snap.waiters_outstanding(), 0);
    }
}
