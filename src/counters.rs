use std::sync::atomic::{AtomicU64, Ordering};

use crate::metrics_consts::{
    JOBS_BAD_SINKED, JOBS_BLACKHOLED, JOBS_FAILED, JOBS_REJECTED, JOBS_SUCCEEDED,
};

/// Process-wide execution outcome counters.
///
/// Schedulers receive these by injection so they stay testable in isolation;
/// each tick also emits the matching `metrics` counter with a `queue` label
/// for whatever recorder the embedding process installed.
#[derive(Debug, Default)]
pub struct JobCounters {
    succeeded: AtomicU64,
    failed: AtomicU64,
    blackholed: AtomicU64,
    rejected: AtomicU64,
    bad_sinked: AtomicU64,
}

impl JobCounters {
    pub fn record_success(&self, queue: &str) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(JOBS_SUCCEEDED, &[("queue", queue.to_owned())]).increment(1);
    }

    pub fn record_failure(&self, queue: &str) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(JOBS_FAILED, &[("queue", queue.to_owned())]).increment(1);
    }

    pub fn record_blackhole(&self, queue: &str) {
        self.blackholed.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(JOBS_BLACKHOLED, &[("queue", queue.to_owned())]).increment(1);
    }

    pub fn record_rejection(&self, queue: &str) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(JOBS_REJECTED, &[("queue", queue.to_owned())]).increment(1);
    }

    pub fn record_bad_sink(&self, queue: &str) {
        self.bad_sinked.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(JOBS_BAD_SINKED, &[("queue", queue.to_owned())]).increment(1);
    }

    pub fn succeeded(&self) -> u64 {
        self.succeeded.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn blackholed(&self) -> u64 {
        self.blackholed.load(Ordering::Relaxed)
    }

    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    pub fn bad_sinked(&self) -> u64 {
        self.bad_sinked.load(Ordering::Relaxed)
    }
}
