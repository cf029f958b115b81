#[cfg(feature = "metrics")]
use std::sync::atomic::{AtomicU64, Ordering};
#[cfg(feature = "metrics")]
use std::time::Instant;

/// Optional performance counters for the scheduler.
#[cfg(feature = "metrics")]
#[derive(Debug)]
pub struct Metrics {
    /// Jobs whose bodies ran to completion.
    pub jobs_executed: AtomicU64,
    /// Successful pops from a worker's own queue.
    pub local_pops: AtomicU64,
    /// Steal attempts against another worker's queue.
    pub steal_attempts: AtomicU64,
    /// Steal attempts that yielded a job.
    pub steals_success: AtomicU64,
    /// Handles accepted by `schedule`.
    pub schedule_pushes: AtomicU64,
    /// Empty rounds inside `wait` that gave up the timeslice.
    pub wait_yields: AtomicU64,
    /// When collection started.
    pub start_time: Instant,
}

#[cfg(feature = "metrics")]
impl Metrics {
    pub fn new() -> Self {
        Self {
            jobs_executed: AtomicU64::new(0),
            local_pops: AtomicU64::new(0),
            steal_attempts: AtomicU64::new(0),
            steals_success: AtomicU64::new(0),
            schedule_pushes: AtomicU64::new(0),
            wait_yields: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Returns a snapshot of current counter values.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            jobs_executed: self.jobs_executed.load(Ordering::Relaxed),
            local_pops: self.local_pops.load(Ordering::Relaxed),
            steal_attempts: self.steal_attempts.load(Ordering::Relaxed),
            steals_success: self.steals_success.load(Ordering::Relaxed),
            schedule_pushes: self.schedule_pushes.load(Ordering::Relaxed),
            wait_yields: self.wait_yields.load(Ordering::Relaxed),
            elapsed_seconds: self.start_time.elapsed().as_secs_f64(),
        }
    }
}

#[cfg(feature = "metrics")]
impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of scheduler counters at a point in time.
#[cfg(feature = "metrics")]
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub jobs_executed: u64,
    pub local_pops: u64,
    pub steal_attempts: u64,
    pub steals_success: u64,
    pub schedule_pushes: u64,
    pub wait_yields: u64,
    pub elapsed_seconds: f64,
}

#[cfg(feature = "metrics")]
impl MetricsSnapshot {
    /// Jobs per second since the scheduler started.
    pub fn jobs_per_second(&self) -> f64 {
        if self.elapsed_seconds > 0.0 {
            self.jobs_executed as f64 / self.elapsed_seconds
        } else {
            0.0
        }
    }

    /// Fraction of steal attempts that found work.
    pub fn steal_hit_rate(&self) -> f64 {
        if self.steal_attempts > 0 {
            self.steals_success as f64 / self.steal_attempts as f64
        } else {
            0.0
        }
    }
}

#[cfg(all(test, feature = "metrics"))]
mod tests {
    use super::*;

    #[test]
    fn fresh_metrics_are_zero() {
        let metrics = Metrics::new();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.jobs_executed, 0);
        assert_eq!(snapshot.steal_attempts, 0);
        assert_eq!(snapshot.steals_success, 0);
        assert_eq!(snapshot.steal_hit_rate(), 0.0);
        assert!(snapshot.elapsed_seconds >= 0.0);
    }

    #[test]
    fn hit_rate_reflects_counters() {
        let metrics = Metrics::new();
        metrics.steal_attempts.fetch_add(4, Ordering::Relaxed);
        metrics.steals_success.fetch_add(1, Ordering::Relaxed);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.steal_hit_rate(), 0.25);
    }
}
