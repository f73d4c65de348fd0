//! Time-bucketed rolling window of call outcomes.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
struct Bucket {
    id: u64,
    successes: u32,
    failures: u32,
}

/// Totals over the live part of the window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowSnapshot {
    /// Successful calls
    pub successes: u32,
    /// Failed calls
    pub failures: u32,
}

impl WindowSnapshot {
    /// Total samples
    #[must_use]
    pub fn total(&self) -> u32 {
        self.successes + self.failures
    }

    /// Failure percentage (0.0 - 100.0)
    #[must_use]
    pub fn failure_rate(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            f64::from(self.failures) / f64::from(total) * 100.0
        }
    }
}

/// Rolling window split into fixed-width buckets.
///
/// Buckets older than the window length are dropped lazily on every
/// read or write.
#[derive(Debug)]
pub struct RollingWindow {
    origin: Instant,
    bucket_width: Duration,
    bucket_count: u64,
    buckets: VecDeque<Bucket>,
}

impl RollingWindow {
    /// Create a window of `length` split into `buckets` buckets
    #[must_use]
    pub fn new(length: Duration, buckets: u32) -> Self {
        let bucket_count = u64::from(buckets.max(1));
        let width_nanos = (length.as_nanos() / u128::from(bucket_count)).max(1);
        Self {
            origin: Instant::now(),
            bucket_width: Duration::from_nanos(width_nanos as u64),
            bucket_count,
            buckets: VecDeque::with_capacity(bucket_count as usize),
        }
    }

    fn bucket_id(&self, now: Instant) -> u64 {
        let elapsed = now.saturating_duration_since(self.origin).as_nanos();
        (elapsed / self.bucket_width.as_nanos()) as u64
    }

    fn evict(&mut self, current: u64) {
        while let Some(front) = self.buckets.front() {
            if front.id + self.bucket_count <= current {
                self.buckets.pop_front();
            } else {
                break;
            }
        }
    }

    fn current_bucket(&mut self, now: Instant) -> &mut Bucket {
        let id = self.bucket_id(now);
        self.evict(id);
        if self.buckets.back().map_or(true, |b| b.id != id) {
            self.buckets.push_back(Bucket {
                id,
                successes: 0,
                failures: 0,
            });
        }
        let last = self.buckets.len() - 1;
        &mut self.buckets[last]
    }

    /// Record a success at `now`
    pub fn record_success(&mut self, now: Instant) {
        self.current_bucket(now).successes += 1;
    }

    /// Record a failure at `now`
    pub fn record_failure(&mut self, now: Instant) {
        self.current_bucket(now).failures += 1;
    }

    /// Totals of the buckets still inside the window at `now`
    pub fn snapshot(&mut self, now: Instant) -> WindowSnapshot {
        let id = self.bucket_id(now);
        self.evict(id);
        self.buckets
            .iter()
            .fold(WindowSnapshot::default(), |acc, b| WindowSnapshot {
                successes: acc.successes + b.successes,
                failures: acc.failures + b.failures,
            })
    }

    /// Drop every sample
    pub fn clear(&mut self) {
        self.buckets.clear();
    }
}
