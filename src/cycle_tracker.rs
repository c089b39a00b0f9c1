//! CPU cycle duration tracking
//!
//! The cycle duration is the monotonic wall-clock delta between two
//! successive samples. It is the denominator when a thread's CPU time is
//! turned into a power estimate.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Tracks the interval between successive CPU samples
#[derive(Debug)]
pub struct CpuCycleTracker {
    origin: Instant,
    /// Nanoseconds since `origin` of the most recent tick
    last_sample: AtomicU64,
    /// Nanoseconds between the two most recent ticks
    last_cycle: AtomicU64,
    ticks: AtomicU64,
}

impl Default for CpuCycleTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuCycleTracker {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            last_sample: AtomicU64::new(0),
            last_cycle: AtomicU64::new(0),
            ticks: AtomicU64::new(0),
        }
    }

    fn now_ns(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }

    /// Close the current cycle and open the next one
    ///
    /// The first tick measures from construction. Concurrent ticks each see a
    /// consistent `(previous, now)` pair thanks to the atomic swap.
    pub fn tick(&self) -> u64 {
        let now = self.now_ns();
        let previous = self.last_sample.swap(now, Ordering::AcqRel);
        let cycle = now.saturating_sub(previous);
        self.last_cycle.store(cycle, Ordering::Release);
        self.ticks.fetch_add(1, Ordering::Relaxed);
        cycle
    }

    /// Most recent cycle duration in nanoseconds (0 before the first tick)
    pub fn cycle_duration(&self) -> u64 {
        self.last_cycle.load(Ordering::Acquire)
    }

    /// Nanoseconds since construction of the most recent tick
    pub fn last_sample(&self) -> u64 {
        self.last_sample.load(Ordering::Acquire)
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_cycle_duration_zero_before_tick() {
        let tracker = CpuCycleTracker::new();
        assert_eq!(tracker.cycle_duration(), 0);
        assert_eq!(tracker.ticks(), 0);
    }

    #[test]
    fn test_first_tick_measures_from_construction() {
        let tracker = CpuCycleTracker::new();
        thread::sleep(Duration::from_millis(10));
        let cycle = tracker.tick();
        assert!(cycle >= 10_000_000, "cycle {} shorter than sleep", cycle);
        assert_eq!(tracker.cycle_duration(), cycle);
        assert_eq!(tracker.last_sample(), cycle);
    }

    #[test]
    fn test_successive_ticks_measure_gap() {
        let tracker = CpuCycleTracker::new();
        thread::sleep(Duration::from_millis(30));
        tracker.tick();
        thread::sleep(Duration::from_millis(2));
        let second = tracker.tick();
        assert!(second >= 2_000_000);
        assert!(second < 30_000_000);
        assert_eq!(tracker.ticks(), 2);
    }

    #[test]
    fn test_concurrent_ticks_are_counted() {
        let tracker = Arc::new(CpuCycleTracker::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let tracker = Arc::clone(&tracker);
                thread::spawn(move || {
                    for _ in 0..100 {
                        tracker.tick();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(tracker.ticks(), 400);
        assert!(tracker.cycle_duration() < 1_000_000_000);
    }
}
