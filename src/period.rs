//! Measured `[start, end)` window in nanoseconds
//!
//! Both bounds are atomics: the sampler thread moves the end of a thread-level
//! period while the owning thread may read it during finalize.

use std::sync::atomic::{AtomicU64, Ordering};

const UNSET: u64 = u64::MAX;

/// A CPU-time or user-time window
#[derive(Debug)]
pub struct Period {
    start: AtomicU64,
    end: AtomicU64,
}

impl Default for Period {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Period {
    fn clone(&self) -> Self {
        Self {
            start: AtomicU64::new(self.start.load(Ordering::Acquire)),
            end: AtomicU64::new(self.end.load(Ordering::Acquire)),
        }
    }
}

impl Period {
    /// Period with neither bound set
    pub fn new() -> Self {
        Self {
            start: AtomicU64::new(UNSET),
            end: AtomicU64::new(UNSET),
        }
    }

    /// Open period starting at `start`
    pub fn starting_at(start: u64) -> Self {
        let period = Self::new();
        period.set_start(start);
        period
    }

    /// Closed period; `end` is clamped so that `end >= start`
    pub fn closed(start: u64, end: u64) -> Self {
        let period = Self::starting_at(start);
        period.set_end(end);
        period
    }

    pub fn start(&self) -> Option<u64> {
        match self.start.load(Ordering::Acquire) {
            UNSET => None,
            v => Some(v),
        }
    }

    pub fn end(&self) -> Option<u64> {
        match self.end.load(Ordering::Acquire) {
            UNSET => None,
            v => Some(v),
        }
    }

    pub fn set_start(&self, start: u64) {
        self.start.store(start.min(UNSET - 1), Ordering::Release);
    }

    /// Close (or move the end of) the window
    ///
    /// Counters are cumulative, so an end below the start is clamped to the
    /// start rather than producing a negative window.
    pub fn set_end(&self, end: u64) {
        let end = match self.start() {
            Some(start) => end.max(start),
            None => end,
        };
        self.end.store(end.min(UNSET - 1), Ordering::Release);
    }

    /// Feed a cumulative counter reading: the first reading opens the window,
    /// every reading moves its end
    pub fn observe(&self, reading: u64) {
        let reading = reading.min(UNSET - 1);
        let _ = self
            .start
            .compare_exchange(UNSET, reading, Ordering::AcqRel, Ordering::Acquire);
        self.set_end(reading);
    }

    /// `end - start`, or `None` while the window is open or unset
    pub fn time(&self) -> Option<u64> {
        match (self.start(), self.end()) {
            (Some(start), Some(end)) => Some(end.saturating_sub(start)),
            _ => None,
        }
    }

    /// [`time`](Self::time) with open windows counted as zero
    pub fn time_or_zero(&self) -> u64 {
        self.time().unwrap_or(0)
    }
}
