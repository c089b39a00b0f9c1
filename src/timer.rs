//! Stopwatch with suspend/resume for invocation wall time
//!
//! A timer moves through `unstarted -> running -> {suspended <-> running} -> stopped`.
//! Elapsed time never includes suspended intervals: `resume()` shifts the start
//! reference forward by the paused duration. Illegal transitions return
//! [`TimerError::InvalidState`] carrying the attempted operation and the
//! current state.

use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Running state of a [`Timer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Unstarted,
    Running,
    Suspended,
    Stopped,
}

impl fmt::Display for TimerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TimerState::Unstarted => "unstarted",
            TimerState::Running => "running",
            TimerState::Suspended => "suspended",
            TimerState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Operation attempted on a [`Timer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerOperation {
    Start,
    Stop,
    Suspend,
    Resume,
    Split,
    Unsplit,
    SplitTime,
}

impl fmt::Display for TimerOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TimerOperation::Start => "start",
            TimerOperation::Stop => "stop",
            TimerOperation::Suspend => "suspend",
            TimerOperation::Resume => "resume",
            TimerOperation::Split => "split",
            TimerOperation::Unsplit => "unsplit",
            TimerOperation::SplitTime => "split_time",
        };
        f.write_str(name)
    }
}

/// Timer contract violation
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerError {
    #[error("cannot {operation} a timer that is {state}")]
    InvalidState {
        operation: TimerOperation,
        state: TimerState,
    },
}

/// Nanosecond stopwatch
#[derive(Debug, Clone)]
pub struct Timer {
    state: TimerState,
    /// Start reference, shifted forward on every resume
    start: Option<Instant>,
    /// Pause boundary while suspended, end instant once stopped
    stop: Option<Instant>,
    /// Split marker (independent of the running state)
    split: Option<Instant>,
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer {
    /// Create an unstarted timer
    pub fn new() -> Self {
        Self {
            state: TimerState::Unstarted,
            start: None,
            stop: None,
            split: None,
        }
    }

    /// Create a timer that is already running
    pub fn started() -> Self {
        let mut timer = Self::new();
        timer.begin(Instant::now());
        timer
    }

    pub fn state(&self) -> TimerState {
        self.state
    }

    fn invalid(&self, operation: TimerOperation) -> TimerError {
        TimerError::InvalidState {
            operation,
            state: self.state,
        }
    }

    fn begin(&mut self, now: Instant) {
        self.start = Some(now);
        self.stop = None;
        self.split = None;
        self.state = TimerState::Running;
    }

    /// Start an unstarted timer
    ///
    /// A stopped timer must be [`reset`](Self::reset) or
    /// [`restart`](Self::restart)ed first.
    pub fn start(&mut self) -> Result<(), TimerError> {
        if self.state != TimerState::Unstarted {
            return Err(self.invalid(TimerOperation::Start));
        }
        self.begin(Instant::now());
        Ok(())
    }

    /// Discard all elapsed time and run again from now
    pub fn restart(&mut self) {
        self.begin(Instant::now());
    }

    /// Return to the unstarted state
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Stop a running or suspended timer
    ///
    /// Stopping while suspended keeps the suspend boundary as the end time.
    pub fn stop(&mut self) -> Result<(), TimerError> {
        match self.state {
            TimerState::Running => {
                self.stop = Some(Instant::now());
            }
            TimerState::Suspended => {}
            _ => return Err(self.invalid(TimerOperation::Stop)),
        }
        self.state = TimerState::Stopped;
        Ok(())
    }

    /// Pause a running timer
    pub fn suspend(&mut self) -> Result<(), TimerError> {
        if self.state != TimerState::Running {
            return Err(self.invalid(TimerOperation::Suspend));
        }
        self.stop = Some(Instant::now());
        self.state = TimerState::Suspended;
        Ok(())
    }

    /// Continue a suspended timer; the paused interval is excluded from
    /// [`elapsed`](Self::elapsed)
    pub fn resume(&mut self) -> Result<(), TimerError> {
        if self.state != TimerState::Suspended {
            return Err(self.invalid(TimerOperation::Resume));
        }
        let now = Instant::now();
        if let (Some(start), Some(paused_at)) = (self.start, self.stop.take()) {
            self.start = Some(start + now.saturating_duration_since(paused_at));
        }
        self.state = TimerState::Running;
        Ok(())
    }

    /// Record a split point while running
    pub fn split(&mut self) -> Result<(), TimerError> {
        if self.state != TimerState::Running {
            return Err(self.invalid(TimerOperation::Split));
        }
        self.split = Some(Instant::now());
        Ok(())
    }

    /// Clear a previously recorded split point
    pub fn unsplit(&mut self) -> Result<(), TimerError> {
        if self.split.take().is_none() {
            return Err(self.invalid(TimerOperation::Unsplit));
        }
        Ok(())
    }

    /// Nanoseconds from start to the split point
    pub fn split_time(&self) -> Result<u64, TimerError> {
        match (self.start, self.split) {
            (Some(start), Some(split)) => Ok(nanos(split.saturating_duration_since(start))),
            _ => Err(self.invalid(TimerOperation::SplitTime)),
        }
    }

    /// Elapsed nanoseconds excluding suspended intervals
    ///
    /// Zero while unstarted, live while running, frozen when suspended or
    /// stopped.
    pub fn elapsed(&self) -> u64 {
        match (self.state, self.start) {
            (TimerState::Unstarted, _) | (_, None) => 0,
            (TimerState::Running, Some(start)) => nanos(start.elapsed()),
            (TimerState::Suspended | TimerState::Stopped, Some(start)) => self
                .stop
                .map(|end| nanos(end.saturating_duration_since(start)))
                .unwrap_or(0),
        }
    }

    pub fn millis(&self) -> u64 {
        self.elapsed() / 1_000_000
    }

    pub fn seconds(&self) -> u64 {
        self.elapsed() / 1_000_000_000
    }
}

fn nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

/// Human-readable rendering of a nanosecond duration
pub fn format_nanos(time: u64) -> String {
    if time > 1_000_000 {
        let millis = time / 1_000_000;
        let mut secs = time / 1_000_000_000;
        let hours = secs / 3600;
        secs -= hours * 3600;
        let minutes = secs / 60;
        secs -= minutes * 60;
        format!(
            "{} hour(s) {} minute(s) {} second(s) {} millis",
            hours,
            minutes,
            secs,
            millis % 1000
        )
    } else {
        format!("{} nanosecond(s)", time)
    }
}

impl fmt::Display for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_nanos(self.elapsed()))
    }
}
