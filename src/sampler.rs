//! Periodic per-thread sampler
//!
//! One sampler thread runs per monitored thread. Each iteration ticks the
//! profile's cycle tracker, reads the thread's cumulative CPU/user time and
//! moves the end of the thread-level periods. Between iterations it waits on
//! a cancellation channel with a timeout, so cancelling wakes it at once.
//!
//! ```text
//! loop {
//!     if !active { break }
//!     cycle.tick()
//!     times = clock.times(tid)   // failure -> mark inactive, stop
//!     cpu.observe(times.cpu); user.observe(times.user)
//!     cancel_rx.recv_timeout(interval)   // disconnect -> stop
//! }
//! ```

use crate::thread_clock::{ClockError, ThreadClock, ThreadTimes};
use crate::thread_profile::ThreadProfile;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Why a sampler loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerExit {
    /// The owner cancelled it
    Cancelled,
    /// The profile went inactive or was dropped
    Deactivated,
    /// The thread's counters could not be read
    ClockFailed,
}

/// Handle to a running sampler thread
#[derive(Debug)]
pub struct Sampler {
    cancel_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<SamplerExit>>,
}

impl Sampler {
    /// Spawn a sampler for `profile`
    ///
    /// The sampler holds only a weak reference; dropping the last strong
    /// reference to the profile ends the loop.
    pub fn spawn(
        profile: &Arc<ThreadProfile>,
        clock: Arc<dyn ThreadClock>,
        interval: Duration,
    ) -> std::io::Result<Self> {
        let (cancel_tx, cancel_rx) = channel::bounded::<()>(0);
        let weak = Arc::downgrade(profile);
        let handle = thread::Builder::new()
            .name(format!("jouler-sampler-{}", profile.tid()))
            .spawn(move || run(weak, clock.as_ref(), interval, cancel_rx))?;

        Ok(Self {
            cancel_tx: Some(cancel_tx),
            handle: Some(handle),
        })
    }

    /// Ask the loop to stop; idempotent
    pub fn cancel(&mut self) {
        self.cancel_tx.take();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_tx.is_none()
    }

    /// Cancel and wait for the loop to exit
    pub fn join(mut self) -> Option<SamplerExit> {
        self.cancel();
        self.handle.take().and_then(|handle| handle.join().ok())
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        // Never join here: the last profile reference may be released on the
        // sampler thread itself
        self.cancel();
    }
}

/// One sampler iteration against `profile`
pub fn sample_once(
    profile: &ThreadProfile,
    clock: &dyn ThreadClock,
) -> Result<ThreadTimes, ClockError> {
    profile.cycle_tracker().tick();
    let times = clock.times(profile.tid())?;
    profile.observe(times);
    Ok(times)
}

fn run(
    profile: Weak<ThreadProfile>,
    clock: &dyn ThreadClock,
    interval: Duration,
    cancel_rx: Receiver<()>,
) -> SamplerExit {
    let mut iterations = 0u64;
    loop {
        {
            let Some(profile) = profile.upgrade() else {
                return SamplerExit::Deactivated;
            };
            if !profile.is_active() {
                tracing::debug!(tid = profile.tid(), iterations, "sampler stopping: profile inactive");
                return SamplerExit::Deactivated;
            }

            match sample_once(&profile, clock) {
                Ok(times) => {
                    tracing::trace!(
                        tid = profile.tid(),
                        cpu_ns = times.cpu_ns,
                        user_ns = times.user_ns,
                        cycle_ns = profile.cycle_tracker().cycle_duration(),
                        "sample"
                    );
                }
                Err(e) => {
                    tracing::warn!(tid = profile.tid(), error = %e, "sampler stopping: {}", e);
                    profile.deactivate();
                    return SamplerExit::ClockFailed;
                }
            }
            iterations += 1;
        }

        match cancel_rx.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => continue,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => return SamplerExit::Cancelled,
        }
    }
}
