//! One call-stack frame
//!
//! Invocations live in an arena owned by their thread's profile and are
//! addressed by [`InvocationId`]. The caller link is an id into the same
//! arena, never an owning pointer.

use crate::period::Period;
use crate::thread_clock::{ThreadTimes, Tid};
use crate::timer::{Timer, TimerState};
use std::fmt;
use std::sync::Arc;

/// Index of an invocation in its thread's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InvocationId(pub usize);

impl fmt::Display for InvocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Token returned by `enter_method` and handed back to `exit_method`
///
/// `session` identifies the profile the invocation was recorded in; arena
/// ids restart at zero when a thread id starts a new session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InvocationHandle {
    pub tid: Tid,
    pub session: u64,
    pub id: InvocationId,
}

/// A single execution of a method on one thread
#[derive(Debug)]
pub struct MethodInvocation {
    pub(crate) id: InvocationId,
    /// `declaringType.methodName`
    pub(crate) method: Arc<str>,
    pub(crate) tid: Tid,
    pub(crate) caller: Option<InvocationId>,
    pub(crate) timer: Timer,
    pub(crate) cpu: Period,
    pub(crate) user: Period,
    /// Attributed power, set once by the owning thread's finalize pass
    pub(crate) power: Option<f64>,
}

impl MethodInvocation {
    pub(crate) fn new(
        id: InvocationId,
        method: Arc<str>,
        tid: Tid,
        caller: Option<InvocationId>,
    ) -> Self {
        Self {
            id,
            method,
            tid,
            caller,
            timer: Timer::new(),
            cpu: Period::new(),
            user: Period::new(),
            power: None,
        }
    }

    /// Open the CPU/user windows from an entry reading
    pub(crate) fn open_periods(&self, times: ThreadTimes) {
        self.cpu.set_start(times.cpu_ns);
        self.user.set_start(times.user_ns);
    }

    /// Close the CPU/user windows from an exit reading
    pub(crate) fn close_periods(&self, times: ThreadTimes) {
        if self.cpu.start().is_some() {
            self.cpu.set_end(times.cpu_ns);
        }
        if self.user.start().is_some() {
            self.user.set_end(times.user_ns);
        }
    }

    pub fn id(&self) -> InvocationId {
        self.id
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn tid(&self) -> Tid {
        self.tid
    }

    pub fn caller(&self) -> Option<InvocationId> {
        self.caller
    }

    /// Wall time excluding the time its direct children were running
    pub fn wall_ns(&self) -> u64 {
        self.timer.elapsed()
    }

    /// CPU time between entry and exit; zero when either reading failed
    pub fn cpu_ns(&self) -> u64 {
        self.cpu.time_or_zero()
    }

    pub fn user_ns(&self) -> u64 {
        self.user.time_or_zero()
    }

    pub fn power(&self) -> Option<f64> {
        self.power
    }

    pub fn snapshot(&self) -> InvocationSnapshot {
        InvocationSnapshot {
            id: self.id,
            method: self.method.to_string(),
            tid: self.tid,
            caller: self.caller,
            timer_state: self.timer.state(),
            wall_ns: self.wall_ns(),
            cpu_ns: self.cpu.time(),
            user_ns: self.user.time(),
            power: self.power,
        }
    }
}

/// Copy of an invocation's observable state
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationSnapshot {
    pub id: InvocationId,
    pub method: String,
    pub tid: Tid,
    pub caller: Option<InvocationId>,
    pub timer_state: TimerState,
    pub wall_ns: u64,
    /// `None` while the window is open or the clock was unavailable
    pub cpu_ns: Option<u64>,
    pub user_ns: Option<u64>,
    pub power: Option<f64>,
}
