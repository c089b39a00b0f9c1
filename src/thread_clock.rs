//! Per-thread cumulative CPU and user time
//!
//! The engine never reads OS counters directly; it goes through a
//! [`ThreadClock`]. [`OsThreadClock`] reads the kernel's per-thread counters,
//! [`ManualThreadClock`] is driven by hand for tests and benchmarks.

use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;

/// Thread identifier as supplied by the instrumentation boundary
pub type Tid = u64;

/// Cumulative time a thread has spent on a CPU, in nanoseconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThreadTimes {
    /// User + system time
    pub cpu_ns: u64,
    /// User-mode time only
    pub user_ns: u64,
}

impl ThreadTimes {
    pub fn new(cpu_ns: u64, user_ns: u64) -> Self {
        Self { cpu_ns, user_ns }
    }
}

/// Failure to read a thread's counters
#[derive(Error, Debug)]
pub enum ClockError {
    #[error("thread {tid} no longer exists")]
    ThreadExited { tid: Tid },

    #[error("CPU time unavailable for thread {tid}: {reason}")]
    Unavailable { tid: Tid, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Source of per-thread CPU/user time
pub trait ThreadClock: Send + Sync {
    /// Cumulative CPU and user time of `tid`
    fn times(&self, tid: Tid) -> Result<ThreadTimes, ClockError>;

    /// Identifier of the calling thread, in this clock's id space
    fn current_tid(&self) -> Tid {
        current_os_tid()
    }
}

/// Kernel thread id of the calling thread
#[cfg(target_os = "linux")]
pub fn current_os_tid() -> Tid {
    nix::unistd::gettid().as_raw() as Tid
}

#[cfg(not(target_os = "linux"))]
pub fn current_os_tid() -> Tid {
    use std::sync::atomic::{AtomicU64, Ordering};
    static NEXT: AtomicU64 = AtomicU64::new(1);
    thread_local! {
        static TID: Tid = NEXT.fetch_add(1, Ordering::Relaxed);
    }
    TID.with(|tid| *tid)
}

/// Reads counters from the operating system
///
/// The calling thread is served by `clock_gettime(CLOCK_THREAD_CPUTIME_ID)`
/// and `getrusage(RUSAGE_THREAD)`; other threads of this process are read
/// from `/proc/self/task/<tid>/stat`, at clock-tick resolution.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsThreadClock;

impl OsThreadClock {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(target_os = "linux")]
impl OsThreadClock {
    fn current_thread_times(&self, tid: Tid) -> Result<ThreadTimes, ClockError> {
        use nix::sys::resource::{getrusage, UsageWho};
        use nix::time::{clock_gettime, ClockId};

        let unavailable = |e: nix::Error| ClockError::Unavailable {
            tid,
            reason: e.to_string(),
        };

        let cpu = clock_gettime(ClockId::CLOCK_THREAD_CPUTIME_ID).map_err(unavailable)?;
        let usage = getrusage(UsageWho::RUSAGE_THREAD).map_err(unavailable)?;
        let user = usage.user_time();

        let cpu_ns = cpu.tv_sec() as u64 * 1_000_000_000 + cpu.tv_nsec() as u64;
        let user_ns = user.tv_sec() as u64 * 1_000_000_000 + user.tv_usec() as u64 * 1_000;
        Ok(ThreadTimes::new(cpu_ns, user_ns.min(cpu_ns)))
    }

    fn procfs_times(&self, tid: Tid) -> Result<ThreadTimes, ClockError> {
        let path = format!("/proc/self/task/{}/stat", tid);
        let stat = match std::fs::read_to_string(&path) {
            Ok(stat) => stat,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ClockError::ThreadExited { tid });
            }
            Err(e) => return Err(ClockError::Io(e)),
        };
        let (utime, stime) = parse_stat_ticks(&stat).ok_or_else(|| ClockError::Unavailable {
            tid,
            reason: format!("malformed {}", path),
        })?;

        let ns_per_tick = ns_per_clock_tick();
        Ok(ThreadTimes::new(
            (utime + stime).saturating_mul(ns_per_tick),
            utime.saturating_mul(ns_per_tick),
        ))
    }
}

#[cfg(target_os = "linux")]
fn ns_per_clock_tick() -> u64 {
    // SAFETY: sysconf has no preconditions
    let ticks = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
    if ticks > 0 {
        1_000_000_000 / ticks as u64
    } else {
        10_000_000
    }
}

impl ThreadClock for OsThreadClock {
    #[cfg(target_os = "linux")]
    fn times(&self, tid: Tid) -> Result<ThreadTimes, ClockError> {
        if tid == current_os_tid() {
            self.current_thread_times(tid)
        } else {
            self.procfs_times(tid)
        }
    }

    #[cfg(not(target_os = "linux"))]
    fn times(&self, tid: Tid) -> Result<ThreadTimes, ClockError> {
        Err(ClockError::Unavailable {
            tid,
            reason: "per-thread CPU time is only supported on Linux".to_string(),
        })
    }
}

/// Extract `(utime, stime)` in clock ticks from a `/proc/<pid>/stat` line
///
/// The command name is parenthesized and may itself contain spaces or
/// parentheses, so fields are counted from the last `)`.
pub fn parse_stat_ticks(stat: &str) -> Option<(u64, u64)> {
    let rest = &stat[stat.rfind(')')? + 1..];
    let mut fields = rest.split_whitespace();
    // Fields after the command start at `state` (field 3); utime is field 14
    let utime = fields.nth(11)?.parse().ok()?;
    let stime = fields.next()?.parse().ok()?;
    Some((utime, stime))
}

/// Hand-driven clock
///
/// Threads that were never [`set`](Self::set) report
/// [`ClockError::Unavailable`]; [`remove`](Self::remove)d threads report
/// [`ClockError::ThreadExited`].
#[derive(Debug, Default)]
pub struct ManualThreadClock {
    threads: RwLock<HashMap<Tid, Option<ThreadTimes>>>,
}

impl ManualThreadClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, tid: Tid, times: ThreadTimes) {
        self.threads
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(tid, Some(times));
    }

    /// Add to a thread's counters, registering it at zero if unknown
    pub fn advance(&self, tid: Tid, cpu_ns: u64, user_ns: u64) {
        let mut threads = self.threads.write().unwrap_or_else(|e| e.into_inner());
        let entry = threads.entry(tid).or_insert(Some(ThreadTimes::default()));
        let times = entry.get_or_insert_with(ThreadTimes::default);
        times.cpu_ns += cpu_ns;
        times.user_ns += user_ns;
    }

    /// Mark a thread as exited
    pub fn remove(&self, tid: Tid) {
        self.threads
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(tid, None);
    }
}

impl ThreadClock for ManualThreadClock {
    fn times(&self, tid: Tid) -> Result<ThreadTimes, ClockError> {
        match self
            .threads
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&tid)
        {
            Some(Some(times)) => Ok(*times),
            Some(None) => Err(ClockError::ThreadExited { tid }),
            None => Err(ClockError::Unavailable {
                tid,
                reason: "no counters recorded".to_string(),
            }),
        }
    }
}
