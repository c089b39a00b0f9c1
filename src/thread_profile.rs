//! One monitored thread: call stack, invocation arena, thread-level times
//!
//! The call stack, arena and name index are mutated only by the owning
//! thread (through the engine) and read by finalize. The sampler touches
//! nothing but the atomic thread-level periods, the cycle tracker and the
//! `active` flag.

use crate::cycle_tracker::CpuCycleTracker;
use crate::error::{ProfilerError, Result};
use crate::invocation::{InvocationId, InvocationSnapshot, MethodInvocation};
use crate::period::Period;
use crate::report::ThreadReport;
use crate::sampler::Sampler;
use crate::statistics::{
    attribute_power, fold_method, power_share, sorted_by_total_time, thread_power,
    MethodStatistics,
};
use crate::thread_clock::{ThreadTimes, Tid};
use crate::timer::{Timer, TimerState};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

/// Outcome of popping a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Popped {
    /// A caller is still on the stack
    Nested { caller: InvocationId },
    /// The outermost frame completed; the thread must be finalized
    Root,
}

#[derive(Debug)]
struct CallState {
    /// Most recent last
    stack: Vec<InvocationId>,
    arena: Vec<MethodInvocation>,
    /// Method name -> every invocation recorded under it
    index: HashMap<Arc<str>, Vec<InvocationId>>,
    timer: Timer,
}

impl CallState {
    /// Per-name aggregates, folded through the name index
    fn fold(&self, tid: Tid) -> HashMap<String, MethodStatistics> {
        self.index
            .iter()
            .map(|(name, ids)| {
                let stats = fold_method(tid, name, ids.iter().map(|id| &self.arena[id.0]));
                (name.to_string(), stats)
            })
            .collect()
    }
}

/// Profile of a single thread
#[derive(Debug)]
pub struct ThreadProfile {
    tid: Tid,
    /// Distinguishes successive profiles of the same thread id
    session: u64,
    cycle: CpuCycleTracker,
    cpu: Period,
    user: Period,
    active: AtomicBool,
    aborted: AtomicBool,
    finalized: AtomicBool,
    power: OnceLock<f64>,
    report: OnceLock<ThreadReport>,
    state: Mutex<CallState>,
    sampler: Mutex<Option<Sampler>>,
}

impl ThreadProfile {
    /// Create an active profile whose thread timer is already running
    pub fn new(tid: Tid, session: u64) -> Self {
        Self {
            tid,
            session,
            cycle: CpuCycleTracker::new(),
            cpu: Period::new(),
            user: Period::new(),
            active: AtomicBool::new(true),
            aborted: AtomicBool::new(false),
            finalized: AtomicBool::new(false),
            power: OnceLock::new(),
            report: OnceLock::new(),
            state: Mutex::new(CallState {
                stack: Vec::new(),
                arena: Vec::new(),
                index: HashMap::new(),
                timer: Timer::started(),
            }),
            sampler: Mutex::new(None),
        }
    }

    fn state(&self) -> MutexGuard<'_, CallState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn tid(&self) -> Tid {
        self.tid
    }

    pub fn session(&self) -> u64 {
        self.session
    }

    pub fn cycle_tracker(&self) -> &CpuCycleTracker {
        &self.cycle
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized.load(Ordering::Acquire)
    }

    /// Thread power, available once finalized
    pub fn power(&self) -> Option<f64> {
        self.power.get().copied()
    }

    pub fn report(&self) -> Option<&ThreadReport> {
        self.report.get()
    }

    /// Thread-level CPU time observed so far (0 if never read)
    pub fn cpu_time_ns(&self) -> u64 {
        self.cpu.time_or_zero()
    }

    pub fn user_time_ns(&self) -> u64 {
        self.user.time_or_zero()
    }

    pub fn stack_depth(&self) -> usize {
        self.state().stack.len()
    }

    pub fn invocation_count(&self) -> usize {
        self.state().arena.len()
    }

    pub fn invocation(&self, id: InvocationId) -> Option<InvocationSnapshot> {
        self.state().arena.get(id.0).map(MethodInvocation::snapshot)
    }

    /// Feed a cumulative counter reading into the thread-level periods
    pub(crate) fn observe(&self, times: ThreadTimes) {
        self.cpu.observe(times.cpu_ns);
        self.user.observe(times.user_ns);
    }

    pub(crate) fn attach_sampler(&self, sampler: Sampler) {
        *self.sampler.lock().unwrap_or_else(|e| e.into_inner()) = Some(sampler);
    }

    /// Mark inactive without cancelling the sampler (used by the sampler
    /// itself when the thread disappears)
    pub(crate) fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }

    /// Stop the periodic sampler; idempotent
    pub fn stop(&self) {
        self.deactivate();
        if let Some(sampler) = self
            .sampler
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_mut()
        {
            sampler.cancel();
        }
    }

    /// Stop the sampler and wait for its thread to exit
    pub(crate) fn stop_and_join(&self) {
        self.stop();
        let sampler = self.sampler.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(sampler) = sampler {
            sampler.join();
        }
    }

    /// Retire the profile after a contract violation
    pub(crate) fn abort(&self) {
        self.aborted.store(true, Ordering::Release);
        self.stop();
    }

    fn ensure_usable(&self) -> Result<()> {
        if self.is_aborted() {
            return Err(ProfilerError::ProfileAborted(self.tid));
        }
        Ok(())
    }

    /// Push a new frame for `method`
    ///
    /// The caller's timer is suspended so that wall time is attributed only
    /// to the innermost running frame.
    pub(crate) fn push(&self, method: &str, entry: Option<ThreadTimes>) -> Result<InvocationId> {
        self.ensure_usable()?;
        let mut state = self.state();
        let state = &mut *state;

        let caller = state.stack.last().copied();
        if let Some(caller) = caller {
            state.arena[caller.0].timer.suspend()?;
        }

        let name = match state.index.get_key_value(method) {
            Some((key, _)) => Arc::clone(key),
            None => Arc::from(method),
        };
        let id = InvocationId(state.arena.len());
        let mut invocation = MethodInvocation::new(id, Arc::clone(&name), self.tid, caller);
        invocation.timer.start()?;
        if let Some(times) = entry {
            invocation.open_periods(times);
        }

        state.arena.push(invocation);
        state.stack.push(id);
        state.index.entry(name).or_default().push(id);
        Ok(id)
    }

    /// Pop `id`, which must be on top of the stack
    pub(crate) fn pop(&self, id: InvocationId, exit: Option<ThreadTimes>) -> Result<Popped> {
        self.ensure_usable()?;
        let mut state = self.state();

        let top = state.stack.last().copied();
        if top != Some(id) {
            return Err(ProfilerError::StackMismatch {
                tid: self.tid,
                expected: top.map(|t| t.0),
                found: id.0,
            });
        }

        let invocation = &mut state.arena[id.0];
        invocation.timer.stop()?;
        if let Some(times) = exit {
            invocation.close_periods(times);
        }
        let caller = invocation.caller;
        state.stack.pop();

        match caller {
            Some(caller) => {
                state.arena[caller.0].timer.resume()?;
                Ok(Popped::Nested { caller })
            }
            None => Ok(Popped::Root),
        }
    }

    /// Per-method aggregates with power attributed from the current thread
    /// power (zero before finalize)
    pub fn method_statistics(&self) -> HashMap<String, MethodStatistics> {
        let mut stats = self.state().fold(self.tid);
        attribute_power(&mut stats, self.power().unwrap_or(0.0));
        stats
    }

    /// Close the thread's books: stop its timer and sampler, compute thread
    /// power, attribute it to every invocation and build the report
    ///
    /// Runs at most once; later calls return the stored report.
    pub(crate) fn finalize(
        &self,
        power_rating: f64,
        last: Option<ThreadTimes>,
    ) -> Result<ThreadReport> {
        self.ensure_usable()?;
        if self.finalized.swap(true, Ordering::AcqRel) {
            if let Some(report) = self.report.get() {
                return Ok(report.clone());
            }
        }

        // No sampler iteration may observe after the final reading
        self.stop_and_join();
        if let Some(times) = last {
            self.observe(times);
        }

        let mut state = self.state();
        if state.timer.state() == TimerState::Running {
            state.timer.stop()?;
        }

        let cycle_ns = self.cycle.cycle_duration();
        let thread_cpu_ns = self.cpu.time_or_zero();
        let power = thread_power(power_rating, thread_cpu_ns, cycle_ns);
        let power = *self.power.get_or_init(|| power);

        let mut stats = state.fold(self.tid);
        let total_method_cpu_ns = attribute_power(&mut stats, power);
        for invocation in state.arena.iter_mut() {
            invocation.power = Some(power_share(invocation.cpu_ns(), total_method_cpu_ns, power));
        }

        let report = ThreadReport {
            tid: self.tid,
            cycle_duration_ns: cycle_ns,
            total_time_ns: state.timer.elapsed(),
            cpu_time_ns: thread_cpu_ns,
            user_time_ns: self.user.time_or_zero(),
            power,
            total_method_cpu_ns,
            methods: sorted_by_total_time(&stats),
        };
        drop(state);

        Ok(self.report.get_or_init(|| report).clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_push_links_caller_and_suspends_it() {
        let profile = ThreadProfile::new(1, 1);
        let f = profile.push("A.f", None).unwrap();
        let g = profile.push("A.g", None).unwrap();

        let g_snap = profile.invocation(g).unwrap();
        assert_eq!(g_snap.caller, Some(f));
        assert_eq!(g_snap.timer_state, TimerState::Running);
        assert_eq!(
            profile.invocation(f).unwrap().timer_state,
            TimerState::Suspended
        );
        assert_eq!(profile.stack_depth(), 2);
    }

    #[test]
    fn test_pop_resumes_caller() {
        let profile = ThreadProfile::new(1, 1);
        let f = profile.push("A.f", None).unwrap();
        let g = profile.push("A.g", None).unwrap();

        assert_eq!(profile.pop(g, None).unwrap(), Popped::Nested { caller: f });
        assert_eq!(
            profile.invocation(f).unwrap().timer_state,
            TimerState::Running
        );
        assert_eq!(profile.pop(f, None).unwrap(), Popped::Root);
        assert_eq!(profile.stack_depth(), 0);
    }

    #[test]
    fn test_pop_not_on_top_is_mismatch() {
        let profile = ThreadProfile::new(4, 1);
        let f = profile.push("A.f", None).unwrap();
        let g = profile.push("A.g", None).unwrap();

        match profile.pop(f, None) {
            Err(ProfilerError::StackMismatch {
                tid,
                expected,
                found,
            }) => {
                assert_eq!(tid, 4);
                assert_eq!(expected, Some(g.0));
                assert_eq!(found, f.0);
            }
            other => panic!("expected stack mismatch, got {:?}", other),
        }
        // Stack untouched by a rejected pop
        assert_eq!(profile.stack_depth(), 2);
    }

    #[test]
    fn test_pop_on_empty_stack_is_mismatch() {
        let profile = ThreadProfile::new(1, 1);
        assert!(matches!(
            profile.pop(InvocationId(0), None),
            Err(ProfilerError::StackMismatch { expected: None, .. })
        ));
    }

    #[test]
    fn test_index_groups_by_name() {
        let profile = ThreadProfile::new(1, 1);
        profile.push("A.main", None).unwrap();
        for _ in 0..3 {
            let id = profile.push("A.step", None).unwrap();
            profile.pop(id, None).unwrap();
        }
        let stats = profile.method_statistics();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats["A.step"].count, 3);
        assert_eq!(stats["A.main"].count, 1);
        assert!(!stats.contains_key("A.missing"));
        assert_eq!(profile.invocation_count(), 4);
    }

    #[test]
    fn test_aborted_profile_rejects_calls() {
        let profile = ThreadProfile::new(2, 1);
        profile.push("A.f", None).unwrap();
        profile.abort();
        assert!(profile.is_aborted());
        assert!(!profile.is_active());
        assert!(matches!(
            profile.push("A.g", None),
            Err(ProfilerError::ProfileAborted(2))
        ));
        assert!(matches!(
            profile.finalize(10.0, None),
            Err(ProfilerError::ProfileAborted(2))
        ));
    }

    #[test]
    fn test_stop_is_idempotent() {
        let profile = ThreadProfile::new(1, 1);
        profile.stop();
        profile.stop();
        assert!(!profile.is_active());
        assert!(!profile.is_aborted());
    }

    #[test]
    fn test_finalize_without_cycle_yields_zero_power() {
        let profile = ThreadProfile::new(1, 1);
        profile.observe(ThreadTimes::new(0, 0));
        let f = profile.push("A.f", Some(ThreadTimes::new(0, 0))).unwrap();
        profile.pop(f, Some(ThreadTimes::new(500, 200))).unwrap();

        let report = profile.finalize(10.0, Some(ThreadTimes::new(600, 250))).unwrap();
        assert_eq!(report.cycle_duration_ns, 0);
        assert_eq!(report.power, 0.0);
        assert_eq!(report.cpu_time_ns, 600);
        assert_eq!(report.total_method_cpu_ns, 500);
        assert_eq!(profile.power(), Some(0.0));
        assert_eq!(profile.invocation(f).unwrap().power, Some(0.0));
    }

    #[test]
    fn test_finalize_attributes_per_invocation() {
        let profile = ThreadProfile::new(1, 1);
        std::thread::sleep(Duration::from_millis(1));
        profile.cycle_tracker().tick();
        profile.observe(ThreadTimes::new(0, 0));

        let f = profile.push("A.f", Some(ThreadTimes::new(0, 0))).unwrap();
        let g = profile.push("A.g", Some(ThreadTimes::new(100, 0))).unwrap();
        profile.pop(g, Some(ThreadTimes::new(400, 0))).unwrap();
        profile.pop(f, Some(ThreadTimes::new(500, 0))).unwrap();

        let report = profile.finalize(10.0, Some(ThreadTimes::new(500, 0))).unwrap();
        assert!(!profile.is_active());
        // f: 500, g: 300
        assert_eq!(report.total_method_cpu_ns, 800);

        let f_power = profile.invocation(f).unwrap().power.unwrap();
        let g_power = profile.invocation(g).unwrap().power.unwrap();
        assert!((f_power + g_power - report.power).abs() < 1e-9 * report.power.max(1.0));
        assert!((f_power / report.power - 500.0 / 800.0).abs() < 1e-9);
    }

    #[test]
    fn test_finalize_reading_is_not_overwritten_by_sampler() {
        use crate::thread_clock::ManualThreadClock;

        // The sampler keeps reporting an older counter than the final reading
        let clock = Arc::new(ManualThreadClock::new());
        clock.set(6, ThreadTimes::new(1_000, 0));
        let profile = Arc::new(ThreadProfile::new(6, 1));
        profile.observe(ThreadTimes::new(0, 0));
        let sampler = Sampler::spawn(&profile, clock, Duration::from_millis(1)).unwrap();
        profile.attach_sampler(sampler);
        std::thread::sleep(Duration::from_millis(5));

        let report = profile.finalize(10.0, Some(ThreadTimes::new(5_000, 0))).unwrap();
        std::thread::sleep(Duration::from_millis(20));

        assert_eq!(report.cpu_time_ns, 5_000);
        assert_eq!(profile.cpu_time_ns(), 5_000);
        assert!(!profile.is_active());
    }

    #[test]
    fn test_session_is_kept() {
        assert_eq!(ThreadProfile::new(1, 42).session(), 42);
    }

    #[test]
    fn test_finalize_runs_once() {
        let profile = ThreadProfile::new(1, 1);
        let f = profile.push("A.f", None).unwrap();
        profile.pop(f, None).unwrap();
        let first = profile.finalize(10.0, None).unwrap();
        let second = profile.finalize(99.0, Some(ThreadTimes::new(1, 1))).unwrap();
        assert_eq!(first, second);
        assert!(profile.is_finalized());
    }

    #[test]
    fn test_method_statistics_before_finalize_has_zero_power() {
        let profile = ThreadProfile::new(1, 1);
        let f = profile.push("A.f", Some(ThreadTimes::new(0, 0))).unwrap();
        profile.pop(f, Some(ThreadTimes::new(10, 0))).unwrap();
        let stats = profile.method_statistics();
        assert_eq!(stats["A.f"].cpu_time_ns, 10);
        assert_eq!(stats["A.f"].attributed_power, 0.0);
    }
}
