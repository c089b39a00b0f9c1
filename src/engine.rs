//! Power attribution engine
//!
//! The engine owns the thread registry and is the only entry point for the
//! instrumentation boundary:
//!
//! ```text
//! app thread                         sampler thread (one per profile)
//! ──────────                         ───────────────────────────────
//! enter_method(f)  ─┐                loop {
//!   enter_method(g) │ push/pop         cycle.tick()
//!   exit_method(g)  │ on own stack     observe(clock.times(tid))
//! exit_method(f)   ─┘                  recv_timeout(interval)
//!   └─ root exit: finalize ──────────► cancel + join
//!        └─ report ──► sink          }
//! ```
//!
//! A contract violation on one thread aborts that thread's profile only.
//! Clock failures and sink failures are logged and never returned to the
//! profiled code.

use crate::config::ProfilerConfig;
use crate::error::{ProfilerError, Result};
use crate::filter::MethodFilter;
use crate::guard::InvocationGuard;
use crate::invocation::{InvocationHandle, InvocationSnapshot};
use crate::report::{ReportSink, ThreadReport};
use crate::sampler::Sampler;
use crate::statistics::MethodStatistics;
use crate::thread_clock::{ThreadClock, ThreadTimes, Tid};
use crate::thread_profile::{Popped, ThreadProfile};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Registry of per-thread profiles plus the immutable engine settings
pub struct PowerAttributionEngine {
    config: ProfilerConfig,
    clock: Arc<dyn ThreadClock>,
    sink: Arc<dyn ReportSink>,
    filter: MethodFilter,
    profiles: RwLock<HashMap<Tid, Arc<ThreadProfile>>>,
    shut_down: AtomicBool,
    next_session: AtomicU64,
}

impl std::fmt::Debug for PowerAttributionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PowerAttributionEngine")
            .field("config", &self.config)
            .field("threads", &self.thread_ids())
            .finish_non_exhaustive()
    }
}

impl PowerAttributionEngine {
    /// Build an engine; the configuration is validated and frozen here
    pub fn new(
        config: ProfilerConfig,
        clock: Arc<dyn ThreadClock>,
        sink: Arc<dyn ReportSink>,
    ) -> Result<Self> {
        config.validate().map_err(ProfilerError::Config)?;
        let filter = MethodFilter::from_patterns(&config.exclude)?;

        tracing::debug!(
            interval_ms = config.sampling_interval_ms,
            power_rating = config.power_rating_watts,
            output = ?config.output,
            "power attribution engine created"
        );

        Ok(Self {
            config,
            clock,
            sink,
            filter,
            profiles: RwLock::new(HashMap::new()),
            shut_down: AtomicBool::new(false),
            next_session: AtomicU64::new(1),
        })
    }

    pub fn config(&self) -> &ProfilerConfig {
        &self.config
    }

    pub fn filter(&self) -> &MethodFilter {
        &self.filter
    }

    pub fn clock(&self) -> &Arc<dyn ThreadClock> {
        &self.clock
    }

    fn read_profiles(&self) -> RwLockReadGuard<'_, HashMap<Tid, Arc<ThreadProfile>>> {
        self.profiles.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_profiles(&self) -> RwLockWriteGuard<'_, HashMap<Tid, Arc<ThreadProfile>>> {
        self.profiles.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Profile registered for `tid`, finalized or not
    pub fn profile(&self, tid: Tid) -> Option<Arc<ThreadProfile>> {
        self.read_profiles().get(&tid).cloned()
    }

    /// Current counters of `tid`, or `None` when the clock cannot read them
    fn read_times(&self, tid: Tid) -> Option<ThreadTimes> {
        match self.clock.times(tid) {
            Ok(times) => Some(times),
            Err(e) => {
                tracing::trace!(tid, error = %e, "thread times unavailable");
                None
            }
        }
    }

    /// Live profile for `tid`, creating one (and its sampler) when the thread
    /// is unseen or its previous session was finalized
    ///
    /// The counter read and the sampler spawn happen outside the registry
    /// lock; other threads never wait on this thread's clock.
    fn profile_for(&self, tid: Tid) -> Arc<ThreadProfile> {
        if let Some(profile) = self.live_profile(tid) {
            return profile;
        }

        let session = self.next_session.fetch_add(1, Ordering::Relaxed);
        let candidate = Arc::new(ThreadProfile::new(tid, session));
        if let Some(times) = self.read_times(tid) {
            candidate.observe(times);
        }

        if self.shut_down.load(Ordering::Acquire) {
            candidate.stop();
        } else {
            match Sampler::spawn(&candidate, Arc::clone(&self.clock), self.config.sampling_interval())
            {
                Ok(sampler) => candidate.attach_sampler(sampler),
                Err(e) => {
                    tracing::warn!(tid, error = %e, "failed to spawn sampler: {}", e);
                    candidate.stop();
                }
            }
        }

        let mut profiles = self.write_profiles();
        if let Some(existing) = profiles.get(&tid).filter(|p| !p.is_finalized()) {
            let existing = Arc::clone(existing);
            drop(profiles);
            candidate.stop_and_join();
            return existing;
        }

        let previous = profiles.insert(tid, Arc::clone(&candidate));
        // A shutdown that ran before the insert never saw the candidate
        let late = self.shut_down.load(Ordering::Acquire);
        drop(profiles);

        if let Some(previous) = previous {
            previous.stop();
        }
        if late {
            candidate.stop_and_join();
        }
        tracing::debug!(tid, session, "thread profile created");
        candidate
    }

    fn live_profile(&self, tid: Tid) -> Option<Arc<ThreadProfile>> {
        self.read_profiles()
            .get(&tid)
            .filter(|p| !p.is_finalized())
            .cloned()
    }

    /// Record entry into `method` on thread `tid`
    pub fn enter_method(&self, method: &str, tid: Tid) -> Result<InvocationHandle> {
        let profile = self.profile_for(tid);
        let entry = self.read_times(tid);

        match profile.push(method, entry) {
            Ok(id) => Ok(InvocationHandle {
                tid,
                session: profile.session(),
                id,
            }),
            Err(e) => Err(self.on_failure(&profile, e)),
        }
    }

    /// Record exit from the invocation behind `handle`
    ///
    /// Exiting the outermost frame finalizes the thread and publishes its
    /// report. A handle from an earlier session of the thread is rejected
    /// without touching the current one.
    pub fn exit_method(&self, handle: InvocationHandle) -> Result<()> {
        let profile = self
            .profile(handle.tid)
            .ok_or(ProfilerError::UnknownThread(handle.tid))?;
        if profile.session() != handle.session {
            tracing::debug!(
                tid = handle.tid,
                session = handle.session,
                current = profile.session(),
                "ignoring exit from a previous session"
            );
            return Err(ProfilerError::StaleInvocation {
                tid: handle.tid,
                session: handle.session,
                current: profile.session(),
            });
        }
        let exit = self.read_times(handle.tid);

        match profile.pop(handle.id, exit) {
            Ok(Popped::Nested { .. }) => Ok(()),
            Ok(Popped::Root) => self.finalize(&profile, exit),
            Err(e) => Err(self.on_failure(&profile, e)),
        }
    }

    fn finalize(&self, profile: &ThreadProfile, last: Option<ThreadTimes>) -> Result<()> {
        let report = match profile.finalize(self.config.power_rating_watts, last) {
            Ok(report) => report,
            Err(e) => return Err(self.on_failure(profile, e)),
        };

        tracing::debug!(
            tid = report.tid,
            power = report.power,
            cycle_ns = report.cycle_duration_ns,
            methods = report.methods.len(),
            "thread finalized"
        );

        if let Err(e) = self.sink.publish(&report) {
            tracing::warn!(tid = report.tid, error = %e, "failed to publish report: {}", e);
        }
        Ok(())
    }

    /// Abort the profile on a contract violation, pass the error through
    fn on_failure(&self, profile: &ThreadProfile, error: ProfilerError) -> ProfilerError {
        if error.is_contract_violation() {
            tracing::warn!(tid = profile.tid(), error = %error, "aborting thread profile: {}", error);
            profile.abort();
        }
        error
    }

    /// Thread power, available once the thread has finalized
    pub fn get_thread_cpu_power(&self, tid: Tid) -> Option<f64> {
        self.profile(tid).and_then(|p| p.power())
    }

    /// Per-method aggregates with attributed power for `tid`
    pub fn compute_method_statistics(&self, tid: Tid) -> Result<HashMap<String, MethodStatistics>> {
        let profile = self.profile(tid).ok_or(ProfilerError::UnknownThread(tid))?;
        Ok(profile.method_statistics())
    }

    pub fn invocation(&self, handle: InvocationHandle) -> Option<InvocationSnapshot> {
        self.profile(handle.tid)
            .filter(|p| p.session() == handle.session)
            .and_then(|p| p.invocation(handle.id))
    }

    pub fn stack_depth(&self, tid: Tid) -> Option<usize> {
        self.profile(tid).map(|p| p.stack_depth())
    }

    /// Whether `tid`'s sampler is still running
    pub fn is_active(&self, tid: Tid) -> bool {
        self.profile(tid).is_some_and(|p| p.is_active())
    }

    pub fn is_aborted(&self, tid: Tid) -> bool {
        self.profile(tid).is_some_and(|p| p.is_aborted())
    }

    /// Registered thread ids, ascending
    pub fn thread_ids(&self) -> Vec<Tid> {
        let mut ids: Vec<Tid> = self.read_profiles().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Whether any registered thread is still being sampled
    pub fn has_active_threads(&self) -> bool {
        self.read_profiles().values().any(|p| p.is_active())
    }

    pub fn thread_report(&self, tid: Tid) -> Option<ThreadReport> {
        self.profile(tid).and_then(|p| p.report().cloned())
    }

    /// Enter `method` on the calling thread; the guard exits on drop
    pub fn scope(&self, method: &str) -> InvocationGuard<'_> {
        self.scope_on(method, self.clock.current_tid())
    }

    /// Enter `method` on thread `tid`; the guard exits on drop
    ///
    /// Excluded methods and failed entries yield an inert guard.
    pub fn scope_on(&self, method: &str, tid: Tid) -> InvocationGuard<'_> {
        if !self.filter.should_profile(method) {
            return InvocationGuard::inert(self);
        }
        match self.enter_method(method, tid) {
            Ok(handle) => InvocationGuard::new(self, handle),
            Err(e) => {
                tracing::warn!(tid, method, error = %e, "enter_method failed: {}", e);
                InvocationGuard::inert(self)
            }
        }
    }

    /// Stop every sampler and wait for them; idempotent
    ///
    /// Profiles created afterwards are not sampled.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        let profiles: Vec<Arc<ThreadProfile>> = self.read_profiles().values().cloned().collect();
        for profile in &profiles {
            profile.stop_and_join();
        }
        tracing::debug!(threads = profiles.len(), "engine shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }
}

impl Drop for PowerAttributionEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
