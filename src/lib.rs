//! Jouler - per-thread CPU power attribution
//!
//! This library tracks, for every monitored thread, a live call stack of
//! method invocations, samples the thread's OS-level CPU and user time in the
//! background, and when the thread's outermost invocation completes splits
//! an estimated power figure for the thread across the methods it ran, in
//! proportion to each method's CPU time.
//!
//! # Example
//!
//! ```
//! use jouler::config::ProfilerConfig;
//! use jouler::engine::PowerAttributionEngine;
//! use jouler::report::CollectingSink;
//! use jouler::thread_clock::{ManualThreadClock, ThreadTimes};
//! use std::sync::Arc;
//!
//! let clock = Arc::new(ManualThreadClock::new());
//! clock.set(1, ThreadTimes::new(0, 0));
//! let sink = Arc::new(CollectingSink::new());
//! let engine = PowerAttributionEngine::new(ProfilerConfig::default(), clock.clone(), sink.clone())?;
//!
//! let f = engine.enter_method("app.Main.f", 1)?;
//! let g = engine.enter_method("app.Main.g", 1)?;
//! clock.advance(1, 2_000_000, 1_000_000);
//! engine.exit_method(g)?;
//! engine.exit_method(f)?;
//!
//! assert_eq!(sink.reports().len(), 1);
//! # Ok::<(), jouler::error::ProfilerError>(())
//! ```

pub mod cli;
pub mod config;
pub mod cycle_tracker;
pub mod engine;
pub mod error;
pub mod filter;
pub mod guard;
pub mod invocation;
pub mod period;
pub mod report;
pub mod sampler;
pub mod statistics;
pub mod thread_clock;
pub mod thread_profile;
pub mod timer;

pub use engine::PowerAttributionEngine;
pub use error::{ProfilerError, Result};
pub use guard::InvocationGuard;
pub use invocation::InvocationHandle;
