//! Scoped entry/exit for the instrumentation boundary
//!
//! Dropping the guard calls `exit_method`, so the exit runs on every path
//! out of the scope, early returns and unwinding included.

use crate::engine::PowerAttributionEngine;
use crate::invocation::InvocationHandle;

/// Exits its invocation when dropped
#[must_use = "dropping the guard immediately exits the invocation"]
pub struct InvocationGuard<'a> {
    engine: &'a PowerAttributionEngine,
    handle: Option<InvocationHandle>,
}

impl<'a> InvocationGuard<'a> {
    pub(crate) fn new(engine: &'a PowerAttributionEngine, handle: InvocationHandle) -> Self {
        Self {
            engine,
            handle: Some(handle),
        }
    }

    /// Guard that records nothing
    pub(crate) fn inert(engine: &'a PowerAttributionEngine) -> Self {
        Self {
            engine,
            handle: None,
        }
    }

    /// `None` for excluded methods or failed entries
    pub fn handle(&self) -> Option<InvocationHandle> {
        self.handle
    }
}

impl Drop for InvocationGuard<'_> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = self.engine.exit_method(handle) {
                tracing::warn!(tid = handle.tid, error = %e, "exit_method failed: {}", e);
            }
        }
    }
}

impl std::fmt::Debug for InvocationGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvocationGuard")
            .field("handle", &self.handle)
            .finish()
    }
}
