//! Error taxonomy for the attribution engine
//!
//! Four families of failure exist:
//! - contract violations (timer misuse, stack mismatch) abort one thread's profile
//! - a handle from a finished session is refused without touching the live one
//! - clock failures stop one thread's sampler
//! - configuration and report I/O errors surface at construction or are logged

use crate::thread_clock::Tid;
use crate::timer::TimerError;
use thiserror::Error;

/// Errors raised by the power attribution engine
#[derive(Error, Debug)]
pub enum ProfilerError {
    #[error("stack mismatch on thread {tid}: exiting invocation {found} but top of stack is {expected:?}")]
    StackMismatch {
        tid: Tid,
        expected: Option<usize>,
        found: usize,
    },

    #[error("invocation belongs to session {session} of thread {tid}, which is now in session {current}")]
    StaleInvocation { tid: Tid, session: u64, current: u64 },

    #[error("no profile registered for thread {0}")]
    UnknownThread(Tid),

    #[error("profile for thread {0} was aborted by an earlier contract violation")]
    ProfileAborted(Tid),

    #[error(transparent)]
    Timer(#[from] TimerError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, ProfilerError>;

impl ProfilerError {
    /// Whether this error means the instrumentation boundary broke its
    /// entry/exit pairing
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            ProfilerError::StackMismatch { .. } | ProfilerError::Timer(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::{TimerOperation, TimerState};

    #[test]
    fn test_stack_mismatch_message() {
        let err = ProfilerError::StackMismatch {
            tid: 7,
            expected: Some(3),
            found: 1,
        };
        let msg = err.to_string();
        assert!(msg.contains("thread 7"));
        assert!(msg.contains("invocation 1"));
        assert!(msg.contains("Some(3)"));
        assert!(err.is_contract_violation());
    }

    #[test]
    fn test_timer_error_is_contract_violation() {
        let err: ProfilerError = TimerError::InvalidState {
            operation: TimerOperation::Resume,
            state: TimerState::Running,
        }
        .into();
        assert!(err.is_contract_violation());
        assert!(err.to_string().contains("resume"));
    }

    #[test]
    fn test_unknown_thread_not_contract_violation() {
        let err = ProfilerError::UnknownThread(42);
        assert!(!err.is_contract_violation());
        assert_eq!(err.to_string(), "no profile registered for thread 42");
    }

    #[test]
    fn test_stale_invocation_not_contract_violation() {
        let err = ProfilerError::StaleInvocation {
            tid: 3,
            session: 1,
            current: 2,
        };
        assert!(!err.is_contract_violation());
        let msg = err.to_string();
        assert!(msg.contains("session 1 of thread 3"));
        assert!(msg.contains("session 2"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: ProfilerError = io.into();
        assert!(matches!(err, ProfilerError::Io(_)));
    }
}
