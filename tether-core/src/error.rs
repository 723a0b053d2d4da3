//! Validation errors for domain types

use thiserror::Error;

/// Errors raised while building a [`JobInvocation`](crate::JobInvocation)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Job tag cannot be empty")]
    EmptyTag,

    #[error("Job tag is too long ({len} chars, max: {max})")]
    TagTooLong { len: usize, max: usize },

    #[error("Job service cannot be empty")]
    EmptyService,

    #[error("Execution window end ({end}s) is before its start ({start}s)")]
    InvalidWindow { start: u64, end: u64 },

    #[error("Initial backoff must be at least {min}s (got {got}s)")]
    BackoffTooShort { got: u64, min: u64 },

    #[error("Maximum backoff ({maximum}s) is smaller than initial backoff ({initial}s)")]
    BackoffInverted { initial: u64, maximum: u64 },

    #[error("Unknown job result code: {0}")]
    UnknownResultCode(i32),
}
