//! Job result codes

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Outcome a worker reports when a job finishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobResult {
    /// The job completed
    Success,

    /// The job failed and should be rescheduled
    FailRetry,

    /// The job failed and must not be retried
    FailNoRetry,
}

impl JobResult {
    /// Stable integer code used when results cross a process boundary
    pub fn code(&self) -> i32 {
        match self {
            JobResult::Success => 0,
            JobResult::FailRetry => 1,
            JobResult::FailNoRetry => 2,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, JobResult::Success)
    }
}

impl TryFrom<i32> for JobResult {
    type Error = ValidationError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(JobResult::Success),
            1 => Ok(JobResult::FailRetry),
            2 => Ok(JobResult::FailNoRetry),
            other => Err(ValidationError::UnknownResultCode(other)),
        }
    }
}

impl std::fmt::Display for JobResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobResult::Success => write!(f, "Success"),
            JobResult::FailRetry => write!(f, "FailRetry"),
            JobResult::FailNoRetry => write!(f, "FailNoRetry"),
        }
    }
}
