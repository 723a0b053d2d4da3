//! Job descriptor types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::trigger::Trigger;
use crate::error::ValidationError;

/// Maximum length of a job tag
pub const MAX_TAG_LENGTH: usize = 100;

/// Smallest initial backoff a retry strategy may use
pub const MIN_INITIAL_BACKOFF_SECS: u64 = 30;

/// A unit of work dispatched to a worker
///
/// Built once by the scheduler and never mutated afterwards. Connections
/// hold it behind an `Arc` for the duration of the execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobInvocation {
    /// Identifies the job within its service
    pub tag: String,

    /// Name of the worker service that runs the job
    pub service: String,

    /// What made the job eligible to run
    pub trigger: Trigger,

    /// Application supplied metadata
    pub extras: HashMap<String, serde_json::Value>,

    pub lifetime: Lifetime,
    pub recurring: bool,

    /// Whether dispatching this job replaces a running job with the same tag
    pub replace_current: bool,

    pub constraints: Vec<Constraint>,
    pub retry_strategy: RetryStrategy,
}

impl JobInvocation {
    /// Starts building a job descriptor
    pub fn builder() -> JobInvocationBuilder {
        JobInvocationBuilder::default()
    }

    /// Looks up a single extra by key
    pub fn extra(&self, key: &str) -> Option<&serde_json::Value> {
        self.extras.get(key)
    }
}

/// How long a scheduled job survives
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Lifetime {
    /// Dropped when the host restarts
    #[default]
    UntilNextBoot,

    /// Persisted across restarts
    Forever,
}

/// Conditions that must hold before the job may run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Constraint {
    OnAnyNetwork,
    OnUnmeteredNetwork,
    DeviceCharging,
    DeviceIdle,
}

/// Backoff curve applied between retries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetryPolicy {
    #[default]
    Exponential,
    Linear,
}

/// Retry configuration carried with the job
///
/// Only carried and validated here; computing backoff belongs to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryStrategy {
    pub policy: RetryPolicy,
    pub initial_backoff_secs: u64,
    pub maximum_backoff_secs: u64,
}

impl RetryStrategy {
    pub fn new(policy: RetryPolicy, initial_backoff_secs: u64, maximum_backoff_secs: u64) -> Self {
        Self {
            policy,
            initial_backoff_secs,
            maximum_backoff_secs,
        }
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.initial_backoff_secs < MIN_INITIAL_BACKOFF_SECS {
            return Err(ValidationError::BackoffTooShort {
                got: self.initial_backoff_secs,
                min: MIN_INITIAL_BACKOFF_SECS,
            });
        }

        if self.maximum_backoff_secs < self.initial_backoff_secs {
            return Err(ValidationError::BackoffInverted {
                initial: self.initial_backoff_secs,
                maximum: self.maximum_backoff_secs,
            });
        }

        Ok(())
    }
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self::new(RetryPolicy::Exponential, 30, 3600)
    }
}

/// Builder for [`JobInvocation`]
#[derive(Debug, Clone, Default)]
pub struct JobInvocationBuilder {
    tag: String,
    service: String,
    trigger: Trigger,
    extras: HashMap<String, serde_json::Value>,
    lifetime: Lifetime,
    recurring: bool,
    replace_current: bool,
    constraints: Vec<Constraint>,
    retry_strategy: RetryStrategy,
}

impl JobInvocationBuilder {
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    pub fn service(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }

    pub fn trigger(mut self, trigger: Trigger) -> Self {
        self.trigger = trigger;
        self
    }

    pub fn extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extras.insert(key.into(), value);
        self
    }

    pub fn lifetime(mut self, lifetime: Lifetime) -> Self {
        self.lifetime = lifetime;
        self
    }

    pub fn recurring(mut self, recurring: bool) -> Self {
        self.recurring = recurring;
        self
    }

    pub fn replace_current(mut self, replace_current: bool) -> Self {
        self.replace_current = replace_current;
        self
    }

    /// Adds a constraint; duplicates are ignored
    pub fn constraint(mut self, constraint: Constraint) -> Self {
        if !self.constraints.contains(&constraint) {
            self.constraints.push(constraint);
        }
        self
    }

    pub fn retry_strategy(mut self, retry_strategy: RetryStrategy) -> Self {
        self.retry_strategy = retry_strategy;
        self
    }

    /// Validates the collected fields and builds the descriptor
    pub fn build(self) -> Result<JobInvocation, ValidationError> {
        if self.tag.is_empty() {
            return Err(ValidationError::EmptyTag);
        }

        let len = self.tag.chars().count();
        if len > MAX_TAG_LENGTH {
            return Err(ValidationError::TagTooLong {
                len,
                max: MAX_TAG_LENGTH,
            });
        }

        if self.service.is_empty() {
            return Err(ValidationError::EmptyService);
        }

        self.trigger.validate()?;
        self.retry_strategy.validate()?;

        Ok(JobInvocation {
            tag: self.tag,
            service: self.service,
            trigger: self.trigger,
            extras: self.extras,
            lifetime: self.lifetime,
            recurring: self.recurring,
            replace_current: self.replace_current,
            constraints: self.constraints,
            retry_strategy: self.retry_strategy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_job() {
        let job = JobInvocation::builder()
            .tag("tag")
            .service("sync-service")
            .trigger(Trigger::now())
            .build()
            .unwrap();

        assert_eq!(job.tag, "tag");
        assert_eq!(job.service, "sync-service");
        assert!(job.trigger.is_immediate());
        assert_eq!(job.lifetime, Lifetime::UntilNextBoot);
        assert!(!job.recurring);
        assert!(job.constraints.is_empty());
        assert_eq!(job.retry_strategy, RetryStrategy::default());
    }

    #[test]
    fn test_full_job() {
        let job = JobInvocation::builder()
            .tag("upload")
            .service("uploader")
            .trigger(Trigger::execution_window(0, 60).unwrap())
            .extra("bucket", serde_json::json!("photos"))
            .lifetime(Lifetime::Forever)
            .recurring(true)
            .replace_current(true)
            .constraint(Constraint::OnUnmeteredNetwork)
            .constraint(Constraint::DeviceCharging)
            .constraint(Constraint::DeviceCharging)
            .retry_strategy(RetryStrategy::new(RetryPolicy::Linear, 60, 600))
            .build()
            .unwrap();

        assert_eq!(job.extra("bucket"), Some(&serde_json::json!("photos")));
        assert_eq!(job.constraints.len(), 2);
        assert!(job.replace_current);
        assert_eq!(job.retry_strategy.policy, RetryPolicy::Linear);
    }

    #[test]
    fn test_required_fields() {
        let err = JobInvocation::builder().service("svc").build().unwrap_err();
        assert_eq!(err, ValidationError::EmptyTag);

        let err = JobInvocation::builder().tag("tag").build().unwrap_err();
        assert_eq!(err, ValidationError::EmptyService);

        let err = JobInvocation::builder()
            .tag("x".repeat(MAX_TAG_LENGTH + 1))
            .service("svc")
            .build()
            .unwrap_err();
        assert!(matches!(err, ValidationError::TagTooLong { .. }));
    }

    #[test]
    fn test_retry_strategy_validation() {
        let err = JobInvocation::builder()
            .tag("tag")
            .service("svc")
            .retry_strategy(RetryStrategy::new(RetryPolicy::Exponential, 5, 600))
            .build()
            .unwrap_err();
        assert_eq!(err, ValidationError::BackoffTooShort { got: 5, min: 30 });

        let err = JobInvocation::builder()
            .tag("tag")
            .service("svc")
            .retry_strategy(RetryStrategy::new(RetryPolicy::Exponential, 120, 60))
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::BackoffInverted {
                initial: 120,
                maximum: 60
            }
        );
    }
}
