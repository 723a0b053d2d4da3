//! Tether Core
//!
//! Shared types for the Tether job connection manager.
//!
//! This crate contains:
//! - Domain types: the job descriptor handed to workers, its trigger,
//!   constraints and retry strategy, and the result codes workers report

pub mod domain;
pub mod error;

pub use domain::job::{Constraint, JobInvocation, JobInvocationBuilder, Lifetime, RetryPolicy, RetryStrategy};
pub use domain::result::JobResult;
pub use domain::trigger::Trigger;
pub use error::ValidationError;
