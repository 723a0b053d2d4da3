//! Scheduler side of the runner
//!
//! The delegator owns one job connection per dispatched job, from binding
//! until the worker reports completion or the job is stopped.

pub mod delegator;

pub use delegator::ExecutionDelegator;
