//! Tether Runner
//!
//! Binds scheduled jobs to the worker that executes them.
//!
//! Architecture:
//! - Worker: the start/stop contract a worker exposes, plus a task based worker
//! - Transport: the binding contract, plus an in-process transport
//! - Connection: the per-job state machine between transport and worker
//! - Scheduler: the delegator that owns one connection per dispatched job
//! - Configuration: settings loaded from environment or defaults

pub mod config;
pub mod connection;
pub mod error;
pub mod scheduler;
pub mod transport;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use connection::{ConnectionPhase, JobConnection};
pub use error::{ConnectionError, DelegatorError, TransportError};
pub use scheduler::ExecutionDelegator;
pub use transport::{BindingRequest, BindingTransport, ConnectionId, LocalTransport, ServiceConnection};
pub use worker::{
    BinderHandle, CompletionReceiver, JobCallback, JobCompletion, JobMessage, JobWorker,
    TaskWorker, WorkerBinder,
};
