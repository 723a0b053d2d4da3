//! Error types for the runner
//!
//! Only dispatch-side calls return these. Transport callbacks and stop
//! requests never surface an error to their caller; failures on those paths
//! are logged and discarded.

use thiserror::Error;

use crate::transport::ConnectionId;

/// Errors reported by a binding transport
#[derive(Debug, Error)]
pub enum TransportError {
    /// No worker service is registered under this name
    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    /// The transport holds no binding for this connection
    #[error("Unknown binding: {0}")]
    UnknownBinding(ConnectionId),

    /// The transport cannot serve requests right now
    #[error("Transport unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised while binding a job connection
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Failed to bind connection {id}: {source}")]
    BindFailed {
        id: ConnectionId,
        #[source]
        source: TransportError,
    },

    #[error("Connection {0} already requested a binding")]
    AlreadyBound(ConnectionId),

    #[error("Connection {0} was already unbound")]
    Finalized(ConnectionId),
}

/// Errors raised by the execution delegator when dispatching a job
#[derive(Debug, Error)]
pub enum DelegatorError {
    #[error("Job '{0}' is already running")]
    JobAlreadyRunning(String),

    #[error("Too many active jobs (max: {max})")]
    CapacityExceeded { max: usize },

    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

impl DelegatorError {
    /// Check if the job could not be dispatched because its worker was unreachable
    pub fn is_bind_failure(&self) -> bool {
        matches!(
            self,
            Self::Connection(ConnectionError::BindFailed { .. })
        )
    }
}
