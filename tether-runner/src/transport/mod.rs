//! Binding transport contract
//!
//! A transport establishes and tears down the logical connection between a
//! job connection and a named worker. It reports progress through the
//! [`ServiceConnection`] callbacks, on an execution context of its choosing.

pub mod local;

pub use local::LocalTransport;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::TransportError;
use crate::worker::BinderHandle;

/// Identifies one binding between a job connection and a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Callbacks a transport invokes on the party that requested a binding
pub trait ServiceConnection: Send + Sync {
    /// The binding completed; `handle` must be capability checked before use
    fn on_connected(&self, handle: BinderHandle);

    /// The binding was lost abruptly
    fn on_disconnected(&self);
}

/// A request to bind a job connection to its worker
pub struct BindingRequest {
    pub id: ConnectionId,
    pub tag: String,
    pub service: String,
    pub connection: Arc<dyn ServiceConnection>,
}

impl std::fmt::Debug for BindingRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindingRequest")
            .field("id", &self.id)
            .field("tag", &self.tag)
            .field("service", &self.service)
            .finish_non_exhaustive()
    }
}

/// Transport able to bind job connections to workers
pub trait BindingTransport: Send + Sync {
    /// Asks for a binding
    ///
    /// Returns once the request is accepted; the outcome is delivered later
    /// through the request's callbacks.
    fn request_binding(&self, request: BindingRequest) -> Result<(), TransportError>;

    /// Releases a binding previously requested under `id`
    fn release_binding(&self, id: ConnectionId) -> Result<(), TransportError>;
}
