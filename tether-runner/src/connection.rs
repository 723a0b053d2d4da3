//! Job connection
//!
//! Owns the binding lifecycle of a single dispatched job:
//!
//! ```text
//! Connecting --on_connected--> Connected
//!     |                            |
//!     +--stop / disconnect / release--+--> Unbound (terminal)
//! ```
//!
//! Three triggers race against each other: the transport's connect and
//! disconnect callbacks, and the scheduler's stop request. Every trigger
//! checks and mutates the state inside one critical section, so whichever
//! finalizes first wins and the others become no-ops. As a result the worker
//! receives at most one start and one stop, and the binding is released at
//! most once.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tether_core::JobInvocation;
use tracing::{debug, error, info, warn};

use crate::error::ConnectionError;
use crate::transport::{BindingRequest, BindingTransport, ConnectionId, ServiceConnection};
use crate::worker::{BinderHandle, JobMessage, JobWorker, WorkerBinder};

/// Observable phase of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Connecting,
    Connected,
    Unbound,
}

impl std::fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionPhase::Connecting => write!(f, "Connecting"),
            ConnectionPhase::Connected => write!(f, "Connected"),
            ConnectionPhase::Unbound => write!(f, "Unbound"),
        }
    }
}

enum ConnectionState {
    Connecting,

    /// Start was delivered. The worker is held weakly: once its owner drops
    /// it there is nobody left to stop.
    Connected { worker: Weak<dyn JobWorker> },

    Unbound,
}

impl ConnectionState {
    fn phase(&self) -> ConnectionPhase {
        match self {
            ConnectionState::Connecting => ConnectionPhase::Connecting,
            ConnectionState::Connected { .. } => ConnectionPhase::Connected,
            ConnectionState::Unbound => ConnectionPhase::Unbound,
        }
    }
}

struct Inner {
    state: ConnectionState,
    pending_message: Option<JobMessage>,

    /// A binding was requested and not yet given back
    is_bound: bool,
}

/// How a connection gets finalized
#[derive(Debug, Clone, Copy)]
enum Finalize {
    /// Scheduler asked the job to stop
    StopRequested { need_to_send_result: bool },

    /// Transport lost the binding
    Disconnected,

    /// Scheduler gave the binding back without stopping the worker
    Release,

    /// Transport refused the binding request
    BindFailed,
}

impl Finalize {
    /// Stop command to send if the worker is connected
    fn stop_flag(self) -> Option<bool> {
        match self {
            Finalize::StopRequested {
                need_to_send_result,
            } => Some(need_to_send_result),
            Finalize::Disconnected | Finalize::BindFailed => Some(false),
            Finalize::Release => None,
        }
    }

    /// Whether the transport still holds a binding that must be released
    fn releases_binding(self) -> bool {
        matches!(self, Finalize::StopRequested { .. } | Finalize::Release)
    }
}

/// Connection between one dispatched job and the worker executing it
pub struct JobConnection {
    id: ConnectionId,
    job: Arc<JobInvocation>,
    transport: Arc<dyn BindingTransport>,
    inner: Mutex<Inner>,
}

impl JobConnection {
    /// Creates a connection for `job`; `message` is delivered with the start command
    pub fn new(
        job: Arc<JobInvocation>,
        message: JobMessage,
        transport: Arc<dyn BindingTransport>,
    ) -> Arc<Self> {
        Self::with_id(ConnectionId::new(), job, message, transport)
    }

    /// Creates a connection under a caller-chosen id
    ///
    /// Lets the dispatcher bind the message's callback to the connection
    /// before the connection exists.
    pub fn with_id(
        id: ConnectionId,
        job: Arc<JobInvocation>,
        message: JobMessage,
        transport: Arc<dyn BindingTransport>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            job,
            transport,
            inner: Mutex::new(Inner {
                state: ConnectionState::Connecting,
                pending_message: Some(message),
                is_bound: false,
            }),
        })
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn job(&self) -> &Arc<JobInvocation> {
        &self.job
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.lock().state.phase()
    }

    /// True once the connection has been finalized
    pub fn was_unbound(&self) -> bool {
        matches!(self.lock().state, ConnectionState::Unbound)
    }

    /// Asks the transport to bind this connection to the job's worker
    ///
    /// If the transport refuses, the connection is finalized without a
    /// release call and the error is returned.
    pub fn bind(self: &Arc<Self>) -> Result<(), ConnectionError> {
        {
            let mut inner = self.lock();
            if matches!(inner.state, ConnectionState::Unbound) {
                return Err(ConnectionError::Finalized(self.id));
            }
            if inner.is_bound {
                return Err(ConnectionError::AlreadyBound(self.id));
            }
            inner.is_bound = true;
        }

        let request = BindingRequest {
            id: self.id,
            tag: self.job.tag.clone(),
            service: self.job.service.clone(),
            connection: Arc::clone(self) as Arc<dyn ServiceConnection>,
        };

        match self.transport.request_binding(request) {
            Ok(()) => {
                debug!("Connection {} requested binding for job '{}'", self.id, self.job.tag);
                Ok(())
            }
            Err(e) => {
                error!(
                    "Unable to bind job '{}' to service '{}': {}",
                    self.job.tag, self.job.service, e
                );
                self.finalize(Finalize::BindFailed);
                Err(ConnectionError::BindFailed {
                    id: self.id,
                    source: e,
                })
            }
        }
    }

    /// Stops the job and releases its binding
    ///
    /// The worker receives a stop only if it was started and is still alive.
    /// No-op once the connection is unbound.
    pub fn on_stop_requested(&self, need_to_send_result: bool) {
        self.finalize(Finalize::StopRequested {
            need_to_send_result,
        });
    }

    /// Releases the binding without sending a stop command
    ///
    /// Used once the worker reported completion. A transport failure is
    /// logged and the connection still ends up unbound.
    pub fn release_binding(&self) {
        self.finalize(Finalize::Release);
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn finalize(&self, reason: Finalize) {
        let must_release = {
            let mut inner = self.lock();

            let previous = std::mem::replace(&mut inner.state, ConnectionState::Unbound);
            if let ConnectionState::Unbound = previous {
                debug!(
                    "Connection {} already unbound, ignoring {:?}",
                    self.id, reason
                );
                return;
            }

            inner.pending_message = None;

            if let (Some(need_to_send_result), ConnectionState::Connected { worker }) =
                (reason.stop_flag(), &previous)
            {
                match worker.upgrade() {
                    Some(worker) => worker.stop(&self.job, need_to_send_result),
                    None => debug!(
                        "Worker for job '{}' is gone, skipping stop",
                        self.job.tag
                    ),
                }
            }

            let must_release = reason.releases_binding() && inner.is_bound;
            inner.is_bound = false;
            must_release
        };

        info!(
            "Connection {} for job '{}' unbound ({:?})",
            self.id, self.job.tag, reason
        );

        // Outside the lock: a transport calling back into this connection
        // while releasing finds it already unbound.
        if must_release {
            if let Err(e) = self.transport.release_binding(self.id) {
                warn!(
                    connection_id = %self.id,
                    tag = %self.job.tag,
                    error = %e,
                    "Failed to release binding"
                );
            }
        }
    }
}

impl ServiceConnection for JobConnection {
    fn on_connected(&self, handle: BinderHandle) {
        let Some(worker) = WorkerBinder::extract(&handle) else {
            warn!(
                "Connection {} received a handle without a worker, ignoring",
                self.id
            );
            return;
        };

        let mut inner = self.lock();

        match inner.state {
            ConnectionState::Connecting if inner.is_bound => {}
            ConnectionState::Connecting => {
                warn!(
                    "Connection {} connected without requesting a binding, ignoring",
                    self.id
                );
                return;
            }
            ConnectionState::Connected { .. } => {
                debug!("Connection {} already connected, ignoring", self.id);
                return;
            }
            ConnectionState::Unbound => {
                debug!("Connection {} connected after unbind, ignoring", self.id);
                return;
            }
        }

        let Some(message) = inner.pending_message.take() else {
            return;
        };

        worker.start(&self.job, message);
        inner.state = ConnectionState::Connected {
            worker: Arc::downgrade(&worker),
        };

        info!(
            "Connection {} started job '{}' on service '{}'",
            self.id, self.job.tag, self.job.service
        );
    }

    fn on_disconnected(&self) {
        // The transport already dropped the binding on its side
        self.finalize(Finalize::Disconnected);
    }
}

impl std::fmt::Debug for JobConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobConnection")
            .field("id", &self.id)
            .field("tag", &self.job.tag)
            .field("phase", &self.phase())
            .finish()
    }
}
