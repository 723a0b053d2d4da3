//! Worker contract
//!
//! A worker receives a start command when its job connection completes and
//! at most one stop command when the connection is finalized. The connection
//! never interprets the message it forwards; the worker uses the callback
//! inside it to report completion back to the scheduler.

mod message;
pub mod task;

pub use message::{CompletionReceiver, JobCallback, JobCompletion, JobMessage};
pub use task::TaskWorker;

use std::any::Any;
use std::sync::Arc;
use tether_core::JobInvocation;

/// Generic handle a transport delivers when a binding completes
pub type BinderHandle = Arc<dyn Any + Send + Sync>;

/// A process able to execute jobs
///
/// Both calls are non-blocking message sends. Implementations must not call
/// back into the job connection from inside them: the connection holds its
/// state lock while delivering start and stop.
pub trait JobWorker: Send + Sync {
    /// Starts executing `job`; completion is reported through `message`
    fn start(&self, job: &JobInvocation, message: JobMessage);

    /// Stops `job`
    ///
    /// When `need_to_send_result` is true the worker still reports a result
    /// through the job's callback.
    fn stop(&self, job: &JobInvocation, need_to_send_result: bool);
}

/// The capability a binder handle must expose to reach a worker
pub struct WorkerBinder {
    worker: Arc<dyn JobWorker>,
}

impl WorkerBinder {
    pub fn new(worker: Arc<dyn JobWorker>) -> Self {
        Self { worker }
    }

    /// Wraps the binder into the generic handle transports deliver
    pub fn into_handle(self) -> BinderHandle {
        Arc::new(self)
    }

    pub fn worker(&self) -> Arc<dyn JobWorker> {
        Arc::clone(&self.worker)
    }

    /// Extracts the worker from a generic handle
    ///
    /// Returns `None` when the handle is anything other than a `WorkerBinder`.
    pub fn extract(handle: &BinderHandle) -> Option<Arc<dyn JobWorker>> {
        handle
            .as_ref()
            .downcast_ref::<WorkerBinder>()
            .map(WorkerBinder::worker)
    }
}

impl std::fmt::Debug for WorkerBinder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerBinder").finish_non_exhaustive()
    }
}
