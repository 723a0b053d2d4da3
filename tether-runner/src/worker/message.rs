//! Start command payload and completion reporting

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tether_core::{JobInvocation, JobResult};
use tokio::sync::mpsc;
use tracing::debug;

use crate::transport::ConnectionId;

/// Stream of completions reported by workers
pub type CompletionReceiver = mpsc::UnboundedReceiver<JobCompletion>;

/// A worker's report that a job finished
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobCompletion {
    /// Connection that delivered the start command, if the callback was bound to one
    pub connection_id: Option<ConnectionId>,
    pub tag: String,
    pub service: String,
    pub result: JobResult,
    pub finished_at: DateTime<Utc>,
}

/// Correlation handle a worker uses to report back to the scheduler
///
/// Every completion sent through a callback bound with
/// [`for_connection`](Self::for_connection) names that connection, so the
/// scheduler can tell a late report from an earlier run apart from the
/// current run of the same tag.
#[derive(Debug, Clone)]
pub struct JobCallback {
    sender: mpsc::UnboundedSender<JobCompletion>,
    connection_id: Option<ConnectionId>,
}

impl JobCallback {
    /// Creates an unbound callback together with the receiving end of its channel
    pub fn channel() -> (Self, CompletionReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let callback = Self {
            sender,
            connection_id: None,
        };
        (callback, receiver)
    }

    /// Callback reporting into the same channel on behalf of connection `id`
    pub fn for_connection(&self, id: ConnectionId) -> Self {
        Self {
            sender: self.sender.clone(),
            connection_id: Some(id),
        }
    }

    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.connection_id
    }

    /// Reports the result of `job`
    ///
    /// Returns false if nobody is listening anymore.
    pub fn report(&self, job: &JobInvocation, result: JobResult) -> bool {
        let completion = JobCompletion {
            connection_id: self.connection_id,
            tag: job.tag.clone(),
            service: job.service.clone(),
            result,
            finished_at: Utc::now(),
        };

        match self.sender.send(completion) {
            Ok(()) => true,
            Err(_) => {
                debug!("Dropping result {} for job '{}': receiver closed", result, job.tag);
                false
            }
        }
    }
}

/// Payload of the start command
#[derive(Debug)]
pub struct JobMessage {
    callback: JobCallback,
}

impl JobMessage {
    pub fn new(callback: JobCallback) -> Self {
        Self { callback }
    }

    pub fn into_callback(self) -> JobCallback {
        self.callback
    }
}
