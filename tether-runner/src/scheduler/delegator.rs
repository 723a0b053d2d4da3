//! Execution delegator
//!
//! Dispatches jobs to workers through job connections and tracks them by
//! tag. Workers report completion through a shared callback channel; the
//! owner of the delegator drains it and hands each completion back through
//! [`ExecutionDelegator::on_job_finished`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tether_core::JobInvocation;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::connection::JobConnection;
use crate::error::DelegatorError;
use crate::transport::{BindingTransport, ConnectionId};
use crate::worker::{CompletionReceiver, JobCallback, JobCompletion, JobMessage};

/// Owner of the job connections opened by this runner
pub struct ExecutionDelegator {
    transport: Arc<dyn BindingTransport>,
    max_active_jobs: usize,
    callback: JobCallback,
    connections: Mutex<HashMap<String, Arc<JobConnection>>>,
}

impl ExecutionDelegator {
    /// Creates a delegator and the receiver every worker reports to
    pub fn new(transport: Arc<dyn BindingTransport>, config: &Config) -> (Self, CompletionReceiver) {
        let (callback, receiver) = JobCallback::channel();
        let delegator = Self {
            transport,
            max_active_jobs: config.max_active_jobs,
            callback,
            connections: Mutex::new(HashMap::new()),
        };
        (delegator, receiver)
    }

    /// Dispatches a job to its worker
    ///
    /// A tag already in flight is rejected unless the job asks to replace the
    /// current one, in which case the running job is stopped without a result.
    pub fn execute_job(&self, job: JobInvocation) -> Result<ConnectionId, DelegatorError> {
        let job = Arc::new(job);

        let (connection, replaced) = {
            let mut connections = self.lock();
            connections.retain(|_, c| !c.was_unbound());

            let replaced = if connections.contains_key(&job.tag) {
                if !job.replace_current {
                    return Err(DelegatorError::JobAlreadyRunning(job.tag.clone()));
                }
                connections.remove(&job.tag)
            } else {
                None
            };

            if connections.len() >= self.max_active_jobs {
                return Err(DelegatorError::CapacityExceeded {
                    max: self.max_active_jobs,
                });
            }

            let id = ConnectionId::new();
            let connection = JobConnection::with_id(
                id,
                Arc::clone(&job),
                JobMessage::new(self.callback.for_connection(id)),
                Arc::clone(&self.transport),
            );
            connections.insert(job.tag.clone(), Arc::clone(&connection));
            (connection, replaced)
        };

        if let Some(old) = replaced {
            info!("Replacing running job '{}'", job.tag);
            old.on_stop_requested(false);
        }

        if let Err(e) = connection.bind() {
            let mut connections = self.lock();
            if connections
                .get(&job.tag)
                .is_some_and(|c| Arc::ptr_eq(c, &connection))
            {
                connections.remove(&job.tag);
            }
            return Err(e.into());
        }

        info!(
            "Dispatched job '{}' to service '{}' (trigger: {})",
            job.tag, job.service, job.trigger
        );

        Ok(connection.id())
    }

    /// Stops a job and forgets its connection
    ///
    /// Returns false if no job with this tag is tracked.
    pub fn stop_job(&self, tag: &str, need_to_send_result: bool) -> bool {
        let connection = self.lock().remove(tag);

        match connection {
            Some(connection) => {
                info!("Stopping job '{}'", tag);
                connection.on_stop_requested(need_to_send_result);
                true
            }
            None => {
                debug!("Stop requested for unknown job '{}'", tag);
                false
            }
        }
    }

    /// Handles a completion reported by a worker
    ///
    /// Only the connection that delivered the finished run is released. A
    /// late report from an earlier run of the same tag is ignored. Returns
    /// true if a connection was released.
    pub fn on_job_finished(&self, completion: &JobCompletion) -> bool {
        let connection = {
            let mut connections = self.lock();
            let current = connections
                .get(&completion.tag)
                .is_some_and(|c| Some(c.id()) == completion.connection_id);
            if current {
                connections.remove(&completion.tag)
            } else {
                None
            }
        };

        match connection {
            Some(connection) => {
                info!(
                    "Job '{}' on service '{}' finished with result {}",
                    completion.tag,
                    connection.job().service,
                    completion.result
                );
                connection.release_binding();
                true
            }
            None => {
                debug!(
                    connection_id = ?completion.connection_id,
                    "Completion for job '{}' has no matching open connection",
                    completion.tag
                );
                false
            }
        }
    }

    /// Waits for the next completion and releases its connection
    ///
    /// Returns `None` once every sender is gone.
    pub async fn next_completion(&self, receiver: &mut CompletionReceiver) -> Option<JobCompletion> {
        let completion = receiver.recv().await?;
        self.on_job_finished(&completion);
        Some(completion)
    }

    /// Tags of the jobs whose connections are still open
    pub fn active_jobs(&self) -> Vec<String> {
        let mut tags: Vec<String> = self
            .lock()
            .iter()
            .filter(|(_, c)| !c.was_unbound())
            .map(|(tag, _)| tag.clone())
            .collect();
        tags.sort();
        tags
    }

    pub fn is_active(&self, tag: &str) -> bool {
        self.lock().get(tag).is_some_and(|c| !c.was_unbound())
    }

    /// Connection currently tracked for `tag`
    pub fn connection(&self, tag: &str) -> Option<Arc<JobConnection>> {
        self.lock().get(tag).cloned()
    }

    /// Forgets connections that were finalized by their transport
    ///
    /// Returns how many were dropped.
    pub fn prune_unbound(&self) -> usize {
        let mut connections = self.lock();
        let before = connections.len();
        connections.retain(|tag, c| {
            let unbound = c.was_unbound();
            if unbound {
                warn!("Job '{}' lost its connection", tag);
            }
            !unbound
        });
        before - connections.len()
    }

    /// Stops every tracked job
    pub fn stop_all(&self, need_to_send_result: bool) -> usize {
        let connections: Vec<Arc<JobConnection>> =
            self.lock().drain().map(|(_, c)| c).collect();

        for connection in &connections {
            connection.on_stop_requested(need_to_send_result);
        }

        connections.len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<JobConnection>>> {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
