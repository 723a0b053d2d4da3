//! Task worker
//!
//! Runs each started job as a tokio task and reports its result through the
//! job's callback. A job is reported exactly once: either by the task when it
//! finishes, or by `stop` when the caller asked for a result.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use tether_core::{JobInvocation, JobResult};
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::worker::{JobCallback, JobMessage, JobWorker};

type JobFuture = Pin<Box<dyn Future<Output = JobResult> + Send>>;
type JobFn = Arc<dyn Fn(JobInvocation) -> JobFuture + Send + Sync>;

struct RunningJob {
    run_id: Uuid,
    abort: AbortHandle,
    callback: JobCallback,
}

/// Worker that executes jobs with an async function on the tokio runtime
pub struct TaskWorker {
    name: String,
    job_fn: JobFn,
    running: Arc<Mutex<HashMap<String, RunningJob>>>,
}

impl TaskWorker {
    /// Creates a worker that runs `job_fn` for every started job
    pub fn new<F, Fut>(name: impl Into<String>, job_fn: F) -> Self
    where
        F: Fn(JobInvocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = JobResult> + Send + 'static,
    {
        let job_fn: JobFn = Arc::new(move |job| Box::pin(job_fn(job)) as JobFuture);
        Self {
            name: name.into(),
            job_fn,
            running: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Tags of the jobs currently running
    pub fn running_jobs(&self) -> Vec<String> {
        let running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        running.keys().cloned().collect()
    }

    pub fn is_running(&self, tag: &str) -> bool {
        let running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        running.contains_key(tag)
    }
}

impl JobWorker for TaskWorker {
    fn start(&self, job: &JobInvocation, message: JobMessage) {
        let callback = message.into_callback();

        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                error!("Worker '{}' cannot run job '{}': {}", self.name, job.tag, e);
                callback.report(job, JobResult::FailRetry);
                return;
            }
        };

        // The lock is held until the entry is inserted so the task cannot
        // finish and look for its entry before it exists.
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if running.contains_key(&job.tag) {
            drop(running);
            warn!(
                connection_id = ?callback.connection_id(),
                "Worker '{}' is already running job '{}', rejecting start",
                self.name, job.tag
            );
            callback.report(job, JobResult::FailRetry);
            return;
        }

        let run_id = Uuid::new_v4();
        let job_future = (self.job_fn)(job.clone());
        let registry = Arc::clone(&self.running);
        let tag = job.tag.clone();
        let job = job.clone();

        let handle = runtime.spawn(async move {
            let result = job_future.await;

            let finished = {
                let mut running = registry.lock().unwrap_or_else(PoisonError::into_inner);
                match running.get(&job.tag) {
                    Some(entry) if entry.run_id == run_id => running.remove(&job.tag),
                    _ => None,
                }
            };

            match finished {
                Some(entry) => {
                    info!("Job '{}' finished with result {}", job.tag, result);
                    entry.callback.report(&job, result);
                }
                None => debug!("Job '{}' finished after being stopped", job.tag),
            }
        });

        running.insert(
            tag.clone(),
            RunningJob {
                run_id,
                abort: handle.abort_handle(),
                callback,
            },
        );

        info!("Worker '{}' started job '{}'", self.name, tag);
    }

    fn stop(&self, job: &JobInvocation, need_to_send_result: bool) {
        let entry = {
            let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
            running.remove(&job.tag)
        };

        let Some(entry) = entry else {
            debug!(
                "Worker '{}' asked to stop job '{}' which is not running",
                self.name, job.tag
            );
            return;
        };

        entry.abort.abort();
        info!("Worker '{}' stopped job '{}'", self.name, job.tag);

        if need_to_send_result {
            entry.callback.report(job, JobResult::FailRetry);
        }
    }
}

impl std::fmt::Debug for TaskWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskWorker")
            .field("name", &self.name)
            .field("running", &self.running_jobs())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_job;
    use crate::transport::ConnectionId;
    use std::time::Duration;
    use tokio::time::timeout;

    fn message() -> (JobMessage, crate::worker::CompletionReceiver) {
        let (callback, receiver) = JobCallback::channel();
        (JobMessage::new(callback), receiver)
    }

    fn sleeping_worker() -> TaskWorker {
        TaskWorker::new("sleeper", |_job| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            JobResult::Success
        })
    }

    #[tokio::test]
    async fn test_completed_job_reports_result() {
        let worker = TaskWorker::new("echo", |job: JobInvocation| async move {
            if job.extra("fail").is_some() {
                JobResult::FailNoRetry
            } else {
                JobResult::Success
            }
        });
        let (message, mut receiver) = message();

        worker.start(&test_job("echo"), message);

        let completion = timeout(Duration::from_secs(5), receiver.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(completion.tag, "echo");
        assert_eq!(completion.result, JobResult::Success);
        assert!(!worker.is_running("echo"));
    }

    #[tokio::test]
    async fn test_stop_with_result_reports_retry() {
        let worker = sleeping_worker();
        let (message, mut receiver) = message();
        let job = test_job("long");

        worker.start(&job, message);
        assert!(worker.is_running("long"));

        worker.stop(&job, true);
        assert!(!worker.is_running("long"));

        let completion = receiver.try_recv().unwrap();
        assert_eq!(completion.result, JobResult::FailRetry);
    }

    #[tokio::test]
    async fn test_stop_without_result_is_silent() {
        let worker = sleeping_worker();
        let (message, mut receiver) = message();
        let job = test_job("quiet");

        worker.start(&job, message);
        worker.stop(&job, false);

        // Let the aborted task wind down; nothing may be reported
        tokio::task::yield_now().await;
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_duplicate_start_rejected_with_retry() {
        let worker = sleeping_worker();
        let (callback, mut receiver) = JobCallback::channel();
        let first_id = ConnectionId::new();
        let second_id = ConnectionId::new();
        let job = test_job("dup");

        worker.start(&job, JobMessage::new(callback.for_connection(first_id)));
        worker.start(&job, JobMessage::new(callback.for_connection(second_id)));
        assert_eq!(worker.running_jobs(), vec!["dup".to_string()]);

        // Only the rejected start hears back, under its own connection
        let rejected = receiver.try_recv().unwrap();
        assert_eq!(rejected.result, JobResult::FailRetry);
        assert_eq!(rejected.connection_id, Some(second_id));
        assert!(receiver.try_recv().is_err());

        // The first run is untouched and still answers to its own connection
        worker.stop(&job, true);
        assert_eq!(receiver.try_recv().unwrap().connection_id, Some(first_id));
    }

    #[test]
    fn test_start_outside_runtime_reports_retry() {
        let worker = sleeping_worker();
        let (message, mut receiver) = message();

        worker.start(&test_job("no-runtime"), message);

        assert_eq!(receiver.try_recv().unwrap().result, JobResult::FailRetry);
        assert!(!worker.is_running("no-runtime"));
    }
}
