//! Recording fakes shared by unit tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tether_core::{JobInvocation, Trigger};

use crate::error::TransportError;
use crate::transport::{BindingRequest, BindingTransport, ConnectionId, ServiceConnection};
use crate::worker::{BinderHandle, JobCallback, JobMessage, JobWorker, WorkerBinder};

pub fn test_job(tag: &str) -> Arc<JobInvocation> {
    Arc::new(
        JobInvocation::builder()
            .tag(tag)
            .service("test-service")
            .trigger(Trigger::now())
            .build()
            .unwrap(),
    )
}

pub fn test_message() -> JobMessage {
    let (callback, _receiver) = JobCallback::channel();
    JobMessage::new(callback)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    Start(String),
    Stop(String, bool),
}

/// Worker that only records the commands it receives
#[derive(Default)]
pub struct RecordingWorker {
    events: Mutex<Vec<WorkerEvent>>,
}

impl RecordingWorker {
    pub fn events(&self) -> Vec<WorkerEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn starts(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, WorkerEvent::Start(_)))
            .count()
    }

    pub fn stops(&self) -> Vec<bool> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                WorkerEvent::Stop(_, result) => Some(result),
                WorkerEvent::Start(_) => None,
            })
            .collect()
    }
}

impl JobWorker for RecordingWorker {
    fn start(&self, job: &JobInvocation, _message: JobMessage) {
        self.events
            .lock()
            .unwrap()
            .push(WorkerEvent::Start(job.tag.clone()));
    }

    fn stop(&self, job: &JobInvocation, need_to_send_result: bool) {
        self.events
            .lock()
            .unwrap()
            .push(WorkerEvent::Stop(job.tag.clone(), need_to_send_result));
    }
}

/// Transport that records requests and releases without connecting anything
#[derive(Default)]
pub struct RecordingTransport {
    requests: Mutex<Vec<ConnectionId>>,
    releases: Mutex<Vec<ConnectionId>>,
    fail_request: bool,
    fail_release: bool,
}

impl RecordingTransport {
    pub fn failing_request() -> Self {
        Self {
            fail_request: true,
            ..Self::default()
        }
    }

    pub fn failing_release() -> Self {
        Self {
            fail_release: true,
            ..Self::default()
        }
    }

    pub fn requests(&self) -> Vec<ConnectionId> {
        self.requests.lock().unwrap().clone()
    }

    pub fn releases(&self) -> Vec<ConnectionId> {
        self.releases.lock().unwrap().clone()
    }
}

impl BindingTransport for RecordingTransport {
    fn request_binding(&self, request: BindingRequest) -> Result<(), TransportError> {
        self.requests.lock().unwrap().push(request.id);
        if self.fail_request {
            return Err(TransportError::ServiceNotFound(request.service));
        }
        Ok(())
    }

    fn release_binding(&self, id: ConnectionId) -> Result<(), TransportError> {
        self.releases.lock().unwrap().push(id);
        if self.fail_release {
            return Err(TransportError::UnknownBinding(id));
        }
        Ok(())
    }
}

/// Service connection that counts the callbacks it receives
#[derive(Default)]
pub struct CallbackProbe {
    connected: AtomicUsize,
    disconnected: AtomicUsize,
}

impl CallbackProbe {
    pub fn connected_with_worker(&self) -> usize {
        self.connected.load(Ordering::SeqCst)
    }

    pub async fn wait_connected(&self) {
        wait_until(|| self.connected.load(Ordering::SeqCst) > 0).await;
    }

    pub async fn wait_disconnected(&self, count: usize) {
        wait_until(|| self.disconnected.load(Ordering::SeqCst) >= count).await;
    }
}

impl ServiceConnection for CallbackProbe {
    fn on_connected(&self, handle: BinderHandle) {
        if WorkerBinder::extract(&handle).is_some() {
            self.connected.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn on_disconnected(&self) {
        self.disconnected.fetch_add(1, Ordering::SeqCst);
    }
}

/// Polls `condition` until it holds, failing the test after five seconds
pub async fn wait_until(condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
