//! In-process binding transport
//!
//! Binds job connections to workers registered in the same process. Binding
//! callbacks are delivered from tokio tasks, so they race with anything the
//! scheduler does on its own tasks the same way a cross-process transport
//! would.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::error::TransportError;
use crate::transport::{BindingRequest, BindingTransport, ConnectionId, ServiceConnection};
use crate::worker::{JobWorker, WorkerBinder};

struct LocalBinding {
    service: String,
    connection: Arc<dyn ServiceConnection>,
}

type Bindings = Arc<Mutex<HashMap<ConnectionId, LocalBinding>>>;

/// Transport connecting job connections to in-process workers
pub struct LocalTransport {
    services: RwLock<HashMap<String, Arc<dyn JobWorker>>>,
    bindings: Bindings,
    connect_delay: Duration,
}

impl LocalTransport {
    /// Creates a transport that delivers `on_connected` after `connect_delay`
    pub fn new(connect_delay: Duration) -> Self {
        Self {
            services: RwLock::new(HashMap::new()),
            bindings: Arc::new(Mutex::new(HashMap::new())),
            connect_delay,
        }
    }

    /// Registers a worker under a service name, replacing any previous one
    pub fn register_service(&self, name: impl Into<String>, worker: Arc<dyn JobWorker>) {
        let name = name.into();
        let mut services = self.services.write().unwrap_or_else(PoisonError::into_inner);
        if services.insert(name.clone(), worker).is_some() {
            warn!("Replaced worker registered as '{}'", name);
        } else {
            info!("Registered worker service '{}'", name);
        }
    }

    /// Number of bindings currently held
    pub fn active_bindings(&self) -> usize {
        self.lock_bindings().len()
    }

    /// Simulates the abrupt loss of a worker service
    ///
    /// Every binding to `name` is dropped and its connection receives
    /// `on_disconnected`. Returns the number of bindings lost.
    pub fn crash_service(&self, name: &str) -> usize {
        let lost: Vec<(ConnectionId, Arc<dyn ServiceConnection>)> = {
            let mut bindings = self.lock_bindings();
            let ids: Vec<ConnectionId> = bindings
                .iter()
                .filter(|(_, binding)| binding.service == name)
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| bindings.remove(&id).map(|b| (id, b.connection)))
                .collect()
        };

        warn!("Service '{}' lost {} binding(s)", name, lost.len());

        let count = lost.len();
        for (id, connection) in lost {
            debug!("Delivering disconnect for binding {}", id);
            match Handle::try_current() {
                Ok(runtime) => {
                    runtime.spawn(async move { connection.on_disconnected() });
                }
                Err(_) => connection.on_disconnected(),
            }
        }

        count
    }

    fn lock_bindings(&self) -> std::sync::MutexGuard<'_, HashMap<ConnectionId, LocalBinding>> {
        self.bindings.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for LocalTransport {
    fn default() -> Self {
        Self::new(Duration::ZERO)
    }
}

impl BindingTransport for LocalTransport {
    fn request_binding(&self, request: BindingRequest) -> Result<(), TransportError> {
        let runtime = Handle::try_current()
            .map_err(|e| TransportError::Unavailable(format!("no async runtime: {}", e)))?;

        let worker = {
            let services = self.services.read().unwrap_or_else(PoisonError::into_inner);
            services
                .get(&request.service)
                .cloned()
                .ok_or_else(|| TransportError::ServiceNotFound(request.service.clone()))?
        };

        let id = request.id;
        self.lock_bindings().insert(
            id,
            LocalBinding {
                service: request.service.clone(),
                connection: Arc::clone(&request.connection),
            },
        );

        debug!(
            "Binding {} requested for job '{}' on service '{}'",
            id, request.tag, request.service
        );

        let bindings = Arc::clone(&self.bindings);
        let delay = self.connect_delay;
        let connection = request.connection;

        runtime.spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            // A binding released before it completed never connects
            let still_bound = bindings
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .contains_key(&id);
            if !still_bound {
                debug!("Binding {} released before connecting", id);
                return;
            }

            connection.on_connected(WorkerBinder::new(worker).into_handle());
        });

        Ok(())
    }

    fn release_binding(&self, id: ConnectionId) -> Result<(), TransportError> {
        match self.lock_bindings().remove(&id) {
            Some(binding) => {
                debug!("Released binding {} on service '{}'", id, binding.service);
                Ok(())
            }
            None => Err(TransportError::UnknownBinding(id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CallbackProbe, RecordingWorker};

    fn request(service: &str, probe: &Arc<CallbackProbe>) -> BindingRequest {
        BindingRequest {
            id: ConnectionId::new(),
            tag: "tag".to_string(),
            service: service.to_string(),
            connection: probe.clone(),
        }
    }

    fn transport_with_worker() -> LocalTransport {
        let transport = LocalTransport::default();
        transport.register_service("svc", Arc::new(RecordingWorker::default()));
        transport
    }

    #[tokio::test]
    async fn test_binding_connects_asynchronously() {
        let transport = transport_with_worker();
        let probe = Arc::new(CallbackProbe::default());

        transport.request_binding(request("svc", &probe)).unwrap();
        assert_eq!(transport.active_bindings(), 1);

        probe.wait_connected().await;
        assert_eq!(probe.connected_with_worker(), 1);
    }

    #[tokio::test]
    async fn test_unknown_service() {
        let transport = transport_with_worker();
        let probe = Arc::new(CallbackProbe::default());

        let err = transport.request_binding(request("missing", &probe)).unwrap_err();
        assert!(matches!(err, TransportError::ServiceNotFound(name) if name == "missing"));
        assert_eq!(transport.active_bindings(), 0);
    }

    #[tokio::test]
    async fn test_release_before_connect_suppresses_callback() {
        let transport = LocalTransport::new(Duration::from_millis(20));
        transport.register_service("svc", Arc::new(RecordingWorker::default()));
        let probe = Arc::new(CallbackProbe::default());
        let req = request("svc", &probe);
        let id = req.id;

        transport.request_binding(req).unwrap();
        transport.release_binding(id).unwrap();

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(probe.connected_with_worker(), 0);
    }

    #[tokio::test]
    async fn test_release_twice_fails() {
        let transport = transport_with_worker();
        let probe = Arc::new(CallbackProbe::default());
        let req = request("svc", &probe);
        let id = req.id;

        transport.request_binding(req).unwrap();
        assert!(transport.release_binding(id).is_ok());
        assert!(matches!(
            transport.release_binding(id),
            Err(TransportError::UnknownBinding(_))
        ));
    }

    #[tokio::test]
    async fn test_crash_service_disconnects_bindings() {
        let transport = transport_with_worker();
        let probe = Arc::new(CallbackProbe::default());

        transport.request_binding(request("svc", &probe)).unwrap();
        transport.request_binding(request("svc", &probe)).unwrap();

        assert_eq!(transport.crash_service("svc"), 2);
        assert_eq!(transport.active_bindings(), 0);

        probe.wait_disconnected(2).await;
    }

    #[test]
    fn test_request_outside_runtime() {
        let transport = transport_with_worker();
        let probe = Arc::new(CallbackProbe::default());

        let err = transport.request_binding(request("svc", &probe)).unwrap_err();
        assert!(matches!(err, TransportError::Unavailable(_)));
    }
}
