use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{RwLock, broadcast};
use tracing::{debug, error, info, warn};

use super::types::{ConnectionState, DaemonEvent};
use crate::lib::backend::{
    docker::DockerBackend,
    types::{Backend, CreateContainerSpec},
};
use crate::lib::error::{ArcboxError, Result};
use crate::lib::resources::types::{
    ContainerViewModel, ImageViewModel, MachineViewModel, NetworkViewModel, VolumeViewModel,
};

const EVENT_CAPACITY: usize = 64;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Client-side handle on the daemon: owns the connection and fans results
/// out to subscribers as [`DaemonEvent`]s.
pub struct DaemonService {
    socket_path: PathBuf,
    state: RwLock<ConnectionState>,
    backend: RwLock<Option<Arc<dyn Backend>>>,
    events: broadcast::Sender<DaemonEvent>,
}

impl DaemonService {
    pub fn new(socket_path: PathBuf) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        DaemonService {
            socket_path,
            state: RwLock::new(ConnectionState::Disconnected),
            backend: RwLock::new(None),
            events,
        }
    }

    /// A service that is already connected to the given backend.
    pub fn with_backend(backend: Arc<dyn Backend>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        DaemonService {
            socket_path: PathBuf::new(),
            state: RwLock::new(ConnectionState::Connected),
            backend: RwLock::new(Some(backend)),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DaemonEvent> {
        self.events.subscribe()
    }

    pub async fn state(&self) -> ConnectionState {
        self.state.read().await.clone()
    }

    pub async fn is_connected(&self) -> bool {
        matches!(*self.state.read().await, ConnectionState::Connected)
    }

    fn emit(&self, event: DaemonEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    async fn set_state(&self, state: ConnectionState) {
        let mut current = self.state.write().await;
        if *current != state {
            info!("Daemon connection: {:?} -> {:?}", *current, state);
            *current = state.clone();
            drop(current);
            self.emit(DaemonEvent::ConnectionChanged(state));
        }
    }

    pub async fn connect(&self) -> Result<()> {
        {
            let mut state = self.state.write().await;
            if matches!(*state, ConnectionState::Connecting | ConnectionState::Connected) {
                return Ok(());
            }
            *state = ConnectionState::Connecting;
        }
        self.emit(DaemonEvent::ConnectionChanged(ConnectionState::Connecting));

        let result = match DockerBackend::connect(&self.socket_path, CONNECT_TIMEOUT) {
            Ok(backend) => backend.ping().await.map(|_| backend),
            Err(e) => Err(e),
        };

        match result {
            Ok(backend) => {
                info!("Connected to daemon at {}", self.socket_path.display());
                *self.backend.write().await = Some(Arc::new(backend));
                self.set_state(ConnectionState::Connected).await;
                Ok(())
            }
            Err(e) => {
                error!("Failed to connect to daemon: {}", e);
                self.set_state(ConnectionState::Error(e.to_string())).await;
                Err(e)
            }
        }
    }

    pub async fn disconnect(&self) {
        *self.backend.write().await = None;
        self.set_state(ConnectionState::Disconnected).await;
    }

    async fn backend(&self) -> Result<Arc<dyn Backend>> {
        match self.backend.read().await.as_ref() {
            Some(backend) => Ok(backend.clone()),
            None => {
                warn!("Not connected to daemon");
                Err(ArcboxError::NotConnected)
            }
        }
    }

    fn report<T>(&self, what: &str, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            error!("Failed to {}: {}", what, e);
            self.emit(DaemonEvent::OperationFailed(format!("Failed to {}: {}", what, e)));
        }
        result
    }

    pub async fn list_containers(&self, all: bool) -> Result<Vec<ContainerViewModel>> {
        let backend = self.backend().await?;
        let containers = self.report("list containers", backend.list_containers(all).await)?;
        debug!("Got {} containers", containers.len());
        self.emit(DaemonEvent::ContainersLoaded(containers.clone()));
        Ok(containers)
    }

    pub async fn list_images(&self) -> Result<Vec<ImageViewModel>> {
        let backend = self.backend().await?;
        let images = self.report("list images", backend.list_images().await)?;
        debug!("Got {} images", images.len());
        self.emit(DaemonEvent::ImagesLoaded(images.clone()));
        Ok(images)
    }

    pub async fn list_volumes(&self) -> Result<Vec<VolumeViewModel>> {
        let backend = self.backend().await?;
        let volumes = self.report("list volumes", backend.list_volumes().await)?;
        self.emit(DaemonEvent::VolumesLoaded(volumes.clone()));
        Ok(volumes)
    }

    pub async fn list_networks(&self) -> Result<Vec<NetworkViewModel>> {
        let backend = self.backend().await?;
        let networks = self.report("list networks", backend.list_networks().await)?;
        self.emit(DaemonEvent::NetworksLoaded(networks.clone()));
        Ok(networks)
    }

    pub async fn list_machines(&self) -> Result<Vec<MachineViewModel>> {
        let backend = self.backend().await?;
        let machines = self.report("list machines", backend.list_machines().await)?;
        self.emit(DaemonEvent::MachinesLoaded(machines.clone()));
        Ok(machines)
    }

    /// Re-lists all containers after a mutation. A failed refresh is already
    /// reported as an event and does not fail the mutation itself.
    async fn refresh_containers(&self) {
        let _ = self.list_containers(true).await;
    }

    pub async fn create_container(&self, spec: CreateContainerSpec) -> Result<String> {
        let backend = self.backend().await?;
        info!(
            "Creating container: image={}, name={:?}, start={}",
            spec.image, spec.name, spec.start
        );
        let id = self.report("create container", backend.create_container(spec).await)?;
        self.emit(DaemonEvent::ContainerCreated(id.clone()));
        self.refresh_containers().await;
        Ok(id)
    }

    pub async fn start_container(&self, id: &str) -> Result<()> {
        let backend = self.backend().await?;
        self.report("start container", backend.start_container(id).await)?;
        self.emit(DaemonEvent::ContainerStarted(id.to_string()));
        self.refresh_containers().await;
        Ok(())
    }

    pub async fn stop_container(&self, id: &str, timeout_secs: u32) -> Result<()> {
        let backend = self.backend().await?;
        self.report(
            "stop container",
            backend.stop_container(id, timeout_secs).await,
        )?;
        self.emit(DaemonEvent::ContainerStopped(id.to_string()));
        self.refresh_containers().await;
        Ok(())
    }

    pub async fn restart_container(&self, id: &str) -> Result<()> {
        let backend = self.backend().await?;
        self.report("restart container", backend.restart_container(id).await)?;
        self.emit(DaemonEvent::ContainerStarted(id.to_string()));
        self.refresh_containers().await;
        Ok(())
    }

    pub async fn remove_container(&self, id: &str, force: bool) -> Result<()> {
        let backend = self.backend().await?;
        self.report("remove container", backend.remove_container(id, force).await)?;
        self.emit(DaemonEvent::ContainerRemoved(id.to_string()));
        self.refresh_containers().await;
        Ok(())
    }

    /// Direct access for operations that have no event, such as log streaming.
    pub async fn connected_backend(&self) -> Result<Arc<dyn Backend>> {
        self.backend().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lib::backend::sample::SampleBackend;

    fn drain(rx: &mut broadcast::Receiver<DaemonEvent>) -> Vec<DaemonEvent> {
        let mut events = vec![];
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn operations_fail_when_disconnected() {
        let service = DaemonService::new(PathBuf::from("/nonexistent/docker.sock"));
        assert_eq!(service.state().await, ConnectionState::Disconnected);
        assert!(matches!(
            service.list_containers(true).await.unwrap_err(),
            ArcboxError::NotConnected
        ));
    }

    #[tokio::test]
    async fn connect_to_missing_socket_ends_in_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let service = DaemonService::new(dir.path().join("docker.sock"));
        let mut rx = service.subscribe();

        assert!(service.connect().await.is_err());
        assert!(matches!(service.state().await, ConnectionState::Error(_)));

        let events = drain(&mut rx);
        assert!(matches!(
            events.first(),
            Some(DaemonEvent::ConnectionChanged(ConnectionState::Connecting))
        ));
        assert!(matches!(
            events.last(),
            Some(DaemonEvent::ConnectionChanged(ConnectionState::Error(_)))
        ));
    }

    #[tokio::test]
    async fn start_emits_event_and_refreshes() {
        let service = DaemonService::with_backend(Arc::new(SampleBackend::new()));
        let mut rx = service.subscribe();

        service.start_container("old-service").await.unwrap();
        let events = drain(&mut rx);
        assert!(matches!(&events[0], DaemonEvent::ContainerStarted(id) if id == "old-service"));
        match &events[1] {
            DaemonEvent::ContainersLoaded(containers) => {
                assert!(containers.iter().all(|c| c.is_running()));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn failures_are_broadcast() {
        let service = DaemonService::with_backend(Arc::new(SampleBackend::new()));
        let mut rx = service.subscribe();

        assert!(service.remove_container("nginx", false).await.is_err());
        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            DaemonEvent::OperationFailed(msg) if msg.starts_with("Failed to remove container")
        ));
    }

    #[tokio::test]
    async fn disconnect_drops_backend() {
        let service = DaemonService::with_backend(Arc::new(SampleBackend::new()));
        assert!(service.is_connected().await);
        service.disconnect().await;
        assert!(!service.is_connected().await);
        assert!(service.list_images().await.is_err());
    }
}
