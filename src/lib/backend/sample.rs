use async_trait::async_trait;
use chrono::Utc;
use futures_util::stream;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::types::{
    Backend, CreateContainerSpec, CreateMachineSpec, CreateNetworkSpec, CreateVolumeSpec,
    LogLine, LogOptions, LogStream, LogStreamKind,
};
use crate::lib::error::{ArcboxError, Result};
use crate::lib::resources::{
    fixtures,
    state::{valid_container_transition, valid_machine_transition},
    types::{
        ContainerState, ContainerViewModel, DistroInfo, ImageViewModel, MachineState,
        MachineViewModel, NetworkViewModel, VolumeViewModel, image_repository,
    },
};

struct SampleStore {
    containers: Vec<ContainerViewModel>,
    images: Vec<ImageViewModel>,
    volumes: Vec<VolumeViewModel>,
    networks: Vec<NetworkViewModel>,
    machines: Vec<MachineViewModel>,
}

/// In-memory backend seeded with the sample fixtures.
pub struct SampleBackend {
    store: Mutex<SampleStore>,
}

impl Default for SampleBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleBackend {
    pub fn new() -> Self {
        let now = Utc::now();
        SampleBackend {
            store: Mutex::new(SampleStore {
                containers: fixtures::sample_containers(now),
                images: fixtures::sample_images(now),
                volumes: fixtures::sample_volumes(now),
                networks: fixtures::sample_networks(now),
                machines: fixtures::sample_machines(now),
            }),
        }
    }

    pub fn empty() -> Self {
        SampleBackend {
            store: Mutex::new(SampleStore {
                containers: vec![],
                images: vec![],
                volumes: vec![],
                networks: vec![],
                machines: vec![],
            }),
        }
    }
}

fn short_uuid() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..12].to_string()
}

/// Finds one item by exact key, or by a unique key prefix the way the
/// docker CLI accepts abbreviated ids.
fn resolve<T>(
    items: &[T],
    query: &str,
    kind: &str,
    keys: impl Fn(&T) -> Vec<&str>,
) -> Result<usize> {
    if let Some(index) = items.iter().position(|item| keys(item).contains(&query)) {
        return Ok(index);
    }
    let matches: Vec<usize> = items
        .iter()
        .enumerate()
        .filter_map(|(index, item)| {
            let hit = !query.is_empty() && keys(item).iter().any(|k| k.starts_with(query));
            hit.then_some(index)
        })
        .collect();
    match matches.as_slice() {
        [index] => Ok(*index),
        [] => Err(ArcboxError::NotFound(format!("{} {}", kind, query))),
        _ => Err(ArcboxError::InvalidRequest(format!(
            "{} id {} is ambiguous",
            kind, query
        ))),
    }
}

fn container_keys(c: &ContainerViewModel) -> Vec<&str> {
    vec![c.id.as_str(), c.name.as_str()]
}

fn image_keys(i: &ImageViewModel) -> Vec<&str> {
    vec![i.id.as_str(), i.id.trim_start_matches("sha256:")]
}

fn network_keys(n: &NetworkViewModel) -> Vec<&str> {
    vec![n.id.as_str(), n.name.as_str()]
}

fn machine_keys(m: &MachineViewModel) -> Vec<&str> {
    vec![m.id.as_str(), m.name.as_str()]
}

/// Compose services join `<project>_default`, everything else the default bridge.
fn container_network(c: &ContainerViewModel) -> String {
    match &c.compose_project {
        Some(project) => format!("{}_default", project),
        None => "bridge".to_string(),
    }
}

impl SampleStore {
    fn transition_container(&mut self, id: &str, dst: ContainerState) -> Result<()> {
        let index = resolve(&self.containers, id, "container", container_keys)?;
        let container = &mut self.containers[index];
        if !valid_container_transition(&container.state, &dst) {
            return Err(ArcboxError::InvalidStateTransition(format!(
                "container {} from {:?} to {:?}",
                container.name, container.state, dst
            )));
        }
        info!(
            "Sample container {}: {:?} -> {:?}",
            container.name, container.state, dst
        );
        let was_running = container.is_running();
        container.state = dst;
        if !dst.is_running() {
            container.cpu_percent = 0.0;
            container.memory_mb = 0.0;
        }
        let network = container_network(container);
        match (was_running, dst.is_running()) {
            (false, true) => self.adjust_endpoints(&network, 1),
            (true, false) => self.adjust_endpoints(&network, -1),
            _ => {}
        }
        Ok(())
    }

    /// Only running containers hold an endpoint on their network.
    fn adjust_endpoints(&mut self, network: &str, delta: isize) {
        if let Some(network) = self.networks.iter_mut().find(|n| n.name == network) {
            network.container_count = network.container_count.saturating_add_signed(delta);
        }
    }

    fn add_image(&mut self, reference: &str) {
        let repository = image_repository(reference).to_string();
        let tag = reference
            .strip_prefix(repository.as_str())
            .and_then(|rest| rest.strip_prefix(':'))
            .unwrap_or("latest")
            .to_string();
        if self
            .images
            .iter()
            .any(|i| i.repository == repository && i.tag == tag)
        {
            debug!("Sample image {}:{} already present", repository, tag);
            return;
        }
        self.images.push(ImageViewModel {
            id: format!("sha256:{}", uuid::Uuid::new_v4().simple()),
            repository,
            tag,
            size_bytes: 50_000_000,
            created_at: Utc::now(),
            in_use: false,
            os: "linux".to_string(),
            architecture: "arm64".to_string(),
        });
    }

    fn transition_machine(&mut self, id: &str, path: &[MachineState]) -> Result<()> {
        let index = resolve(&self.machines, id, "machine", machine_keys)?;
        let machine = &mut self.machines[index];
        let mut current = machine.state;
        for dst in path {
            if !valid_machine_transition(&current, dst) {
                return Err(ArcboxError::InvalidStateTransition(format!(
                    "machine {} from {:?} to {:?}",
                    machine.name, current, dst
                )));
            }
            current = *dst;
        }
        info!("Sample machine {}: {:?} -> {:?}", machine.name, machine.state, current);
        machine.state = current;
        machine.ip_address = current
            .is_running()
            .then(|| format!("192.168.64.{}", index + 2));
        Ok(())
    }

    fn refresh_image_usage(&mut self) {
        for image in &mut self.images {
            let full_name = image.full_name();
            image.in_use = self.containers.iter().any(|c| c.image == full_name);
        }
    }
}

#[async_trait]
impl Backend for SampleBackend {
    fn name(&self) -> &'static str {
        "sample"
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerViewModel>> {
        let store = self.store.lock().await;
        Ok(store
            .containers
            .iter()
            .filter(|c| all || c.is_running())
            .cloned()
            .collect())
    }

    async fn create_container(&self, spec: CreateContainerSpec) -> Result<String> {
        spec.validate()?;
        let mut store = self.store.lock().await;

        let name = spec.name.clone().unwrap_or_else(|| format!("sample-{}", &short_uuid()[..6]));
        if store.containers.iter().any(|c| c.name == name) {
            return Err(ArcboxError::Conflict(format!(
                "container name {} is already in use",
                name
            )));
        }

        let image = if image_repository(&spec.image) == spec.image {
            format!("{}:latest", spec.image)
        } else {
            spec.image.clone()
        };

        let container = ContainerViewModel {
            id: short_uuid(),
            name,
            image,
            state: if spec.start {
                ContainerState::Running
            } else {
                ContainerState::Stopped
            },
            ports: vec![],
            created_at: Utc::now(),
            compose_project: None,
            cpu_percent: 0.0,
            memory_mb: 0.0,
            memory_limit_mb: 512.0,
        };
        let id = container.id.clone();
        debug!("Sample container {} created from {}", container.name, container.image);
        // creating pulls a missing image first
        store.add_image(&container.image);
        if container.is_running() {
            store.adjust_endpoints(&container_network(&container), 1);
        }
        store.containers.push(container);
        store.refresh_image_usage();
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        self.store
            .lock()
            .await
            .transition_container(id, ContainerState::Running)
    }

    async fn stop_container(&self, id: &str, _timeout_secs: u32) -> Result<()> {
        self.store
            .lock()
            .await
            .transition_container(id, ContainerState::Stopped)
    }

    async fn restart_container(&self, id: &str) -> Result<()> {
        let mut store = self.store.lock().await;
        let index = resolve(&store.containers, id, "container", container_keys)?;
        if store.containers[index].state == ContainerState::Running {
            store.transition_container(id, ContainerState::Restarting)?;
        }
        store.transition_container(id, ContainerState::Running)
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<()> {
        let mut store = self.store.lock().await;
        let index = resolve(&store.containers, id, "container", container_keys)?;
        let container = &store.containers[index];
        if container.is_running() && !force {
            return Err(ArcboxError::Conflict(format!(
                "container {} is running; stop it or use force",
                container.name
            )));
        }
        let removed = store.containers.remove(index);
        info!("Sample container {} removed", removed.name);
        if removed.is_running() {
            store.adjust_endpoints(&container_network(&removed), -1);
        }
        for volume in &mut store.volumes {
            volume.container_names.retain(|n| n != &removed.name);
            volume.in_use = !volume.container_names.is_empty();
        }
        store.refresh_image_usage();
        Ok(())
    }

    async fn container_logs(&self, id: &str, options: LogOptions) -> Result<LogStream> {
        let store = self.store.lock().await;
        let index = resolve(&store.containers, id, "container", container_keys)?;
        let container = &store.containers[index];

        let started = container.created_at;
        let mut lines: Vec<LogLine> = [
            (LogStreamKind::Stdout, format!("starting {}", container.image)),
            (LogStreamKind::Stdout, "configuration loaded".to_string()),
            (LogStreamKind::Stderr, "warning: no healthcheck configured".to_string()),
            (LogStreamKind::Stdout, format!("{} ready", container.name)),
        ]
        .into_iter()
        .enumerate()
        .map(|(i, (stream, content))| LogLine {
            stream,
            content,
            timestamp: options.timestamps.then(|| {
                (started + chrono::Duration::seconds(i as i64)).to_rfc3339()
            }),
        })
        .collect();

        if let Some(tail) = options.tail {
            let skip = lines.len().saturating_sub(tail as usize);
            lines.drain(..skip);
        }
        Ok(Box::pin(stream::iter(lines.into_iter().map(Ok))))
    }

    async fn list_images(&self) -> Result<Vec<ImageViewModel>> {
        Ok(self.store.lock().await.images.clone())
    }

    async fn pull_image(&self, reference: &str) -> Result<()> {
        if reference.trim().is_empty() {
            return Err(ArcboxError::InvalidRequest("image reference is required".to_string()));
        }
        let mut store = self.store.lock().await;
        store.add_image(reference);
        store.refresh_image_usage();
        Ok(())
    }

    async fn remove_image(&self, id: &str, force: bool) -> Result<()> {
        let mut store = self.store.lock().await;
        let index = resolve(&store.images, id, "image", image_keys)?;
        let image = &store.images[index];
        if image.in_use && !force {
            return Err(ArcboxError::Conflict(format!(
                "image {} is used by a container",
                image.full_name()
            )));
        }
        store.images.remove(index);
        Ok(())
    }

    async fn list_volumes(&self) -> Result<Vec<VolumeViewModel>> {
        Ok(self.store.lock().await.volumes.clone())
    }

    async fn create_volume(&self, spec: CreateVolumeSpec) -> Result<VolumeViewModel> {
        if spec.name.trim().is_empty() {
            return Err(ArcboxError::InvalidRequest("volume name is required".to_string()));
        }
        let mut store = self.store.lock().await;
        if let Some(existing) = store.volumes.iter().find(|v| v.name == spec.name) {
            // the engine treats re-creating a volume as a no-op
            return Ok(existing.clone());
        }
        let volume = VolumeViewModel {
            mount_point: format!("/var/lib/docker/volumes/{}/_data", spec.name),
            name: spec.name,
            driver: spec.driver,
            size_bytes: Some(0),
            created_at: Utc::now(),
            in_use: false,
            container_names: vec![],
        };
        store.volumes.push(volume.clone());
        Ok(volume)
    }

    async fn remove_volume(&self, name: &str, force: bool) -> Result<()> {
        let mut store = self.store.lock().await;
        let index = store
            .volumes
            .iter()
            .position(|v| v.name == name)
            .ok_or_else(|| ArcboxError::NotFound(format!("volume {}", name)))?;
        if store.volumes[index].in_use && !force {
            return Err(ArcboxError::Conflict(format!("volume {} is in use", name)));
        }
        store.volumes.remove(index);
        Ok(())
    }

    async fn list_networks(&self) -> Result<Vec<NetworkViewModel>> {
        Ok(self.store.lock().await.networks.clone())
    }

    async fn create_network(&self, spec: CreateNetworkSpec) -> Result<String> {
        if spec.name.trim().is_empty() {
            return Err(ArcboxError::InvalidRequest("network name is required".to_string()));
        }
        let mut store = self.store.lock().await;
        if store.networks.iter().any(|n| n.name == spec.name) {
            return Err(ArcboxError::Conflict(format!(
                "network with name {} already exists",
                spec.name
            )));
        }
        let id = format!(
            "{}{}",
            uuid::Uuid::new_v4().simple(),
            uuid::Uuid::new_v4().simple()
        );
        store.networks.push(NetworkViewModel {
            id: id.clone(),
            name: spec.name,
            driver: spec.driver,
            scope: "local".to_string(),
            created_at: Utc::now(),
            internal: spec.internal,
            attachable: spec.attachable,
            container_count: 0,
        });
        Ok(id)
    }

    async fn remove_network(&self, id: &str) -> Result<()> {
        let mut store = self.store.lock().await;
        let index = resolve(&store.networks, id, "network", network_keys)?;
        let network = &store.networks[index];
        if network.is_system() {
            return Err(ArcboxError::Conflict(format!(
                "{} is a pre-defined network and cannot be removed",
                network.name
            )));
        }
        if network.container_count > 0 {
            return Err(ArcboxError::Conflict(format!(
                "network {} has active endpoints",
                network.name
            )));
        }
        store.networks.remove(index);
        Ok(())
    }

    async fn list_machines(&self) -> Result<Vec<MachineViewModel>> {
        Ok(self.store.lock().await.machines.clone())
    }

    async fn create_machine(&self, spec: CreateMachineSpec) -> Result<String> {
        if spec.name.trim().is_empty() {
            return Err(ArcboxError::InvalidRequest("machine name is required".to_string()));
        }
        if spec.cpu_cores == 0 || spec.memory_gb == 0 || spec.disk_gb == 0 {
            return Err(ArcboxError::InvalidRequest(
                "machine resources must be non-zero".to_string(),
            ));
        }
        let mut store = self.store.lock().await;
        if store.machines.iter().any(|m| m.name == spec.name) {
            return Err(ArcboxError::Conflict(format!(
                "machine {} already exists",
                spec.name
            )));
        }
        let id = format!("m-{}", short_uuid());
        let display_name = format!("{} {}", capitalize(&spec.distro), spec.version);
        store.machines.push(MachineViewModel {
            id: id.clone(),
            name: spec.name,
            distro: DistroInfo {
                name: spec.distro,
                version: spec.version,
                display_name,
            },
            state: MachineState::Stopped,
            cpu_cores: spec.cpu_cores,
            memory_gb: spec.memory_gb,
            disk_gb: spec.disk_gb,
            ip_address: None,
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn start_machine(&self, id: &str) -> Result<()> {
        self.store
            .lock()
            .await
            .transition_machine(id, &[MachineState::Starting, MachineState::Running])
    }

    async fn stop_machine(&self, id: &str) -> Result<()> {
        self.store
            .lock()
            .await
            .transition_machine(id, &[MachineState::Stopping, MachineState::Stopped])
    }

    async fn remove_machine(&self, id: &str, force: bool) -> Result<()> {
        let mut store = self.store.lock().await;
        let index = resolve(&store.machines, id, "machine", machine_keys)?;
        let machine = &store.machines[index];
        if machine.state != MachineState::Stopped && !force {
            return Err(ArcboxError::Conflict(format!(
                "machine {} is {}; stop it or use force",
                machine.name,
                machine.state.label().to_lowercase()
            )));
        }
        store.machines.remove(index);
        Ok(())
    }
}

fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn stop_then_start_container() {
        let backend = SampleBackend::new();
        backend.stop_container("nginx", 10).await.unwrap();
        let running = backend.list_containers(false).await.unwrap();
        assert!(running.iter().all(|c| c.name != "nginx"));

        backend.start_container("a1b2").await.unwrap();
        let all = backend.list_containers(true).await.unwrap();
        let nginx = all.iter().find(|c| c.name == "nginx").unwrap();
        assert_eq!(nginx.state, ContainerState::Running);
    }

    #[tokio::test]
    async fn removing_running_container_needs_force() {
        let backend = SampleBackend::new();
        let err = backend.remove_container("redis", false).await.unwrap_err();
        assert!(matches!(err, ArcboxError::Conflict(_)));

        backend.remove_container("redis", true).await.unwrap();
        let all = backend.list_containers(true).await.unwrap();
        assert!(all.iter().all(|c| c.name != "redis"));

        let volumes = backend.list_volumes().await.unwrap();
        let redis_volume = volumes.iter().find(|v| v.name == "my-project_redis").unwrap();
        assert!(!redis_volume.in_use);
    }

    #[tokio::test]
    async fn unknown_and_ambiguous_ids() {
        let backend = SampleBackend::new();
        assert!(matches!(
            backend.start_container("zzz").await.unwrap_err(),
            ArcboxError::NotFound(_)
        ));
        // every sample image id carries the digest prefix
        assert!(matches!(
            backend.remove_image("sha256:", true).await.unwrap_err(),
            ArcboxError::InvalidRequest(_)
        ));
    }

    #[tokio::test]
    async fn create_container_marks_image_in_use() {
        let backend = SampleBackend::new();
        let alpine_in_use = |images: &[ImageViewModel]| {
            images
                .iter()
                .find(|i| i.repository == "alpine")
                .map(|i| i.in_use)
        };
        assert_eq!(alpine_in_use(&backend.list_images().await.unwrap()), Some(false));

        let spec = CreateContainerSpec {
            image: "alpine:3.19".to_string(),
            name: Some("shell".to_string()),
            start: true,
            ..Default::default()
        };
        let id = backend.create_container(spec.clone()).await.unwrap();
        assert_eq!(id.len(), 12);
        assert_eq!(alpine_in_use(&backend.list_images().await.unwrap()), Some(true));

        let err = backend.create_container(spec).await.unwrap_err();
        assert!(matches!(err, ArcboxError::Conflict(_)));

        let err = backend.remove_image("9e6b8d7f", false).await.unwrap_err();
        assert!(matches!(err, ArcboxError::Conflict(_)));
    }

    #[tokio::test]
    async fn logs_respect_tail() {
        let backend = SampleBackend::new();
        let options = LogOptions {
            tail: Some(2),
            timestamps: false,
            follow: false,
        };
        let lines: Vec<LogLine> = backend
            .container_logs("postgres", options)
            .await
            .unwrap()
            .map(|line| line.unwrap())
            .collect()
            .await;
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1].content, "postgres ready");
        assert!(lines.iter().all(|l| l.timestamp.is_none()));
    }

    #[tokio::test]
    async fn machine_lifecycle() {
        let backend = SampleBackend::new();
        let id = backend
            .create_machine(CreateMachineSpec {
                name: "debian".to_string(),
                distro: "debian".to_string(),
                version: "12".to_string(),
                cpu_cores: 2,
                memory_gb: 4,
                disk_gb: 32,
            })
            .await
            .unwrap();

        let err = backend.stop_machine(&id).await.unwrap_err();
        assert!(matches!(err, ArcboxError::InvalidStateTransition(_)));

        backend.start_machine(&id).await.unwrap();
        let machines = backend.list_machines().await.unwrap();
        let debian = machines.iter().find(|m| m.id == id).unwrap();
        assert!(debian.is_running());
        assert!(debian.ip_address.is_some());
        assert_eq!(debian.distro.display_name, "Debian 12");

        let err = backend.remove_machine(&id, false).await.unwrap_err();
        assert!(matches!(err, ArcboxError::Conflict(_)));
        backend.stop_machine(&id).await.unwrap();
        backend.remove_machine(&id, false).await.unwrap();
        assert_eq!(backend.list_machines().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn system_networks_are_protected() {
        let backend = SampleBackend::new();
        assert!(matches!(
            backend.remove_network("bridge").await.unwrap_err(),
            ArcboxError::Conflict(_)
        ));
        let id = backend
            .create_network(CreateNetworkSpec {
                name: "backend".to_string(),
                driver: "bridge".to_string(),
                internal: true,
                attachable: false,
            })
            .await
            .unwrap();
        assert_eq!(id.len(), 64);
        backend.remove_network("backend").await.unwrap();
    }

    #[tokio::test]
    async fn pull_adds_image_once() {
        let backend = SampleBackend::empty();
        backend.pull_image("busybox").await.unwrap();
        backend.pull_image("busybox:latest").await.unwrap();
        let images = backend.list_images().await.unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].full_name(), "busybox:latest");
    }

    #[tokio::test]
    async fn removing_compose_services_frees_project_network() {
        let backend = SampleBackend::new();
        let project_count = |networks: &[NetworkViewModel]| {
            networks
                .iter()
                .find(|n| n.name == "my-project_default")
                .map(|n| n.container_count)
        };
        assert!(matches!(
            backend.remove_network("my-project_default").await.unwrap_err(),
            ArcboxError::Conflict(_)
        ));

        backend.stop_container("nginx", 10).await.unwrap();
        assert_eq!(project_count(&backend.list_networks().await.unwrap()), Some(2));

        for name in ["nginx", "postgres", "redis"] {
            backend.remove_container(name, true).await.unwrap();
        }
        assert_eq!(project_count(&backend.list_networks().await.unwrap()), Some(0));
        backend.remove_network("my-project_default").await.unwrap();
    }

    #[tokio::test]
    async fn create_registers_missing_image() {
        let backend = SampleBackend::new();
        backend
            .create_container(CreateContainerSpec {
                image: "busybox".to_string(),
                start: true,
                ..Default::default()
            })
            .await
            .unwrap();
        let images = backend.list_images().await.unwrap();
        let busybox = images.iter().find(|i| i.full_name() == "busybox:latest").unwrap();
        assert!(busybox.in_use);

        let networks = backend.list_networks().await.unwrap();
        let bridge = networks.iter().find(|n| n.name == "bridge").unwrap();
        assert_eq!(bridge.container_count, 2);
    }
}
