use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use bollard::{
    API_DEFAULT_VERSION, Docker,
    container::{
        Config, CreateContainerOptions, ListContainersOptions, LogOutput, LogsOptions,
        RemoveContainerOptions, RestartContainerOptions, StartContainerOptions,
        StopContainerOptions,
    },
    image::{CreateImageOptions, ListImagesOptions, RemoveImageOptions},
    models::{
        ContainerSummary, HostConfig, ImageSummary, Network, RestartPolicy as EngineRestartPolicy,
        RestartPolicyNameEnum, Volume,
    },
    network::{CreateNetworkOptions, ListNetworksOptions},
    volume::{CreateVolumeOptions, ListVolumesOptions, RemoveVolumeOptions},
};
use chrono::{DateTime, TimeZone, Utc};
use futures_util::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, info, warn};

use super::types::{
    Backend, CreateContainerSpec, CreateMachineSpec, CreateNetworkSpec, CreateVolumeSpec,
    LogLine, LogOptions, LogStream, LogStreamKind, RestartPolicy,
};
use crate::lib::error::{ArcboxError, Result};
use crate::lib::resources::types::{
    COMPOSE_PROJECT_LABEL, ContainerState, ContainerViewModel, ImageViewModel, MachineViewModel,
    NetworkViewModel, PortMapping, VolumeViewModel,
};

/// Talks to the daemon's Docker-compatible API over its Unix socket.
#[derive(Debug, Clone)]
pub struct DockerBackend {
    client: Docker,
    socket_path: PathBuf,
}

impl DockerBackend {
    pub fn connect(socket_path: &Path, timeout: Duration) -> Result<Self> {
        let path = socket_path.to_string_lossy();
        let client = Docker::connect_with_unix(&path, timeout.as_secs(), API_DEFAULT_VERSION)?;
        Ok(DockerBackend {
            client,
            socket_path: socket_path.to_path_buf(),
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    async fn container_summaries(&self) -> Result<Vec<ContainerSummary>> {
        Ok(self
            .client
            .list_containers(Some(ListContainersOptions::<String> {
                all: true,
                ..Default::default()
            }))
            .await?)
    }
}

fn unix_time(seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(seconds, 0).single().unwrap_or_else(Utc::now)
}

fn rfc3339_time(value: Option<&str>) -> DateTime<Utc> {
    value
        .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
        .map(|v| v.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}

/// Architecture name as image manifests spell it.
fn host_architecture() -> &'static str {
    match std::env::consts::ARCH {
        "aarch64" => "arm64",
        "x86_64" => "amd64",
        other => other,
    }
}

fn container_name(summary: &ContainerSummary) -> String {
    summary
        .names
        .as_ref()
        .and_then(|names| names.first())
        .map(|name| name.trim_start_matches('/').to_string())
        .unwrap_or_default()
}

impl From<ContainerSummary> for ContainerViewModel {
    fn from(summary: ContainerSummary) -> Self {
        let name = container_name(&summary);
        let ports = summary
            .ports
            .unwrap_or_default()
            .into_iter()
            .filter_map(|port| {
                Some(PortMapping {
                    host_port: port.public_port?,
                    container_port: port.private_port,
                    protocol: port
                        .typ
                        .map(|t| t.to_string())
                        .unwrap_or_else(|| "tcp".to_string()),
                })
            })
            .fold(Vec::<PortMapping>::new(), |mut acc, port| {
                // the engine lists a binding once per host address family
                if !acc.contains(&port) {
                    acc.push(port);
                }
                acc
            });
        let compose_project = summary
            .labels
            .as_ref()
            .and_then(|labels| labels.get(COMPOSE_PROJECT_LABEL))
            .cloned();

        ContainerViewModel {
            id: summary.id.unwrap_or_default(),
            name,
            image: summary.image.unwrap_or_default(),
            state: ContainerState::from_engine(summary.state.as_deref().unwrap_or("exited")),
            ports,
            created_at: unix_time(summary.created.unwrap_or_default()),
            compose_project,
            cpu_percent: 0.0,
            memory_mb: 0.0,
            memory_limit_mb: 0.0,
        }
    }
}

impl From<ImageSummary> for ImageViewModel {
    fn from(summary: ImageSummary) -> Self {
        let (repository, tag) = summary
            .repo_tags
            .iter()
            .find(|rt| rt.as_str() != "<none>:<none>")
            .map(|rt| match rt.rsplit_once(':') {
                Some((repo, tag)) if !tag.contains('/') => (repo.to_string(), tag.to_string()),
                _ => (rt.clone(), "latest".to_string()),
            })
            .unwrap_or_else(|| ("<none>".to_string(), "<none>".to_string()));

        ImageViewModel {
            id: summary.id,
            repository,
            tag,
            size_bytes: summary.size.max(0) as u64,
            created_at: unix_time(summary.created),
            in_use: summary.containers > 0,
            os: "linux".to_string(),
            architecture: host_architecture().to_string(),
        }
    }
}

impl From<Volume> for VolumeViewModel {
    fn from(volume: Volume) -> Self {
        let size_bytes = volume
            .usage_data
            .as_ref()
            .and_then(|usage| u64::try_from(usage.size).ok());
        VolumeViewModel {
            created_at: rfc3339_time(volume.created_at.as_deref()),
            name: volume.name,
            driver: volume.driver,
            mount_point: volume.mountpoint,
            size_bytes,
            in_use: false,
            container_names: vec![],
        }
    }
}

impl From<Network> for NetworkViewModel {
    fn from(network: Network) -> Self {
        NetworkViewModel {
            created_at: rfc3339_time(network.created.as_deref()),
            id: network.id.unwrap_or_default(),
            name: network.name.unwrap_or_default(),
            driver: network.driver.unwrap_or_default(),
            scope: network.scope.unwrap_or_else(|| "local".to_string()),
            internal: network.internal.unwrap_or(false),
            attachable: network.attachable.unwrap_or(false),
            container_count: network.containers.map(|c| c.len()).unwrap_or(0),
        }
    }
}

fn engine_restart_policy(policy: RestartPolicy) -> EngineRestartPolicy {
    let name = match policy {
        RestartPolicy::No => RestartPolicyNameEnum::NO,
        RestartPolicy::Always => RestartPolicyNameEnum::ALWAYS,
        RestartPolicy::OnFailure => RestartPolicyNameEnum::ON_FAILURE,
        RestartPolicy::UnlessStopped => RestartPolicyNameEnum::UNLESS_STOPPED,
    };
    EngineRestartPolicy {
        name: Some(name),
        maximum_retry_count: None,
    }
}

pub fn container_config(spec: &CreateContainerSpec) -> Config<String> {
    let host_config = HostConfig {
        restart_policy: Some(engine_restart_policy(spec.restart_policy)),
        auto_remove: Some(spec.auto_remove),
        privileged: Some(spec.privileged),
        readonly_rootfs: Some(spec.read_only),
        init: spec.init.then_some(true),
        ..Default::default()
    };

    Config {
        image: Some(spec.image.clone()),
        cmd: spec.cmd.clone(),
        entrypoint: spec.entrypoint.clone(),
        working_dir: spec.working_dir.clone(),
        host_config: Some(host_config),
        ..Default::default()
    }
}

/// Treats "already started/stopped" as success.
fn ignore_not_modified(result: std::result::Result<(), bollard::errors::Error>) -> Result<()> {
    match result.map_err(ArcboxError::from) {
        Err(err) if err.is_not_modified() => Ok(()),
        other => other,
    }
}

/// One frame may carry several lines; blank lines are dropped.
fn log_lines(output: LogOutput, timestamps: bool) -> Vec<LogLine> {
    let (stream, message) = match output {
        LogOutput::StdOut { message } | LogOutput::Console { message } => {
            (LogStreamKind::Stdout, message)
        }
        LogOutput::StdErr { message } => (LogStreamKind::Stderr, message),
        LogOutput::StdIn { .. } => return vec![],
    };
    String::from_utf8_lossy(&message)
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| LogLine::parse(stream, line, timestamps))
        .collect()
}

/// Image ids referenced by at least one container.
fn images_in_use(containers: &[ContainerSummary]) -> HashSet<&str> {
    containers
        .iter()
        .filter_map(|c| c.image_id.as_deref())
        .collect()
}

/// Volume name to the names of the containers mounting it.
fn volume_users(containers: &[ContainerSummary]) -> HashMap<String, Vec<String>> {
    let mut users: HashMap<String, Vec<String>> = HashMap::new();
    for container in containers {
        for mount in container.mounts.iter().flatten() {
            if let Some(volume) = &mount.name {
                users
                    .entry(volume.clone())
                    .or_default()
                    .push(container_name(container));
            }
        }
    }
    users
}

/// Network name to the number of attached containers.
fn network_counts(containers: &[ContainerSummary]) -> HashMap<String, usize> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for container in containers {
        let attached = container
            .network_settings
            .as_ref()
            .and_then(|settings| settings.networks.as_ref());
        for name in attached.into_iter().flat_map(|networks| networks.keys()) {
            *counts.entry(name.clone()).or_default() += 1;
        }
    }
    counts
}

#[async_trait]
impl Backend for DockerBackend {
    fn name(&self) -> &'static str {
        "docker"
    }

    async fn ping(&self) -> Result<()> {
        self.client.ping().await?;
        Ok(())
    }

    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerViewModel>> {
        let summaries = self
            .client
            .list_containers(Some(ListContainersOptions::<String> {
                all,
                ..Default::default()
            }))
            .await?;
        debug!("Got {} containers", summaries.len());
        Ok(summaries.into_iter().map(ContainerViewModel::from).collect())
    }

    async fn create_container(&self, spec: CreateContainerSpec) -> Result<String> {
        spec.validate()?;
        self.pull_image(&spec.image).await?;

        // an empty name lets the engine generate one
        let options = CreateContainerOptions {
            name: spec.name.clone().unwrap_or_default(),
            platform: spec.platform.engine_value().map(String::from),
        };
        let response = self
            .client
            .create_container(Some(options), container_config(&spec))
            .await?;
        for warning in &response.warnings {
            warn!("Create container {}: {}", response.id, warning);
        }
        info!("Container created: {}", response.id);

        if spec.start {
            self.start_container(&response.id).await?;
        }
        Ok(response.id)
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        ignore_not_modified(
            self.client
                .start_container(id, None::<StartContainerOptions<String>>)
                .await,
        )?;
        info!("Started container {}", id);
        Ok(())
    }

    async fn stop_container(&self, id: &str, timeout_secs: u32) -> Result<()> {
        ignore_not_modified(
            self.client
                .stop_container(
                    id,
                    Some(StopContainerOptions {
                        t: i64::from(timeout_secs),
                    }),
                )
                .await,
        )?;
        info!("Stopped container {}", id);
        Ok(())
    }

    async fn restart_container(&self, id: &str) -> Result<()> {
        self.client
            .restart_container(id, Some(RestartContainerOptions { t: 10 }))
            .await?;
        info!("Restarted container {}", id);
        Ok(())
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<()> {
        self.client
            .remove_container(
                id,
                Some(RemoveContainerOptions {
                    force,
                    v: false,
                    link: false,
                }),
            )
            .await?;
        info!("Removed container {}", id);
        Ok(())
    }

    async fn container_logs(&self, id: &str, options: LogOptions) -> Result<LogStream> {
        let tail = options
            .tail
            .map(|n| n.to_string())
            .unwrap_or_else(|| "all".to_string());
        let timestamps = options.timestamps;
        let stream = self
            .client
            .logs(
                id,
                Some(LogsOptions::<String> {
                    follow: options.follow,
                    stdout: true,
                    stderr: true,
                    timestamps,
                    tail,
                    ..Default::default()
                }),
            )
            .map_err(ArcboxError::from)
            .map_ok(move |output| {
                stream::iter(log_lines(output, timestamps).into_iter().map(Ok::<_, ArcboxError>))
            })
            .try_flatten();
        Ok(Box::pin(stream))
    }

    async fn list_images(&self) -> Result<Vec<ImageViewModel>> {
        let summaries = self
            .client
            .list_images(Some(ListImagesOptions::<String> {
                all: false,
                ..Default::default()
            }))
            .await?;
        let containers = self.container_summaries().await?;
        let used_ids = images_in_use(&containers);
        debug!("Got {} images", summaries.len());

        Ok(summaries
            .into_iter()
            .map(|summary| {
                let used = used_ids.contains(summary.id.as_str());
                let mut image = ImageViewModel::from(summary);
                image.in_use = image.in_use || used;
                image
            })
            .collect())
    }

    async fn pull_image(&self, reference: &str) -> Result<()> {
        info!("Pulling image: {}", reference);
        let mut stream = self.client.create_image(
            Some(CreateImageOptions {
                from_image: reference.to_string(),
                ..Default::default()
            }),
            None,
            None,
        );

        while let Some(msg) = stream.next().await {
            let info = msg?;
            if let Some(status) = info.status {
                debug!("[pull {}] {}", reference, status);
            }
        }

        info!("Image pulled: {}", reference);
        Ok(())
    }

    async fn remove_image(&self, id: &str, force: bool) -> Result<()> {
        let deleted = self
            .client
            .remove_image(
                id,
                Some(RemoveImageOptions {
                    force,
                    noprune: false,
                }),
                None,
            )
            .await?;
        info!("Removed image {} ({} layers affected)", id, deleted.len());
        Ok(())
    }

    async fn list_volumes(&self) -> Result<Vec<VolumeViewModel>> {
        let response = self
            .client
            .list_volumes(None::<ListVolumesOptions<String>>)
            .await?;
        let mut users = volume_users(&self.container_summaries().await?);

        let volumes: Vec<VolumeViewModel> = response
            .volumes
            .unwrap_or_default()
            .into_iter()
            .map(|volume| {
                let mut model = VolumeViewModel::from(volume);
                model.container_names = users.remove(&model.name).unwrap_or_default();
                model.in_use = !model.container_names.is_empty();
                model
            })
            .collect();
        debug!("Got {} volumes", volumes.len());
        Ok(volumes)
    }

    async fn create_volume(&self, spec: CreateVolumeSpec) -> Result<VolumeViewModel> {
        let volume = self
            .client
            .create_volume(CreateVolumeOptions {
                name: spec.name,
                driver: spec.driver,
                ..Default::default()
            })
            .await?;
        info!("Created volume {}", volume.name);
        Ok(VolumeViewModel::from(volume))
    }

    async fn remove_volume(&self, name: &str, force: bool) -> Result<()> {
        self.client
            .remove_volume(name, Some(RemoveVolumeOptions { force }))
            .await?;
        info!("Removed volume {}", name);
        Ok(())
    }

    async fn list_networks(&self) -> Result<Vec<NetworkViewModel>> {
        let networks = self
            .client
            .list_networks(None::<ListNetworksOptions<String>>)
            .await?;
        let counts = network_counts(&self.container_summaries().await?);

        Ok(networks
            .into_iter()
            .map(|network| {
                let mut model = NetworkViewModel::from(network);
                if let Some(count) = counts.get(&model.name) {
                    model.container_count = model.container_count.max(*count);
                }
                model
            })
            .collect())
    }

    async fn create_network(&self, spec: CreateNetworkSpec) -> Result<String> {
        let response = self
            .client
            .create_network(CreateNetworkOptions {
                name: spec.name.clone(),
                driver: spec.driver,
                internal: spec.internal,
                attachable: spec.attachable,
                ..Default::default()
            })
            .await?;
        let id = response.id;
        info!("Created network {} ({})", spec.name, id);
        Ok(id)
    }

    async fn remove_network(&self, id: &str) -> Result<()> {
        self.client.remove_network(id).await?;
        info!("Removed network {}", id);
        Ok(())
    }

    async fn list_machines(&self) -> Result<Vec<MachineViewModel>> {
        Err(ArcboxError::Unsupported("machines".to_string()))
    }

    async fn create_machine(&self, _spec: CreateMachineSpec) -> Result<String> {
        Err(ArcboxError::Unsupported("machines".to_string()))
    }

    async fn start_machine(&self, _id: &str) -> Result<()> {
        Err(ArcboxError::Unsupported("machines".to_string()))
    }

    async fn stop_machine(&self, _id: &str) -> Result<()> {
        Err(ArcboxError::Unsupported("machines".to_string()))
    }

    async fn remove_machine(&self, _id: &str, _force: bool) -> Result<()> {
        Err(ArcboxError::Unsupported("machines".to_string()))
    }
}
