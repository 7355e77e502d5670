use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::format::{compact_age, decimal_size, optional_size, relative_age};

/// Label the compose CLI puts on every container of a project.
pub const COMPOSE_PROJECT_LABEL: &str = "com.docker.compose.project";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    Running,
    Stopped,
    Restarting,
    Paused,
    Dead,
}

impl ContainerState {
    pub fn is_running(&self) -> bool {
        matches!(self, ContainerState::Running)
    }

    pub fn label(&self) -> &'static str {
        match self {
            ContainerState::Running => "Running",
            ContainerState::Stopped => "Stopped",
            ContainerState::Restarting => "Restarting",
            ContainerState::Paused => "Paused",
            ContainerState::Dead => "Dead",
        }
    }

    /// Maps the engine's state string. `created` and `exited` containers are
    /// both shown as stopped.
    pub fn from_engine(state: &str) -> Self {
        match state.to_ascii_lowercase().as_str() {
            "running" => ContainerState::Running,
            "restarting" => ContainerState::Restarting,
            "paused" => ContainerState::Paused,
            "dead" | "removing" => ContainerState::Dead,
            _ => ContainerState::Stopped,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    pub host_port: u16,
    pub container_port: u16,
    pub protocol: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerViewModel {
    pub id: String,
    pub name: String,
    pub image: String,
    pub state: ContainerState,
    pub ports: Vec<PortMapping>,
    pub created_at: DateTime<Utc>,
    pub compose_project: Option<String>,
    pub cpu_percent: f64,
    pub memory_mb: f64,
    pub memory_limit_mb: f64,
}

impl ContainerViewModel {
    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// "8080:80, 443:443", or "-" with nothing published.
    pub fn ports_display(&self) -> String {
        if self.ports.is_empty() {
            return "-".to_string();
        }
        self.ports
            .iter()
            .map(|p| format!("{}:{}", p.host_port, p.container_port))
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn created_ago(&self) -> String {
        compact_age(self.created_at, Utc::now())
    }

    pub fn repository(&self) -> &str {
        image_repository(&self.image)
    }
}

/// Strips tag and digest from an image reference:
/// `nginx:latest` -> `nginx`, `localhost:5000/app:dev` -> `localhost:5000/app`.
pub fn image_repository(image: &str) -> &str {
    let without_digest = image.split('@').next().unwrap_or(image);
    match without_digest.rfind(':') {
        Some(colon) if !without_digest[colon..].contains('/') => &without_digest[..colon],
        _ => without_digest,
    }
}

/// Containers split by compose project, for collapsible rendering.
#[derive(Debug, Default)]
pub struct ComposeGroups<'a> {
    pub projects: BTreeMap<String, Vec<&'a ContainerViewModel>>,
    pub standalone: Vec<&'a ContainerViewModel>,
}

pub fn group_by_compose<'a>(
    containers: impl IntoIterator<Item = &'a ContainerViewModel>,
) -> ComposeGroups<'a> {
    let mut groups = ComposeGroups::default();
    for container in containers {
        match &container.compose_project {
            Some(project) => groups
                .projects
                .entry(project.clone())
                .or_default()
                .push(container),
            None => groups.standalone.push(container),
        }
    }
    groups
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageViewModel {
    pub id: String,
    pub repository: String,
    pub tag: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    pub in_use: bool,
    pub os: String,
    pub architecture: String,
}

impl ImageViewModel {
    pub fn full_name(&self) -> String {
        if self.repository == "<none>" {
            format!("<none>:{}", self.tag)
        } else {
            format!("{}:{}", self.repository, self.tag)
        }
    }

    pub fn short_id(&self) -> String {
        self.id
            .trim_start_matches("sha256:")
            .chars()
            .take(12)
            .collect()
    }

    pub fn size_display(&self) -> String {
        decimal_size(self.size_bytes)
    }

    pub fn created_ago(&self) -> String {
        relative_age(self.created_at, Utc::now())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageStats {
    pub total_size: u64,
    pub unused_size: u64,
    pub total_count: usize,
    pub unused_count: usize,
}

pub fn calculate_image_stats(images: &[ImageViewModel]) -> ImageStats {
    ImageStats {
        total_size: images.iter().map(|i| i.size_bytes).sum(),
        unused_size: images
            .iter()
            .filter(|i| !i.in_use)
            .map(|i| i.size_bytes)
            .sum(),
        total_count: images.len(),
        unused_count: images.iter().filter(|i| !i.in_use).count(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeViewModel {
    pub name: String,
    pub driver: String,
    pub mount_point: String,
    pub size_bytes: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub in_use: bool,
    pub container_names: Vec<String>,
}

impl VolumeViewModel {
    pub fn size_display(&self) -> String {
        optional_size(self.size_bytes)
    }

    pub fn created_ago(&self) -> String {
        relative_age(self.created_at, Utc::now())
    }

    pub fn usage_display(&self) -> String {
        if !self.in_use {
            return "Unused".to_string();
        }
        match self.container_names.as_slice() {
            [only] => format!("Used by {}", only),
            names => format!("Used by {} containers", names.len()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkViewModel {
    pub id: String,
    pub name: String,
    pub driver: String,
    pub scope: String,
    pub created_at: DateTime<Utc>,
    pub internal: bool,
    pub attachable: bool,
    pub container_count: usize,
}

impl NetworkViewModel {
    pub fn short_id(&self) -> String {
        self.id.chars().take(12).collect()
    }

    pub fn created_ago(&self) -> String {
        relative_age(self.created_at, Utc::now())
    }

    pub fn driver_display(&self) -> String {
        format!("{} ({})", self.driver, self.scope)
    }

    pub fn usage_display(&self) -> String {
        match self.container_count {
            0 => "No containers".to_string(),
            1 => "1 container".to_string(),
            n => format!("{} containers", n),
        }
    }

    /// The networks every engine creates on its own.
    pub fn is_system(&self) -> bool {
        matches!(self.name.as_str(), "bridge" | "host" | "none")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MachineState {
    Running,
    Stopped,
    Starting,
    Stopping,
}

impl MachineState {
    pub fn is_running(&self) -> bool {
        matches!(self, MachineState::Running)
    }

    pub fn label(&self) -> &'static str {
        match self {
            MachineState::Running => "Running",
            MachineState::Stopped => "Stopped",
            MachineState::Starting => "Starting",
            MachineState::Stopping => "Stopping",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistroInfo {
    pub name: String,
    pub version: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineViewModel {
    pub id: String,
    pub name: String,
    pub distro: DistroInfo,
    pub state: MachineState,
    pub cpu_cores: u32,
    pub memory_gb: u32,
    pub disk_gb: u32,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl MachineViewModel {
    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    pub fn resources_display(&self) -> String {
        format!(
            "{} cores, {} GB RAM, {} GB disk",
            self.cpu_cores, self.memory_gb, self.disk_gb
        )
    }
}
