use std::{fmt, str::FromStr};

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::lib::error::{ArcboxError, Result};
use crate::lib::resources::types::{
    ContainerViewModel, ImageViewModel, MachineViewModel, NetworkViewModel, VolumeViewModel,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RestartPolicy {
    #[default]
    #[serde(rename = "no")]
    No,
    #[serde(rename = "always")]
    Always,
    #[serde(rename = "on-failure")]
    OnFailure,
    #[serde(rename = "unless-stopped")]
    UnlessStopped,
}

impl RestartPolicy {
    pub fn label(&self) -> &'static str {
        match self {
            RestartPolicy::No => "no",
            RestartPolicy::Always => "always",
            RestartPolicy::OnFailure => "on-failure",
            RestartPolicy::UnlessStopped => "unless-stopped",
        }
    }

    pub fn all() -> &'static [RestartPolicy] {
        &[
            RestartPolicy::No,
            RestartPolicy::Always,
            RestartPolicy::OnFailure,
            RestartPolicy::UnlessStopped,
        ]
    }
}

impl fmt::Display for RestartPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for RestartPolicy {
    type Err = ArcboxError;

    fn from_str(s: &str) -> Result<Self> {
        RestartPolicy::all()
            .iter()
            .copied()
            .find(|p| p.label() == s)
            .ok_or_else(|| ArcboxError::InvalidRequest(format!("unknown restart policy: {}", s)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Platform {
    #[default]
    #[serde(rename = "auto")]
    Auto,
    #[serde(rename = "linux/amd64")]
    LinuxAmd64,
    #[serde(rename = "linux/arm64")]
    LinuxArm64,
}

impl Platform {
    pub fn label(&self) -> &'static str {
        match self {
            Platform::Auto => "auto",
            Platform::LinuxAmd64 => "linux/amd64",
            Platform::LinuxArm64 => "linux/arm64",
        }
    }

    pub fn all() -> &'static [Platform] {
        &[Platform::Auto, Platform::LinuxAmd64, Platform::LinuxArm64]
    }

    /// Platform string for the engine; `None` lets it pick.
    pub fn engine_value(&self) -> Option<&'static str> {
        match self {
            Platform::Auto => None,
            other => Some(other.label()),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Platform {
    type Err = ArcboxError;

    fn from_str(s: &str) -> Result<Self> {
        Platform::all()
            .iter()
            .copied()
            .find(|p| p.label() == s)
            .ok_or_else(|| ArcboxError::InvalidRequest(format!("unknown platform: {}", s)))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreateContainerSpec {
    pub image: String,
    pub name: Option<String>,
    pub cmd: Option<Vec<String>>,
    pub entrypoint: Option<Vec<String>>,
    pub working_dir: Option<String>,
    pub platform: Platform,
    pub restart_policy: RestartPolicy,
    pub auto_remove: bool,
    pub privileged: bool,
    pub read_only: bool,
    pub init: bool,
    pub start: bool,
}

impl CreateContainerSpec {
    pub fn validate(&self) -> Result<()> {
        if self.image.trim().is_empty() {
            return Err(ArcboxError::InvalidRequest("image is required".to_string()));
        }
        Ok(())
    }
}

/// Raw text fields of the "new container" form.
#[derive(Debug, Clone, Default)]
pub struct ContainerForm {
    pub image: String,
    pub name: String,
    pub command: String,
    pub entrypoint: String,
    pub working_dir: String,
    pub platform: Platform,
    pub restart_policy: RestartPolicy,
    pub remove_after_stop: bool,
    pub privileged: bool,
    pub read_only: bool,
    pub use_init: bool,
}

fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn split_words(value: &str) -> Option<Vec<String>> {
    non_blank(value).map(|v| v.split_whitespace().map(String::from).collect())
}

impl ContainerForm {
    pub fn into_spec(self, start: bool) -> Result<CreateContainerSpec> {
        let spec = CreateContainerSpec {
            image: self.image.trim().to_string(),
            name: non_blank(&self.name),
            cmd: split_words(&self.command),
            entrypoint: split_words(&self.entrypoint),
            working_dir: non_blank(&self.working_dir),
            platform: self.platform,
            restart_policy: self.restart_policy,
            auto_remove: self.remove_after_stop,
            privileged: self.privileged,
            read_only: self.read_only,
            init: self.use_init,
            start,
        };
        spec.validate()?;
        Ok(spec)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateVolumeSpec {
    pub name: String,
    #[serde(default = "default_volume_driver")]
    pub driver: String,
}

fn default_volume_driver() -> String {
    "local".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateNetworkSpec {
    pub name: String,
    #[serde(default = "default_network_driver")]
    pub driver: String,
    #[serde(default)]
    pub internal: bool,
    #[serde(default)]
    pub attachable: bool,
}

fn default_network_driver() -> String {
    "bridge".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateMachineSpec {
    pub name: String,
    pub distro: String,
    pub version: String,
    pub cpu_cores: u32,
    pub memory_gb: u32,
    pub disk_gb: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStreamKind {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    pub stream: LogStreamKind,
    pub content: String,
    /// RFC 3339 timestamp as reported by the engine, when requested.
    pub timestamp: Option<String>,
}

impl LogLine {
    /// Splits an engine line of the form `<rfc3339> <message>`.
    pub fn parse(stream: LogStreamKind, raw: &str, timestamps: bool) -> Self {
        let raw = raw.trim_end_matches(['\r', '\n']);
        if timestamps {
            if let Some((ts, rest)) = raw.split_once(' ') {
                if chrono::DateTime::parse_from_rfc3339(ts).is_ok() {
                    return LogLine {
                        stream,
                        content: rest.to_string(),
                        timestamp: Some(ts.to_string()),
                    };
                }
            }
        }
        LogLine {
            stream,
            content: raw.to_string(),
            timestamp: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogOptions {
    pub follow: bool,
    pub tail: Option<u32>,
    pub timestamps: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        LogOptions {
            follow: false,
            tail: Some(100),
            timestamps: true,
        }
    }
}

pub type LogStream = BoxStream<'static, Result<LogLine>>;

/// Operations a daemon has to offer for the desktop client to be useful.
#[async_trait]
pub trait Backend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn ping(&self) -> Result<()>;

    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerViewModel>>;
    async fn create_container(&self, spec: CreateContainerSpec) -> Result<String>;
    async fn start_container(&self, id: &str) -> Result<()>;
    async fn stop_container(&self, id: &str, timeout_secs: u32) -> Result<()>;
    async fn restart_container(&self, id: &str) -> Result<()>;
    async fn remove_container(&self, id: &str, force: bool) -> Result<()>;
    async fn container_logs(&self, id: &str, options: LogOptions) -> Result<LogStream>;

    async fn list_images(&self) -> Result<Vec<ImageViewModel>>;
    async fn pull_image(&self, reference: &str) -> Result<()>;
    async fn remove_image(&self, id: &str, force: bool) -> Result<()>;

    async fn list_volumes(&self) -> Result<Vec<VolumeViewModel>>;
    async fn create_volume(&self, spec: CreateVolumeSpec) -> Result<VolumeViewModel>;
    async fn remove_volume(&self, name: &str, force: bool) -> Result<()>;

    async fn list_networks(&self) -> Result<Vec<NetworkViewModel>>;
    async fn create_network(&self, spec: CreateNetworkSpec) -> Result<String>;
    async fn remove_network(&self, id: &str) -> Result<()>;

    async fn list_machines(&self) -> Result<Vec<MachineViewModel>>;
    async fn create_machine(&self, spec: CreateMachineSpec) -> Result<String>;
    async fn start_machine(&self, id: &str) -> Result<()>;
    async fn stop_machine(&self, id: &str) -> Result<()>;
    async fn remove_machine(&self, id: &str, force: bool) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_blank_fields_become_none() {
        let form = ContainerForm {
            image: " alpine:latest ".to_string(),
            command: "sh -c  'echo hi'".to_string(),
            working_dir: "   ".to_string(),
            remove_after_stop: true,
            ..Default::default()
        };
        let spec = form.into_spec(true).unwrap();

        assert_eq!(spec.image, "alpine:latest");
        assert_eq!(spec.name, None);
        assert_eq!(
            spec.cmd,
            Some(vec!["sh".to_string(), "-c".to_string(), "'echo".to_string(), "hi'".to_string()])
        );
        assert_eq!(spec.entrypoint, None);
        assert_eq!(spec.working_dir, None);
        assert!(spec.auto_remove);
        assert!(spec.start);
    }

    #[test]
    fn form_requires_image() {
        let err = ContainerForm::default().into_spec(false).unwrap_err();
        assert!(matches!(err, ArcboxError::InvalidRequest(_)));
    }

    #[test]
    fn policies_and_platforms_parse_from_labels() {
        for policy in RestartPolicy::all() {
            assert_eq!(policy.label().parse::<RestartPolicy>().unwrap(), *policy);
        }
        assert_eq!("linux/arm64".parse::<Platform>().unwrap(), Platform::LinuxArm64);
        assert!("windows".parse::<Platform>().is_err());
        assert_eq!(Platform::Auto.engine_value(), None);
        assert_eq!(Platform::LinuxAmd64.engine_value(), Some("linux/amd64"));
    }

    #[test]
    fn spec_json_uses_labels() {
        let spec: CreateContainerSpec = serde_json::from_str(
            r#"{"image":"nginx","restart_policy":"unless-stopped","platform":"linux/amd64"}"#,
        )
        .unwrap();
        assert_eq!(spec.restart_policy, RestartPolicy::UnlessStopped);
        assert_eq!(spec.platform, Platform::LinuxAmd64);
        assert!(!spec.start);
    }

    #[test]
    fn log_lines_split_timestamps() {
        let line = LogLine::parse(
            LogStreamKind::Stdout,
            "2024-05-01T10:00:00.123456789Z server started\n",
            true,
        );
        assert_eq!(line.timestamp.as_deref(), Some("2024-05-01T10:00:00.123456789Z"));
        assert_eq!(line.content, "server started");

        let plain = LogLine::parse(LogStreamKind::Stderr, "no timestamp here", true);
        assert_eq!(plain.timestamp, None);
        assert_eq!(plain.content, "no timestamp here");
    }
}
