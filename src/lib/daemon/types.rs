use std::path::PathBuf;
use std::time::Duration;

use crate::lib::config::{ArcboxPaths, Settings};

pub const DAEMON_BINARY: &str = "arcbox";
pub const HEALTH_POLL_INTERVAL: Duration = Duration::from_millis(200);
pub const PING_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DaemonState {
    #[default]
    Stopped,
    Starting,
    Running,
    Failed(String),
}

impl DaemonState {
    pub fn is_running(&self) -> bool {
        matches!(self, DaemonState::Running)
    }

    pub fn label(&self) -> String {
        match self {
            DaemonState::Stopped => "stopped".to_string(),
            DaemonState::Starting => "starting".to_string(),
            DaemonState::Running => "running".to_string(),
            DaemonState::Failed(msg) => format!("failed: {}", msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaemonManagerEvent {
    StateChanged(DaemonState),
}

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub binary: Option<PathBuf>,
    pub socket: PathBuf,
    pub data_dir: PathBuf,
    pub startup_timeout: Duration,
    pub stop_timeout: Duration,
}

impl DaemonConfig {
    pub fn from_settings(settings: &Settings, paths: &ArcboxPaths) -> Self {
        DaemonConfig {
            binary: settings.daemon.binary.clone(),
            socket: settings.docker_socket(paths),
            data_dir: paths.data_dir.clone(),
            startup_timeout: settings.daemon.startup_timeout(),
            stop_timeout: settings.daemon.stop_timeout(),
        }
    }
}
