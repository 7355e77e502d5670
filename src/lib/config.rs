//! On-disk locations and persisted desktop settings.
//!
//! Everything lives under `~/.arcbox/`, the daemon's own default data
//! directory:
//! - `docker.sock` - Docker-compatible API socket
//! - `arcbox.sock` - native RPC socket
//! - `desktop.json` - settings written by this client

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::lib::error::{ArcboxError, Result};

const DATA_DIR_NAME: &str = ".arcbox";
const SETTINGS_FILE: &str = "desktop.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArcboxPaths {
    pub data_dir: PathBuf,
}

impl Default for ArcboxPaths {
    fn default() -> Self {
        let base = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/tmp"));
        ArcboxPaths {
            data_dir: base.join(DATA_DIR_NAME),
        }
    }
}

impl ArcboxPaths {
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        ArcboxPaths {
            data_dir: data_dir.into(),
        }
    }

    /// Docker API socket, also answers the `/_ping` health check.
    pub fn docker_socket(&self) -> PathBuf {
        self.data_dir.join("docker.sock")
    }

    pub fn grpc_socket(&self) -> PathBuf {
        self.data_dir.join("arcbox.sock")
    }

    pub fn settings_file(&self) -> PathBuf {
        self.data_dir.join(SETTINGS_FILE)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateChannel {
    #[default]
    Stable,
    Beta,
    Nightly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TerminalTheme {
    #[default]
    System,
    Light,
    Dark,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExternalTerminal {
    #[default]
    LastUsed,
    Terminal,
    #[serde(rename = "iterm2")]
    ITerm2,
    Warp,
    Alacritty,
}

impl ExternalTerminal {
    pub fn label(&self) -> &'static str {
        match self {
            ExternalTerminal::LastUsed => "Last used",
            ExternalTerminal::Terminal => "Terminal",
            ExternalTerminal::ITerm2 => "iTerm2",
            ExternalTerminal::Warp => "Warp",
            ExternalTerminal::Alacritty => "Alacritty",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    pub start_at_login: bool,
    pub show_in_menu_bar: bool,
    pub keep_running_when_quit: bool,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        GeneralSettings {
            start_at_login: true,
            show_in_menu_bar: false,
            keep_running_when_quit: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateSettings {
    pub auto_download: bool,
    pub channel: UpdateChannel,
}

impl Default for UpdateSettings {
    fn default() -> Self {
        UpdateSettings {
            auto_download: true,
            channel: UpdateChannel::Stable,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalSettings {
    pub theme: TerminalTheme,
    pub external: ExternalTerminal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonSettings {
    /// Explicit daemon binary; searched for when unset.
    pub binary: Option<PathBuf>,
    /// Docker API socket; `<data_dir>/docker.sock` when unset.
    pub socket: Option<PathBuf>,
    pub startup_timeout_secs: u64,
    pub stop_timeout_secs: u64,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        DaemonSettings {
            binary: None,
            socket: None,
            startup_timeout_secs: 30,
            stop_timeout_secs: 10,
        }
    }
}

impl DaemonSettings {
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub listen: String,
}

impl Default for ApiSettings {
    fn default() -> Self {
        ApiSettings {
            listen: "127.0.0.1:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub updates: UpdateSettings,
    pub terminal: TerminalSettings,
    pub daemon: DaemonSettings,
    pub api: ApiSettings,
}

impl Settings {
    /// Loads settings, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                ArcboxError::Config(format!("invalid settings file {}: {}", path.display(), e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No settings at {}, using defaults", path.display());
                Ok(Settings::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn docker_socket(&self, paths: &ArcboxPaths) -> PathBuf {
        self.daemon
            .socket
            .clone()
            .unwrap_or_else(|| paths.docker_socket())
    }
}
