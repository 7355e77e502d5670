use crate::lib::resources::types::{
    ContainerViewModel, ImageViewModel, MachineViewModel, NetworkViewModel, VolumeViewModel,
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error(String),
}

impl ConnectionState {
    pub fn label(&self) -> String {
        match self {
            ConnectionState::Disconnected => "disconnected".to_string(),
            ConnectionState::Connecting => "connecting".to_string(),
            ConnectionState::Connected => "connected".to_string(),
            ConnectionState::Error(msg) => format!("error: {}", msg),
        }
    }
}

/// Broadcast to every subscriber of a [`super::service::DaemonService`].
#[derive(Debug, Clone)]
pub enum DaemonEvent {
    ConnectionChanged(ConnectionState),
    ContainersLoaded(Vec<ContainerViewModel>),
    ImagesLoaded(Vec<ImageViewModel>),
    VolumesLoaded(Vec<VolumeViewModel>),
    NetworksLoaded(Vec<NetworkViewModel>),
    MachinesLoaded(Vec<MachineViewModel>),
    ContainerCreated(String),
    ContainerStarted(String),
    ContainerStopped(String),
    ContainerRemoved(String),
    OperationFailed(String),
}
