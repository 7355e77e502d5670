use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArcboxError {
    #[error("Not connected to daemon")]
    NotConnected,

    #[error("Resource Not Found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unsupported by backend: {0}")]
    Unsupported(String),

    #[error("Docker client error: {0}")]
    Docker(#[source] bollard::errors::Error),

    #[error("Daemon error: {0}")]
    Daemon(String),

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization Error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ArcboxError>;

impl ArcboxError {
    /// True when the engine answered 304, e.g. starting a running container.
    pub fn is_not_modified(&self) -> bool {
        matches!(
            self,
            ArcboxError::Docker(bollard::errors::Error::DockerResponseServerError {
                status_code: 304,
                ..
            })
        )
    }
}

impl From<bollard::errors::Error> for ArcboxError {
    fn from(err: bollard::errors::Error) -> Self {
        match err {
            bollard::errors::Error::DockerResponseServerError {
                status_code: 404,
                message,
            } => ArcboxError::NotFound(message),
            bollard::errors::Error::DockerResponseServerError {
                status_code: 409,
                message,
            } => ArcboxError::Conflict(message),
            other => ArcboxError::Docker(other),
        }
    }
}
