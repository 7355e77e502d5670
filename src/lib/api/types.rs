use std::sync::Arc;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use sysinfo::System;
use tokio::sync::Mutex;

use crate::lib::backend::types::Backend;
use crate::lib::error::ArcboxError;

pub struct ApiState {
    pub backend: Arc<dyn Backend>,
    pub sysinfo: Mutex<System>,
}

pub struct ApiServer {
    pub state: Arc<ApiState>,
    pub address: String,
}

#[derive(Debug)]
pub struct SystemStats {
    pub cpu_usage: f32,
    pub total_memory: u64,
    pub used_memory: u64,
    pub total_swap: u64,
    pub used_swap: u64,
    pub system_name: String,
    pub hostname: String,
    pub total_cpus: u64,
    pub disk_usage: f32,
    pub running_containers: u64,
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub struct ListQuery {
    pub all: bool,
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub struct ForceQuery {
    pub force: bool,
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub struct StopQuery {
    /// Seconds before the engine kills the container.
    pub timeout: Option<u32>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub struct LogQuery {
    pub tail: Option<u32>,
    pub timestamps: Option<bool>,
}

#[derive(Deserialize, Debug)]
pub struct PullRequest {
    pub reference: String,
}

impl ArcboxError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ArcboxError::NotFound(_) => StatusCode::NOT_FOUND,
            ArcboxError::Conflict(_) | ArcboxError::InvalidStateTransition(_) => {
                StatusCode::CONFLICT
            }
            ArcboxError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ArcboxError::Unsupported(_) => StatusCode::NOT_IMPLEMENTED,
            ArcboxError::NotConnected => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ArcboxError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
