use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State as AxumState},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
};
use futures_util::TryStreamExt;
use serde_json::{Value, json};
use sysinfo::System;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::info;

use super::stats::get_stats;
use super::types::{
    ApiServer, ApiState, ForceQuery, ListQuery, LogQuery, PullRequest, StopQuery, SystemStats,
};
use crate::lib::backend::types::{
    Backend, CreateContainerSpec, CreateMachineSpec, CreateNetworkSpec, CreateVolumeSpec, LogLine,
    LogOptions,
};
use crate::lib::error::{ArcboxError, Result};
use crate::lib::resources::types::{
    ContainerViewModel, ImageViewModel, MachineViewModel, NetworkViewModel, VolumeViewModel,
};

type Shared = AxumState<Arc<ApiState>>;

const DEFAULT_STOP_TIMEOUT: u32 = 10;

impl ApiServer {
    pub fn new(backend: Arc<dyn Backend>, address: &str) -> Self {
        Self {
            state: Arc::new(ApiState {
                backend,
                sysinfo: Mutex::new(System::new_all()),
            }),
            address: address.to_string(),
        }
    }

    pub fn router(state: Arc<ApiState>) -> Router {
        Router::new()
            .route("/_ping", get(ping))
            .route("/system", get(system))
            .route("/containers", get(list_containers).post(create_container))
            .route("/containers/{id}", delete(remove_container))
            .route("/containers/{id}/start", post(start_container))
            .route("/containers/{id}/stop", post(stop_container))
            .route("/containers/{id}/restart", post(restart_container))
            .route("/containers/{id}/logs", get(container_logs))
            .route("/images", get(list_images))
            .route("/images/pull", post(pull_image))
            .route("/images/{id}", delete(remove_image))
            .route("/volumes", get(list_volumes).post(create_volume))
            .route("/volumes/{name}", delete(remove_volume))
            .route("/networks", get(list_networks).post(create_network))
            .route("/networks/{id}", delete(remove_network))
            .route("/machines", get(list_machines).post(create_machine))
            .route("/machines/{id}", delete(remove_machine))
            .route("/machines/{id}/start", post(start_machine))
            .route("/machines/{id}/stop", post(stop_machine))
            .with_state(state)
    }

    pub async fn start_server(self) -> Result<()> {
        let app = Self::router(self.state.clone());
        let listener = TcpListener::bind(&self.address).await?;
        info!(
            "Serving {} backend on {}",
            self.state.backend.name(),
            listener.local_addr()?
        );
        axum::serve(listener, app).await?;
        Ok(())
    }
}

async fn ping() -> &'static str {
    "OK"
}

async fn system(AxumState(state): Shared) -> Result<Json<SystemStats>> {
    let containers = state.backend.list_containers(false).await?;
    let mut sysinfo = state.sysinfo.lock().await;
    Ok(Json(get_stats(&mut sysinfo, containers.len() as u64)))
}

fn created(body: Value) -> impl IntoResponse {
    (StatusCode::CREATED, Json(body))
}

async fn list_containers(
    AxumState(state): Shared,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<ContainerViewModel>>> {
    Ok(Json(state.backend.list_containers(query.all).await?))
}

async fn create_container(
    AxumState(state): Shared,
    Json(spec): Json<CreateContainerSpec>,
) -> Result<impl IntoResponse> {
    spec.validate()?;
    let id = state.backend.create_container(spec).await?;
    info!("Container created via API: {}", id);
    Ok(created(json!({ "id": id })))
}

async fn start_container(AxumState(state): Shared, Path(id): Path<String>) -> Result<StatusCode> {
    state.backend.start_container(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn stop_container(
    AxumState(state): Shared,
    Path(id): Path<String>,
    Query(query): Query<StopQuery>,
) -> Result<StatusCode> {
    let timeout = query.timeout.unwrap_or(DEFAULT_STOP_TIMEOUT);
    state.backend.stop_container(&id, timeout).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn restart_container(
    AxumState(state): Shared,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state.backend.restart_container(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn remove_container(
    AxumState(state): Shared,
    Path(id): Path<String>,
    Query(query): Query<ForceQuery>,
) -> Result<StatusCode> {
    state.backend.remove_container(&id, query.force).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Returns a finite snapshot of the log; following is only offered on the CLI.
async fn container_logs(
    AxumState(state): Shared,
    Path(id): Path<String>,
    Query(query): Query<LogQuery>,
) -> Result<Json<Vec<LogLine>>> {
    let defaults = LogOptions::default();
    let options = LogOptions {
        follow: false,
        tail: query.tail.or(defaults.tail),
        timestamps: query.timestamps.unwrap_or(defaults.timestamps),
    };
    let lines = state
        .backend
        .container_logs(&id, options)
        .await?
        .try_collect()
        .await?;
    Ok(Json(lines))
}

async fn list_images(AxumState(state): Shared) -> Result<Json<Vec<ImageViewModel>>> {
    Ok(Json(state.backend.list_images().await?))
}

async fn pull_image(
    AxumState(state): Shared,
    Json(request): Json<PullRequest>,
) -> Result<impl IntoResponse> {
    if request.reference.trim().is_empty() {
        return Err(ArcboxError::InvalidRequest(
            "image reference is required".to_string(),
        ));
    }
    state.backend.pull_image(&request.reference).await?;
    Ok(Json(json!({ "pulled": request.reference })))
}

async fn remove_image(
    AxumState(state): Shared,
    Path(id): Path<String>,
    Query(query): Query<ForceQuery>,
) -> Result<StatusCode> {
    state.backend.remove_image(&id, query.force).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_volumes(AxumState(state): Shared) -> Result<Json<Vec<VolumeViewModel>>> {
    Ok(Json(state.backend.list_volumes().await?))
}

async fn create_volume(
    AxumState(state): Shared,
    Json(spec): Json<CreateVolumeSpec>,
) -> Result<impl IntoResponse> {
    let volume = state.backend.create_volume(spec).await?;
    Ok((StatusCode::CREATED, Json(volume)))
}

async fn remove_volume(
    AxumState(state): Shared,
    Path(name): Path<String>,
    Query(query): Query<ForceQuery>,
) -> Result<StatusCode> {
    state.backend.remove_volume(&name, query.force).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_networks(AxumState(state): Shared) -> Result<Json<Vec<NetworkViewModel>>> {
    Ok(Json(state.backend.list_networks().await?))
}

async fn create_network(
    AxumState(state): Shared,
    Json(spec): Json<CreateNetworkSpec>,
) -> Result<impl IntoResponse> {
    let id = state.backend.create_network(spec).await?;
    Ok(created(json!({ "id": id })))
}

async fn remove_network(AxumState(state): Shared, Path(id): Path<String>) -> Result<StatusCode> {
    state.backend.remove_network(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_machines(AxumState(state): Shared) -> Result<Json<Vec<MachineViewModel>>> {
    Ok(Json(state.backend.list_machines().await?))
}

async fn create_machine(
    AxumState(state): Shared,
    Json(spec): Json<CreateMachineSpec>,
) -> Result<impl IntoResponse> {
    let id = state.backend.create_machine(spec).await?;
    Ok(created(json!({ "id": id })))
}

async fn start_machine(AxumState(state): Shared, Path(id): Path<String>) -> Result<StatusCode> {
    state.backend.start_machine(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn stop_machine(AxumState(state): Shared, Path(id): Path<String>) -> Result<StatusCode> {
    state.backend.stop_machine(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn remove_machine(
    AxumState(state): Shared,
    Path(id): Path<String>,
    Query(query): Query<ForceQuery>,
) -> Result<StatusCode> {
    state.backend.remove_machine(&id, query.force).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lib::backend::sample::SampleBackend;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn app() -> Router {
        let server = ApiServer::new(Arc::new(SampleBackend::new()), "127.0.0.1:0");
        ApiServer::router(server.state)
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                request = request.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = app
            .clone()
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn ping_answers_ok() {
        let app = app();
        let response = app
            .oneshot(Request::builder().uri("/_ping").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn lists_containers() {
        let app = app();
        let (status, running) = send(&app, "GET", "/containers", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(running.as_array().unwrap().len(), 4);

        let (_, all) = send(&app, "GET", "/containers?all=true", None).await;
        assert_eq!(all.as_array().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn container_lifecycle() {
        let app = app();
        let (status, body) = send(
            &app,
            "POST",
            "/containers",
            Some(json!({ "image": "alpine:3.19", "name": "scratch" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(body["id"].is_string());

        let (status, _) = send(&app, "POST", "/containers/scratch/start", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        // running containers need force
        let (status, body) = send(&app, "DELETE", "/containers/scratch", None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].as_str().unwrap().contains("scratch"));

        let (status, _) = send(&app, "DELETE", "/containers/scratch?force=true", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = send(&app, "POST", "/containers/scratch/stop", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn invalid_requests_are_rejected() {
        let app = app();
        let (status, body) = send(&app, "POST", "/containers", Some(json!({ "image": " " }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid request: image is required");

        let (status, _) = send(&app, "POST", "/images/pull", Some(json!({ "reference": "" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn logs_honor_tail() {
        let app = app();
        let (status, lines) = send(&app, "GET", "/containers/nginx/logs?tail=2", None).await;
        assert_eq!(status, StatusCode::OK);
        let lines = lines.as_array().unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1]["content"], "nginx ready");
        assert!(lines[1]["timestamp"].is_string());
    }

    #[tokio::test]
    async fn volumes_networks_and_machines() {
        let app = app();
        let (status, volume) = send(&app, "POST", "/volumes", Some(json!({ "name": "scratch" }))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(volume["driver"], "local");

        let (status, _) = send(&app, "DELETE", "/volumes/scratch", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = send(&app, "POST", "/networks", Some(json!({ "name": "backend" }))).await;
        assert_eq!(status, StatusCode::CREATED);
        let (_, networks) = send(&app, "GET", "/networks", None).await;
        assert_eq!(networks.as_array().unwrap().len(), 5);

        let (status, _) = send(&app, "POST", "/machines/alpine-dev/start", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (_, machines) = send(&app, "GET", "/machines", None).await;
        assert!(
            machines
                .as_array()
                .unwrap()
                .iter()
                .all(|m| m["state"] == "running")
        );
    }

    #[tokio::test]
    async fn system_reports_running_containers() {
        let app = app();
        let (status, stats) = send(&app, "GET", "/system", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats["running_containers"], 4);
    }

    #[test]
    fn error_statuses() {
        assert_eq!(
            ArcboxError::NotConnected.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ArcboxError::Unsupported("machines".to_string()).status_code(),
            StatusCode::NOT_IMPLEMENTED
        );
        assert_eq!(
            ArcboxError::InvalidStateTransition("x".to_string()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ArcboxError::Daemon("x".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
