use crate::api::rest::{ApiResult, AppState};
use crate::db::models::{Camera, CreateCameraRequest, UpdateCameraRequest};
use crate::services::SweepSummary;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use log::info;
use serde::{Deserialize, Serialize};

/// Pagination for `GET /api/cameras`
#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    100
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub database: &'static str,
    pub cameras: i64,
    pub version: &'static str,
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/api/cameras", get(list_cameras).post(create_camera))
        .route("/api/cameras/check", post(check_all_cameras))
        .route(
            "/api/cameras/:id",
            get(get_camera).put(update_camera).delete(delete_camera),
        )
        .route("/api/cameras/:id/check", post(check_camera))
        .route("/api/health", get(health))
        .route("/api/status", get(status))
}

pub async fn list_cameras(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Vec<Camera>>> {
    let cameras = state
        .camera_service
        .list(params.skip, params.limit)
        .await?;
    Ok(Json(cameras))
}

pub async fn get_camera(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> ApiResult<Json<Camera>> {
    Ok(Json(state.camera_service.get(id).await?))
}

pub async fn create_camera(
    State(state): State<AppState>,
    Json(request): Json<CreateCameraRequest>,
) -> ApiResult<(StatusCode, Json<Camera>)> {
    let camera = state.camera_service.create(request).await?;
    Ok((StatusCode::OK, Json(camera)))
}

pub async fn update_camera(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(request): Json<UpdateCameraRequest>,
) -> ApiResult<Json<Camera>> {
    Ok(Json(state.camera_service.update(id, request).await?))
}

pub async fn delete_camera(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> ApiResult<Json<MessageResponse>> {
    state.camera_service.delete(id).await?;
    Ok(Json(MessageResponse {
        message: "Camera deleted successfully".to_string(),
    }))
}

/// Ping one camera now instead of waiting for the next sweep
pub async fn check_camera(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> ApiResult<Json<Camera>> {
    Ok(Json(state.camera_service.check_one(id).await?))
}

/// Run a full sweep now. The response is sent only once every camera has been pinged.
pub async fn check_all_cameras(State(state): State<AppState>) -> Json<SweepSummary> {
    info!("Manual status sweep requested");
    let report = state.camera_service.check_all().await;
    report.log();
    Json(report.summary())
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy" })
}

/// Running status; answers 500 when the database is unreachable
pub async fn status(State(state): State<AppState>) -> ApiResult<Json<StatusResponse>> {
    state.camera_service.health_check().await?;
    let cameras = state.camera_service.count().await?;
    Ok(Json(StatusResponse {
        status: "running",
        database: "connected",
        cameras,
        version: env!("CARGO_PKG_VERSION"),
    }))
}
