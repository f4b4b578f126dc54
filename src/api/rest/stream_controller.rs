use crate::api::rest::{ApiResult, AppState};
use crate::error::Error;
use crate::services::stream_relay::MJPEG_CONTENT_TYPE;
use axum::body::StreamBody;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use log::info;

pub fn create_router() -> Router<AppState> {
    Router::new().route("/api/cameras/:id/stream", get(stream_camera))
}

/// Relay a camera's RTSP source as MJPEG.
///
/// Every client gets its own upstream connection.
pub async fn stream_camera(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> ApiResult<Response> {
    let camera = state.camera_service.get(id).await?;
    let rtsp_url = camera
        .rtsp_url
        .filter(|url| !url.trim().is_empty())
        .ok_or_else(|| Error::NotFound(format!("Camera with id {} has no stream URL", id)))?;

    info!("Opening stream for camera {}", id);
    let chunks = state.stream_relay.open(&rtsp_url).await?;

    Ok((
        [
            (header::CONTENT_TYPE, MJPEG_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        StreamBody::new(chunks),
    )
        .into_response())
}
