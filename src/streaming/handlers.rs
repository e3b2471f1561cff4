use crate::error::AccessError;
use crate::snapshot::FrameSnapshot;
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use futures::StreamExt;
use serde_json::json;
use tracing::{debug, info, trace};

use super::server::ServerState;

pub(crate) const BOUNDARY: &str = "frame";

/// Map access failures to 404 / 503 with a `detail` body
fn access_error(err: AccessError) -> Response {
    let status = match err {
        AccessError::NotFound { .. } => StatusCode::NOT_FOUND,
        AccessError::Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, Json(json!({ "detail": err.to_string() }))).into_response()
}

fn part_header(frame: &FrameSnapshot) -> Bytes {
    Bytes::from(format!(
        "--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\nX-Frame-ID: {}\r\n\r\n",
        BOUNDARY,
        frame.image.len(),
        frame.frame_id
    ))
}

/// Handler for the per-camera MJPEG stream.
///
/// Every new frame is sent once; while no new frame arrives the last one is
/// re-sent each keepalive period so proxies keep the connection open.
pub async fn mjpeg_stream_handler(
    Path(camera_id): Path<String>,
    State(state): State<ServerState>,
) -> Response {
    let mut frames = match state.access.open_stream(&camera_id).await {
        Ok(frames) => frames,
        Err(e) => return access_error(e),
    };

    info!("New MJPEG stream client connected for camera {}", camera_id);

    let guard = state.stats.connect();
    let keepalive = state.keepalive;
    let stats = state.stats;
    let shutdown = state.shutdown;

    let stream = async_stream::stream! {
        let _guard = guard;
        let mut last: Option<FrameSnapshot> = None;

        loop {
            let next = tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("Server shutting down, closing stream for camera {}", camera_id);
                    break;
                }
                next = tokio::time::timeout(keepalive, frames.next()) => next,
            };

            let keepalive_frame = match next {
                Ok(Some(frame)) => {
                    last = Some(frame);
                    false
                }
                Ok(None) => break,
                Err(_) => true,
            };

            let Some(frame) = last.as_ref() else {
                trace!("No frame yet for camera {}", camera_id);
                continue;
            };

            stats.record_frame(frame.image.len(), keepalive_frame);
            yield Ok::<_, axum::Error>(part_header(frame));
            yield Ok(frame.image.clone());
            yield Ok(Bytes::from_static(b"\r\n"));
        }

        debug!("MJPEG stream for camera {} ended", camera_id);
    };

    (
        [
            (
                header::CONTENT_TYPE,
                format!("multipart/x-mixed-replace; boundary={}", BOUNDARY),
            ),
            (header::CACHE_CONTROL, "no-cache, private".to_string()),
            (header::PRAGMA, "no-cache".to_string()),
        ],
        Body::from_stream(stream),
    )
        .into_response()
}

pub async fn alerts_handler(
    Path(camera_id): Path<String>,
    State(state): State<ServerState>,
) -> Response {
    match state.access.get_alert_snapshot(&camera_id).await {
        Ok(alerts) => Json(alerts).into_response(),
        Err(e) => access_error(e),
    }
}

pub async fn status_handler(
    Path(camera_id): Path<String>,
    State(state): State<ServerState>,
) -> Response {
    match state.access.get_stream_status(&camera_id).await {
        Ok(status) => Json(status).into_response(),
        Err(e) => access_error(e),
    }
}

/// Handler for health check endpoint
pub async fn health_handler(State(state): State<ServerState>) -> impl IntoResponse {
    let (cameras, running_workers) = state.access.counts().await;

    let health_info = json!({
        "status": "healthy",
        "cameras": cameras,
        "running_workers": running_workers,
        "viewers": state.stats.snapshot(),
    });

    (StatusCode::OK, Json(health_info))
}

pub async fn root_handler() -> impl IntoResponse {
    Json(json!({
        "message": "EPI Guard detection coordinator",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
