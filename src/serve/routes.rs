use std::time::{Duration, Instant};

use axum::extract::{Multipart, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use tracing::{error, info};

use super::render::{draw_detections, encode_jpeg, JPEG_QUALITY};
use super::state::AppState;
use crate::error::ObbkitError;

/// Multipart field carrying the image.
pub const UPLOAD_FIELD: &str = "file";
pub const NO_FILE_DETAIL: &str = "No file was uploaded.";
pub const BAD_IMAGE_DETAIL: &str = "Could not open the image.";

/// Error returned to HTTP clients as `{"detail": ...}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            detail: detail.into(),
        }
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail: detail.into(),
        }
    }
}

impl From<ObbkitError> for ApiError {
    fn from(err: ObbkitError) -> Self {
        error!(error = %err, "prediction failed");
        Self::internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "status": "ok", "model_path": state.model_path }))
}

pub async fn root(State(state): State<AppState>) -> Response {
    if let Some(dir) = &state.static_dir {
        if let Ok(page) = tokio::fs::read(dir.join("index.html")).await {
            return Html(page).into_response();
        }
    }
    Json(json!({ "message": "Send an image via POST /predict" })).into_response()
}

struct Prediction {
    jpeg: Vec<u8>,
    detections: usize,
    elapsed: Duration,
}

pub async fn predict(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart body: {e}")))?
    {
        if field.name() == Some(UPLOAD_FIELD) {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::bad_request(format!("Could not read upload: {e}")))?;
            upload = Some(bytes);
            break;
        }
    }
    let contents = upload
        .filter(|bytes| !bytes.is_empty())
        .ok_or_else(|| ApiError::bad_request(NO_FILE_DETAIL))?;

    let detector = state.detector.clone();
    let prediction = tokio::task::spawn_blocking(move || -> Result<Prediction, ApiError> {
        let image = image::load_from_memory(&contents)
            .map_err(|_| ApiError::bad_request(BAD_IMAGE_DETAIL))?
            .to_rgb8();

        let start = Instant::now();
        let detections = detector.detect(&image)?;
        let elapsed = start.elapsed();

        let jpeg = encode_jpeg(&draw_detections(&image, &detections), JPEG_QUALITY)?;
        Ok(Prediction {
            jpeg,
            detections: detections.len(),
            elapsed,
        })
    })
    .await
    .map_err(|e| ApiError::internal(format!("Prediction task failed: {e}")))??;

    info!(
        detections = prediction.detections,
        seconds = prediction.elapsed.as_secs_f64(),
        "prediction served"
    );

    let model_path = HeaderValue::from_str(&state.model_path)
        .map_err(|e| ApiError::internal(format!("Invalid model path header: {e}")))?;
    let inference_time = HeaderValue::from_str(&format!("{:.3}", prediction.elapsed.as_secs_f64()))
        .map_err(|e| ApiError::internal(e.to_string()))?;

    let mut response = prediction.jpeg.into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("image/jpeg"));
    headers.insert("x-inference-time", inference_time);
    headers.insert("x-detections", HeaderValue::from(prediction.detections));
    headers.insert("x-model-path", model_path);
    Ok(response)
}
