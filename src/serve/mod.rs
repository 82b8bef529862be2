//! HTTP detection service.
//!
//! Routes:
//! - `GET /health`: liveness plus the configured model path
//! - `GET /`: the static `index.html`, or a JSON hint
//! - `POST /predict`: multipart image upload, answered with an annotated JPEG
//! - `/static/*`: files from the static directory, when it exists

pub mod detector;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod render;
pub mod routes;
pub mod state;

pub use detector::{Detection, Detector, DetectorParams};
pub use state::AppState;

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::info;

use crate::error::ObbkitError;

/// Default model location, relative to the working directory.
pub const DEFAULT_MODEL_PATH: &str = "yolo_dataset/train_chassi_detect2/weights/best.onnx";

/// Startup settings for [`serve`].
#[derive(Clone, Debug)]
pub struct ServeConfig {
    pub host: String,
    pub port: u16,
    pub model_path: PathBuf,
    pub static_dir: PathBuf,
    pub params: DetectorParams,
    pub max_upload_bytes: usize,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            static_dir: PathBuf::from("api/static"),
            params: DetectorParams::default(),
            max_upload_bytes: 20 * 1024 * 1024,
        }
    }
}

/// Builds the application router around `state`.
pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut app = Router::new()
        .route("/", get(routes::root))
        .route("/health", get(routes::health))
        .route("/predict", post(routes::predict));
    if let Some(dir) = &state.static_dir {
        app = app.nest_service("/static", ServeDir::new(dir));
    }

    app.with_state(state)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(cors)
}

#[cfg(feature = "onnx")]
fn load_detector(config: &ServeConfig) -> Result<Arc<dyn Detector>, ObbkitError> {
    let detector = onnx::OnnxDetector::load(&config.model_path, config.params)?;
    Ok(Arc::new(detector))
}

#[cfg(not(feature = "onnx"))]
fn load_detector(config: &ServeConfig) -> Result<Arc<dyn Detector>, ObbkitError> {
    Err(ObbkitError::ModelLoad {
        path: config.model_path.clone(),
        message: "this build has no model runtime; rebuild with `--features onnx`".to_string(),
    })
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutting down");
    }
}

/// Loads the model once and serves until interrupted.
pub async fn serve(config: ServeConfig) -> Result<(), ObbkitError> {
    if !config.model_path.is_file() {
        return Err(ObbkitError::ModelNotFound {
            path: config.model_path.clone(),
        });
    }
    let detector = load_detector(&config)?;
    info!(model = %config.model_path.display(), "model loaded");

    let static_dir = config
        .static_dir
        .is_dir()
        .then(|| config.static_dir.clone());
    let state = AppState::new(
        detector,
        config.model_path.display().to_string(),
        static_dir,
    );
    let app = router(state, config.max_upload_bytes);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ObbkitError::Server {
            message: format!("could not bind {addr}: {e}"),
        })?;
    info!("listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ObbkitError::Server {
            message: e.to_string(),
        })
}
