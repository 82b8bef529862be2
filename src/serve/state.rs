use std::path::PathBuf;
use std::sync::Arc;

use super::detector::Detector;

/// State shared by every request handler.
#[derive(Clone)]
pub struct AppState {
    pub detector: Arc<dyn Detector>,
    /// Reported by `/health` and the `X-Model-Path` header.
    pub model_path: String,
    /// Set only when the directory exists.
    pub static_dir: Option<PathBuf>,
}

impl AppState {
    pub fn new(
        detector: Arc<dyn Detector>,
        model_path: impl Into<String>,
        static_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            detector,
            model_path: model_path.into(),
            static_dir,
        }
    }
}
