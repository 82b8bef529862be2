use std::path::PathBuf;
use thiserror::Error;

/// The main error type for obbkit operations.
#[derive(Debug, Error)]
pub enum ObbkitError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Directory not found: {}", path.display())]
    DirectoryNotFound { path: PathBuf },

    #[error("No .txt files found under {}", path.display())]
    NoLabelFiles { path: PathBuf },

    #[error("Failed to parse label {}:{line}: {message}", path.display())]
    LabelParse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("Failed while traversing {}: {message}", path.display())]
    DirectoryWalk { path: PathBuf, message: String },

    #[error("Could not locate image/label folders inside {}: {message}", base.display())]
    DataDirsNotFound { base: PathBuf, message: String },

    #[error("No matching image/label pairs found in {} and {}", images_dir.display(), labels_dir.display())]
    NoPairsFound {
        images_dir: PathBuf,
        labels_dir: PathBuf,
    },

    #[error("Invalid split ratios: {message}")]
    InvalidSplitRatios { message: String },

    #[error("Audit reported {issue_count} issue(s)")]
    AuditFailed { issue_count: usize },

    #[error("Failed to serialize report: {0}")]
    ReportJson(#[from] serde_json::Error),

    #[error("Model not found at path: {}", path.display())]
    ModelNotFound { path: PathBuf },

    #[error("Failed to load model {}: {message}", path.display())]
    ModelLoad { path: PathBuf, message: String },

    #[error("Inference failed: {message}")]
    Inference { message: String },

    #[error("Failed to encode image: {message}")]
    ImageEncode { message: String },

    #[error("Server error: {message}")]
    Server { message: String },
}
