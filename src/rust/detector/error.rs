use std::io;
use std::path::PathBuf;

/// Errors raised while locating or reading bundled assets.
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("Asset not found: {0}")]
    Missing(PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Digest mismatch for {path}: expected {expected}, got {actual}")]
    DigestMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },
}

/// Errors raised while parsing the label/treatment catalog.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Malformed catalog entry '{key}': {reason}")]
    Parse { key: String, reason: String },
    #[error("Catalog is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Either half of a failed catalog load: the file or its contents.
#[derive(Debug, thiserror::Error)]
pub enum CatalogLoadError {
    #[error(transparent)]
    Asset(#[from] AssetError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Errors raised by a forward pass.
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("Inference runtime error: {0}")]
    Runtime(String),
    #[error("Unexpected tensor shape: expected {expected} values, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },
}

impl From<ort::Error> for InferenceError {
    fn from(err: ort::Error) -> Self {
        InferenceError::Runtime(err.to_string())
    }
}

/// Failure to bring the detector into the ready state.
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error(transparent)]
    Asset(#[from] AssetError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("Failed to open inference backend: {0}")]
    Backend(#[from] InferenceError),
    #[error("Loading task failed: {0}")]
    Join(String),
    #[error("Initialization already in progress")]
    InProgress,
    #[error("Initialization cancelled by shutdown")]
    Cancelled,
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl From<CatalogLoadError> for InitError {
    fn from(err: CatalogLoadError) -> Self {
        match err {
            CatalogLoadError::Asset(e) => InitError::Asset(e),
            CatalogLoadError::Catalog(e) => InitError::Catalog(e),
        }
    }
}

/// Failure of a single analysis request.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("Model is not ready")]
    NotReady,
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Analysis failed: {0}")]
    Inference(#[from] InferenceError),
    #[error("Result discarded because a different image was selected")]
    Superseded,
    #[error("Analysis task failed: {0}")]
    Join(String),
}

/// Failure reported by a translation collaborator.
#[derive(Debug, thiserror::Error)]
pub enum TranslationError {
    #[error("No translator available for '{0}'")]
    Unavailable(String),
    #[error("Translation failed: {0}")]
    Failed(String),
}
