mod builder;
mod catalog;
#[allow(clippy::module_inception)]
mod detector;
mod engine;
mod error;
mod preprocess;
mod select;
mod service;

pub use builder::DetectorBuilder;
pub use catalog::{DiseaseInfo, LabelCatalog, NO_TREATMENT, UNKNOWN_DISEASE};
pub use detector::DiseaseDetector;
pub use engine::{BackendFactory, InferenceBackend, OnnxBackend, OnnxBackendFactory};
pub use error::{
    AnalysisError, AssetError, CatalogError, CatalogLoadError, InferenceError, InitError,
    TranslationError,
};
pub use preprocess::{preprocess, PreprocessedInput, CHANNELS, INPUT_LEN, INPUT_SIZE};
pub use select::{argmax, select, top_k, ConfidenceVector, DiseaseResult};
pub use service::{DetectionService, Ready};
