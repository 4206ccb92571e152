//! On-device crop leaf disease detection using an ONNX image classifier.
//!
//! A bundled model (`hub_model.onnx`) scores a 224x224 RGB leaf photo
//! against every disease class; the best class is resolved through a bundled
//! catalog (`class_indices.json`) into a disease name and treatment advice,
//! which can then be translated into the user's language.
//!
//! # Basic Usage
//!
//! ```no_run
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use std::sync::Arc;
//! use plantdoc::DetectionService;
//!
//! let service = DetectionService::builder()
//!     .with_assets_dir("assets")
//!     .build()?;
//! let ready = service.initialize().await?;
//! println!("Model knows {} diseases", ready.num_classes);
//!
//! let leaf = Arc::new(image::open("leaf.jpg")?);
//! let result = service.analyze(leaf).await?;
//! println!("{}: {}", result.disease_name, result.treatment);
//! # Ok(())
//! # }
//! ```
//!
//! # Thread Safety
//!
//! [`DetectionService`] is `Send + Sync`; share it through `Arc`. Loading
//! runs on blocking background threads, and forward passes against one
//! loaded model are serialized.

pub mod asset_manager;
pub mod detector;
mod runtime;
pub mod session;
pub mod translation;

pub use asset_manager::{AssetConfig, AssetManager, ModelHandle};
pub use detector::{
    AnalysisError, AssetError, BackendFactory, CatalogError, DetectionService, DetectorBuilder,
    DiseaseDetector, DiseaseInfo, DiseaseResult, InferenceBackend, InferenceError, InitError,
    LabelCatalog, OnnxBackendFactory, PreprocessedInput, Ready, TranslationError,
};
pub use runtime::RuntimeConfig;
pub use session::{AnalysisSession, SessionState};
pub use translation::{FixedLanguage, LanguagePreference, LocalizationService, Translator};

/// Installs `env_logger`, configured through `RUST_LOG`.
pub fn init_logger() {
    env_logger::init();
}
