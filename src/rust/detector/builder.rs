use std::path::Path;
use std::sync::Arc;

use super::engine::{BackendFactory, OnnxBackendFactory};
use super::error::InitError;
use super::service::DetectionService;
use crate::asset_manager::{AssetConfig, AssetManager};
use crate::runtime::RuntimeConfig;

/// A builder for constructing a [`DetectionService`] with a fluent interface.
#[derive(Default)]
pub struct DetectorBuilder {
    assets: Option<AssetConfig>,
    runtime_config: RuntimeConfig,
    backend_factory: Option<Arc<dyn BackendFactory>>,
}

impl DetectorBuilder {
    /// Creates a builder that reads assets from the default directory and
    /// runs models through ONNX Runtime.
    pub fn new() -> Self {
        Self {
            assets: None,
            runtime_config: RuntimeConfig::default(),
            backend_factory: None,
        }
    }

    /// Sets the full asset configuration (directory, file names, digest).
    pub fn with_assets(mut self, assets: AssetConfig) -> Self {
        self.assets = Some(assets);
        self
    }

    /// Reads the default-named assets from `dir`.
    ///
    /// # Example
    /// ```
    /// use plantdoc::DetectionService;
    ///
    /// let service = DetectionService::builder()
    ///     .with_assets_dir("/opt/plantdoc/assets")
    ///     .build()
    ///     .unwrap();
    /// assert!(!service.is_ready());
    /// ```
    pub fn with_assets_dir<P: AsRef<Path>>(self, dir: P) -> Self {
        self.with_assets(AssetConfig::new(dir))
    }

    /// Sets the ONNX Runtime configuration. Ignored when a custom backend
    /// factory is supplied.
    pub fn with_runtime_config(mut self, config: RuntimeConfig) -> Self {
        self.runtime_config = config;
        self
    }

    /// Replaces the ONNX Runtime backend with another engine.
    pub fn with_backend_factory(mut self, factory: Arc<dyn BackendFactory>) -> Self {
        self.backend_factory = Some(factory);
        self
    }

    /// Builds the service. Nothing is loaded until
    /// [`DetectionService::initialize`] is called.
    ///
    /// # Errors
    /// `InitError::Config` when the model or catalog file name is empty.
    pub fn build(self) -> Result<DetectionService, InitError> {
        let assets = self.assets.unwrap_or_default();
        if assets.model_file.trim().is_empty() {
            return Err(InitError::Config("Model file name cannot be empty".into()));
        }
        if assets.catalog_file.trim().is_empty() {
            return Err(InitError::Config("Catalog file name cannot be empty".into()));
        }
        if let Some(hash) = &assets.model_sha256 {
            if hash.len() != 64 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(InitError::Config(format!(
                    "Model digest must be 64 hex characters, got '{}'",
                    hash
                )));
            }
        }

        let factory = self
            .backend_factory
            .unwrap_or_else(|| Arc::new(OnnxBackendFactory::new(self.runtime_config)));

        Ok(DetectionService::new(AssetManager::new(assets), factory))
    }
}
