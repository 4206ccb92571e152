use std::path::{Path, PathBuf};
use std::fs;
use std::io;
use std::sync::{Arc, Mutex};
use std::env;
use sha2::{Sha256, Digest};

use crate::detector::{AssetError, CatalogError, CatalogLoadError, LabelCatalog};

/// File name of the bundled classifier.
pub const DEFAULT_MODEL_FILE: &str = "hub_model.onnx";
/// File name of the bundled label/treatment catalog.
pub const DEFAULT_CATALOG_FILE: &str = "class_indices.json";

/// The bundled model read fully into memory. Cloning shares the bytes.
#[derive(Debug, Clone)]
pub struct ModelHandle {
    path: PathBuf,
    bytes: Arc<[u8]>,
}

impl ModelHandle {
    pub fn from_bytes(path: impl Into<PathBuf>, bytes: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            bytes: bytes.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Where the bundled assets live and what they are called.
#[derive(Debug, Clone)]
pub struct AssetConfig {
    pub assets_dir: PathBuf,
    pub model_file: String,
    pub catalog_file: String,
    /// Expected lowercase hex SHA-256 of the model file, checked on load when set.
    pub model_sha256: Option<String>,
}

impl AssetConfig {
    pub fn new<P: AsRef<Path>>(assets_dir: P) -> Self {
        Self {
            assets_dir: assets_dir.as_ref().to_path_buf(),
            model_file: DEFAULT_MODEL_FILE.to_string(),
            catalog_file: DEFAULT_CATALOG_FILE.to_string(),
            model_sha256: None,
        }
    }

    pub fn with_model_sha256(mut self, hash: impl Into<String>) -> Self {
        self.model_sha256 = Some(hash.into().to_lowercase());
        self
    }

    /// Returns the default assets directory path
    pub fn default_assets_dir() -> PathBuf {
        // 1. Check environment variable
        if let Ok(path) = env::var("PLANTDOC_ASSETS") {
            return PathBuf::from(path);
        }

        // 2. Use platform-specific data directory
        if let Some(data_dir) = dirs::data_dir() {
            return data_dir.join("plantdoc").join("assets");
        }

        // 3. Fallback to user's home directory
        if let Some(home_dir) = dirs::home_dir() {
            return home_dir.join(".local").join("share").join("plantdoc").join("assets");
        }

        // 4. If all else fails, use system temp directory (platform agnostic)
        env::temp_dir().join("plantdoc").join("assets")
    }
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self::new(Self::default_assets_dir())
    }
}

/// Loads the bundled model and catalog, each at most once.
///
/// Clones share the same caches, so every clone hands out the same
/// [`ModelHandle`] bytes and the same catalog.
#[derive(Debug, Clone)]
pub struct AssetManager {
    config: AssetConfig,
    model: Arc<Mutex<Option<ModelHandle>>>,
    catalog: Arc<Mutex<Option<Arc<LabelCatalog>>>>,
}

impl AssetManager {
    /// Creates a new AssetManager reading from the default assets directory
    pub fn new_default() -> Self {
        Self::new(AssetConfig::default())
    }

    pub fn new(config: AssetConfig) -> Self {
        Self {
            config,
            model: Arc::new(Mutex::new(None)),
            catalog: Arc::new(Mutex::new(None)),
        }
    }

    pub fn config(&self) -> &AssetConfig {
        &self.config
    }

    pub fn get_model_path(&self) -> PathBuf {
        self.config.assets_dir.join(&self.config.model_file)
    }

    pub fn get_catalog_path(&self) -> PathBuf {
        self.config.assets_dir.join(&self.config.catalog_file)
    }

    pub fn is_bundled(&self) -> bool {
        let model_path = self.get_model_path();
        let catalog_path = self.get_catalog_path();
        log::debug!("Model path: {:?} (exists: {})", model_path, model_path.exists());
        log::debug!("Catalog path: {:?} (exists: {})", catalog_path, catalog_path.exists());
        model_path.exists() && catalog_path.exists()
    }

    /// Reads the model into memory on first use and returns the cached handle afterwards.
    pub fn load_model(&self) -> Result<ModelHandle, AssetError> {
        let mut cached = self.model.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(handle) = cached.as_ref() {
            return Ok(handle.clone());
        }

        let path = self.get_model_path();
        log::info!("Loading model from {:?}", path);
        let bytes = read_asset(&path)?;
        log::info!("Read {} bytes", bytes.len());

        if let Some(expected) = &self.config.model_sha256 {
            let actual = sha256_hex(&bytes);
            if &actual != expected {
                log::error!("Model hash mismatch: expected {}, got {}", expected, actual);
                return Err(AssetError::DigestMismatch {
                    path,
                    expected: expected.clone(),
                    actual,
                });
            }
            log::info!("Model hash verified");
        }

        let handle = ModelHandle::from_bytes(path, bytes);
        *cached = Some(handle.clone());
        Ok(handle)
    }

    /// Parses the catalog on first use and returns the cached catalog afterwards.
    pub fn load_catalog(&self) -> Result<Arc<LabelCatalog>, CatalogLoadError> {
        let mut cached = self.catalog.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(catalog) = cached.as_ref() {
            return Ok(Arc::clone(catalog));
        }

        let path = self.get_catalog_path();
        log::info!("Loading label catalog from {:?}", path);
        let bytes = read_asset(&path)?;
        let text = String::from_utf8(bytes).map_err(|e| CatalogError::Parse {
            key: "<file>".to_string(),
            reason: format!("catalog is not valid UTF-8: {}", e),
        })?;
        let catalog = Arc::new(LabelCatalog::from_json(&text)?);
        log::info!("Catalog loaded with {} entries", catalog.len());

        *cached = Some(Arc::clone(&catalog));
        Ok(catalog)
    }

    /// Checks the model on disk against the configured digest.
    ///
    /// Returns `Ok(true)` when no digest is configured and the file exists.
    pub fn verify_model(&self) -> Result<bool, AssetError> {
        let path = self.get_model_path();
        if !path.exists() {
            log::info!("Model file does not exist: {:?}", path);
            return Ok(false);
        }
        match &self.config.model_sha256 {
            Some(expected) => {
                let actual = sha256_hex(&fs::read(&path)?);
                log::info!("Calculated hash: {}", actual);
                log::info!("Expected hash:   {}", expected);
                Ok(&actual == expected)
            }
            None => Ok(true),
        }
    }

    /// Drops the cached model and catalog so the next load reads the files again.
    pub fn reset(&self) {
        *self.model.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
        *self.catalog.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
    }
}

fn read_asset(path: &Path) -> Result<Vec<u8>, AssetError> {
    fs::read(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => AssetError::Missing(path.to_path_buf()),
        _ => AssetError::Io(e),
    })
}

pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
