use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use image::DynamicImage;
use log::{error, info, warn};

use super::catalog::LabelCatalog;
use super::detector::DiseaseDetector;
use super::engine::{BackendFactory, InferenceBackend};
use super::error::{AnalysisError, CatalogLoadError, InitError};
use super::select::DiseaseResult;
use crate::asset_manager::AssetManager;

/// Summary of a successfully initialized service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ready {
    pub num_classes: usize,
    pub catalog_entries: usize,
}

#[derive(Debug)]
enum ServiceState {
    Uninitialized,
    // Tagged so a load abandoned by shutdown cannot publish into a later one
    Loading { attempt: u64 },
    Ready(DiseaseDetector),
    Failed(String),
}

/// Owns the model and catalog for one screen session and gates analysis on
/// both being loaded.
///
/// ```no_run
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// use std::sync::Arc;
/// use plantdoc::DetectionService;
///
/// let service = DetectionService::builder()
///     .with_assets_dir("assets")
///     .build()?;
/// service.initialize().await?;
///
/// let image = Arc::new(image::open("leaf.jpg")?);
/// let result = service.analyze(image).await?;
/// println!("{} ({:.1}%)", result.disease_name, result.confidence * 100.0);
/// # Ok(())
/// # }
/// ```
pub struct DetectionService {
    assets: AssetManager,
    factory: Arc<dyn BackendFactory>,
    state: RwLock<ServiceState>,
    attempts: AtomicU64,
}

// Flips a load that never finished (e.g. the future was dropped) to Failed.
struct LoadingGuard<'a> {
    service: &'a DetectionService,
    attempt: u64,
    done: bool,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        if !self.done {
            let mut state = self.service.write_state();
            if self.service.is_current(&state, self.attempt) {
                *state = ServiceState::Failed("initialization was interrupted".into());
            }
        }
    }
}

impl DetectionService {
    /// Creates a new DetectorBuilder for fluent construction
    pub fn builder() -> super::builder::DetectorBuilder {
        super::builder::DetectorBuilder::new()
    }

    pub(crate) fn new(assets: AssetManager, factory: Arc<dyn BackendFactory>) -> Self {
        Self {
            assets,
            factory,
            state: RwLock::new(ServiceState::Uninitialized),
            attempts: AtomicU64::new(0),
        }
    }

    pub fn assets(&self) -> &AssetManager {
        &self.assets
    }

    /// Loads the model and the catalog concurrently in the background.
    ///
    /// Returns immediately when already ready. After a failure the next call
    /// retries the whole load. A [`DetectionService::shutdown`] issued while
    /// loading discards the loaded model and fails with `Cancelled`.
    pub async fn initialize(&self) -> Result<Ready, InitError> {
        let attempt = {
            let mut state = self.write_state();
            if let ServiceState::Ready(detector) = &*state {
                return Ok(Self::summary(detector));
            }
            if matches!(*state, ServiceState::Loading { .. }) {
                return Err(InitError::InProgress);
            }
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            *state = ServiceState::Loading { attempt };
            attempt
        };
        let mut guard = LoadingGuard { service: self, attempt, done: false };

        info!("Loading model and catalog from {:?}", self.assets.config().assets_dir);

        let assets = self.assets.clone();
        let factory = Arc::clone(&self.factory);
        let model_task = tokio::task::spawn_blocking(move || -> Result<Arc<dyn InferenceBackend>, InitError> {
            let handle = assets.load_model()?;
            Ok(factory.open(&handle)?)
        });

        let assets = self.assets.clone();
        let catalog_task = tokio::task::spawn_blocking(move || assets.load_catalog());

        let (backend, catalog) = tokio::join!(model_task, catalog_task);
        let outcome = Self::assemble(backend, catalog);

        guard.done = true;
        let mut state = self.write_state();
        if !self.is_current(&state, attempt) {
            info!("Discarding model loaded after shutdown");
            drop(outcome);
            self.assets.reset();
            return Err(InitError::Cancelled);
        }
        match outcome {
            Ok(detector) => {
                let ready = Self::summary(&detector);
                info!(
                    "Detector ready: {} classes, {} catalog entries",
                    ready.num_classes, ready.catalog_entries
                );
                *state = ServiceState::Ready(detector);
                Ok(ready)
            }
            Err(e) => {
                error!("Failed to initialize detector: {}", e);
                // The next initialize re-reads the assets from disk
                self.assets.reset();
                *state = ServiceState::Failed(e.to_string());
                Err(e)
            }
        }
    }

    fn assemble(
        backend: Result<Result<Arc<dyn InferenceBackend>, InitError>, tokio::task::JoinError>,
        catalog: Result<Result<Arc<LabelCatalog>, CatalogLoadError>, tokio::task::JoinError>,
    ) -> Result<DiseaseDetector, InitError> {
        let backend = backend.map_err(|e| InitError::Join(e.to_string()))??;
        let catalog = catalog.map_err(|e| InitError::Join(e.to_string()))??;
        Ok(DiseaseDetector::new(backend, catalog))
    }

    fn summary(detector: &DiseaseDetector) -> Ready {
        Ready {
            num_classes: detector.num_classes(),
            catalog_entries: detector.catalog().len(),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(*self.read_state(), ServiceState::Ready(_))
    }

    pub fn is_loading(&self) -> bool {
        matches!(*self.read_state(), ServiceState::Loading { .. })
    }

    /// The message of the last failed initialization, if that is the current state.
    pub fn failure(&self) -> Option<String> {
        match &*self.read_state() {
            ServiceState::Failed(msg) => Some(msg.clone()),
            _ => None,
        }
    }

    pub fn num_classes(&self) -> Option<usize> {
        match &*self.read_state() {
            ServiceState::Ready(detector) => Some(detector.num_classes()),
            _ => None,
        }
    }

    /// Returns a handle to the loaded detector, or `NotReady`.
    pub fn detector(&self) -> Result<DiseaseDetector, AnalysisError> {
        match &*self.read_state() {
            ServiceState::Ready(detector) => Ok(detector.clone()),
            _ => Err(AnalysisError::NotReady),
        }
    }

    /// Diagnoses one image on a blocking background thread.
    ///
    /// Rejected with `NotReady` while loading, after a failed load and
    /// after [`DetectionService::shutdown`].
    pub async fn analyze(&self, image: Arc<DynamicImage>) -> Result<DiseaseResult, AnalysisError> {
        let detector = self.detector()?;
        tokio::task::spawn_blocking(move || detector.analyze(&image))
            .await
            .map_err(|e| AnalysisError::Join(e.to_string()))?
    }

    /// Like [`DetectionService::analyze`], also returning the `k` best classes.
    pub async fn analyze_ranked(
        &self,
        image: Arc<DynamicImage>,
        k: usize,
    ) -> Result<(DiseaseResult, Vec<(usize, String, f32)>), AnalysisError> {
        let detector = self.detector()?;
        tokio::task::spawn_blocking(move || detector.analyze_ranked(&image, k))
            .await
            .map_err(|e| AnalysisError::Join(e.to_string()))?
    }

    /// Releases the detector. In-flight analyses finish with their own
    /// reference; new ones are rejected until the next `initialize`.
    ///
    /// A load still in progress is abandoned: its model is dropped as soon
    /// as it arrives and the service stays uninitialized.
    pub fn shutdown(&self) {
        let mut state = self.write_state();
        if matches!(*state, ServiceState::Loading { .. }) {
            warn!("Shutdown requested while loading; the pending load will be discarded");
        }
        *state = ServiceState::Uninitialized;
        self.assets.reset();
        info!("Detector released");
    }

    fn is_current(&self, state: &ServiceState, attempt: u64) -> bool {
        matches!(*state, ServiceState::Loading { attempt: current } if current == attempt)
    }

    fn read_state(&self) -> RwLockReadGuard<'_, ServiceState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, ServiceState> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
