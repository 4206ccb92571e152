//! Per-image workflow on top of a [`DetectionService`].
//!
//! ```text
//! Idle -> ImageSelected -> Analyzing -> Result | Failed
//! ```
//!
//! `Failed` goes back to `ImageSelected` on re-analysis or to `Idle` when the
//! image is cleared. A result that arrives after a different image was
//! selected is discarded.

use std::sync::{Arc, Mutex, MutexGuard};
use image::DynamicImage;
use log::{info, warn};

use crate::detector::{AnalysisError, DetectionService, DiseaseResult};
use crate::translation::{FixedLanguage, LanguagePreference, LocalizationService};

/// Observable state of an [`AnalysisSession`].
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Idle,
    ImageSelected,
    Analyzing,
    Result(DiseaseResult),
    Failed(String),
}

struct Inner {
    state: SessionState,
    image: Option<Arc<DynamicImage>>,
    // Bumped on every selection so late results can be recognized
    generation: u64,
}

// Puts the session back to ImageSelected if an analysis future is dropped
// before it records an outcome.
struct AnalyzingGuard<'a> {
    session: &'a AnalysisSession,
    generation: u64,
    done: bool,
}

impl Drop for AnalyzingGuard<'_> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        let mut inner = self.session.lock();
        if inner.generation == self.generation && inner.state == SessionState::Analyzing {
            inner.state = SessionState::ImageSelected;
        }
    }
}

/// Drives one screen's image selection and analysis.
pub struct AnalysisSession {
    service: Arc<DetectionService>,
    localizer: Option<Arc<LocalizationService>>,
    preference: Arc<dyn LanguagePreference>,
    inner: Mutex<Inner>,
}

impl AnalysisSession {
    pub fn new(service: Arc<DetectionService>) -> Self {
        Self {
            service,
            localizer: None,
            preference: Arc::new(FixedLanguage::unset()),
            inner: Mutex::new(Inner {
                state: SessionState::Idle,
                image: None,
                generation: 0,
            }),
        }
    }

    /// Translates results with `localizer` into the language `preference` names.
    pub fn with_localization(
        mut self,
        localizer: Arc<LocalizationService>,
        preference: Arc<dyn LanguagePreference>,
    ) -> Self {
        self.localizer = Some(localizer);
        self.preference = preference;
        self
    }

    pub fn service(&self) -> &DetectionService {
        &self.service
    }

    pub fn state(&self) -> SessionState {
        self.lock().state.clone()
    }

    pub fn has_image(&self) -> bool {
        self.lock().image.is_some()
    }

    /// The record to display for the current state: the diagnosis after a
    /// successful analysis, the "Error" placeholder after a failed one, and
    /// nothing otherwise.
    pub fn display_result(&self) -> Option<DiseaseResult> {
        match &self.lock().state {
            SessionState::Result(result) => Some(result.clone()),
            SessionState::Failed(_) => Some(DiseaseResult::analysis_failed()),
            _ => None,
        }
    }

    /// Selects a new image, discarding any previous result.
    pub fn select_image(&self, image: DynamicImage) {
        let mut inner = self.lock();
        inner.image = Some(Arc::new(image));
        inner.generation += 1;
        inner.state = SessionState::ImageSelected;
    }

    /// Drops the selected image and any result.
    pub fn clear_image(&self) {
        let mut inner = self.lock();
        inner.image = None;
        inner.generation += 1;
        inner.state = SessionState::Idle;
    }

    /// Analyzes the selected image and, if configured, translates the result.
    ///
    /// # Errors
    /// - `InvalidInput` when no image is selected
    /// - `NotReady` when the service has not finished loading
    /// - `Inference` when the forward pass fails (state becomes `Failed`)
    /// - `Superseded` when another image was selected meanwhile
    pub async fn analyze(&self) -> Result<DiseaseResult, AnalysisError> {
        let (image, generation) = {
            let mut inner = self.lock();
            let image = inner
                .image
                .clone()
                .ok_or_else(|| AnalysisError::InvalidInput("No image selected".into()))?;
            if !self.service.is_ready() {
                return Err(AnalysisError::NotReady);
            }
            inner.state = SessionState::Analyzing;
            (image, inner.generation)
        };
        let mut guard = AnalyzingGuard { session: self, generation, done: false };

        let outcome = match self.service.analyze(image).await {
            Ok(result) => Ok(self.localize(result).await),
            Err(e) => Err(e),
        };

        guard.done = true;
        let mut inner = self.lock();
        if inner.generation != generation {
            info!("Discarding result for an image that is no longer selected");
            return Err(AnalysisError::Superseded);
        }
        match outcome {
            Ok(result) => {
                inner.state = SessionState::Result(result.clone());
                Ok(result)
            }
            Err(e) => {
                warn!("Failed to analyze image: {}", e);
                inner.state = SessionState::Failed(e.to_string());
                Err(e)
            }
        }
    }

    async fn localize(&self, result: DiseaseResult) -> DiseaseResult {
        let Some(localizer) = self.localizer.clone() else {
            return result;
        };
        let preference = Arc::clone(&self.preference);
        let original = result.clone();
        match tokio::task::spawn_blocking(move || localizer.localize(&result, preference.as_ref())).await {
            Ok(localized) => localized,
            Err(e) => {
                warn!("Translation task failed, keeping original text: {}", e);
                original
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
