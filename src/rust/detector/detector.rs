use std::sync::Arc;
use image::DynamicImage;
use log::{debug, warn};

use super::catalog::LabelCatalog;
use super::engine::InferenceBackend;
use super::error::AnalysisError;
use super::preprocess::preprocess;
use super::select::{select, top_k, DiseaseResult};

/// A loaded classifier paired with its label catalog.
///
/// Each call to [`DiseaseDetector::analyze`] runs preprocess, one forward
/// pass and arg-max selection in sequence on the calling thread. The
/// backend serializes concurrent calls.
#[derive(Clone)]
pub struct DiseaseDetector {
    backend: Arc<dyn InferenceBackend>,
    catalog: Arc<LabelCatalog>,
}

// Compile-time verification of thread-safety
const _: () = {
    fn assert_send_sync<T: Send + Sync>() {}
    fn verify_thread_safety() {
        assert_send_sync::<DiseaseDetector>();
    }
};

impl std::fmt::Debug for DiseaseDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiseaseDetector")
            .field("num_classes", &self.backend.num_classes())
            .field("catalog_entries", &self.catalog.len())
            .finish()
    }
}

impl DiseaseDetector {
    pub fn new(backend: Arc<dyn InferenceBackend>, catalog: Arc<LabelCatalog>) -> Self {
        let num_classes = backend.num_classes();
        let stray = catalog.out_of_range(num_classes);
        if !stray.is_empty() {
            warn!(
                "Catalog has entries {:?} beyond the model's {} classes; class numbering may not match",
                stray, num_classes
            );
        }
        if catalog.len() < num_classes {
            warn!(
                "Catalog covers {} of {} classes; missing classes resolve to 'Unknown'",
                catalog.len(),
                num_classes
            );
        }
        Self { backend, catalog }
    }

    pub fn num_classes(&self) -> usize {
        self.backend.num_classes()
    }

    pub fn catalog(&self) -> &LabelCatalog {
        &self.catalog
    }

    /// Diagnoses one image.
    pub fn analyze(&self, image: &DynamicImage) -> Result<DiseaseResult, AnalysisError> {
        let scores = self.scores(image)?;
        select(&scores, &self.catalog)
    }

    /// Diagnoses one image and also returns the `k` best classes with their
    /// catalog names.
    pub fn analyze_ranked(
        &self,
        image: &DynamicImage,
        k: usize,
    ) -> Result<(DiseaseResult, Vec<(usize, String, f32)>), AnalysisError> {
        let scores = self.scores(image)?;
        let result = select(&scores, &self.catalog)?;
        let ranked = top_k(&scores, k)
            .into_iter()
            .map(|(index, score)| (index, self.catalog.lookup(index).name, score))
            .collect();
        Ok((result, ranked))
    }

    fn scores(&self, image: &DynamicImage) -> Result<Vec<f32>, AnalysisError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(AnalysisError::InvalidInput("Image has no pixels".into()));
        }
        let input = preprocess(image);
        let scores = self.backend.infer(input)?;
        debug!("Received {} class scores", scores.len());
        Ok(scores)
    }
}
