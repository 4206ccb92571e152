use std::cmp::Ordering;
use serde::{Deserialize, Serialize};

use super::catalog::LabelCatalog;
use super::error::AnalysisError;

/// Raw per-class scores produced by one forward pass.
pub type ConfidenceVector = Vec<f32>;

/// Diagnosis shown to the user for one analyzed image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiseaseResult {
    pub disease_name: String,
    pub confidence: f32,
    pub treatment: String,
}

impl DiseaseResult {
    pub fn new(disease_name: impl Into<String>, confidence: f32, treatment: impl Into<String>) -> Self {
        Self {
            disease_name: disease_name.into(),
            confidence,
            treatment: treatment.into(),
        }
    }

    /// Placeholder record displayed in place of a diagnosis after a failed analysis.
    pub fn analysis_failed() -> Self {
        Self::new("Error", 0.0, "Failed to analyze image. Please try again.")
    }
}

/// Index of the largest score. The first occurrence wins ties and NaN never
/// beats a number.
pub fn argmax(scores: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &score) in scores.iter().enumerate() {
        match best {
            None => best = Some((i, score)),
            Some((_, current)) if current.is_nan() && !score.is_nan() => best = Some((i, score)),
            Some((_, current)) if score > current => best = Some((i, score)),
            _ => {}
        }
    }
    best.map(|(i, _)| i)
}

/// Picks the most confident class and resolves it through the catalog.
pub fn select(scores: &[f32], catalog: &LabelCatalog) -> Result<DiseaseResult, AnalysisError> {
    let index = argmax(scores)
        .ok_or_else(|| AnalysisError::InvalidInput("Confidence vector is empty".into()))?;
    // argmax only lands on NaN when every score is NaN
    if scores[index].is_nan() {
        return Err(AnalysisError::InvalidInput("Confidence vector has no numeric score".into()));
    }
    let info = catalog.lookup(index);

    Ok(DiseaseResult {
        disease_name: info.name,
        confidence: scores[index],
        treatment: info.treatment,
    })
}

/// The `k` highest scores as `(index, score)`, best first. Equal scores keep
/// their original order.
pub fn top_k(scores: &[f32], k: usize) -> Vec<(usize, f32)> {
    let mut indexed: Vec<(usize, f32)> = scores.iter().copied().enumerate().collect();
    indexed.sort_by(|a, b| match (a.1.is_nan(), b.1.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal),
    });
    indexed.truncate(k);
    indexed
}
