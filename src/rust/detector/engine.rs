use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use ndarray::Array4;
use ort::session::Session;
use ort::value::{Tensor, ValueType};
use log::{debug, info};

use super::error::InferenceError;
use super::preprocess::{PreprocessedInput, CHANNELS, INPUT_LEN, INPUT_SIZE};
use super::select::ConfidenceVector;
use crate::asset_manager::ModelHandle;
use crate::runtime::{create_session_builder, RuntimeConfig};

/// Runs one forward pass of the disease classifier.
///
/// Implementations must serialize calls internally if the underlying
/// interpreter is not re-entrant; callers may share one backend across
/// threads.
pub trait InferenceBackend: Send + Sync {
    /// Length of every confidence vector this backend produces.
    fn num_classes(&self) -> usize;

    /// Consumes one preprocessed image and returns one score per class.
    fn infer(&self, input: PreprocessedInput) -> Result<ConfidenceVector, InferenceError>;
}

/// Opens an [`InferenceBackend`] for a loaded model.
pub trait BackendFactory: Send + Sync {
    fn open(&self, model: &ModelHandle) -> Result<Arc<dyn InferenceBackend>, InferenceError>;
}

/// Creates [`OnnxBackend`]s with a fixed runtime configuration.
#[derive(Debug, Clone, Default)]
pub struct OnnxBackendFactory {
    pub runtime_config: RuntimeConfig,
}

impl OnnxBackendFactory {
    pub fn new(runtime_config: RuntimeConfig) -> Self {
        Self { runtime_config }
    }
}

impl BackendFactory for OnnxBackendFactory {
    fn open(&self, model: &ModelHandle) -> Result<Arc<dyn InferenceBackend>, InferenceError> {
        Ok(Arc::new(OnnxBackend::from_handle(model, &self.runtime_config)?))
    }
}

/// ONNX Runtime backend for an image classifier taking `[1, 224, 224, 3]`
/// float input and producing `[1, N]` float scores.
///
/// The session is guarded by a mutex so forward passes never overlap, and it
/// is released when the backend is dropped.
#[derive(Debug)]
pub struct OnnxBackend {
    session: Mutex<Session>,
    input_name: String,
    num_classes: usize,
}

impl OnnxBackend {
    pub fn from_handle(model: &ModelHandle, config: &RuntimeConfig) -> Result<Self, InferenceError> {
        let session = create_session_builder(config)?.commit_from_memory(model.bytes())?;
        Self::validate_model(&session)?;

        let input_name = session.inputs[0].name.clone();
        let declared = Self::declared_classes(&session);

        let mut backend = Self {
            session: Mutex::new(session),
            input_name,
            num_classes: declared.unwrap_or(0),
        };

        if declared.is_none() {
            // Dynamic output dimension: ask the model once with a black image.
            let sample = backend.run(PreprocessedInput::zeros())?;
            info!("Inferred class count from model output: {}", sample.len());
            backend.num_classes = sample.len();
        }

        if backend.num_classes == 0 {
            return Err(InferenceError::Runtime("Model reports zero output classes".into()));
        }

        info!(
            "Loaded classifier from {:?} ({} classes)",
            model.path(),
            backend.num_classes
        );
        Ok(backend)
    }

    /// Checks the model has one input and at least one output, and that any
    /// fixed input dimensions match the preprocessed layout.
    fn validate_model(session: &Session) -> Result<(), InferenceError> {
        let input = session.inputs.first().ok_or_else(|| {
            InferenceError::Runtime("Model must have an image input".into())
        })?;
        if session.outputs.is_empty() {
            return Err(InferenceError::Runtime(
                "Model must have at least 1 output for class scores".into(),
            ));
        }

        if let ValueType::Tensor { dimensions, .. } = &input.input_type {
            let expected = [1, INPUT_SIZE as i64, INPUT_SIZE as i64, CHANNELS as i64];
            if dimensions.len() != expected.len() {
                return Err(InferenceError::Runtime(format!(
                    "Model input '{}' has rank {}, expected NHWC rank 4",
                    input.name,
                    dimensions.len()
                )));
            }
            for (axis, (&got, &want)) in dimensions.iter().zip(expected.iter()).enumerate() {
                // Non-positive dimensions are symbolic
                if got > 0 && got != want {
                    return Err(InferenceError::Runtime(format!(
                        "Model input '{}' axis {} is {}, expected {}",
                        input.name, axis, got, want
                    )));
                }
            }
        }
        Ok(())
    }

    fn declared_classes(session: &Session) -> Option<usize> {
        match &session.outputs.first()?.output_type {
            ValueType::Tensor { dimensions, .. } => dimensions
                .last()
                .and_then(|&d| usize::try_from(d).ok())
                .filter(|&d| d > 0),
            _ => None,
        }
    }

    fn run(&self, input: PreprocessedInput) -> Result<ConfidenceVector, InferenceError> {
        if input.len() != INPUT_LEN {
            return Err(InferenceError::ShapeMismatch {
                expected: INPUT_LEN,
                actual: input.len(),
            });
        }

        let size = INPUT_SIZE as usize;
        let array = Array4::from_shape_vec((1, size, size, CHANNELS), input.into_vec())
            .map_err(|e| InferenceError::Runtime(format!("Failed to create input array: {}", e)))?;
        let tensor = Tensor::from_array(array)?;

        let mut input_tensors = HashMap::new();
        input_tensors.insert(self.input_name.as_str(), tensor);

        let session = self
            .session
            .lock()
            .map_err(|_| InferenceError::Runtime("Session lock poisoned".into()))?;
        let outputs = session.run(input_tensors)?;
        let scores = outputs[0].try_extract_tensor::<f32>()?;

        let scores: ConfidenceVector = scores.iter().copied().collect();
        debug!("Forward pass produced {} scores", scores.len());
        Ok(scores)
    }
}

impl InferenceBackend for OnnxBackend {
    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn infer(&self, input: PreprocessedInput) -> Result<ConfidenceVector, InferenceError> {
        let scores = self.run(input)?;
        if scores.len() != self.num_classes {
            return Err(InferenceError::ShapeMismatch {
                expected: self.num_classes,
                actual: scores.len(),
            });
        }
        Ok(scores)
    }
}

// Compile-time verification of thread-safety
const _: () = {
    fn assert_send_sync<T: Send + Sync>() {}
    fn verify_thread_safety() {
        assert_send_sync::<OnnxBackend>();
    }
};
