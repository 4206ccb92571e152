#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use image::{DynamicImage, Rgb, RgbImage};
use plantdoc::{
    BackendFactory, DetectionService, InferenceBackend, InferenceError, ModelHandle,
    PreprocessedInput,
};

pub const NUM_CLASSES: usize = 38;

/// Scores a real leaf model would give a clear case of class 37.
pub fn leaf_blight_scores() -> Vec<f32> {
    let mut scores = vec![0.05; NUM_CLASSES - 1];
    scores.push(0.95);
    scores
}

/// Backend that returns the same scores for every input.
pub struct ScriptedBackend {
    scores: Vec<f32>,
    fail: bool,
    gate: Option<Arc<Gate>>,
    pub calls: AtomicUsize,
    pub last_input_len: AtomicUsize,
}

impl ScriptedBackend {
    pub fn returning(scores: Vec<f32>) -> Self {
        Self {
            scores,
            fail: false,
            gate: None,
            calls: AtomicUsize::new(0),
            last_input_len: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::returning(leaf_blight_scores())
        }
    }

    pub fn gated(scores: Vec<f32>, gate: Arc<Gate>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::returning(scores)
        }
    }
}

impl InferenceBackend for ScriptedBackend {
    fn num_classes(&self) -> usize {
        self.scores.len()
    }

    fn infer(&self, input: PreprocessedInput) -> Result<Vec<f32>, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.last_input_len.store(input.len(), Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.wait();
        }
        if self.fail {
            return Err(InferenceError::Runtime("native interpreter crashed".into()));
        }
        Ok(self.scores.clone())
    }
}

/// Hands out one shared backend, after checking the model bytes were loaded.
pub struct ScriptedFactory {
    pub backend: Arc<ScriptedBackend>,
    pub opened: AtomicUsize,
    gate: Option<Arc<Gate>>,
}

impl ScriptedFactory {
    pub fn new(backend: ScriptedBackend) -> Arc<Self> {
        Arc::new(Self {
            backend: Arc::new(backend),
            opened: AtomicUsize::new(0),
            gate: None,
        })
    }

    /// A factory whose `open` blocks until `gate` is opened.
    pub fn gated(backend: ScriptedBackend, gate: Arc<Gate>) -> Arc<Self> {
        Arc::new(Self {
            backend: Arc::new(backend),
            opened: AtomicUsize::new(0),
            gate: Some(gate),
        })
    }
}

impl BackendFactory for ScriptedFactory {
    fn open(&self, model: &ModelHandle) -> Result<Arc<dyn InferenceBackend>, InferenceError> {
        if model.is_empty() {
            return Err(InferenceError::Runtime("empty model file".into()));
        }
        if let Some(gate) = &self.gate {
            gate.wait();
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        let backend: Arc<dyn InferenceBackend> = self.backend.clone();
        Ok(backend)
    }
}

/// A latch the test opens to let a blocked forward pass finish.
#[derive(Default)]
pub struct Gate {
    open: Mutex<bool>,
    cond: Condvar,
}

impl Gate {
    pub fn open(&self) {
        *self.open.lock().unwrap() = true;
        self.cond.notify_all();
    }

    fn wait(&self) {
        let mut open = self.open.lock().unwrap();
        while !*open {
            open = self.cond.wait(open).unwrap();
        }
    }
}

pub fn catalog_json() -> String {
    let mut entries = Vec::new();
    for i in 0..NUM_CLASSES - 1 {
        entries.push(format!(
            r#""{}": {{"name": "Disease {}", "treatment": "Treatment {}"}}"#,
            i, i, i
        ));
    }
    entries.push(r#""37": {"name": "Leaf Blight", "treatment": "Apply fungicide X"}"#.to_string());
    format!("{{{}}}", entries.join(",\n"))
}

pub fn write_model(dir: &Path) {
    fs::write(dir.join("hub_model.onnx"), b"fake onnx weights").unwrap();
}

pub fn write_catalog(dir: &Path, json: &str) {
    fs::write(dir.join("class_indices.json"), json).unwrap();
}

pub fn write_assets(dir: &Path) {
    write_model(dir);
    write_catalog(dir, &catalog_json());
}

pub fn service_with(dir: &Path, factory: Arc<ScriptedFactory>) -> DetectionService {
    DetectionService::builder()
        .with_assets_dir(dir)
        .with_backend_factory(factory)
        .build()
        .unwrap()
}

pub fn solid_leaf(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([34, 139, 34])))
}
