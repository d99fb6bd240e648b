//! Binary face-photo classifier via ONNX Runtime.
//!
//! Wraps the exported MOD-2D-CNN model: NHWC float input of shape
//! (1, 224, 224, 3), one sigmoid output. The model is opaque; callers only
//! see the [`Scorer`] seam.

use crate::preprocess::INPUT_SHAPE;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("model file not found: {0} (export the Keras model to ONNX and place it there)")]
    ModelNotFound(String),
    #[error("input tensor has shape {0:?}, expected [1, 224, 224, 3]")]
    InvalidInput(Vec<usize>),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("model produced an unusable score: {0}")]
    InvalidOutput(f32),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Tensor in, probability out.
///
/// The scoring seam between the request flow and whatever model backs it.
/// Closures implement it too, which is how tests inject fixed scores.
pub trait Scorer: Send {
    fn score(&mut self, input: &Array4<f32>) -> Result<f32, ClassifierError>;
}

impl<F> Scorer for F
where
    F: FnMut(&Array4<f32>) -> Result<f32, ClassifierError> + Send,
{
    fn score(&mut self, input: &Array4<f32>) -> Result<f32, ClassifierError> {
        self(input)
    }
}

/// Sanity-check a raw model score.
///
/// Non-finite values are rejected. Finite values that drift outside [0, 1]
/// (e.g. a model exported without its final sigmoid clamp) are clamped.
pub fn checked_score(raw: f32) -> Result<f32, ClassifierError> {
    if !raw.is_finite() {
        return Err(ClassifierError::InvalidOutput(raw));
    }
    if !(0.0..=1.0).contains(&raw) {
        tracing::warn!(score = raw, "classifier score outside [0, 1]; clamping");
    }
    Ok(raw.clamp(0.0, 1.0))
}

/// ONNX-backed classifier.
pub struct OnnxClassifier {
    session: Session,
}

impl OnnxClassifier {
    /// Load the ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, ClassifierError> {
        if !Path::new(model_path).exists() {
            return Err(ClassifierError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded classifier model"
        );

        Ok(Self { session })
    }
}

impl Scorer for OnnxClassifier {
    fn score(&mut self, input: &Array4<f32>) -> Result<f32, ClassifierError> {
        if input.shape() != INPUT_SHAPE {
            return Err(ClassifierError::InvalidInput(input.shape().to_vec()));
        }

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ClassifierError::InferenceFailed(format!("score extraction: {e}")))?;

        let first = raw
            .first()
            .copied()
            .ok_or_else(|| ClassifierError::InferenceFailed("empty output tensor".into()))?;

        checked_score(first)
    }
}
