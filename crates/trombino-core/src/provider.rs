//! Embedding provider seam.
//!
//! The provider owns face detection and embedding extraction; everything
//! behind this trait is an opaque capability of the underlying models.
//! Methods are synchronous and CPU-bound — the dispatch layer is
//! responsible for offloading calls to a worker pool.

use crate::types::{FaceAttributes, FaceCapture, ModelInfo};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    /// Strict extraction found no face. An expected outcome, surfaced to
    /// callers as a decision rather than a fault.
    #[error("no face detected")]
    NoFaceDetected,
    #[error("image could not be decoded: {0}")]
    ImageUnreadable(String),
    #[error("model file not found: {0} — place exported ONNX models in the model directory")]
    ModelNotFound(String),
    #[error("attribute analysis model not configured")]
    AnalyzerUnavailable,
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Face detection + embedding extraction behind one seam.
pub trait EmbeddingProvider: Send + Sync {
    /// Locate the most prominent face and extract its embedding.
    ///
    /// `strict` controls the no-face case: strict extraction fails with
    /// [`ProviderError::NoFaceDetected`], permissive extraction returns
    /// `Ok(None)`.
    fn embed(&self, image: &[u8], strict: bool) -> Result<Option<FaceCapture>, ProviderError>;

    /// Estimate age, gender, dominant emotion and dominant ethnicity for
    /// the most prominent face (or the full frame when none is found).
    fn analyze(&self, image: &[u8]) -> Result<FaceAttributes, ProviderError>;

    /// Names of the embedding model and detector in use.
    fn info(&self) -> ModelInfo;
}
