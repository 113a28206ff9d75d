//! Enrollment coordinator — runs the quality gate and strict embedding
//! extraction over a batch of images, inserting one record per accepted
//! image. Per-image failures are recorded and never abort the batch;
//! only a batch where nothing was accepted fails as a whole.

use crate::index::{IndexError, VectorIndex};
use crate::provider::{EmbeddingProvider, ProviderError};
use crate::quality::QualityGate;
use crate::types::{EnrollmentRecord, QualityReason};
use serde::Serialize;
use thiserror::Error;

/// Why one image in a batch was not enrolled.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectReason {
    Quality { reason: QualityReason, measurement: f32 },
    NoFaceDetected,
    Provider { message: String },
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::Quality { reason, measurement } => {
                write!(f, "quality check failed ({reason:?}, measurement {measurement:.1})")
            }
            RejectReason::NoFaceDetected => write!(f, "no face detected"),
            RejectReason::Provider { message } => write!(f, "provider error: {message}"),
        }
    }
}

/// One rejected image, identified by its position in the input batch.
#[derive(Debug, Clone, Serialize)]
pub struct Rejection {
    pub index: usize,
    pub reason: RejectReason,
}

/// Result of a (partially) successful batch enrollment.
#[derive(Debug, Clone, Serialize)]
pub struct EnrollmentOutcome {
    pub accepted: usize,
    pub rejections: Vec<Rejection>,
}

#[derive(Error, Debug)]
pub enum EnrollError {
    /// Every image in the batch was rejected; nothing was inserted.
    #[error("no image in the batch was accepted for enrollment")]
    AllRejected { rejections: Vec<Rejection> },
    /// The store itself failed — a system fault, distinct from per-image
    /// rejections, so the whole operation aborts.
    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Enrolls a person from one or more images.
pub struct EnrollmentCoordinator<'a> {
    provider: &'a dyn EmbeddingProvider,
    index: &'a dyn VectorIndex,
    gate: QualityGate,
}

impl<'a> EnrollmentCoordinator<'a> {
    pub fn new(provider: &'a dyn EmbeddingProvider, index: &'a dyn VectorIndex, gate: QualityGate) -> Self {
        Self { provider, index, gate }
    }

    /// Enroll `person` from `images`, processing each image independently
    /// in input order.
    ///
    /// Every enrollment path goes through the quality gate and strict
    /// detection; a single image is just a batch of one. For batches of
    /// more than one image the input position is stored as `pose_index`.
    pub fn enroll(&self, person: &str, images: &[Vec<u8>]) -> Result<EnrollmentOutcome, EnrollError> {
        let batch = images.len() > 1;
        let mut accepted = 0usize;
        let mut rejections = Vec::new();

        for (i, bytes) in images.iter().enumerate() {
            let verdict = self.gate.assess(bytes);
            if !verdict.acceptable {
                tracing::info!(
                    person,
                    image = i,
                    reason = ?verdict.reason,
                    measurement = verdict.measurement,
                    "enrollment image rejected by quality gate"
                );
                rejections.push(Rejection {
                    index: i,
                    reason: RejectReason::Quality {
                        reason: verdict.reason,
                        measurement: verdict.measurement,
                    },
                });
                continue;
            }

            let capture = match self.provider.embed(bytes, true) {
                Ok(Some(capture)) => capture,
                Ok(None) | Err(ProviderError::NoFaceDetected) => {
                    tracing::info!(person, image = i, "enrollment image rejected: no face detected");
                    rejections.push(Rejection { index: i, reason: RejectReason::NoFaceDetected });
                    continue;
                }
                Err(err) => {
                    tracing::warn!(person, image = i, error = %err, "enrollment image rejected: provider error");
                    rejections.push(Rejection {
                        index: i,
                        reason: RejectReason::Provider { message: err.to_string() },
                    });
                    continue;
                }
            };

            let pose_index = batch.then_some(i as u32);
            self.index
                .insert(EnrollmentRecord::new(person, pose_index, capture.embedding))?;
            accepted += 1;
        }

        if accepted == 0 {
            return Err(EnrollError::AllRejected { rejections });
        }

        tracing::info!(person, accepted, rejected = rejections.len(), "enrollment finished");
        Ok(EnrollmentOutcome { accepted, rejections })
    }
}
