//! trombino-core — face recognition domain logic.
//!
//! Quality gate, identity match policy and enrollment coordination over
//! two seams: an [`EmbeddingProvider`] (face detection + embedding
//! extraction, ONNX-backed in production) and a [`VectorIndex`]
//! (nearest-neighbor store, implemented in `trombino-store`).

pub mod enroll;
pub mod index;
pub mod onnx;
pub mod policy;
pub mod provider;
pub mod quality;
pub mod types;

pub use enroll::{EnrollError, EnrollmentCoordinator, EnrollmentOutcome, RejectReason, Rejection};
pub use index::{IndexError, VectorIndex};
pub use onnx::OnnxProvider;
pub use policy::MatchPolicy;
pub use provider::{EmbeddingProvider, ProviderError};
pub use quality::{QualityGate, QualityThresholds};
pub use types::{
    Embedding, EnrollmentRecord, FaceAttributes, FaceCapture, IndexStats, MatchOutcome,
    MatchReason, ModelInfo, Neighbor, QualityReason, QualityVerdict, RecordSummary,
};
