use serde::{Deserialize, Serialize};

/// Face embedding vector (128-dimensional for FaceNet).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "facenet-128").
    pub model_version: Option<String>,
}

impl Embedding {
    /// Cosine distance between two embeddings: `1 - cosine_similarity`.
    ///
    /// Returns a value in [0, 2]; 0 means identical direction. This is the
    /// dissimilarity metric the vector index ranks neighbors by, so the
    /// match threshold is calibrated against it.
    pub fn cosine_distance(&self, other: &Embedding) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 { 1.0 - dot / denom } else { 1.0 }
    }
}

/// A persisted enrollment: one embedding tied to one person.
///
/// Created only from images that passed the quality gate; never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrollmentRecord {
    pub id: String,
    pub person: String,
    /// Position of the source image within a batch enrollment.
    pub pose_index: Option<u32>,
    pub embedding: Embedding,
    pub created_at: String,
}

impl EnrollmentRecord {
    /// Build a record with a fresh id and the current timestamp.
    pub fn new(person: &str, pose_index: Option<u32>, embedding: Embedding) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            person: person.to_string(),
            pose_index,
            embedding,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// One face located in an image: its embedding plus the detector's
/// certainty that the region really is a face, in [0, 1].
#[derive(Debug, Clone)]
pub struct FaceCapture {
    pub embedding: Embedding,
    pub detection_confidence: f32,
}

/// Nearest neighbor returned by a vector index query.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub person: String,
    pub distance: f32,
    pub record_id: String,
}

/// Why an identification attempt resolved the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchReason {
    Matched,
    LowConfidence,
    EmptyIndex,
    BelowSimilarityThreshold,
    NoFaceDetected,
}

/// Decision produced by the identity match policy. Ephemeral; never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchOutcome {
    pub matched: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub person: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f32>,
    pub detection_confidence: f32,
    pub reason: MatchReason,
}

impl MatchOutcome {
    pub fn matched(person: String, confidence: f32, distance: f32) -> Self {
        Self {
            matched: true,
            person: Some(person),
            distance: Some(distance),
            detection_confidence: confidence,
            reason: MatchReason::Matched,
        }
    }

    pub fn low_confidence(confidence: f32) -> Self {
        Self {
            matched: false,
            person: None,
            distance: None,
            detection_confidence: confidence,
            reason: MatchReason::LowConfidence,
        }
    }

    pub fn empty_index(confidence: f32) -> Self {
        Self {
            matched: false,
            person: None,
            distance: None,
            detection_confidence: confidence,
            reason: MatchReason::EmptyIndex,
        }
    }

    pub fn below_threshold(confidence: f32, distance: f32) -> Self {
        Self {
            matched: false,
            person: None,
            distance: Some(distance),
            detection_confidence: confidence,
            reason: MatchReason::BelowSimilarityThreshold,
        }
    }

    /// Outcome for a strict extraction that found no face at all. This is
    /// an expected result of pointing the camera at nothing, not an error.
    pub fn no_face() -> Self {
        Self {
            matched: false,
            person: None,
            distance: None,
            detection_confidence: 0.0,
            reason: MatchReason::NoFaceDetected,
        }
    }
}

/// Why the quality gate accepted or rejected an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QualityReason {
    Ok,
    TooDark,
    TooBright,
    TooBlurry,
    Unreadable,
}

/// Verdict of the quality gate for one image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityVerdict {
    pub acceptable: bool,
    pub reason: QualityReason,
    /// The measurement that decided the verdict: mean brightness for
    /// dark/bright, Laplacian variance for blur, sharpness when accepted.
    pub measurement: f32,
}

/// Estimated demographic and expression attributes for one face.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceAttributes {
    pub age: u32,
    pub gender: String,
    pub dominant_emotion: String,
    pub dominant_race: String,
}

/// Aggregate view of the index contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStats {
    pub total_records: usize,
    /// Distinct enrolled people, sorted.
    pub people: Vec<String>,
}

/// Summary of one stored record, without the embedding itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordSummary {
    pub id: String,
    pub person: String,
    pub pose_index: Option<u32>,
    pub created_at: String,
}

/// Identifies the models behind the embedding provider, reported by
/// the verify endpoint and the daemon status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub model: String,
    pub detector: String,
}
