//! Identity match policy — the two-stage filter that turns an embedding
//! plus a nearest-neighbor distance into a match decision.
//!
//! Stage one rejects untrustworthy captures on detection confidence
//! alone, without touching the index: an embedding computed from a
//! blurry face, a partial occlusion or a non-face region is garbage,
//! and comparing garbage vectors produces false positives. Stage two
//! applies the distance threshold to the single nearest neighbor.

use crate::index::{IndexError, VectorIndex};
use crate::types::{FaceCapture, MatchOutcome};

/// Calibration thresholds for identity matching.
///
/// Both values are tied to the specific embedding model and distance
/// metric in use (FaceNet-128 under cosine distance by default);
/// swapping the model invalidates them, so they are always injected
/// from configuration.
#[derive(Debug, Clone, Copy)]
pub struct MatchPolicy {
    /// Detector confidence below which the capture is rejected outright.
    pub min_detection_confidence: f32,
    /// Largest nearest-neighbor distance still accepted as a match,
    /// inclusive.
    pub max_distance: f32,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self {
            min_detection_confidence: 0.90,
            max_distance: 0.40,
        }
    }
}

impl MatchPolicy {
    /// Classify a capture against the index.
    ///
    /// Pure apart from the index query: re-running with the same capture
    /// against an unchanged index yields the same outcome.
    pub fn match_identity(
        &self,
        capture: &FaceCapture,
        index: &dyn VectorIndex,
    ) -> Result<MatchOutcome, IndexError> {
        let confidence = capture.detection_confidence;

        if confidence < self.min_detection_confidence {
            tracing::debug!(confidence, "match rejected before index query: low detection confidence");
            return Ok(MatchOutcome::low_confidence(confidence));
        }

        let Some(neighbor) = index.nearest(&capture.embedding)? else {
            return Ok(MatchOutcome::empty_index(confidence));
        };

        if neighbor.distance > self.max_distance {
            tracing::debug!(
                person = %neighbor.person,
                distance = neighbor.distance,
                "nearest neighbor beyond match threshold"
            );
            return Ok(MatchOutcome::below_threshold(confidence, neighbor.distance));
        }

        tracing::info!(
            person = %neighbor.person,
            distance = neighbor.distance,
            confidence,
            "identity matched"
        );
        Ok(MatchOutcome::matched(neighbor.person, confidence, neighbor.distance))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Embedding, EnrollmentRecord, IndexStats, MatchReason, Neighbor, RecordSummary};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Index stub that returns a scripted neighbor and counts queries.
    struct ScriptedIndex {
        neighbor: Option<Neighbor>,
        queries: AtomicUsize,
    }

    impl ScriptedIndex {
        fn with_neighbor(person: &str, distance: f32) -> Self {
            Self {
                neighbor: Some(Neighbor {
                    person: person.to_string(),
                    distance,
                    record_id: "r1".to_string(),
                }),
                queries: AtomicUsize::new(0),
            }
        }

        fn empty() -> Self {
            Self { neighbor: None, queries: AtomicUsize::new(0) }
        }

        fn query_count(&self) -> usize {
            self.queries.load(Ordering::SeqCst)
        }
    }

    impl VectorIndex for ScriptedIndex {
        fn insert(&self, _record: EnrollmentRecord) -> Result<(), IndexError> {
            Ok(())
        }
        fn nearest(&self, _probe: &Embedding) -> Result<Option<Neighbor>, IndexError> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            Ok(self.neighbor.clone())
        }
        fn stats(&self) -> Result<IndexStats, IndexError> {
            Ok(IndexStats { total_records: 0, people: vec![] })
        }
        fn records(&self) -> Result<Vec<RecordSummary>, IndexError> {
            Ok(vec![])
        }
        fn remove_person(&self, _person: &str) -> Result<usize, IndexError> {
            Ok(0)
        }
    }

    fn capture(confidence: f32) -> FaceCapture {
        FaceCapture {
            embedding: Embedding { values: vec![1.0, 0.0, 0.0], model_version: None },
            detection_confidence: confidence,
        }
    }

    #[test]
    fn test_low_confidence_never_queries_index() {
        let policy = MatchPolicy::default();
        let index = ScriptedIndex::with_neighbor("ada", 0.01);

        for confidence in [0.0, 0.5, 0.89, 0.8999] {
            let out = policy.match_identity(&capture(confidence), &index).unwrap();
            assert!(!out.matched);
            assert_eq!(out.reason, MatchReason::LowConfidence);
            assert_eq!(out.distance, None);
        }
        assert_eq!(index.query_count(), 0);
    }

    #[test]
    fn test_confidence_threshold_inclusive() {
        let policy = MatchPolicy::default();
        let index = ScriptedIndex::with_neighbor("ada", 0.1);
        let out = policy.match_identity(&capture(0.90), &index).unwrap();
        assert!(out.matched, "confidence exactly at the floor proceeds to the index");
        assert_eq!(index.query_count(), 1);
    }

    #[test]
    fn test_empty_index() {
        let policy = MatchPolicy::default();
        let index = ScriptedIndex::empty();
        let out = policy.match_identity(&capture(0.95), &index).unwrap();
        assert!(!out.matched);
        assert_eq!(out.reason, MatchReason::EmptyIndex);
        assert_eq!(index.query_count(), 1);
    }

    #[test]
    fn test_matched_iff_distance_at_most_threshold() {
        let policy = MatchPolicy::default();

        for (distance, expect_match) in [(0.0, true), (0.39, true), (0.40, true), (0.4001, false), (1.2, false)] {
            let index = ScriptedIndex::with_neighbor("ada", distance);
            let out = policy.match_identity(&capture(0.95), &index).unwrap();
            assert_eq!(out.matched, expect_match, "distance {distance}");
            if expect_match {
                assert_eq!(out.reason, MatchReason::Matched);
                assert_eq!(out.person.as_deref(), Some("ada"));
            } else {
                assert_eq!(out.reason, MatchReason::BelowSimilarityThreshold);
                assert_eq!(out.person, None);
            }
            assert_eq!(out.distance, Some(distance));
        }
    }

    #[test]
    fn test_idempotent_against_unchanged_index() {
        let policy = MatchPolicy::default();
        let index = ScriptedIndex::with_neighbor("ada", 0.2);
        let probe = capture(0.93);

        let first = policy.match_identity(&probe, &index).unwrap();
        let second = policy.match_identity(&probe, &index).unwrap();
        assert_eq!(first.matched, second.matched);
        assert_eq!(first.person, second.person);
        assert_eq!(first.distance, second.distance);
        assert_eq!(first.reason, second.reason);
    }

    #[test]
    fn test_custom_thresholds() {
        let policy = MatchPolicy { min_detection_confidence: 0.5, max_distance: 0.8 };
        let index = ScriptedIndex::with_neighbor("ada", 0.7);
        let out = policy.match_identity(&capture(0.6), &index).unwrap();
        assert!(out.matched);
    }
}
