//! Vector index seam.
//!
//! The index is an external, concurrently-accessible store of
//! (embedding, person) pairs. The core imposes no locking of its own;
//! implementations provide their own consistency for concurrent
//! insert/query.

use crate::types::{Embedding, EnrollmentRecord, IndexStats, Neighbor, RecordSummary};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("vector index unavailable: {0}")]
    Unavailable(String),
    #[error("corrupt record {id}: {detail}")]
    Corrupt { id: String, detail: String },
}

/// Store of enrollment records supporting insert and single
/// nearest-neighbor lookup by cosine distance.
pub trait VectorIndex: Send + Sync {
    /// Persist a record. Atomic from the caller's perspective: after a
    /// failure the record is absent.
    fn insert(&self, record: EnrollmentRecord) -> Result<(), IndexError>;

    /// Single nearest neighbor to `probe`, or `None` iff the index is
    /// empty.
    fn nearest(&self, probe: &Embedding) -> Result<Option<Neighbor>, IndexError>;

    /// Record count and the distinct people enrolled.
    fn stats(&self) -> Result<IndexStats, IndexError>;

    /// All stored records, without embeddings.
    fn records(&self) -> Result<Vec<RecordSummary>, IndexError>;

    /// Remove every record for `person`; returns how many were deleted.
    fn remove_person(&self, person: &str) -> Result<usize, IndexError>;
}
