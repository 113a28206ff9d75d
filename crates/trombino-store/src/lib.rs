//! trombino-store — [`VectorIndex`](trombino_core::VectorIndex) backends.
//!
//! [`SqliteIndex`] persists enrollment records in a single SQLite file
//! and answers nearest-neighbor queries with a full scan over the
//! decoded embeddings; at gallery sizes where a face service makes
//! sense, the scan is cheaper than maintaining an ANN structure.
//! [`MemoryIndex`] backs tests and ephemeral deployments.

mod memory;
mod sqlite;

pub use memory::MemoryIndex;
pub use sqlite::SqliteIndex;
