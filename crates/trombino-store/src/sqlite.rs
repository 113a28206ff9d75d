//! SQLite-backed vector index.

use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;
use trombino_core::{
    Embedding, EnrollmentRecord, IndexError, IndexStats, Neighbor, RecordSummary, VectorIndex,
};

/// Persistent index over a single SQLite file.
///
/// The connection is serialized behind a mutex; SQLite's own durability
/// guarantees make each insert atomic from the caller's perspective.
pub struct SqliteIndex {
    conn: Mutex<Connection>,
}

impl SqliteIndex {
    /// Open (or create) the database at `path` and ensure the schema.
    pub fn open(path: &Path) -> Result<Self, IndexError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| IndexError::Unavailable(format!("create {}: {e}", parent.display())))?;
        }
        let conn = Connection::open(path).map_err(unavailable)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS enrollments (
                 id            TEXT PRIMARY KEY,
                 person        TEXT NOT NULL,
                 pose_index    INTEGER,
                 embedding     BLOB NOT NULL,
                 model_version TEXT,
                 created_at    TEXT NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_enrollments_person ON enrollments(person);",
        )
        .map_err(unavailable)?;

        tracing::info!(path = %path.display(), "enrollment store opened");
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, IndexError> {
        self.conn
            .lock()
            .map_err(|_| IndexError::Unavailable("store lock poisoned".into()))
    }
}

impl VectorIndex for SqliteIndex {
    fn insert(&self, record: EnrollmentRecord) -> Result<(), IndexError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO enrollments (id, person, pose_index, embedding, model_version, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                record.id,
                record.person,
                record.pose_index,
                encode_embedding(&record.embedding.values),
                record.embedding.model_version,
                record.created_at,
            ],
        )
        .map_err(unavailable)?;
        Ok(())
    }

    fn nearest(&self, probe: &Embedding) -> Result<Option<Neighbor>, IndexError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT id, person, embedding, model_version FROM enrollments")
            .map_err(unavailable)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Vec<u8>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            })
            .map_err(unavailable)?;

        // Full scan, every row compared; best match wins.
        let mut best: Option<Neighbor> = None;
        for row in rows {
            let (id, person, blob, model_version) = row.map_err(unavailable)?;
            let values = decode_embedding(&blob).map_err(|detail| IndexError::Corrupt {
                id: id.clone(),
                detail,
            })?;
            let stored = Embedding { values, model_version };
            let distance = probe.cosine_distance(&stored);
            if best.as_ref().map_or(true, |b| distance < b.distance) {
                best = Some(Neighbor { person, distance, record_id: id });
            }
        }
        Ok(best)
    }

    fn stats(&self) -> Result<IndexStats, IndexError> {
        let conn = self.lock()?;
        let total_records: usize = conn
            .query_row("SELECT COUNT(*) FROM enrollments", [], |row| row.get(0))
            .map_err(unavailable)?;

        let mut stmt = conn
            .prepare("SELECT DISTINCT person FROM enrollments ORDER BY person")
            .map_err(unavailable)?;
        let people = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(unavailable)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(unavailable)?;

        Ok(IndexStats { total_records, people })
    }

    fn records(&self) -> Result<Vec<RecordSummary>, IndexError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT id, person, pose_index, created_at FROM enrollments ORDER BY created_at, id")
            .map_err(unavailable)?;
        let records = stmt
            .query_map([], |row| {
                Ok(RecordSummary {
                    id: row.get(0)?,
                    person: row.get(1)?,
                    pose_index: row.get(2)?,
                    created_at: row.get(3)?,
                })
            })
            .map_err(unavailable)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(unavailable);
        records
    }

    fn remove_person(&self, person: &str) -> Result<usize, IndexError> {
        let conn = self.lock()?;
        let deleted = conn
            .execute("DELETE FROM enrollments WHERE person = ?1", [person])
            .map_err(unavailable)?;
        tracing::info!(person, deleted, "removed enrollments");
        Ok(deleted)
    }
}

fn unavailable(err: rusqlite::Error) -> IndexError {
    IndexError::Unavailable(err.to_string())
}

/// Embeddings are stored as little-endian f32 blobs.
fn encode_embedding(values: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(values.len() * 4);
    for v in values {
        blob.extend_from_slice(&v.to_le_bytes());
    }
    blob
}

fn decode_embedding(blob: &[u8]) -> Result<Vec<f32>, String> {
    if blob.len() % 4 != 0 {
        return Err(format!("embedding blob length {} not a multiple of 4", blob.len()));
    }
    Ok(blob
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emb(values: Vec<f32>) -> Embedding {
        Embedding { values, model_version: Some("facenet-128".into()) }
    }

    fn open_temp() -> (tempfile::TempDir, SqliteIndex) {
        let dir = tempfile::tempdir().unwrap();
        let index = SqliteIndex::open(&dir.path().join("faces.db")).unwrap();
        (dir, index)
    }

    #[test]
    fn test_empty_index_has_no_neighbor() {
        let (_dir, index) = open_temp();
        assert!(index.nearest(&emb(vec![1.0, 0.0])).unwrap().is_none());
    }

    #[test]
    fn test_nearest_picks_smallest_distance() {
        let (_dir, index) = open_temp();
        index
            .insert(EnrollmentRecord::new("ada", None, emb(vec![0.0, 1.0, 0.0])))
            .unwrap();
        index
            .insert(EnrollmentRecord::new("grace", None, emb(vec![1.0, 0.1, 0.0])))
            .unwrap();
        index
            .insert(EnrollmentRecord::new("alan", None, emb(vec![0.0, 0.0, 1.0])))
            .unwrap();

        let neighbor = index.nearest(&emb(vec![1.0, 0.0, 0.0])).unwrap().unwrap();
        assert_eq!(neighbor.person, "grace");
        assert!(neighbor.distance < 0.01, "distance {}", neighbor.distance);
    }

    #[test]
    fn test_roundtrip_preserves_embedding() {
        let (_dir, index) = open_temp();
        let values = vec![-0.25f32, 0.5, 1.0e-7, 3.75];
        index
            .insert(EnrollmentRecord::new("ada", Some(2), emb(values.clone())))
            .unwrap();

        // Identical probe must come back at distance ~0.
        let neighbor = index.nearest(&emb(values)).unwrap().unwrap();
        assert!(neighbor.distance.abs() < 1e-6);
    }

    #[test]
    fn test_stats_dedupe_and_sort_people() {
        let (_dir, index) = open_temp();
        for person in ["grace", "ada", "grace", "ada", "ada"] {
            index
                .insert(EnrollmentRecord::new(person, None, emb(vec![1.0, 0.0])))
                .unwrap();
        }

        let stats = index.stats().unwrap();
        assert_eq!(stats.total_records, 5);
        assert_eq!(stats.people, vec!["ada", "grace"]);
    }

    #[test]
    fn test_records_listing() {
        let (_dir, index) = open_temp();
        index
            .insert(EnrollmentRecord::new("ada", Some(0), emb(vec![1.0])))
            .unwrap();
        index
            .insert(EnrollmentRecord::new("ada", Some(1), emb(vec![0.5])))
            .unwrap();

        let records = index.records().unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.person == "ada"));
        let mut poses: Vec<_> = records.iter().map(|r| r.pose_index).collect();
        poses.sort();
        assert_eq!(poses, vec![Some(0), Some(1)]);
    }

    #[test]
    fn test_remove_person() {
        let (_dir, index) = open_temp();
        for person in ["ada", "ada", "grace"] {
            index
                .insert(EnrollmentRecord::new(person, None, emb(vec![1.0, 0.0])))
                .unwrap();
        }

        assert_eq!(index.remove_person("ada").unwrap(), 2);
        assert_eq!(index.remove_person("ada").unwrap(), 0);
        let stats = index.stats().unwrap();
        assert_eq!(stats.total_records, 1);
        assert_eq!(stats.people, vec!["grace"]);
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("faces.db");
        {
            let index = SqliteIndex::open(&path).unwrap();
            index
                .insert(EnrollmentRecord::new("ada", None, emb(vec![1.0, 0.0])))
                .unwrap();
        }

        let reopened = SqliteIndex::open(&path).unwrap();
        let stats = reopened.stats().unwrap();
        assert_eq!(stats.total_records, 1);
        assert_eq!(stats.people, vec!["ada"]);
    }

    #[test]
    fn test_embedding_blob_roundtrip() {
        let values = vec![0.0f32, -1.5, f32::MIN_POSITIVE, 255.25];
        assert_eq!(decode_embedding(&encode_embedding(&values)).unwrap(), values);
    }

    #[test]
    fn test_decode_rejects_truncated_blob() {
        assert!(decode_embedding(&[0u8, 1, 2]).is_err());
    }
}
