//! In-memory vector index for tests and ephemeral deployments.

use std::sync::RwLock;
use trombino_core::{
    Embedding, EnrollmentRecord, IndexError, IndexStats, Neighbor, RecordSummary, VectorIndex,
};

/// Volatile index over a `Vec` of records. Contents are lost on restart.
#[derive(Default)]
pub struct MemoryIndex {
    records: RwLock<Vec<EnrollmentRecord>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Vec<EnrollmentRecord>>, IndexError> {
        self.records
            .read()
            .map_err(|_| IndexError::Unavailable("index lock poisoned".into()))
    }
}

impl VectorIndex for MemoryIndex {
    fn insert(&self, record: EnrollmentRecord) -> Result<(), IndexError> {
        self.records
            .write()
            .map_err(|_| IndexError::Unavailable("index lock poisoned".into()))?
            .push(record);
        Ok(())
    }

    fn nearest(&self, probe: &Embedding) -> Result<Option<Neighbor>, IndexError> {
        let records = self.read()?;

        let mut best: Option<Neighbor> = None;
        for record in records.iter() {
            let distance = probe.cosine_distance(&record.embedding);
            if best.as_ref().map_or(true, |b| distance < b.distance) {
                best = Some(Neighbor {
                    person: record.person.clone(),
                    distance,
                    record_id: record.id.clone(),
                });
            }
        }
        Ok(best)
    }

    fn stats(&self) -> Result<IndexStats, IndexError> {
        let records = self.read()?;
        let mut people: Vec<String> = records.iter().map(|r| r.person.clone()).collect();
        people.sort();
        people.dedup();
        Ok(IndexStats { total_records: records.len(), people })
    }

    fn records(&self) -> Result<Vec<RecordSummary>, IndexError> {
        Ok(self
            .read()?
            .iter()
            .map(|r| RecordSummary {
                id: r.id.clone(),
                person: r.person.clone(),
                pose_index: r.pose_index,
                created_at: r.created_at.clone(),
            })
            .collect())
    }

    fn remove_person(&self, person: &str) -> Result<usize, IndexError> {
        let mut records = self
            .records
            .write()
            .map_err(|_| IndexError::Unavailable("index lock poisoned".into()))?;
        let before = records.len();
        records.retain(|r| r.person != person);
        Ok(before - records.len())
    }
}
