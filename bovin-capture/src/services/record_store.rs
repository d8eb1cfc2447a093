//! In-memory morphology record storage

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{PersistenceError, RecordStore};
use crate::models::{MorphologyRecord, NewMorphologyRecord};

/// Record store kept in process memory, used with the mock backend
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    records: RwLock<HashMap<Uuid, MorphologyRecord>>,
    created_by: Option<String>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Operator name stamped on every created record
    pub fn with_created_by(mut self, created_by: impl Into<String>) -> Self {
        self.created_by = Some(created_by.into());
        self
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// All records, oldest first
    pub async fn list(&self) -> Vec<MorphologyRecord> {
        let mut records: Vec<_> = self.records.read().await.values().cloned().collect();
        records.sort_by_key(|r| r.captured_at);
        records
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn create_morphology_record(
        &self,
        record: &NewMorphologyRecord,
    ) -> Result<MorphologyRecord, PersistenceError> {
        let created = MorphologyRecord {
            id: Uuid::new_v4(),
            animal_id: record.cow_id.clone(),
            source_detection: record.source_detection,
            measurements: record.measurements.clone(),
            captured_at: Utc::now(),
            created_by: self.created_by.clone(),
        };
        self.records.write().await.insert(created.id, created.clone());
        tracing::debug!(
            record_id = %created.id,
            cow_id = %created.animal_id,
            "Record stored in memory"
        );
        Ok(created)
    }

    async fn get_morphology_record(
        &self,
        id: Uuid,
    ) -> Result<Option<MorphologyRecord>, PersistenceError> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn delete_morphology_record(&self, id: Uuid) -> Result<bool, PersistenceError> {
        Ok(self.records.write().await.remove(&id).is_some())
    }
}
