use crate::AnnouncementStore;
use async_trait::async_trait;
use likewatch_core::{AnnouncementRecord, CoreError, DatabaseError};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Volatile store used when no database is wanted, and by tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, AnnouncementRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl AnnouncementStore for MemoryStore {
    async fn get(&self, post_id: &str) -> Result<Option<AnnouncementRecord>, CoreError> {
        Ok(self.records.read().await.get(post_id).cloned())
    }

    async fn insert(&self, record: &AnnouncementRecord) -> Result<(), CoreError> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.post_id) {
            return Err(CoreError::Database(DatabaseError::ConstraintViolation {
                constraint: format!("announcements.post_id = {}", record.post_id),
            }));
        }
        records.insert(record.post_id.clone(), record.clone());
        Ok(())
    }

    async fn update_reaction_count(&self, post_id: &str, count: i64) -> Result<bool, CoreError> {
        match self.records.write().await.get_mut(post_id) {
            Some(record) => {
                record.reaction_count = count;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn increment_reaction_count(&self, post_id: &str) -> Result<bool, CoreError> {
        match self.records.write().await.get_mut(post_id) {
            Some(record) => {
                record.reaction_count += 1;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
