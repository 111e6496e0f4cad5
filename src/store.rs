//! Book record storage.
//!
//! The pipeline only needs load-by-id and save. [`MemoryBookStore`] keeps
//! records in a shared map and is what the server runs with.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::PipelineResult;
use crate::schema::BookRecord;

/// Capability: persistence of book records and their captures.
#[async_trait::async_trait]
pub trait BookStore: Send + Sync {
    async fn load(&self, id: Uuid) -> PipelineResult<Option<BookRecord>>;

    /// Insert or replace the record as a single write.
    async fn save(&self, record: BookRecord) -> PipelineResult<()>;

    /// Delete a record. Returns whether it existed.
    async fn remove(&self, id: Uuid) -> PipelineResult<bool>;
}

/// In-memory store.
#[derive(Debug, Clone, Default)]
pub struct MemoryBookStore {
    inner: Arc<RwLock<HashMap<Uuid, BookRecord>>>,
}

impl MemoryBookStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl BookStore for MemoryBookStore {
    async fn load(&self, id: Uuid) -> PipelineResult<Option<BookRecord>> {
        Ok(self.inner.read().await.get(&id).cloned())
    }

    async fn save(&self, record: BookRecord) -> PipelineResult<()> {
        let id = record.id;
        let captures = record.captures.len();
        self.inner.write().await.insert(id, record);
        tracing::debug!("BookStore: saved {} ({} captures)", id, captures);
        Ok(())
    }

    async fn remove(&self, id: Uuid) -> PipelineResult<bool> {
        Ok(self.inner.write().await.remove(&id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{RawCapture, Role};

    #[tokio::test]
    async fn test_save_then_load() {
        let store = MemoryBookStore::new();
        let record = BookRecord::new(vec![RawCapture::new(Role::Cover, vec![1, 2, 3])]);
        let id = record.id;

        assert!(store.load(id).await.unwrap().is_none());
        store.save(record).await.unwrap();

        let loaded = store.load(id).await.unwrap().unwrap();
        assert_eq!(loaded.captures.len(), 1);
        assert_eq!(loaded.captures[0].data, vec![1, 2, 3]);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_save_replaces_existing() {
        let store = MemoryBookStore::new();
        let mut record = BookRecord::new(Vec::new());
        store.save(record.clone()).await.unwrap();

        record.title = Some("Новое название".to_string());
        store.save(record.clone()).await.unwrap();

        let loaded = store.load(record.id).await.unwrap().unwrap();
        assert_eq!(loaded.title.as_deref(), Some("Новое название"));
        assert_eq!(store.len().await, 1);

        assert!(store.remove(record.id).await.unwrap());
        assert!(!store.remove(record.id).await.unwrap());
        assert!(store.is_empty().await);
    }
}
