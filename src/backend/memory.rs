//! In-process result backend, the default for local execution and tests.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;

use crate::backend::{ResultBackend, TaskMeta};
use crate::error::TaskError;

/// Stores task records in a concurrent in-process map.
///
/// Suitable whenever callers and workers share one process (the local
/// transport, unit tests). Records expire lazily: reads past `expires_at`
/// return the record unchanged and
/// [`ResultStore`](crate::backend::ResultStore) treats it as absent;
/// [`cleanup_expired`](ResultBackend::cleanup_expired) removes them
/// eagerly.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    records: DashMap<String, TaskMeta>,
}

impl InMemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records, expired ones included.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no records are stored.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl ResultBackend for InMemoryBackend {
    async fn read_state(&self, task_id: &str) -> Result<Option<TaskMeta>, TaskError> {
        Ok(self.records.get(task_id).map(|entry| entry.clone()))
    }

    async fn write_state(&self, task_id: &str, meta: &TaskMeta) -> Result<(), TaskError> {
        self.records.insert(task_id.to_string(), meta.clone());
        Ok(())
    }

    async fn delete_state(&self, task_id: &str) -> Result<bool, TaskError> {
        Ok(self.records.remove(task_id).is_some())
    }

    async fn cleanup_expired(&self) -> Result<usize, TaskError> {
        let now = Utc::now();
        let before = self.records.len();
        self.records.retain(|_, meta| !meta.is_expired(now));
        Ok(before - self.records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::TaskState;
    use chrono::Duration;
    use serde_json::json;

    fn success_meta() -> TaskMeta {
        TaskMeta {
            state: TaskState::Success,
            result: Some(json!(8)),
            date_done: Some(Utc::now()),
            ..TaskMeta::pending()
        }
    }

    #[tokio::test]
    async fn absent_id_reads_none() {
        let backend = InMemoryBackend::new();
        assert_eq!(backend.read_state("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let backend = InMemoryBackend::new();
        let meta = success_meta();
        backend.write_state("id-1", &meta).await.unwrap();
        assert_eq!(backend.read_state("id-1").await.unwrap(), Some(meta));
    }

    #[tokio::test]
    async fn delete_reports_existence() {
        let backend = InMemoryBackend::new();
        backend.write_state("id-1", &success_meta()).await.unwrap();
        assert!(backend.delete_state("id-1").await.unwrap());
        assert!(!backend.delete_state("id-1").await.unwrap());
    }

    #[tokio::test]
    async fn cleanup_removes_only_expired_records() {
        let backend = InMemoryBackend::new();
        let live = success_meta();
        let expired = TaskMeta {
            expires_at: Some(Utc::now() - Duration::seconds(5)),
            ..success_meta()
        };
        backend.write_state("live", &live).await.unwrap();
        backend.write_state("gone", &expired).await.unwrap();

        assert_eq!(backend.cleanup_expired().await.unwrap(), 1);
        assert_eq!(backend.read_state("gone").await.unwrap(), None);
        assert!(backend.read_state("live").await.unwrap().is_some());
    }
}
