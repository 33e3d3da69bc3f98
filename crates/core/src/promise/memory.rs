//! In-process promise store.
//!
//! Backs the embedded runtime and tests. State lives only as long as the
//! store value itself.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::{Created, PromiseRecord, PromiseStore};
use crate::error::{CoreError, CoreResult};
use crate::types::JobId;

#[derive(Debug, Default)]
pub struct MemoryPromiseStore {
    promises: RwLock<HashMap<JobId, PromiseRecord>>,
}

impl MemoryPromiseStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of promises currently tracked.
    pub async fn len(&self) -> usize {
        self.promises.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.promises.read().await.is_empty()
    }
}

#[async_trait]
impl PromiseStore for MemoryPromiseStore {
    async fn create(&self, id: &JobId) -> CoreResult<Created> {
        let mut promises = self.promises.write().await;
        if let Some(existing) = promises.get(id) {
            return Ok(Created {
                record: existing.clone(),
                fresh: false,
            });
        }
        let record = PromiseRecord::pending(id.clone());
        promises.insert(id.clone(), record.clone());
        Ok(Created {
            record,
            fresh: true,
        })
    }

    async fn get(&self, id: &JobId) -> CoreResult<Option<PromiseRecord>> {
        Ok(self.promises.read().await.get(id).cloned())
    }

    async fn resolve(&self, id: &JobId, value: Value) -> CoreResult<PromiseRecord> {
        let mut promises = self.promises.write().await;
        let record = promises
            .get_mut(id)
            .ok_or_else(|| CoreError::PromiseNotFound(id.clone()))?;
        record.resolve(value)?;
        Ok(record.clone())
    }

    async fn reject(&self, id: &JobId, message: String) -> CoreResult<PromiseRecord> {
        let mut promises = self.promises.write().await;
        let record = promises
            .get_mut(id)
            .ok_or_else(|| CoreError::PromiseNotFound(id.clone()))?;
        record.reject(message)?;
        Ok(record.clone())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;
    use crate::promise::PromiseState;

    #[tokio::test]
    async fn create_is_idempotent() {
        let store = MemoryPromiseStore::new();
        let id = JobId::from("a");
        assert!(store.create(&id).await.expect("create").fresh);
        store.resolve(&id, json!("a.sout")).await.expect("resolve");

        let again = store.create(&id).await.expect("create again");
        assert!(!again.fresh);
        assert_eq!(again.record.state, PromiseState::Completed);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn get_unknown_is_none() {
        let store = MemoryPromiseStore::new();
        assert!(store.get(&JobId::from("nope")).await.expect("get").is_none());
    }

    #[tokio::test]
    async fn resolve_unknown_fails() {
        let store = MemoryPromiseStore::new();
        assert_matches!(
            store.resolve(&JobId::from("nope"), json!(null)).await,
            Err(CoreError::PromiseNotFound(_))
        );
    }

    #[tokio::test]
    async fn second_settlement_is_refused() {
        let store = MemoryPromiseStore::new();
        let id = JobId::from("b");
        store.create(&id).await.expect("create");
        store.resolve(&id, json!("b.sout")).await.expect("resolve");

        assert_matches!(
            store.reject(&id, "late".into()).await,
            Err(CoreError::PromiseAlreadySettled(_))
        );
        let record = store.get(&id).await.expect("get").expect("present");
        assert_eq!(record.value, Some(json!("b.sout")));
    }
}
