//! In-memory job store

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::JobStore;
use crate::error::Result;
use crate::state::WorkflowState;

/// Job store backed by a shared map.
///
/// Clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct MemoryJobStore {
    jobs: Arc<RwLock<HashMap<String, WorkflowState>>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored workflows
    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn load(&self, request_id: &str) -> Result<Option<WorkflowState>> {
        Ok(self.jobs.read().await.get(request_id).cloned())
    }

    async fn save(&self, state: &WorkflowState) -> Result<()> {
        self.jobs
            .write()
            .await
            .insert(state.request_id.clone(), state.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self.jobs.read().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    async fn delete(&self, request_id: &str) -> Result<bool> {
        Ok(self.jobs.write().await.remove(request_id).is_some())
    }
}
