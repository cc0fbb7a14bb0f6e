//! Persistent job store
//!
//! The store holds one [`WorkflowState`] per request id. The engine saves at
//! every step boundary and before returning a suspension, so a fresh process
//! can pick any workflow up from its last saved node.
//!
//! - [`MemoryJobStore`]: process-local, for tests and single-shot runs
//! - [`FileJobStore`]: one JSON document per request under a directory

mod file;
mod memory;

pub use file::FileJobStore;
pub use memory::MemoryJobStore;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::StoreConfig;
use crate::error::{QuillError, Result};
use crate::state::{StatePatch, WorkflowState};

/// Storage backend for workflow state
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Load a workflow, `None` if unknown
    async fn load(&self, request_id: &str) -> Result<Option<WorkflowState>>;

    /// Insert or replace a workflow
    async fn save(&self, state: &WorkflowState) -> Result<()>;

    /// Known request ids, sorted
    async fn list(&self) -> Result<Vec<String>>;

    /// Remove a workflow; returns whether it existed
    async fn delete(&self, request_id: &str) -> Result<bool>;

    /// Apply a partial update to a stored workflow and return the result.
    ///
    /// Not atomic across processes; the engine serializes access per request.
    async fn merge(&self, request_id: &str, patch: StatePatch) -> Result<WorkflowState> {
        let mut state = self
            .load(request_id)
            .await?
            .ok_or_else(|| QuillError::WorkflowNotFound(request_id.to_string()))?;
        state.apply(patch)?;
        self.save(&state).await?;
        Ok(state)
    }
}

/// Build the store named by the configuration
pub fn from_config(config: &StoreConfig) -> Arc<dyn JobStore> {
    match config {
        StoreConfig::Memory => Arc::new(MemoryJobStore::new()),
        StoreConfig::File { dir } => Arc::new(FileJobStore::new(dir.clone())),
    }
}
