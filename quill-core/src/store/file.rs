//! JSON-file job store

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use super::JobStore;
use crate::error::{QuillError, Result};
use crate::state::WorkflowState;

/// Job store writing one pretty-printed JSON file per request id.
///
/// Writes go to a temporary file first and are renamed into place, so a
/// crash mid-write leaves the previous document intact.
#[derive(Debug, Clone)]
pub struct FileJobStore {
    dir: PathBuf,
}

impl FileJobStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, request_id: &str) -> Result<PathBuf> {
        let valid = !request_id.is_empty()
            && request_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(QuillError::InvalidInput(format!(
                "invalid request id: {:?}",
                request_id
            )));
        }
        Ok(self.dir.join(format!("{}.json", request_id)))
    }
}

#[async_trait]
impl JobStore for FileJobStore {
    async fn load(&self, request_id: &str) -> Result<Option<WorkflowState>> {
        let path = self.path_for(request_id)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let state = serde_json::from_slice(&bytes).map_err(|e| {
                    QuillError::Store(format!("corrupt job file {}: {}", path.display(), e))
                })?;
                Ok(Some(state))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, state: &WorkflowState) -> Result<()> {
        let path = self.path_for(&state.request_id)?;
        tokio::fs::create_dir_all(&self.dir).await?;

        let json = serde_json::to_vec_pretty(state)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;

        tracing::debug!(request_id = %state.request_id, path = %path.display(), "Saved workflow state");
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if let Some(id) = name.to_str().and_then(|n| n.strip_suffix(".json")) {
                ids.push(id.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    async fn delete(&self, request_id: &str) -> Result<bool> {
        let path = self.path_for(request_id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
