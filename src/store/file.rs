//! Single-document JSON storage backend
//!
//! The whole state lives in one file shaped as
//! `{"workflows": {...}, "executions": {...}}`, both keyed by identity.
//! Every write reads the document, modifies it and replaces the file
//! atomically, all under one in-process lock. The temp file and the
//! containing directory are both fsynced before a write returns.

use super::{Result, StateStore, StoreError};
use crate::model::{next_update_timestamp, Execution, Workflow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StateDocument {
    #[serde(default)]
    workflows: BTreeMap<String, Workflow>,
    #[serde(default)]
    executions: BTreeMap<String, Execution>,
}

pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    /// Open the document at `path`, creating it (and its directory) if missing.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let store = Self {
            path,
            lock: Mutex::new(()),
        };

        if fs::try_exists(&store.path).await? {
            // Fail early on a corrupt document rather than on the first write.
            store.read_document().await?;
        } else {
            store.write_document(&StateDocument::default()).await?;
            debug!("Created state document at {}", store.path.display());
        }
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_document(&self) -> Result<StateDocument> {
        let bytes = fs::read(&self.path).await?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(StateDocument::default());
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn write_document(&self, document: &StateDocument) -> Result<()> {
        let json = serde_json::to_vec_pretty(document)?;

        let temp_path = self.path.with_extension("json.tmp");
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(&json).await?;
        file.sync_all().await?;
        drop(file);

        if let Err(e) = fs::rename(&temp_path, &self.path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        self.sync_parent_dir().await
    }

    /// Flush the directory entry so the rename itself survives a crash.
    #[cfg(unix)]
    async fn sync_parent_dir(&self) -> Result<()> {
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        fs::File::open(parent).await?.sync_all().await?;
        Ok(())
    }

    // Directories cannot be opened as files here; the rename is the best we get.
    #[cfg(not(unix))]
    async fn sync_parent_dir(&self) -> Result<()> {
        Ok(())
    }

    /// Read-modify-write under the store lock.
    async fn modify<T>(
        &self,
        apply: impl FnOnce(&mut StateDocument) -> Result<T> + Send,
    ) -> Result<T> {
        let _guard = self.lock.lock().await;
        let mut document = self.read_document().await?;
        let result = apply(&mut document)?;
        self.write_document(&document).await?;
        Ok(result)
    }
}

#[async_trait]
impl StateStore for FileStore {
    async fn create_workflow(&self, workflow: &Workflow) -> Result<()> {
        self.modify(|doc| {
            if doc.workflows.contains_key(&workflow.workflow_id) {
                return Err(StoreError::DuplicateIdentity(workflow.workflow_id.clone()));
            }
            doc.workflows
                .insert(workflow.workflow_id.clone(), workflow.clone());
            Ok(())
        })
        .await
    }

    async fn update_workflow(&self, workflow: &mut Workflow) -> Result<()> {
        let updated = self
            .modify(|doc| {
                let stored = doc
                    .workflows
                    .get_mut(&workflow.workflow_id)
                    .ok_or_else(|| StoreError::NotFound(workflow.workflow_id.clone()))?;
                let mut updated = workflow.clone();
                updated.updated_at = next_update_timestamp(stored.updated_at);
                *stored = updated.clone();
                Ok(updated)
            })
            .await?;
        workflow.updated_at = updated.updated_at;
        Ok(())
    }

    async fn get_workflow(&self, workflow_id: &str) -> Result<Option<Workflow>> {
        let _guard = self.lock.lock().await;
        let mut document = self.read_document().await?;
        Ok(document.workflows.remove(workflow_id))
    }

    async fn list_workflows(&self) -> Result<Vec<Workflow>> {
        let _guard = self.lock.lock().await;
        let document = self.read_document().await?;
        let mut all: Vec<Workflow> = document.workflows.into_values().collect();
        all.sort_by_key(|w| w.created_at);
        Ok(all)
    }

    async fn create_execution(&self, execution: &Execution) -> Result<()> {
        self.modify(|doc| {
            if doc.executions.contains_key(&execution.execution_id) {
                return Err(StoreError::DuplicateIdentity(execution.execution_id.clone()));
            }
            doc.executions
                .insert(execution.execution_id.clone(), execution.clone());
            Ok(())
        })
        .await
    }

    async fn update_execution(&self, execution: &Execution) -> Result<()> {
        self.modify(|doc| {
            let stored = doc
                .executions
                .get_mut(&execution.execution_id)
                .ok_or_else(|| StoreError::NotFound(execution.execution_id.clone()))?;
            *stored = execution.clone();
            Ok(())
        })
        .await
    }

    async fn list_executions(&self, workflow_id: &str) -> Result<Vec<Execution>> {
        let _guard = self.lock.lock().await;
        let document = self.read_document().await?;
        Ok(document
            .executions
            .into_values()
            .filter(|e| e.workflow_id == workflow_id)
            .collect())
    }

    fn backend_name(&self) -> &'static str {
        "file"
    }
}
