//! Durable state for workflows and step executions.
//!
//! Every backend implements [`StateStore`] and behaves identically from the
//! caller's side:
//! - writes are durable before the call returns
//! - creating an existing identity fails with [`StoreError::DuplicateIdentity`]
//! - updating a missing identity fails with [`StoreError::NotFound`]
//! - a normal miss on read is `Ok(None)`, not an error
//! - records read back are structurally equal to what was written
//!
//! Backends: [`SqliteStore`] (two tables), [`FileStore`] (one JSON document)
//! and [`MemoryStore`] (process-local, for tests and dry runs).

mod file;
mod memory;
mod sqlite;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::config::{Config, StateBackend};
use crate::model::{Execution, Workflow};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Errors from storage operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("already exists: {0}")]
    DuplicateIdentity(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("lock error: {0}")]
    Lock(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Backend-agnostic persistence for [`Workflow`] and [`Execution`] records.
///
/// Workflows are keyed by `workflow_id`, executions by `execution_id` with a
/// secondary lookup by `workflow_id`.
#[async_trait]
pub trait StateStore: Send + Sync {
    // === Workflow Operations ===

    /// Persist a new workflow.
    async fn create_workflow(&self, workflow: &Workflow) -> Result<()>;

    /// Overwrite an existing workflow.
    ///
    /// Sets `workflow.updated_at` to a timestamp strictly later than the
    /// stored one before writing, so the caller's copy matches the store.
    async fn update_workflow(&self, workflow: &mut Workflow) -> Result<()>;

    /// Get workflow by identity
    async fn get_workflow(&self, workflow_id: &str) -> Result<Option<Workflow>>;

    /// List all workflows, oldest first
    async fn list_workflows(&self) -> Result<Vec<Workflow>>;

    // === Execution Operations ===

    /// Persist a new execution.
    async fn create_execution(&self, execution: &Execution) -> Result<()>;

    /// Overwrite an existing execution.
    async fn update_execution(&self, execution: &Execution) -> Result<()>;

    /// All executions of a workflow in no particular order.
    ///
    /// Callers that care about order sort by `started_at`.
    async fn list_executions(&self, workflow_id: &str) -> Result<Vec<Execution>>;

    /// Short backend name for logs
    fn backend_name(&self) -> &'static str;
}

/// Open the store selected by `config`.
pub async fn open_store(config: &Config) -> Result<Arc<dyn StateStore>> {
    let store: Arc<dyn StateStore> = match config.state_backend {
        StateBackend::Sqlite => Arc::new(SqliteStore::open(&config.state_db_path).await?),
        StateBackend::File => Arc::new(FileStore::open(config.state_file_path()).await?),
        StateBackend::Memory => Arc::new(MemoryStore::new()),
    };
    info!("Using {} state store", store.backend_name());
    Ok(store)
}
