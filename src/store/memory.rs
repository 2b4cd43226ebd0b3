//! In-memory storage backend
//!
//! Nothing survives the process. Used for tests and dry runs.

use super::{Result, StateStore, StoreError};
use crate::model::{next_update_timestamp, Execution, Workflow};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

pub struct MemoryStore {
    workflows: RwLock<HashMap<String, Workflow>>,
    executions: RwLock<HashMap<String, Execution>>,

    /// workflow_id -> execution ids
    executions_by_workflow: RwLock<HashMap<String, HashSet<String>>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create a new empty memory store
    pub fn new() -> Self {
        Self {
            workflows: RwLock::new(HashMap::new()),
            executions: RwLock::new(HashMap::new()),
            executions_by_workflow: RwLock::new(HashMap::new()),
        }
    }

    fn write_lock<T>(lock: &RwLock<T>) -> Result<std::sync::RwLockWriteGuard<'_, T>> {
        lock.write()
            .map_err(|e| StoreError::Lock(format!("write lock poisoned: {}", e)))
    }

    fn read_lock<T>(lock: &RwLock<T>) -> Result<std::sync::RwLockReadGuard<'_, T>> {
        lock.read()
            .map_err(|e| StoreError::Lock(format!("read lock poisoned: {}", e)))
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn create_workflow(&self, workflow: &Workflow) -> Result<()> {
        let mut workflows = Self::write_lock(&self.workflows)?;
        if workflows.contains_key(&workflow.workflow_id) {
            return Err(StoreError::DuplicateIdentity(workflow.workflow_id.clone()));
        }
        workflows.insert(workflow.workflow_id.clone(), workflow.clone());
        Ok(())
    }

    async fn update_workflow(&self, workflow: &mut Workflow) -> Result<()> {
        let mut workflows = Self::write_lock(&self.workflows)?;
        let stored = workflows
            .get_mut(&workflow.workflow_id)
            .ok_or_else(|| StoreError::NotFound(workflow.workflow_id.clone()))?;
        workflow.updated_at = next_update_timestamp(stored.updated_at);
        *stored = workflow.clone();
        Ok(())
    }

    async fn get_workflow(&self, workflow_id: &str) -> Result<Option<Workflow>> {
        let workflows = Self::read_lock(&self.workflows)?;
        Ok(workflows.get(workflow_id).cloned())
    }

    async fn list_workflows(&self) -> Result<Vec<Workflow>> {
        let workflows = Self::read_lock(&self.workflows)?;
        let mut all: Vec<Workflow> = workflows.values().cloned().collect();
        all.sort_by_key(|w| w.created_at);
        Ok(all)
    }

    async fn create_execution(&self, execution: &Execution) -> Result<()> {
        {
            let mut executions = Self::write_lock(&self.executions)?;
            if executions.contains_key(&execution.execution_id) {
                return Err(StoreError::DuplicateIdentity(execution.execution_id.clone()));
            }
            executions.insert(execution.execution_id.clone(), execution.clone());
        }

        let mut index = Self::write_lock(&self.executions_by_workflow)?;
        index
            .entry(execution.workflow_id.clone())
            .or_default()
            .insert(execution.execution_id.clone());
        Ok(())
    }

    async fn update_execution(&self, execution: &Execution) -> Result<()> {
        let mut executions = Self::write_lock(&self.executions)?;
        let stored = executions
            .get_mut(&execution.execution_id)
            .ok_or_else(|| StoreError::NotFound(execution.execution_id.clone()))?;
        *stored = execution.clone();
        Ok(())
    }

    async fn list_executions(&self, workflow_id: &str) -> Result<Vec<Execution>> {
        let index = Self::read_lock(&self.executions_by_workflow)?;
        let Some(ids) = index.get(workflow_id) else {
            return Ok(Vec::new());
        };
        let executions = Self::read_lock(&self.executions)?;
        Ok(ids
            .iter()
            .filter_map(|id| executions.get(id).cloned())
            .collect())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
