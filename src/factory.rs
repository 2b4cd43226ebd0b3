use crate::error::EngineError;
use crate::model::Workflow;
use crate::step::Payload;
use crate::store::StateStore;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Mints a workflow identity: `{platform}-{environment}-{8 hex chars}`.
///
/// ```
/// let id = kubeloom::new_workflow_id("k3s", "development");
/// assert!(id.starts_with("k3s-development-"));
/// assert_eq!(id.len(), "k3s-development-".len() + 8);
/// ```
pub fn new_workflow_id(platform: &str, environment: &str) -> String {
    let suffix: String = Uuid::new_v4().simple().to_string().chars().take(8).collect();
    format!("{}-{}-{}", platform, environment, suffix)
}

/// Creates and persists new `PENDING` workflows.
#[derive(Clone)]
pub struct WorkflowFactory {
    store: Arc<dyn StateStore>,
}

impl std::fmt::Debug for WorkflowFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowFactory")
            .field("store", &self.store.backend_name())
            .finish()
    }
}

impl WorkflowFactory {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    /// Persists a fresh workflow and returns it.
    ///
    /// A clash with an existing identity surfaces as
    /// [`StoreError::DuplicateIdentity`](crate::store::StoreError::DuplicateIdentity).
    pub async fn create(
        &self,
        platform: &str,
        environment: &str,
        config: Payload,
    ) -> Result<Workflow, EngineError> {
        let workflow = Workflow::new(
            new_workflow_id(platform, environment),
            platform,
            environment,
            config,
        );
        self.store.create_workflow(&workflow).await?;
        info!("Workflow created: {}", workflow.workflow_id);
        Ok(workflow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::WorkflowStatus;
    use crate::store::{MemoryStore, StoreError};
    use serde_json::json;

    #[test]
    fn test_workflow_id_format() {
        let id = new_workflow_id("eks", "production");
        let suffix = id.strip_prefix("eks-production-").unwrap();
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, new_workflow_id("eks", "production"));
    }

    #[tokio::test]
    async fn test_create_persists_pending_workflow() {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStore::new());
        let factory = WorkflowFactory::new(store.clone());

        let mut config = Payload::new();
        config.insert("nodes".into(), json!(3));
        let workflow = factory.create("k3s", "staging", config).await.unwrap();

        let stored = store.get_workflow(&workflow.workflow_id).await.unwrap().unwrap();
        assert_eq!(stored, workflow);
        assert_eq!(stored.status, WorkflowStatus::Pending);
        assert_eq!(stored.created_at, stored.updated_at);
        assert_eq!(stored.config["nodes"], 3);
    }

    #[tokio::test]
    async fn test_duplicate_identity_propagates() {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStore::new());
        let existing = Workflow::new("taken", "k3s", "dev", Payload::new());
        store.create_workflow(&existing).await.unwrap();

        let result = store.create_workflow(&existing).await.map_err(EngineError::from);
        assert!(matches!(
            result,
            Err(EngineError::Store(StoreError::DuplicateIdentity(_)))
        ));
    }
}
