//! # kubeloom
//!
//! Sequential agent pipeline engine for Kubernetes cluster provisioning.
//!
//! A workflow runs a fixed pipeline of named steps ("agents"): planning,
//! infrastructure provisioning, GitOps setup, monitoring, validation and
//! documentation. Each step sees the outputs of every step before it. Every
//! step invocation is persisted as an [`Execution`], and the [`Workflow`]
//! record tracks status and cumulative outputs, so a run can be inspected
//! after the fact.
//!
//! ## Features
//!
//! - **Fault isolation**: a step that returns `Err` or panics is recorded as a
//!   failed execution, never a crashed run
//! - **Critical steps**: a failed planner or infrastructure step stops the run;
//!   other failures are recorded and the run continues
//! - **Interchangeable state stores**: SQLite, a single JSON document, or memory
//! - **Forward-only status**: [`WorkflowStatus`] never moves backwards
//!
//! ## Quick Start
//!
//! ```rust
//! use kubeloom::prelude::*;
//! use async_trait::async_trait;
//! use std::sync::Arc;
//!
//! #[derive(Debug)]
//! struct PlannerAgent;
//!
//! #[async_trait]
//! impl Agent for PlannerAgent {
//!     async fn execute(&self, input: &AgentInput) -> Result<AgentOutput, AgentError> {
//!         Ok(AgentOutput::success("PlannerAgent", Payload::new())
//!             .with_data("summary", format!("plan for {}", input.workflow_id)))
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() {
//! let store: Arc<dyn StateStore> = Arc::new(MemoryStore::new());
//! let orchestrator = Orchestrator::builder(store)
//!     .register("planner", PlannerAgent)
//!     .build()
//!     .expect("valid orchestrator");
//!
//! let output = orchestrator
//!     .run_workflow("k3s", "development", Payload::new())
//!     .await
//!     .expect("state store available");
//!
//! // Only the planner is registered, so the remaining steps are reported missing.
//! assert!(!output.success);
//! assert!(output.data.contains_key("planner"));
//! assert!(output.errors.contains(&"Agent 'infrastructure' not registered".to_string()));
//! # }
//! ```
//!
//! ## Inspecting a run
//!
//! ```rust
//! use kubeloom::prelude::*;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let store: Arc<dyn StateStore> = Arc::new(MemoryStore::new());
//! let orchestrator = Orchestrator::new(store);
//! let id = orchestrator
//!     .create_workflow("eks", "production", Payload::new())
//!     .await
//!     .expect("state store available");
//!
//! if let Some(workflow) = orchestrator.get_workflow_status(&id).await.expect("readable") {
//!     assert_eq!(workflow.status, WorkflowStatus::Pending);
//! }
//! for execution in orchestrator.list_executions(&id).await.expect("readable") {
//!     println!("{} {}", execution.agent_name, execution.status);
//! }
//! # }
//! ```

mod context;
mod error;
mod executor;
mod factory;
mod model;
mod step;
mod workflow;

pub mod config;
pub mod logging;
pub mod pipeline;
pub mod prelude;
pub mod store;

pub use config::{Config, ConfigError, StateBackend};
pub use context::{RunContext, StepOutcome};
pub use error::{AgentError, EngineError};
pub use executor::ExecutionWrapper;
pub use factory::{new_workflow_id, WorkflowFactory};
pub use model::{next_update_timestamp, AgentStatus, Execution, Workflow, WorkflowStatus};
pub use pipeline::{PipelineStep, PIPELINE};
pub use step::{Agent, AgentInput, AgentOutput, Payload, StepName};
pub use store::{open_store, StateStore, StoreError};
pub use workflow::{Orchestrator, OrchestratorBuilder, ORCHESTRATOR_NAME};
