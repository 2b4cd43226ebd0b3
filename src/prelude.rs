//! Commonly used types and traits

pub use crate::error::{AgentError, EngineError};
pub use crate::model::{AgentStatus, Execution, Workflow, WorkflowStatus};
pub use crate::step::{Agent, AgentInput, AgentOutput, Payload, StepName};
pub use crate::store::{MemoryStore, StateStore};
pub use crate::workflow::Orchestrator;
