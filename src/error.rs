use crate::model::WorkflowStatus;
use crate::step::StepName;
use crate::store::StoreError;
use thiserror::Error;

/// Errors raised by the orchestrator and the workflow factory.
///
/// Step failures never show up here: they are folded into the run's
/// [`AgentOutput`](crate::AgentOutput). What remains are problems that leave
/// no well-formed result to return, chiefly a state store that cannot be
/// written.
///
/// # Non-Exhaustive
///
/// Always include a wildcard arm when matching:
///
/// ```
/// use kubeloom::EngineError;
///
/// fn describe(error: &EngineError) -> String {
///     match error {
///         EngineError::Store(e) => format!("state store unavailable: {e}"),
///         EngineError::WorkflowNotFound(id) => format!("no workflow {id}"),
///         EngineError::InvalidTransition { from, to } => {
///             format!("cannot move from {from} to {to}")
///         }
///         _ => error.to_string(),
///     }
/// }
/// ```
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum EngineError {
    /// The state store failed. The run is aborted because later status
    /// inspection depends on what was persisted.
    #[error("State store error: {0}")]
    Store(#[from] StoreError),

    /// No workflow with this identity exists.
    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),

    /// A workflow status change would move backwards or leave a terminal state.
    #[error("Invalid workflow transition: {from} -> {to}")]
    InvalidTransition {
        /// Current status
        from: WorkflowStatus,
        /// Requested status
        to: WorkflowStatus,
    },

    /// Two agents were registered under the same step name.
    #[error("Agent already registered: {0}")]
    AgentAlreadyRegistered(StepName),

    /// The engine was configured inconsistently.
    #[error("Invalid engine configuration: {0}")]
    Configuration(String),
}

/// Unexpected faults raised by a step's domain logic.
///
/// The executor converts every variant into a failed
/// [`AgentOutput`](crate::AgentOutput), so these never escape a run.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum AgentError {
    /// Generic fault with a message.
    #[error("{0}")]
    Fault(String),

    /// An external provisioning tool exited unsuccessfully.
    #[error("command `{program}` exited with status {status}: {stderr}")]
    Command {
        /// Program that was invoked
        program: String,
        /// Exit status code
        status: i32,
        /// Captured standard error
        stderr: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AgentError {
    /// Creates a [`AgentError::Fault`] from any displayable value.
    pub fn fault(message: impl Into<String>) -> Self {
        Self::Fault(message.into())
    }
}
