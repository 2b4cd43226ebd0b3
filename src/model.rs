//! Persisted records: workflows and per-step executions.

use crate::error::EngineError;
use crate::step::{AgentOutput, Payload};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Lifecycle of a workflow.
///
/// `PENDING → PLANNING → PROVISIONING → CONFIGURING → VALIDATING →
/// DOCUMENTING → {COMPLETED | FAILED}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    Pending,
    Planning,
    Provisioning,
    Configuring,
    Validating,
    Documenting,
    Completed,
    Failed,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStatus::Pending => "pending",
            WorkflowStatus::Planning => "planning",
            WorkflowStatus::Provisioning => "provisioning",
            WorkflowStatus::Configuring => "configuring",
            WorkflowStatus::Validating => "validating",
            WorkflowStatus::Documenting => "documenting",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Failed => "failed",
        }
    }

    /// Position in the pipeline. Both terminal states share the last rank.
    fn rank(&self) -> u8 {
        match self {
            WorkflowStatus::Pending => 0,
            WorkflowStatus::Planning => 1,
            WorkflowStatus::Provisioning => 2,
            WorkflowStatus::Configuring => 3,
            WorkflowStatus::Validating => 4,
            WorkflowStatus::Documenting => 5,
            WorkflowStatus::Completed | WorkflowStatus::Failed => 6,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowStatus::Completed | WorkflowStatus::Failed)
    }

    /// Returns `true` if a workflow in this status may move to `next`.
    ///
    /// Statuses only move forward. Staying on the same status is allowed
    /// because several steps can share one status, and `FAILED` can be
    /// entered from any non-terminal status.
    ///
    /// ```
    /// use kubeloom::WorkflowStatus;
    ///
    /// assert!(WorkflowStatus::Pending.can_transition_to(WorkflowStatus::Planning));
    /// assert!(WorkflowStatus::Configuring.can_transition_to(WorkflowStatus::Configuring));
    /// assert!(WorkflowStatus::Planning.can_transition_to(WorkflowStatus::Failed));
    /// assert!(!WorkflowStatus::Validating.can_transition_to(WorkflowStatus::Provisioning));
    /// assert!(!WorkflowStatus::Completed.can_transition_to(WorkflowStatus::Failed));
    /// ```
    pub fn can_transition_to(&self, next: WorkflowStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == WorkflowStatus::Failed || next.rank() >= self.rank()
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(WorkflowStatus::Pending),
            "planning" => Ok(WorkflowStatus::Planning),
            "provisioning" => Ok(WorkflowStatus::Provisioning),
            "configuring" => Ok(WorkflowStatus::Configuring),
            "validating" => Ok(WorkflowStatus::Validating),
            "documenting" => Ok(WorkflowStatus::Documenting),
            "completed" => Ok(WorkflowStatus::Completed),
            "failed" => Ok(WorkflowStatus::Failed),
            other => Err(format!("unknown workflow status: {other}")),
        }
    }
}

/// Lifecycle of a single step execution: `IDLE → RUNNING → {SUCCESS | FAILED}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Idle,
    Running,
    Success,
    Failed,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Idle => "idle",
            AgentStatus::Running => "running",
            AgentStatus::Success => "success",
            AgentStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentStatus::Success | AgentStatus::Failed)
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(AgentStatus::Idle),
            "running" => Ok(AgentStatus::Running),
            "success" => Ok(AgentStatus::Success),
            "failed" => Ok(AgentStatus::Failed),
            other => Err(format!("unknown agent status: {other}")),
        }
    }
}

/// One requested deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub workflow_id: String,
    pub status: WorkflowStatus,
    pub platform: String,
    pub environment: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub config: Payload,
    #[serde(default)]
    pub outputs: Payload,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl Workflow {
    /// Creates a `PENDING` workflow with `created_at == updated_at == now`.
    pub fn new(
        workflow_id: impl Into<String>,
        platform: impl Into<String>,
        environment: impl Into<String>,
        config: Payload,
    ) -> Self {
        let now = Utc::now();
        Self {
            workflow_id: workflow_id.into(),
            status: WorkflowStatus::Pending,
            platform: platform.into(),
            environment: environment.into(),
            created_at: now,
            updated_at: now,
            config,
            outputs: Payload::new(),
            errors: Vec::new(),
        }
    }

    /// Moves the workflow to `next`, refusing backward or post-terminal moves.
    pub fn transition(&mut self, next: WorkflowStatus) -> Result<(), EngineError> {
        if !self.status.can_transition_to(next) {
            return Err(EngineError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Context handed to every step: platform and environment merged under
    /// the config, with config keys taking precedence.
    pub fn run_context(&self) -> Payload {
        let mut context = Payload::new();
        context.insert("platform".into(), Value::String(self.platform.clone()));
        context.insert(
            "environment".into(),
            Value::String(self.environment.clone()),
        );
        for (key, value) in &self.config {
            context.insert(key.clone(), value.clone());
        }
        context
    }
}

/// Timestamp for an update of a record last written at `previous`.
///
/// Always strictly later than `previous`, even when the wall clock has not
/// advanced or has stepped backwards.
pub fn next_update_timestamp(previous: DateTime<Utc>) -> DateTime<Utc> {
    let now = Utc::now();
    if now > previous {
        now
    } else {
        previous + Duration::microseconds(1)
    }
}

/// Durable record of one step invocation.
///
/// Terminal status and `completed_at` are set together by [`Execution::finish`]
/// and never cleared afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub execution_id: String,
    pub workflow_id: String,
    pub agent_name: String,
    pub status: AgentStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub input_data: Payload,
    #[serde(default)]
    pub output_data: Payload,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub logs: Vec<String>,
}

impl Execution {
    /// Creates a `RUNNING` execution with a fresh identity, started now.
    pub fn start(
        workflow_id: impl Into<String>,
        agent_name: impl Into<String>,
        input_data: Payload,
    ) -> Self {
        Self {
            execution_id: Uuid::new_v4().to_string(),
            workflow_id: workflow_id.into(),
            agent_name: agent_name.into(),
            status: AgentStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            input_data,
            output_data: Payload::new(),
            error_message: None,
            logs: Vec::new(),
        }
    }

    /// Records the terminal outcome of the step.
    ///
    /// Has no effect on an execution that already finished.
    pub fn finish(
        &mut self,
        output: &AgentOutput,
        output_data: Payload,
        completed_at: DateTime<Utc>,
    ) {
        if self.completed_at.is_some() {
            return;
        }
        self.status = if output.success {
            AgentStatus::Success
        } else {
            AgentStatus::Failed
        };
        self.completed_at = Some(completed_at);
        self.output_data = output_data;
        self.logs = output.logs.clone();
        self.error_message = output.error_message();
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Wall-clock time between start and completion.
    pub fn duration(&self) -> Option<Duration> {
        self.completed_at.map(|end| end - self.started_at)
    }

    /// Short form of the identity for log lines.
    pub fn short_id(&self) -> &str {
        self.execution_id.get(..8).unwrap_or(&self.execution_id)
    }
}

/// Serializes `value` into a [`Payload`], wrapping non-object values under `"value"`.
pub(crate) fn to_payload<T: Serialize>(value: &T) -> Result<Payload, serde_json::Error> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => {
            let mut map = Payload::new();
            map.insert("value".into(), other);
            Ok(map)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_serde_names() {
        assert_eq!(
            serde_json::to_value(WorkflowStatus::Provisioning).ok(),
            Some(json!("provisioning"))
        );
        assert_eq!(
            serde_json::to_value(AgentStatus::Success).ok(),
            Some(json!("success"))
        );
        assert_eq!(
            "documenting".parse::<WorkflowStatus>(),
            Ok(WorkflowStatus::Documenting)
        );
        assert_eq!("running".parse::<AgentStatus>(), Ok(AgentStatus::Running));
        assert!("rolled_back".parse::<WorkflowStatus>().is_err());
    }

    #[test]
    fn test_transition_forward_only() {
        let mut workflow = Workflow::new("wf", "k3s", "development", Payload::new());
        assert!(workflow.transition(WorkflowStatus::Planning).is_ok());
        assert!(workflow.transition(WorkflowStatus::Configuring).is_ok());
        assert!(workflow.transition(WorkflowStatus::Configuring).is_ok());

        let result = workflow.transition(WorkflowStatus::Provisioning);
        assert!(matches!(
            result,
            Err(EngineError::InvalidTransition {
                from: WorkflowStatus::Configuring,
                to: WorkflowStatus::Provisioning,
            })
        ));
        assert_eq!(workflow.status, WorkflowStatus::Configuring);

        assert!(workflow.transition(WorkflowStatus::Failed).is_ok());
        assert!(workflow.transition(WorkflowStatus::Completed).is_err());
    }

    #[test]
    fn test_new_workflow_timestamps() {
        let workflow = Workflow::new("wf", "eks", "production", Payload::new());
        assert_eq!(workflow.status, WorkflowStatus::Pending);
        assert_eq!(workflow.created_at, workflow.updated_at);
    }

    #[test]
    fn test_next_update_timestamp_is_strict() {
        let future = Utc::now() + Duration::seconds(60);
        assert_eq!(next_update_timestamp(future), future + Duration::microseconds(1));

        let past = Utc::now() - Duration::seconds(60);
        assert!(next_update_timestamp(past) > past);
    }

    #[test]
    fn test_run_context_config_wins() {
        let mut config = Payload::new();
        config.insert("nodes".into(), json!(3));
        config.insert("platform".into(), json!("k3s-custom"));
        let workflow = Workflow::new("wf", "k3s", "staging", config);

        let context = workflow.run_context();
        assert_eq!(context["platform"], "k3s-custom");
        assert_eq!(context["environment"], "staging");
        assert_eq!(context["nodes"], 3);
    }

    #[test]
    fn test_execution_finish_once() {
        let mut execution = Execution::start("wf", "planner", Payload::new());
        assert_eq!(execution.status, AgentStatus::Running);
        assert!(execution.completed_at.is_none());
        assert_eq!(execution.short_id().len(), 8);

        let failed = AgentOutput::failure("planner", ["no capacity"]);
        let first = Utc::now();
        execution.finish(&failed, Payload::new(), first);
        assert_eq!(execution.status, AgentStatus::Failed);
        assert_eq!(execution.completed_at, Some(first));
        assert_eq!(execution.error_message.as_deref(), Some("no capacity"));

        let ok = AgentOutput::success("planner", Payload::new());
        execution.finish(&ok, Payload::new(), first + Duration::seconds(5));
        assert_eq!(execution.status, AgentStatus::Failed);
        assert_eq!(execution.completed_at, Some(first));
        assert!(execution.is_terminal());
        assert!(execution.duration().is_some());
    }

    #[test]
    fn test_to_payload_wraps_scalars() {
        let payload = to_payload(&42).ok();
        assert_eq!(payload.and_then(|p| p.get("value").cloned()), Some(json!(42)));
    }
}
