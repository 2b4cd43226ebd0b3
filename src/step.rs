use crate::error::AgentError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::{self, Debug};

/// Arbitrary structured data exchanged between steps and persisted as-is.
pub type Payload = Map<String, Value>;

/// Type-safe step name wrapper.
///
/// Step names are the keys of the agent registry and of the cumulative
/// output map, so they are kept distinct from free-form strings.
///
/// # Examples
///
/// ```
/// use kubeloom::StepName;
///
/// let name = StepName::new("planner");
/// assert_eq!(name.as_str(), "planner");
///
/// let name: StepName = "monitoring".into();
/// assert_eq!(name, "monitoring");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepName(String);

impl StepName {
    /// Creates a new StepName
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the step name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for StepName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for StepName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for StepName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for StepName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for StepName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for StepName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Input bundle handed to a step.
///
/// `context` is the workflow configuration and never changes during a run.
/// `previous_outputs` maps the name of every step attempted so far to the
/// `data` it returned, including steps that failed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentInput {
    pub workflow_id: String,
    #[serde(default)]
    pub context: Payload,
    #[serde(default)]
    pub previous_outputs: Payload,
}

impl AgentInput {
    /// Creates an input with an empty output history.
    pub fn new(workflow_id: impl Into<String>, context: Payload) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            context,
            previous_outputs: Payload::new(),
        }
    }

    /// Returns the data an earlier step produced, if that step was attempted.
    ///
    /// # Examples
    ///
    /// ```
    /// use kubeloom::{AgentInput, Payload};
    /// use serde_json::json;
    ///
    /// let mut input = AgentInput::new("k3s-development-1a2b3c4d", Payload::new());
    /// input
    ///     .previous_outputs
    ///     .insert("planner".into(), json!({ "nodes": 3 }));
    ///
    /// let plan = input.previous_output("planner").expect("planner ran");
    /// assert_eq!(plan["nodes"], 3);
    /// assert!(input.previous_output("infrastructure").is_none());
    /// ```
    pub fn previous_output(&self, step: &str) -> Option<&Payload> {
        self.previous_outputs.get(step).and_then(Value::as_object)
    }

    /// Returns a value from the workflow context.
    pub fn context_value(&self, key: &str) -> Option<&Value> {
        self.context.get(key)
    }
}

/// Result bundle produced by a step.
///
/// `execution_time` is measured and filled in by the executor; whatever a
/// step puts there is overwritten.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentOutput {
    pub agent_name: String,
    pub success: bool,
    #[serde(default)]
    pub data: Payload,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub logs: Vec<String>,
    #[serde(default)]
    pub execution_time: f64,
}

impl AgentOutput {
    /// Creates a successful output carrying `data`.
    pub fn success(agent_name: impl Into<String>, data: Payload) -> Self {
        Self {
            agent_name: agent_name.into(),
            success: true,
            data,
            ..Self::default()
        }
    }

    /// Creates a declared failure with the given errors.
    pub fn failure<I, S>(agent_name: impl Into<String>, errors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            agent_name: agent_name.into(),
            success: false,
            errors: errors.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Adds a key to `data`.
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Appends a log line.
    pub fn with_log(mut self, line: impl Into<String>) -> Self {
        self.logs.push(line.into());
        self
    }

    /// Appends an error and marks the output as failed.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.errors.push(error.into());
        self.success = false;
        self
    }

    /// Newline-joined errors, or `None` when there are none.
    pub fn error_message(&self) -> Option<String> {
        if self.errors.is_empty() {
            None
        } else {
            Some(self.errors.join("\n"))
        }
    }
}

/// A named unit of provisioning logic.
///
/// Expected failures (a cluster that does not come up, a manifest that does
/// not apply) are reported by returning `Ok` with `success == false` and a
/// populated `errors` list. `Err` is reserved for faults the step did not
/// anticipate. The executor turns both into the same failed result, and a
/// panic is handled the same way.
///
/// # Examples
///
/// ```
/// use kubeloom::{Agent, AgentError, AgentInput, AgentOutput, Payload};
/// use async_trait::async_trait;
///
/// #[derive(Debug)]
/// struct PlannerAgent;
///
/// #[async_trait]
/// impl Agent for PlannerAgent {
///     async fn execute(&self, input: &AgentInput) -> Result<AgentOutput, AgentError> {
///         let nodes = input
///             .context_value("nodes")
///             .and_then(|v| v.as_u64())
///             .unwrap_or(1);
///
///         Ok(AgentOutput::success("PlannerAgent", Payload::new())
///             .with_data("nodes", nodes)
///             .with_log(format!("planned {nodes} nodes")))
///     }
/// }
/// ```
#[async_trait]
pub trait Agent: Send + Sync + Debug {
    /// Executes the step logic against the given input.
    ///
    /// # Returns
    ///
    /// - `Ok(output)` with `success == true` - the step completed
    /// - `Ok(output)` with `success == false` - the step failed in a way it understands
    /// - `Err(error)` - an unexpected fault
    async fn execute(&self, input: &AgentInput) -> Result<AgentOutput, AgentError>;
}
