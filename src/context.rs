use crate::step::{AgentOutput, Payload, StepName};
use serde_json::Value;
use std::time::{Duration, Instant};

/// Outcome of one attempted step, kept for the run summary.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub name: StepName,
    pub success: bool,
    pub summary: Option<String>,
}

/// Accumulates the results of one pipeline run.
///
/// Owned by the orchestrator for the duration of the run; nothing else
/// writes to it.
#[derive(Debug)]
pub struct RunContext {
    outputs: Payload,
    errors: Vec<String>,
    logs: Vec<String>,
    outcomes: Vec<StepOutcome>,
    start_time: Instant,
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RunContext {
    pub fn new() -> Self {
        Self {
            outputs: Payload::new(),
            errors: Vec::new(),
            logs: Vec::new(),
            outcomes: Vec::new(),
            start_time: Instant::now(),
        }
    }

    /// Folds a step's output into the run.
    ///
    /// The step's data is stored under its name whether or not it succeeded.
    pub fn record(&mut self, name: &StepName, output: &AgentOutput) {
        self.logs.extend(output.logs.iter().cloned());
        self.outputs
            .insert(name.to_string(), Value::Object(output.data.clone()));
        if !output.success {
            self.errors.extend(output.errors.iter().cloned());
        }
        self.outcomes.push(StepOutcome {
            name: name.clone(),
            success: output.success,
            summary: output
                .data
                .get("summary")
                .and_then(Value::as_str)
                .map(str::to_string),
        });
    }

    /// Records a run-level error that is not tied to an executed step.
    pub fn push_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }

    /// Cumulative outputs, keyed by step name.
    pub fn outputs(&self) -> &Payload {
        &self.outputs
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn logs(&self) -> &[String] {
        &self.logs
    }

    pub fn outcomes(&self) -> &[StepOutcome] {
        &self.outcomes
    }

    /// True when no error was recorded and every attempted step succeeded.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty() && self.outcomes.iter().all(|o| o.success)
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Consumes the context into the run's aggregate output.
    pub fn into_output(self, agent_name: impl Into<String>) -> AgentOutput {
        let execution_time = self.elapsed().as_secs_f64();
        let success = self.is_success();
        AgentOutput {
            agent_name: agent_name.into(),
            success,
            data: self.outputs,
            errors: self.errors,
            logs: self.logs,
            execution_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_keeps_failed_data() {
        let mut ctx = RunContext::new();
        let planner = AgentOutput::success("planner", Payload::new())
            .with_data("summary", "3 nodes")
            .with_log("planning");
        ctx.record(&StepName::new("planner"), &planner);

        let monitoring = AgentOutput::failure("monitoring", ["helm timeout"])
            .with_data("release", "kube-prometheus");
        ctx.record(&StepName::new("monitoring"), &monitoring);

        assert_eq!(ctx.outputs()["planner"]["summary"], "3 nodes");
        assert_eq!(ctx.outputs()["monitoring"], json!({ "release": "kube-prometheus" }));
        assert_eq!(ctx.errors(), ["helm timeout".to_string()]);
        assert_eq!(ctx.logs(), ["planning".to_string()]);
        assert_eq!(ctx.outcomes()[0].summary.as_deref(), Some("3 nodes"));
        assert!(!ctx.outcomes()[1].success);
        assert!(!ctx.is_success());
    }

    #[test]
    fn test_failed_step_without_errors_fails_the_run() {
        let mut ctx = RunContext::new();
        ctx.record(
            &StepName::new("validation"),
            &AgentOutput::failure("validation", Vec::<String>::new()),
        );

        assert!(ctx.errors().is_empty());
        assert!(!ctx.is_success());
        assert!(!ctx.into_output("orchestrator").success);
    }

    #[test]
    fn test_into_output() {
        let mut ctx = RunContext::new();
        ctx.push_error("Agent 'argocd' not registered");
        std::thread::sleep(Duration::from_millis(5));

        let output = ctx.into_output("orchestrator");
        assert_eq!(output.agent_name, "orchestrator");
        assert!(!output.success);
        assert!(output.data.is_empty());
        assert!(output.execution_time >= 0.005);
    }
}
