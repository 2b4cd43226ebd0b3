//! Execution wrapper
//!
//! Runs one step and records it as an [`Execution`]. Every invocation makes
//! exactly two store writes: the `RUNNING` record before the step starts and
//! the terminal record after it ends. Faults raised by the step, including
//! panics, come back as a failed [`AgentOutput`] and never propagate.
//! Only store failures are returned as errors.

use crate::model::{to_payload, Execution};
use crate::step::{Agent, AgentInput, AgentOutput, StepName};
use crate::store::{StateStore, StoreError};
use chrono::Utc;
use std::sync::Arc;
use tokio::task::JoinError;
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct ExecutionWrapper {
    store: Arc<dyn StateStore>,
}

impl std::fmt::Debug for ExecutionWrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionWrapper")
            .field("store", &self.store.backend_name())
            .finish()
    }
}

impl ExecutionWrapper {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    /// Runs `agent` under `name` and returns its output with
    /// `execution_time` filled in.
    pub async fn execute(
        &self,
        name: &StepName,
        agent: Arc<dyn Agent>,
        input: AgentInput,
    ) -> Result<AgentOutput, StoreError> {
        let input_data = to_payload(&input)?;
        let mut execution = Execution::start(&input.workflow_id, name.as_str(), input_data);
        self.store.create_execution(&execution).await?;
        info!("Starting {} (execution {})", name, execution.short_id());

        let outcome = tokio::spawn(async move { agent.execute(&input).await }).await;
        let completed_at = Utc::now();
        let elapsed = (completed_at - execution.started_at)
            .to_std()
            .map(|d| d.as_secs_f64())
            .unwrap_or_default();

        let mut output = match outcome {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => fault_output(name, &e.to_string()),
            Err(e) => fault_output(name, &join_error_message(e)),
        };
        // A failure must always carry a reason.
        if !output.success && output.errors.is_empty() {
            output.errors.push(format!("Agent {} failed", name));
        }
        output.execution_time = elapsed;

        execution.finish(&output, to_payload(&output)?, completed_at);
        self.store.update_execution(&execution).await?;

        if output.success {
            info!("{} completed in {:.2}s", name, elapsed);
        } else {
            warn!("{} failed after {:.2}s", name, elapsed);
            for e in &output.errors {
                error!("  {}", e);
            }
        }

        Ok(output)
    }
}

/// Failed output standing in for a step that did not return one.
fn fault_output(name: &StepName, message: &str) -> AgentOutput {
    AgentOutput::failure(name.as_str(), [format!("Agent {} failed: {}", name, message)])
}

fn join_error_message(e: JoinError) -> String {
    if !e.is_panic() {
        return e.to_string();
    }
    let payload = e.into_panic();
    let message = if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    };
    format!("panicked: {}", message)
}
