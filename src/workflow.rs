use crate::context::RunContext;
use crate::error::EngineError;
use crate::executor::ExecutionWrapper;
use crate::factory::WorkflowFactory;
use crate::model::{Execution, Workflow, WorkflowStatus};
use crate::pipeline::{find_step, PIPELINE};
use crate::step::{Agent, AgentInput, AgentOutput, Payload, StepName};
use crate::store::StateStore;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};

/// `agent_name` of the aggregate output returned by a run.
pub const ORCHESTRATOR_NAME: &str = "orchestrator";

/// Drives the fixed pipeline for a workflow.
///
/// Steps run strictly one after another. Each attempted step gets the run
/// context and the data of every step attempted before it. A failed
/// critical step stops the run; other failures are recorded and the run
/// moves on.
pub struct Orchestrator {
    store: Arc<dyn StateStore>,
    executor: ExecutionWrapper,
    factory: WorkflowFactory,
    agents: HashMap<StepName, Arc<dyn Agent>>,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut agents: Vec<&str> = self.agents.keys().map(StepName::as_str).collect();
        agents.sort_unstable();
        f.debug_struct("Orchestrator")
            .field("store", &self.store.backend_name())
            .field("agents", &agents)
            .finish()
    }
}

impl Orchestrator {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            executor: ExecutionWrapper::new(Arc::clone(&store)),
            factory: WorkflowFactory::new(Arc::clone(&store)),
            store,
            agents: HashMap::new(),
        }
    }

    pub fn builder(store: Arc<dyn StateStore>) -> OrchestratorBuilder {
        OrchestratorBuilder::new(store)
    }

    /// Registers the implementation of a pipeline step.
    ///
    /// Fails if the name is not a pipeline step or already has an agent.
    pub fn register<A>(
        &mut self,
        name: impl Into<StepName>,
        agent: A,
    ) -> Result<(), EngineError>
    where
        A: Agent + 'static,
    {
        self.register_shared(name.into(), Arc::new(agent))
    }

    fn register_shared(
        &mut self,
        name: StepName,
        agent: Arc<dyn Agent>,
    ) -> Result<(), EngineError> {
        if find_step(name.as_str()).is_none() {
            return Err(EngineError::Configuration(format!(
                "'{}' is not a pipeline step",
                name
            )));
        }
        if self.agents.contains_key(&name) {
            return Err(EngineError::AgentAlreadyRegistered(name));
        }
        info!("Agent registered: {}", name);
        self.agents.insert(name, agent);
        Ok(())
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.agents.contains_key(name)
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    /// Creates a `PENDING` workflow and returns its identity.
    pub async fn create_workflow(
        &self,
        platform: &str,
        environment: &str,
        config: Payload,
    ) -> Result<String, EngineError> {
        let workflow = self.factory.create(platform, environment, config).await?;
        Ok(workflow.workflow_id)
    }

    /// Creates a workflow and runs it to completion.
    ///
    /// Step failures are reported in the returned output. Only a state
    /// store failure makes this return `Err`.
    pub async fn run_workflow(
        &self,
        platform: &str,
        environment: &str,
        config: Payload,
    ) -> Result<AgentOutput, EngineError> {
        let workflow = self.factory.create(platform, environment, config).await?;
        self.execute(workflow).await
    }

    /// Runs a workflow created earlier with [`create_workflow`](Self::create_workflow).
    ///
    /// The workflow must still be `PENDING`.
    pub async fn run(&self, workflow_id: &str) -> Result<AgentOutput, EngineError> {
        let workflow = self
            .store
            .get_workflow(workflow_id)
            .await?
            .ok_or_else(|| EngineError::WorkflowNotFound(workflow_id.to_string()))?;
        self.execute(workflow).await
    }

    pub async fn get_workflow_status(
        &self,
        workflow_id: &str,
    ) -> Result<Option<Workflow>, EngineError> {
        Ok(self.store.get_workflow(workflow_id).await?)
    }

    /// Executions of a workflow in the order they were started.
    pub async fn list_executions(&self, workflow_id: &str) -> Result<Vec<Execution>, EngineError> {
        let mut executions = self.store.list_executions(workflow_id).await?;
        executions.sort_by_key(|e| e.started_at);
        Ok(executions)
    }

    pub async fn list_workflows(&self) -> Result<Vec<Workflow>, EngineError> {
        Ok(self.store.list_workflows().await?)
    }

    async fn execute(&self, mut workflow: Workflow) -> Result<AgentOutput, EngineError> {
        if workflow.status != WorkflowStatus::Pending {
            return Err(EngineError::InvalidTransition {
                from: workflow.status,
                to: WorkflowStatus::Planning,
            });
        }

        info!(
            "Running workflow {} (platform: {}, environment: {})",
            workflow.workflow_id, workflow.platform, workflow.environment
        );

        let context = workflow.run_context();
        let mut run = RunContext::new();

        for step in PIPELINE {
            let name = StepName::new(step.name);
            let Some(agent) = self.agents.get(&name).cloned() else {
                let message = format!("Agent '{}' not registered", name);
                error!("{}", message);
                run.push_error(message.clone());
                workflow.errors.push(message);
                self.store.update_workflow(&mut workflow).await?;
                continue;
            };

            info!("Step: {}", step.description);
            let input = AgentInput {
                workflow_id: workflow.workflow_id.clone(),
                context: context.clone(),
                previous_outputs: run.outputs().clone(),
            };

            workflow.transition(step.status)?;
            self.store.update_workflow(&mut workflow).await?;

            let output = self.executor.execute(&name, agent, input).await?;
            run.record(&name, &output);

            workflow
                .outputs
                .insert(name.to_string(), Value::Object(output.data.clone()));
            if !output.success {
                workflow.errors.extend(output.errors.iter().cloned());
            }
            self.store.update_workflow(&mut workflow).await?;

            if output.success {
                info!("{} finished", step.description);
            } else if step.critical {
                error!("Critical agent '{}' failed, stopping workflow", name);
                break;
            } else {
                warn!("Non-critical agent '{}' failed, continuing", name);
            }
        }

        let final_status = if run.is_success() {
            WorkflowStatus::Completed
        } else {
            WorkflowStatus::Failed
        };
        workflow.transition(final_status)?;
        self.store.update_workflow(&mut workflow).await?;

        log_summary(&workflow, &run);
        Ok(run.into_output(ORCHESTRATOR_NAME))
    }
}

fn log_summary(workflow: &Workflow, run: &RunContext) {
    info!(
        "Workflow {} {} in {:.2}s",
        workflow.workflow_id,
        workflow.status,
        run.elapsed().as_secs_f64()
    );
    for outcome in run.outcomes() {
        info!(
            "  {} {}: {}",
            if outcome.success { "✓" } else { "✗" },
            outcome.name,
            outcome.summary.as_deref().unwrap_or("N/A")
        );
    }
    if !run.errors().is_empty() {
        warn!("Errors ({}):", run.errors().len());
        for e in run.errors() {
            warn!("  - {}", e);
        }
    }
}

/// Collects agents, then validates them into an [`Orchestrator`].
pub struct OrchestratorBuilder {
    store: Arc<dyn StateStore>,
    agents: Vec<(StepName, Arc<dyn Agent>)>,
}

impl OrchestratorBuilder {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            store,
            agents: Vec::new(),
        }
    }

    pub fn register<A>(mut self, name: impl Into<StepName>, agent: A) -> Self
    where
        A: Agent + 'static,
    {
        let agent: Arc<dyn Agent> = Arc::new(agent);
        self.agents.push((name.into(), agent));
        self
    }

    pub fn build(self) -> Result<Orchestrator, EngineError> {
        let mut orchestrator = Orchestrator::new(self.store);
        for (name, agent) in self.agents {
            orchestrator.register_shared(name, agent)?;
        }
        Ok(orchestrator)
    }
}
