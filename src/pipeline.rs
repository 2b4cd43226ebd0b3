//! The fixed deployment pipeline.
//!
//! Order, status mapping and the critical set are static. A step whose
//! failure leaves nothing for later steps to build on is critical and stops
//! the run; any other failure is recorded and the run continues.

use crate::model::WorkflowStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineStep {
    pub name: &'static str,
    pub description: &'static str,
    /// Workflow status written before the step is attempted
    pub status: WorkflowStatus,
    pub critical: bool,
}

pub const PIPELINE: &[PipelineStep] = &[
    PipelineStep {
        name: "planner",
        description: "Deployment planning",
        status: WorkflowStatus::Planning,
        critical: true,
    },
    PipelineStep {
        name: "infrastructure",
        description: "Infrastructure provisioning",
        status: WorkflowStatus::Provisioning,
        critical: true,
    },
    PipelineStep {
        name: "argocd",
        description: "ArgoCD (GitOps) deployment",
        status: WorkflowStatus::Configuring,
        critical: false,
    },
    PipelineStep {
        name: "monitoring",
        description: "Monitoring setup",
        status: WorkflowStatus::Configuring,
        critical: false,
    },
    PipelineStep {
        name: "validation",
        description: "Cluster validation",
        status: WorkflowStatus::Validating,
        critical: false,
    },
    PipelineStep {
        name: "documentation",
        description: "Documentation generation",
        status: WorkflowStatus::Documenting,
        critical: false,
    },
];

/// Looks up a pipeline step by name.
pub fn find_step(name: &str) -> Option<&'static PipelineStep> {
    PIPELINE.iter().find(|step| step.name == name)
}

/// Names of all steps in run order.
pub fn step_names() -> impl Iterator<Item = &'static str> {
    PIPELINE.iter().map(|step| step.name)
}
