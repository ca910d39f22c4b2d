pub mod error;
pub mod fan_out;
pub mod hierarchy;
pub mod pipeline;
pub mod run_state;
pub mod scenario_service;
pub mod workflow;

pub use error::{OrchestratorError, Result};
pub use fan_out::{FanOut, FanOutOutcome, FanOutReport, TaskFailure};
pub use hierarchy::{HierarchyResolver, ResolvedHierarchy};
pub use pipeline::{ContainerSettings, PipelineBuilder, PipelineContext, SolutionStep};
pub use run_state::{map_phase_to_state, RunStateReconciler};
pub use scenario_service::{OrchestratorConfig, ScenarioOrchestrator};
pub use workflow::{
    ArgoClientConfig, ArgoWorkflowClient, WorkflowStatusError, WorkflowStatusProvider,
};
