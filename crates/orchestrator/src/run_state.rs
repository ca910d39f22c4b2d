use std::sync::Arc;

use scenario_core::{Scenario, ScenarioState};
use tracing::{debug, warn};

use crate::error::{OrchestratorError, Result};
use crate::workflow::WorkflowStatusProvider;

/// Map an Argo workflow phase onto the state shown for a scenario.
///
/// Total over all inputs: an unrecognized phase yields [`ScenarioState::Unknown`].
pub fn map_phase_to_state(phase: &str) -> ScenarioState {
    match phase {
        "Pending" | "Running" => ScenarioState::Running,
        "Succeeded" => ScenarioState::Successful,
        "Skipped" | "Failed" | "Error" | "Omitted" => ScenarioState::Failed,
        other => {
            warn!(phase = other, "Unknown workflow phase");
            ScenarioState::Unknown
        }
    }
}

/// Derives the state of a scenario from the workflow of its last run.
#[derive(Clone)]
pub struct RunStateReconciler {
    provider: Arc<dyn WorkflowStatusProvider>,
}

impl RunStateReconciler {
    pub fn new(provider: Arc<dyn WorkflowStatusProvider>) -> Self {
        Self { provider }
    }

    /// Refresh `scenario.state` from a fresh status query. Scenarios that never ran
    /// are left untouched.
    pub async fn add_state(&self, scenario: &mut Scenario) -> Result<()> {
        let Some(last_run) = scenario.last_run.as_ref() else {
            return Ok(());
        };

        let (workflow_id, workflow_name) =
            match (last_run.workflow_id.as_deref(), last_run.workflow_name.as_deref()) {
                (Some(id), Some(name)) => (id, name),
                _ => {
                    return Err(OrchestratorError::InvalidState(format!(
                        "Scenario {} has a last run without workflow id or name",
                        scenario.id
                    )))
                }
            };

        let phase = self.provider.query(workflow_id, workflow_name).await?;
        let state = map_phase_to_state(&phase);
        debug!(
            scenario_id = %scenario.id,
            workflow_name,
            phase = %phase,
            state = state.as_str(),
            "Run state reconciled"
        );
        scenario.state = state;
        Ok(())
    }

    pub async fn add_states(&self, scenarios: &mut [Scenario]) -> Result<()> {
        for scenario in scenarios.iter_mut() {
            self.add_state(scenario).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::WorkflowStatusError;
    use async_trait::async_trait;
    use scenario_core::ScenarioLastRun;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedPhase {
        phase: &'static str,
        calls: AtomicUsize,
    }

    impl FixedPhase {
        fn new(phase: &'static str) -> Arc<Self> {
            Arc::new(Self {
                phase,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl WorkflowStatusProvider for FixedPhase {
        async fn query(
            &self,
            _workflow_id: &str,
            _workflow_name: &str,
        ) -> std::result::Result<String, WorkflowStatusError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.phase.to_string())
        }
    }

    struct Unreachable;

    #[async_trait]
    impl WorkflowStatusProvider for Unreachable {
        async fn query(
            &self,
            _workflow_id: &str,
            workflow_name: &str,
        ) -> std::result::Result<String, WorkflowStatusError> {
            Err(WorkflowStatusError::WorkflowNotFound(workflow_name.to_string()))
        }
    }

    fn ran_scenario() -> Scenario {
        let mut scenario = Scenario::new("Ran", "alice").with_id("s-1");
        scenario.last_run = Some(ScenarioLastRun::new("sr-1", "wf-1", "run-1"));
        scenario
    }

    #[test]
    fn test_known_phases() {
        assert_eq!(map_phase_to_state("Pending"), ScenarioState::Running);
        assert_eq!(map_phase_to_state("Running"), ScenarioState::Running);
        assert_eq!(map_phase_to_state("Succeeded"), ScenarioState::Successful);
        for phase in ["Skipped", "Failed", "Error", "Omitted"] {
            assert_eq!(map_phase_to_state(phase), ScenarioState::Failed, "{phase}");
        }
    }

    #[test]
    fn test_unknown_phases_never_fail() {
        for phase in ["", "running", "Succeeded ", "Paused", "🤷"] {
            assert_eq!(map_phase_to_state(phase), ScenarioState::Unknown, "{phase:?}");
        }
    }

    #[tokio::test]
    async fn test_add_state_without_last_run_is_noop() {
        let provider = FixedPhase::new("Succeeded");
        let reconciler = RunStateReconciler::new(provider.clone());
        let mut scenario = Scenario::new("Fresh", "alice");

        reconciler.add_state(&mut scenario).await.unwrap();

        assert_eq!(scenario.state, ScenarioState::Created);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_add_state_queries_on_every_call() {
        let provider = FixedPhase::new("Failed");
        let reconciler = RunStateReconciler::new(provider.clone());
        let mut scenario = ran_scenario();

        reconciler.add_state(&mut scenario).await.unwrap();
        reconciler.add_state(&mut scenario).await.unwrap();

        assert_eq!(scenario.state, ScenarioState::Failed);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_incomplete_last_run_is_invalid_state() {
        let reconciler = RunStateReconciler::new(FixedPhase::new("Running"));
        let mut scenario = ran_scenario();
        scenario.last_run.as_mut().unwrap().workflow_name = None;

        let err = reconciler.add_state(&mut scenario).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_provider_error_propagates() {
        let reconciler = RunStateReconciler::new(Arc::new(Unreachable));
        let mut scenario = ran_scenario();

        let err = reconciler.add_state(&mut scenario).await.unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::WorkflowStatus(WorkflowStatusError::WorkflowNotFound(_))
        ));
        assert_eq!(scenario.state, ScenarioState::Created);
    }
}
