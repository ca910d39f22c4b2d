use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use db::{Catalog, ScenarioRepository};
use events::{Event, EventNotifier};
use scenario_core::{
    generate_scenario_id, CreateScenarioRequest, ExecutionUnit, ParameterValue, Scenario,
    ScenarioLastRun, ScenarioState, ScenarioUser, Solution, UpdateScenarioRequest, Workspace,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{OrchestratorError, Result};
use crate::fan_out::FanOutOutcome;
use crate::hierarchy::{explicit_values, merge_parameter_values, HierarchyResolver};
use crate::pipeline::{PipelineBuilder, PipelineContext};
use crate::run_state::RunStateReconciler;
use crate::workflow::WorkflowStatusProvider;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Block dataset-list updates until every descendant has been rewritten.
    pub wait_dataset_list_propagation: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            wait_dataset_list_propagation: true,
        }
    }
}

impl OrchestratorConfig {
    pub fn with_wait_dataset_list_propagation(mut self, wait: bool) -> Self {
        self.wait_dataset_list_propagation = wait;
        self
    }
}

/// Scenario lifecycle operations.
///
/// Every read refreshes the run state of the returned scenarios from the workflow
/// engine. Mutations are written only when something actually changed, and
/// events go out only after the write.
pub struct ScenarioOrchestrator {
    repository: Arc<dyn ScenarioRepository>,
    catalog: Arc<dyn Catalog>,
    notifier: Arc<dyn EventNotifier>,
    hierarchy: HierarchyResolver,
    reconciler: RunStateReconciler,
    pipeline: PipelineBuilder,
    config: OrchestratorConfig,
}

impl ScenarioOrchestrator {
    pub fn new(
        repository: Arc<dyn ScenarioRepository>,
        catalog: Arc<dyn Catalog>,
        workflow_status: Arc<dyn WorkflowStatusProvider>,
        notifier: Arc<dyn EventNotifier>,
        pipeline: PipelineBuilder,
    ) -> Self {
        Self {
            hierarchy: HierarchyResolver::new(Arc::clone(&repository)),
            reconciler: RunStateReconciler::new(workflow_status),
            repository,
            catalog,
            notifier,
            pipeline,
            config: OrchestratorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    // ---- Reads ----

    pub async fn find_scenario(
        &self,
        organization_id: &str,
        workspace_id: &str,
        scenario_id: &str,
    ) -> Result<Scenario> {
        let mut scenario = self
            .repository
            .get(organization_id, workspace_id, scenario_id)
            .await?;
        self.reconciler.add_state(&mut scenario).await?;
        Ok(scenario)
    }

    pub async fn find_all_scenarios(
        &self,
        organization_id: &str,
        workspace_id: &str,
    ) -> Result<Vec<Scenario>> {
        let mut scenarios = self
            .repository
            .query_all(organization_id, workspace_id)
            .await?;
        self.reconciler.add_states(&mut scenarios).await?;
        Ok(scenarios)
    }

    /// Flat listing of every scenario; callers rebuild the tree from parent ids.
    pub async fn scenarios_tree(
        &self,
        organization_id: &str,
        workspace_id: &str,
    ) -> Result<Vec<Scenario>> {
        self.find_all_scenarios(organization_id, workspace_id).await
    }

    // ---- Lifecycle ----

    pub async fn create_scenario(
        &self,
        organization_id: &str,
        workspace_id: &str,
        caller: &str,
        request: CreateScenarioRequest,
    ) -> Result<Scenario> {
        self.catalog.find_organization(organization_id).await?;
        let workspace = self
            .catalog
            .find_workspace(organization_id, workspace_id)
            .await?;
        let solution = self.workspace_solution(organization_id, &workspace).await?;

        let parent = match request.parent_id.as_deref() {
            Some(parent_id) => Some(
                self.repository
                    .get(organization_id, workspace_id, parent_id)
                    .await?,
            ),
            None => None,
        };

        let resolved =
            HierarchyResolver::resolve_on_create(&request, parent.as_ref(), solution.as_ref())?;
        let users = self.load_user_names(&request.users).await?;

        let run_template_name = match (solution.as_ref(), request.run_template_id.as_deref()) {
            (Some(solution), Some(run_template_id)) => solution
                .run_template(run_template_id)
                .and_then(|t| t.name.clone()),
            _ => None,
        };

        let mut scenario = Scenario::new(request.name, caller).with_id(generate_scenario_id());
        scenario.description = request.description;
        scenario.tags = request.tags;
        scenario.parent_id = request.parent_id;
        scenario.root_id = resolved.root_id;
        scenario.dataset_list = resolved.dataset_list;
        scenario.parameters_values = resolved.parameters_values;
        scenario.solution_id = solution.as_ref().map(|s| s.id.clone());
        scenario.solution_name = solution.as_ref().and_then(|s| s.name.clone());
        scenario.run_template_id = request.run_template_id;
        scenario.run_template_name = run_template_name;
        scenario.users = users;
        scenario.state = ScenarioState::Created;

        self.repository
            .upsert(organization_id, workspace_id, &scenario)
            .await?;
        info!(
            scenario_id = %scenario.id,
            parent_id = ?scenario.parent_id,
            owner_id = %scenario.owner_id,
            "Scenario created"
        );

        for user in &scenario.users {
            self.publish_user_added(organization_id, workspace_id, &scenario.id, user);
        }

        Ok(scenario)
    }

    pub async fn update_scenario(
        &self,
        organization_id: &str,
        workspace_id: &str,
        scenario_id: &str,
        caller: &str,
        update: UpdateScenarioRequest,
    ) -> Result<Scenario> {
        let mut existing = self
            .find_scenario(organization_id, workspace_id, scenario_id)
            .await?;
        self.catalog.find_organization(organization_id).await?;
        let workspace = self
            .catalog
            .find_workspace(organization_id, workspace_id)
            .await?;

        let mut changed = false;

        if let Some(name) = update.name {
            if name != existing.name {
                existing.name = name;
                changed = true;
            }
        }
        if let Some(description) = update.description {
            if existing.description.as_deref() != Some(description.as_str()) {
                existing.description = Some(description);
                changed = true;
            }
        }
        if let Some(tags) = update.tags {
            if tags != existing.tags {
                existing.tags = tags;
                changed = true;
            }
        }
        if let Some(last_run) = update.last_run {
            if existing.last_run.as_ref() != Some(&last_run) {
                existing.last_run = Some(last_run);
                changed = true;
            }
        }

        if let Some(owner_id) = update.owner_id {
            if owner_id != existing.owner_id {
                if existing.owner_id != caller {
                    return Err(OrchestratorError::Forbidden(format!(
                        "{} is not allowed to change the ownership of scenario {}",
                        caller, scenario_id
                    )));
                }
                info!(scenario_id, from = %existing.owner_id, to = %owner_id, "Ownership transferred");
                existing.owner_id = owner_id;
                changed = true;
            }
        }

        let mut added_users: Vec<ScenarioUser> = Vec::new();
        let mut removed_user_ids: Vec<String> = Vec::new();
        if let Some(users) = update.users {
            let users = self.load_user_names(&users).await?;
            removed_user_ids = existing
                .users
                .iter()
                .filter(|previous| !users.iter().any(|u| u.id == previous.id))
                .map(|previous| previous.id.clone())
                .collect();
            existing.users = users.clone();
            added_users = users;
            changed = true;
        }

        let mut dataset_list_changed = false;
        if let Some(dataset_list) = update.dataset_list {
            let requested: BTreeSet<&String> = dataset_list.iter().collect();
            let current: BTreeSet<&String> = existing.dataset_list.iter().collect();
            if requested != current {
                if existing.is_root() {
                    existing.dataset_list = dataset_list;
                    dataset_list_changed = true;
                    changed = true;
                } else {
                    info!(
                        scenario_id,
                        "Ignoring dataset list on child scenario, only root scenarios can set it"
                    );
                }
            }
        }

        if let Some(solution_id) = update.solution_id {
            if existing.solution_id.as_deref() != Some(solution_id.as_str()) {
                debug!(scenario_id, solution_id = %solution_id, "solutionId is read-only, ignored");
            }
        }

        if let Some(run_template_id) = update.run_template_id {
            if existing.run_template_id.as_deref() != Some(run_template_id.as_str()) {
                let solution = self
                    .workspace_solution(organization_id, &workspace)
                    .await?
                    .ok_or_else(|| {
                        OrchestratorError::configuration(format!(
                            "No run template {} in workspace {}: it has no solution",
                            run_template_id, workspace_id
                        ))
                    })?;
                let run_template = solution.run_template(&run_template_id).ok_or_else(|| {
                    OrchestratorError::run_template_not_found(&run_template_id, &solution.id)
                })?;
                existing.run_template_name = run_template.name.clone();
                existing.run_template_id = Some(run_template_id);
                changed = true;
            }
        }

        if let Some(parameters_values) = update.parameters_values {
            let requested = explicit_values(&parameters_values);
            let differs = {
                let requested_keys: BTreeSet<ParameterKey<'_>> =
                    parameter_keys(&requested).collect();
                let current_keys: BTreeSet<ParameterKey<'_>> =
                    parameter_keys(&existing.parameters_values).collect();
                requested_keys != current_keys
            };
            if differs {
                existing.parameters_values = requested;
                changed = true;
            }
        }

        if !changed {
            debug!(scenario_id, "Scenario unchanged, nothing written");
            return Ok(existing);
        }

        existing.touch();
        self.repository
            .upsert(organization_id, workspace_id, &existing)
            .await?;
        info!(scenario_id, "Scenario updated");

        for user_id in removed_user_ids {
            self.publish_user_removed(organization_id, workspace_id, scenario_id, user_id);
        }
        for user in &added_users {
            self.publish_user_added(organization_id, workspace_id, scenario_id, user);
        }

        if dataset_list_changed {
            match self
                .hierarchy
                .propagate_dataset_list(
                    organization_id,
                    workspace_id,
                    scenario_id,
                    existing.dataset_list.clone(),
                    self.config.wait_dataset_list_propagation,
                )
                .await
            {
                Ok(outcome) => debug!(
                    scenario_id,
                    dispatched = outcome.dispatched(),
                    "Dataset list propagation dispatched"
                ),
                Err(e) => warn!(scenario_id, error = %e, "Dataset list propagation failed"),
            }
            self.notifier.publish(Event::DatasetListChanged {
                organization_id: organization_id.to_string(),
                workspace_id: workspace_id.to_string(),
                scenario_id: scenario_id.to_string(),
                dataset_list: existing.dataset_list.clone(),
            });
        }

        Ok(existing)
    }

    /// Delete a scenario owned by `caller`, then move its children up one level.
    pub async fn delete_scenario(
        &self,
        organization_id: &str,
        workspace_id: &str,
        scenario_id: &str,
        caller: &str,
        wait: bool,
    ) -> Result<FanOutOutcome> {
        let scenario = self
            .find_scenario(organization_id, workspace_id, scenario_id)
            .await?;
        if scenario.owner_id != caller {
            return Err(OrchestratorError::Forbidden(format!(
                "{} is not allowed to delete scenario {}",
                caller, scenario_id
            )));
        }

        self.repository
            .delete(organization_id, workspace_id, scenario_id)
            .await?;
        info!(scenario_id, "Scenario deleted");

        // The record is gone at this point; a failed child lookup must not undo that.
        match self
            .hierarchy
            .on_scenario_deleted(organization_id, workspace_id, &scenario, wait)
            .await
        {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                warn!(scenario_id, error = %e, "Could not list children of deleted scenario");
                Ok(FanOutOutcome::Skipped {
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Remove every scenario of a workspace. Returns how many were removed.
    pub async fn delete_all_scenarios(
        &self,
        organization_id: &str,
        workspace_id: &str,
    ) -> Result<usize> {
        let scenarios = self
            .repository
            .query_all(organization_id, workspace_id)
            .await?;
        let mut deleted = 0;
        for scenario in &scenarios {
            if self
                .repository
                .delete(organization_id, workspace_id, &scenario.id)
                .await?
            {
                deleted += 1;
            }
        }
        info!(organization_id, workspace_id, deleted, "All scenarios deleted");
        Ok(deleted)
    }

    /// Attach the run just submitted for a scenario.
    pub async fn record_run_started(
        &self,
        organization_id: &str,
        workspace_id: &str,
        scenario_id: &str,
        last_run: ScenarioLastRun,
    ) -> Result<Scenario> {
        let mut scenario = self
            .repository
            .get(organization_id, workspace_id, scenario_id)
            .await?;
        if scenario.last_run.as_ref() == Some(&last_run) {
            return Ok(scenario);
        }
        info!(
            scenario_id,
            workflow_name = ?last_run.workflow_name,
            "Recording scenario run"
        );
        scenario.last_run = Some(last_run);
        scenario.touch();
        self.repository
            .upsert(organization_id, workspace_id, &scenario)
            .await?;
        Ok(scenario)
    }

    // ---- Parameter values ----

    pub async fn add_or_replace_parameter_values(
        &self,
        organization_id: &str,
        workspace_id: &str,
        scenario_id: &str,
        values: Vec<ParameterValue>,
    ) -> Result<Vec<ParameterValue>> {
        if values.is_empty() {
            return Ok(values);
        }
        let mut scenario = self
            .find_scenario(organization_id, workspace_id, scenario_id)
            .await?;
        merge_parameter_values(&mut scenario.parameters_values, &values);
        scenario.touch();
        self.repository
            .upsert(organization_id, workspace_id, &scenario)
            .await?;
        debug!(scenario_id, count = values.len(), "Parameter values merged");
        Ok(values)
    }

    pub async fn remove_all_parameter_values(
        &self,
        organization_id: &str,
        workspace_id: &str,
        scenario_id: &str,
    ) -> Result<()> {
        let mut scenario = self
            .find_scenario(organization_id, workspace_id, scenario_id)
            .await?;
        if scenario.parameters_values.is_empty() {
            return Ok(());
        }
        scenario.parameters_values.clear();
        scenario.touch();
        self.repository
            .upsert(organization_id, workspace_id, &scenario)
            .await?;
        Ok(())
    }

    // ---- Users ----

    /// Add users or replace their roles. Every user of the scenario is announced
    /// afterwards since any of their roles may have changed.
    pub async fn add_or_replace_users(
        &self,
        organization_id: &str,
        workspace_id: &str,
        scenario_id: &str,
        users: Vec<ScenarioUser>,
    ) -> Result<Vec<ScenarioUser>> {
        if users.is_empty() {
            return Ok(users);
        }
        self.catalog.find_organization(organization_id).await?;
        self.catalog
            .find_workspace(organization_id, workspace_id)
            .await?;
        let mut scenario = self
            .find_scenario(organization_id, workspace_id, scenario_id)
            .await?;

        let users = self.load_user_names(&users).await?;
        for user in &users {
            match scenario.users.iter_mut().find(|u| u.id == user.id) {
                Some(existing) => *existing = user.clone(),
                None => scenario.users.push(user.clone()),
            }
        }
        scenario.touch();
        self.repository
            .upsert(organization_id, workspace_id, &scenario)
            .await?;

        for user in &scenario.users {
            self.publish_user_added(organization_id, workspace_id, scenario_id, user);
        }
        Ok(users)
    }

    pub async fn remove_all_users(
        &self,
        organization_id: &str,
        workspace_id: &str,
        scenario_id: &str,
    ) -> Result<()> {
        let mut scenario = self
            .find_scenario(organization_id, workspace_id, scenario_id)
            .await?;
        if scenario.users.is_empty() {
            return Ok(());
        }
        let removed: Vec<ScenarioUser> = std::mem::take(&mut scenario.users);
        scenario.touch();
        self.repository
            .upsert(organization_id, workspace_id, &scenario)
            .await?;

        for user in removed {
            self.publish_user_removed(organization_id, workspace_id, scenario_id, user.id);
        }
        Ok(())
    }

    pub async fn remove_user(
        &self,
        organization_id: &str,
        workspace_id: &str,
        scenario_id: &str,
        user_id: &str,
    ) -> Result<()> {
        let mut scenario = self
            .find_scenario(organization_id, workspace_id, scenario_id)
            .await?;
        let before = scenario.users.len();
        scenario.users.retain(|u| u.id != user_id);
        if scenario.users.len() == before {
            return Ok(());
        }
        scenario.touch();
        self.repository
            .upsert(organization_id, workspace_id, &scenario)
            .await?;

        self.publish_user_removed(organization_id, workspace_id, scenario_id, user_id.to_string());
        Ok(())
    }

    // ---- Run pipeline ----

    /// Ordered execution units for running a scenario.
    pub async fn build_run_pipeline(
        &self,
        organization_id: &str,
        workspace_id: &str,
        scenario_id: &str,
    ) -> Result<Vec<ExecutionUnit>> {
        let scenario = self
            .repository
            .get(organization_id, workspace_id, scenario_id)
            .await?;
        let run_template_id = scenario.run_template_id.clone().ok_or_else(|| {
            OrchestratorError::configuration(format!(
                "Scenario {} has no run template",
                scenario_id
            ))
        })?;
        let workspace = self
            .catalog
            .find_workspace(organization_id, workspace_id)
            .await?;
        let solution = self
            .workspace_solution(organization_id, &workspace)
            .await?
            .ok_or_else(|| {
                OrchestratorError::configuration(format!(
                    "Workspace {} has no solution",
                    workspace_id
                ))
            })?;

        let mut datasets = Vec::with_capacity(scenario.dataset_list.len());
        for dataset_id in &scenario.dataset_list {
            let dataset = self.catalog.find_dataset(organization_id, dataset_id).await?;
            let connector = self.catalog.find_connector(&dataset.connector.id).await?;
            datasets.push((dataset, connector));
        }

        let context = PipelineContext {
            scenario_id: scenario.id,
            workspace,
            solution,
            run_template_id,
            datasets,
        };
        self.pipeline.build_pipeline(&context)
    }

    // ---- Helpers ----

    async fn workspace_solution(
        &self,
        organization_id: &str,
        workspace: &Workspace,
    ) -> Result<Option<Solution>> {
        match workspace.solution.solution_id.as_deref() {
            Some(solution_id) => Ok(Some(
                self.catalog
                    .find_solution(organization_id, solution_id)
                    .await?,
            )),
            None => Ok(None),
        }
    }

    /// Fill in user names from the catalog. Users with a blank id are dropped and
    /// a repeated id keeps its last roles.
    async fn load_user_names(&self, users: &[ScenarioUser]) -> Result<Vec<ScenarioUser>> {
        let mut names: BTreeMap<&str, String> = BTreeMap::new();
        let mut loaded: Vec<ScenarioUser> = Vec::with_capacity(users.len());
        for user in users.iter().filter(|u| !u.id.trim().is_empty()) {
            if !names.contains_key(user.id.as_str()) {
                let found = self.catalog.find_user(&user.id).await?;
                names.insert(user.id.as_str(), found.name);
            }
            let named = ScenarioUser {
                id: user.id.clone(),
                name: names[user.id.as_str()].clone(),
                roles: user.roles.clone(),
            };
            match loaded.iter_mut().find(|u| u.id == named.id) {
                Some(existing) => *existing = named,
                None => loaded.push(named),
            }
        }
        Ok(loaded)
    }

    fn publish_user_added(
        &self,
        organization_id: &str,
        workspace_id: &str,
        scenario_id: &str,
        user: &ScenarioUser,
    ) {
        self.notifier.publish(Event::UserAddedToScenario {
            organization_id: organization_id.to_string(),
            workspace_id: workspace_id.to_string(),
            scenario_id: scenario_id.to_string(),
            user_id: user.id.clone(),
            roles: user.role_names(),
        });
    }

    fn publish_user_removed(
        &self,
        organization_id: &str,
        workspace_id: &str,
        scenario_id: &str,
        user_id: String,
    ) {
        self.notifier.publish(Event::UserRemovedFromScenario {
            organization_id: organization_id.to_string(),
            workspace_id: workspace_id.to_string(),
            scenario_id: scenario_id.to_string(),
            user_id,
        });
    }
}

/// Identity of a parameter value for change detection; inherited and explicit differ.
type ParameterKey<'a> = (&'a str, &'a str, Option<&'a str>, bool);

fn parameter_keys(values: &[ParameterValue]) -> impl Iterator<Item = ParameterKey<'_>> {
    values.iter().map(|p| {
        (
            p.parameter_id.as_str(),
            p.value.as_str(),
            p.var_type.as_deref(),
            p.is_inherited,
        )
    })
}
