//! Construction of the execution units that make up a scenario run.

use std::collections::BTreeMap;

use scenario_core::{Connector, Dataset, ExecutionUnit, RunTemplate, Solution, Workspace};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{OrchestratorError, Result};

const FETCH_DATASET: &str = "fetchDatasetContainers";
const FETCH_PARAMETERS: &str = "fetchScenarioParametersContainer";
const SEND_DATA_WAREHOUSE: &str = "sendDataWarehouseContainer";

const AZURE_TENANT_ID_VAR: &str = "AZURE_TENANT_ID";
const AZURE_CLIENT_ID_VAR: &str = "AZURE_CLIENT_ID";
const AZURE_CLIENT_SECRET_VAR: &str = "AZURE_CLIENT_SECRET";
const API_URL_VAR: &str = "CSM_API_URL";
const API_TOKEN_VAR: &str = "CSM_API_TOKEN";
const DATASET_PATH_VAR: &str = "CSM_DATASET_ABSOLUTE_PATH";
const DATASET_PATH: &str = "/mnt/scenariorun-data";
const PARAMETERS_PATH_VAR: &str = "CSM_PARAMETERS_ABSOLUTE_PATH";
const PARAMETERS_PATH: &str = "/mnt/scenariorun-parameters";
const SCENARIO_ID_VAR: &str = "CSM_SCENARIO_ID";
const SEND_PARAMETERS_VAR: &str = "CSM_SEND_DATAWAREHOUSE_PARAMETERS";
const SEND_DATASETS_VAR: &str = "CSM_SEND_DATAWAREHOUSE_DATASETS";
const ADX_INGESTION_URI_VAR: &str = "ADX_DATA_INGESTION_URI";
const ADX_DATABASE_VAR: &str = "ADX_DATABASE";
const RUN_TEMPLATE_ID_VAR: &str = "CSM_RUN_TEMPLATE_ID";
const CONTAINER_MODE_VAR: &str = "CSM_CONTAINER_MODE";
const CONTROL_PLANE_TOPIC_VAR: &str = "CSM_CONTROL_PLANE_TOPIC";
const CONTROL_PLANE_SUFFIX: &str = "-scenariorun";
const PROBES_MEASURES_TOPIC_VAR: &str = "CSM_PROBES_MEASURES_TOPIC";
const SIMULATION_VAR: &str = "CSM_SIMULATION";
const ENTRYPOINT: &str = "entrypoint.py";

/// Solution container steps, each run from the solution image in its own mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolutionStep {
    ApplyParameters,
    ValidateData,
    PreRun,
    Run,
    PostRun,
}

impl SolutionStep {
    pub const ALL: [SolutionStep; 5] = [
        Self::ApplyParameters,
        Self::ValidateData,
        Self::PreRun,
        Self::Run,
        Self::PostRun,
    ];

    pub fn container_name(&self) -> &'static str {
        match self {
            Self::ApplyParameters => "applyParametersContainer",
            Self::ValidateData => "validateDataContainer",
            Self::PreRun => "preRunContainer",
            Self::Run => "runContainer",
            Self::PostRun => "postRunContainer",
        }
    }

    pub fn mode(&self) -> &'static str {
        match self {
            Self::ApplyParameters => "handle-parameters",
            Self::ValidateData => "validate",
            Self::PreRun => "prerun",
            Self::Run => "engine",
            Self::PostRun => "postrun",
        }
    }
}

/// Platform settings injected into every container.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ContainerSettings {
    pub azure_tenant_id: String,
    pub azure_client_id: String,
    pub azure_client_secret: String,
    pub api_base_url: String,
    pub api_token: String,
    pub scenario_fetch_parameters_image: String,
    pub send_data_warehouse_image: String,
    pub adx_data_ingestion_uri: String,
    pub event_hub_cluster_uri: String,
}

/// Everything needed to assemble the full pipeline of a scenario run.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub scenario_id: String,
    pub workspace: Workspace,
    pub solution: Solution,
    pub run_template_id: String,
    /// Datasets paired with their connectors, in the scenario's dataset-list order.
    pub datasets: Vec<(Dataset, Connector)>,
}

#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    settings: ContainerSettings,
}

impl PipelineBuilder {
    pub fn new(settings: ContainerSettings) -> Self {
        Self { settings }
    }

    fn common_env_vars(&self) -> BTreeMap<String, String> {
        let s = &self.settings;
        [
            (AZURE_TENANT_ID_VAR, s.azure_tenant_id.as_str()),
            (AZURE_CLIENT_ID_VAR, s.azure_client_id.as_str()),
            (AZURE_CLIENT_SECRET_VAR, s.azure_client_secret.as_str()),
            (API_URL_VAR, s.api_base_url.as_str()),
            (API_TOKEN_VAR, s.api_token.as_str()),
            (DATASET_PATH_VAR, DATASET_PATH),
            (PARAMETERS_PATH_VAR, PARAMETERS_PATH),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    /// Container that fetches one dataset through its connector.
    pub fn build_from_dataset(
        &self,
        dataset: &Dataset,
        connector: &Connector,
    ) -> Result<ExecutionUnit> {
        if dataset.connector.id != connector.id {
            return Err(OrchestratorError::Mismatch(format!(
                "Dataset {} uses connector {} but connector {} was supplied",
                dataset.id, dataset.connector.id, connector.id
            )));
        }

        let mut env_vars = self.common_env_vars();
        let mut run_args = Vec::new();
        for parameter in connector.parameters() {
            let value = dataset.parameter_value(&parameter.id).to_string();
            match parameter.env_var.as_deref() {
                Some(env_var) => {
                    env_vars.insert(env_var.to_string(), value);
                }
                None => run_args.push(value),
            }
        }

        Ok(ExecutionUnit::new(FETCH_DATASET, connector.image())
            .with_env_vars(env_vars)
            .with_run_args(run_args))
    }

    pub fn build_scenario_parameters_fetch_container(&self, scenario_id: &str) -> ExecutionUnit {
        let mut env_vars = self.common_env_vars();
        env_vars.insert(SCENARIO_ID_VAR.to_string(), scenario_id.to_string());
        ExecutionUnit::new(
            FETCH_PARAMETERS,
            self.settings.scenario_fetch_parameters_image.as_str(),
        )
        .with_env_vars(env_vars)
    }

    /// Container that ships inputs to the data warehouse. A run template toggle
    /// overrides the workspace default, which itself defaults to `true`.
    pub fn build_send_data_warehouse_container(
        &self,
        workspace: &Workspace,
        run_template: &RunTemplate,
    ) -> ExecutionUnit {
        let send_parameters = send_option(
            workspace.send_input_to_data_warehouse,
            run_template.send_input_parameters_to_data_warehouse,
        );
        let send_datasets = send_option(
            workspace.send_input_to_data_warehouse,
            run_template.send_datasets_to_data_warehouse,
        );

        let mut env_vars = self.common_env_vars();
        env_vars.insert(SEND_PARAMETERS_VAR.to_string(), send_parameters.to_string());
        env_vars.insert(SEND_DATASETS_VAR.to_string(), send_datasets.to_string());
        env_vars.insert(
            ADX_INGESTION_URI_VAR.to_string(),
            self.settings.adx_data_ingestion_uri.clone(),
        );
        env_vars.insert(ADX_DATABASE_VAR.to_string(), workspace.key.clone());

        ExecutionUnit::new(
            SEND_DATA_WAREHOUSE,
            self.settings.send_data_warehouse_image.as_str(),
        )
        .with_env_vars(env_vars)
    }

    pub fn build_apply_parameters_container(
        &self,
        workspace_key: &str,
        solution: &Solution,
        run_template_id: &str,
    ) -> Result<ExecutionUnit> {
        self.build_solution_container(
            workspace_key,
            solution,
            run_template_id,
            SolutionStep::ApplyParameters,
        )
    }

    pub fn build_validate_data_container(
        &self,
        workspace_key: &str,
        solution: &Solution,
        run_template_id: &str,
    ) -> Result<ExecutionUnit> {
        self.build_solution_container(
            workspace_key,
            solution,
            run_template_id,
            SolutionStep::ValidateData,
        )
    }

    pub fn build_pre_run_container(
        &self,
        workspace_key: &str,
        solution: &Solution,
        run_template_id: &str,
    ) -> Result<ExecutionUnit> {
        self.build_solution_container(workspace_key, solution, run_template_id, SolutionStep::PreRun)
    }

    pub fn build_run_container(
        &self,
        workspace_key: &str,
        solution: &Solution,
        run_template_id: &str,
    ) -> Result<ExecutionUnit> {
        self.build_solution_container(workspace_key, solution, run_template_id, SolutionStep::Run)
    }

    pub fn build_post_run_container(
        &self,
        workspace_key: &str,
        solution: &Solution,
        run_template_id: &str,
    ) -> Result<ExecutionUnit> {
        self.build_solution_container(workspace_key, solution, run_template_id, SolutionStep::PostRun)
    }

    pub fn build_solution_container(
        &self,
        workspace_key: &str,
        solution: &Solution,
        run_template_id: &str,
        step: SolutionStep,
    ) -> Result<ExecutionUnit> {
        let run_template = solution
            .run_template(run_template_id)
            .ok_or_else(|| OrchestratorError::run_template_not_found(run_template_id, &solution.id))?;

        let event_hub = &self.settings.event_hub_cluster_uri;
        let mut env_vars = self.common_env_vars();
        env_vars.insert(RUN_TEMPLATE_ID_VAR.to_string(), run_template_id.to_string());
        env_vars.insert(CONTAINER_MODE_VAR.to_string(), step.mode().to_string());
        env_vars.insert(
            CONTROL_PLANE_TOPIC_VAR.to_string(),
            format!("{}/{}{}", event_hub, workspace_key, CONTROL_PLANE_SUFFIX),
        );
        env_vars.insert(
            PROBES_MEASURES_TOPIC_VAR.to_string(),
            format!("{}/{}", event_hub, workspace_key),
        );
        if let Some(ref simulation) = run_template.csm_simulation {
            env_vars.insert(SIMULATION_VAR.to_string(), simulation.clone());
        }

        Ok(ExecutionUnit::new(step.container_name(), solution.image())
            .with_env_vars(env_vars)
            .with_entrypoint(ENTRYPOINT))
    }

    /// Every unit of a run in execution order: dataset fetches, parameter fetch,
    /// the five solution steps, then the data warehouse export.
    pub fn build_pipeline(&self, context: &PipelineContext) -> Result<Vec<ExecutionUnit>> {
        let run_template = context
            .solution
            .run_template(&context.run_template_id)
            .ok_or_else(|| {
                OrchestratorError::run_template_not_found(
                    &context.run_template_id,
                    &context.solution.id,
                )
            })?;

        let mut units = Vec::with_capacity(context.datasets.len() + SolutionStep::ALL.len() + 2);
        for (dataset, connector) in &context.datasets {
            units.push(self.build_from_dataset(dataset, connector)?);
        }
        units.push(self.build_scenario_parameters_fetch_container(&context.scenario_id));
        for step in SolutionStep::ALL {
            units.push(self.build_solution_container(
                &context.workspace.key,
                &context.solution,
                &context.run_template_id,
                step,
            )?);
        }
        units.push(self.build_send_data_warehouse_container(&context.workspace, run_template));

        debug!(
            scenario_id = %context.scenario_id,
            units = units.len(),
            "Run pipeline built"
        );
        Ok(units)
    }
}

fn send_option(workspace_default: Option<bool>, run_template_override: Option<bool>) -> bool {
    run_template_override.or(workspace_default).unwrap_or(true)
}
