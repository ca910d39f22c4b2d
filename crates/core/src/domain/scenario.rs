use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;

const SCENARIO_ID_PREFIX: &str = "s-";
const SCENARIO_ID_LENGTH: usize = 10;

/// Displayed run state of a scenario.
///
/// `Created` is only ever set on creation; every other value is derived from the
/// phase reported by the workflow engine for the scenario's last run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioState {
    #[default]
    Created,
    Running,
    Successful,
    Failed,
    Unknown,
}

impl ScenarioState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Successful => "successful",
            Self::Failed => "failed",
            Self::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "created" => Some(Self::Created),
            "running" => Some(Self::Running),
            "successful" => Some(Self::Successful),
            "failed" => Some(Self::Failed),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }
}

impl std::str::FromStr for ScenarioState {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| CoreError::UnknownState(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioRole {
    Viewer,
    Editor,
    Admin,
}

impl ScenarioRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Viewer => "viewer",
            Self::Editor => "editor",
            Self::Admin => "admin",
        }
    }
}

/// A user granted access to a scenario. `name` is filled from the user directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScenarioUser {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub roles: Vec<ScenarioRole>,
}

impl ScenarioUser {
    pub fn new(id: impl Into<String>, roles: Vec<ScenarioRole>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            roles,
        }
    }

    pub fn role_names(&self) -> Vec<String> {
        self.roles.iter().map(|r| r.as_str().to_string()).collect()
    }
}

/// Value of a run template parameter on a scenario.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParameterValue {
    pub parameter_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub var_type: Option<String>,
    pub value: String,
    /// Set when the value was copied from an ancestor rather than set on this scenario.
    #[serde(default)]
    pub is_inherited: bool,
}

impl ParameterValue {
    pub fn new(parameter_id: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            parameter_id: parameter_id.into(),
            var_type: None,
            value: value.into(),
            is_inherited: false,
        }
    }

    pub fn with_var_type(mut self, var_type: impl Into<String>) -> Self {
        self.var_type = Some(var_type.into());
        self
    }

    pub fn inherited(mut self) -> Self {
        self.is_inherited = true;
        self
    }

    pub fn explicit(mut self) -> Self {
        self.is_inherited = false;
        self
    }
}

/// Reference to the last run submitted for a scenario.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScenarioLastRun {
    pub scenario_run_id: Option<String>,
    pub csm_simulation_run: Option<String>,
    pub workflow_id: Option<String>,
    pub workflow_name: Option<String>,
}

impl ScenarioLastRun {
    pub fn new(
        scenario_run_id: impl Into<String>,
        workflow_id: impl Into<String>,
        workflow_name: impl Into<String>,
    ) -> Self {
        Self {
            scenario_run_id: Some(scenario_run_id.into()),
            csm_simulation_run: None,
            workflow_id: Some(workflow_id.into()),
            workflow_name: Some(workflow_name.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Scenario {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub owner_id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    /// Topmost ancestor; `None` only for root scenarios.
    #[serde(default)]
    pub root_id: Option<String>,
    #[serde(default)]
    pub solution_id: Option<String>,
    #[serde(default)]
    pub solution_name: Option<String>,
    #[serde(default)]
    pub run_template_id: Option<String>,
    #[serde(default)]
    pub run_template_name: Option<String>,
    #[serde(default)]
    pub dataset_list: Vec<String>,
    #[serde(default)]
    pub parameters_values: Vec<ParameterValue>,
    #[serde(default)]
    pub users: Vec<ScenarioUser>,
    #[serde(default)]
    pub state: ScenarioState,
    #[serde(default)]
    pub last_run: Option<ScenarioLastRun>,
    pub creation_date: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
}

impl Scenario {
    pub fn new(name: impl Into<String>, owner_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: generate_scenario_id(),
            name: name.into(),
            description: None,
            tags: Vec::new(),
            owner_id: owner_id.into(),
            parent_id: None,
            root_id: None,
            solution_id: None,
            solution_name: None,
            run_template_id: None,
            run_template_name: None,
            dataset_list: Vec::new(),
            parameters_values: Vec::new(),
            users: Vec::new(),
            state: ScenarioState::default(),
            last_run: None,
            creation_date: now,
            last_update: now,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn parameter(&self, parameter_id: &str) -> Option<&ParameterValue> {
        self.parameters_values
            .iter()
            .find(|p| p.parameter_id == parameter_id)
    }

    pub fn touch(&mut self) {
        self.last_update = Utc::now();
    }
}

/// Generate a scenario identifier such as `s-4f2a9c01be`.
pub fn generate_scenario_id() -> String {
    let raw = Uuid::new_v4().simple().to_string();
    format!("{}{}", SCENARIO_ID_PREFIX, &raw[..SCENARIO_ID_LENGTH])
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateScenarioRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub run_template_id: Option<String>,
    #[serde(default)]
    pub dataset_list: Vec<String>,
    #[serde(default)]
    pub parameters_values: Vec<ParameterValue>,
    #[serde(default)]
    pub users: Vec<ScenarioUser>,
}

impl CreateScenarioRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_run_template(mut self, run_template_id: impl Into<String>) -> Self {
        self.run_template_id = Some(run_template_id.into());
        self
    }

    pub fn with_datasets(mut self, dataset_list: Vec<String>) -> Self {
        self.dataset_list = dataset_list;
        self
    }

    pub fn with_parameter(mut self, value: ParameterValue) -> Self {
        self.parameters_values.push(value);
        self
    }

    pub fn with_user(mut self, user: ScenarioUser) -> Self {
        self.users.push(user);
        self
    }
}

/// Partial update of a scenario. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateScenarioRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    pub owner_id: Option<String>,
    pub users: Option<Vec<ScenarioUser>>,
    pub dataset_list: Option<Vec<String>>,
    pub solution_id: Option<String>,
    pub run_template_id: Option<String>,
    pub parameters_values: Option<Vec<ParameterValue>>,
    pub last_run: Option<ScenarioLastRun>,
}
