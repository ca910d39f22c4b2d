use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParameterGroup {
    pub id: String,
    #[serde(default)]
    pub label: Option<String>,
    /// Parameter ids, in declaration order.
    #[serde(default)]
    pub parameters: Vec<String>,
}

/// Named execution profile of a solution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunTemplate {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub csm_simulation: Option<String>,
    #[serde(default)]
    pub send_input_parameters_to_data_warehouse: Option<bool>,
    #[serde(default)]
    pub send_datasets_to_data_warehouse: Option<bool>,
    /// Ids of the solution parameter groups this template uses.
    #[serde(default)]
    pub parameter_groups: Vec<String>,
}

impl RunTemplate {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            csm_simulation: None,
            send_input_parameters_to_data_warehouse: None,
            send_datasets_to_data_warehouse: None,
            parameter_groups: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Solution {
    pub id: String,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    pub repository: String,
    pub version: String,
    #[serde(default)]
    pub parameter_groups: Vec<ParameterGroup>,
    #[serde(default)]
    pub run_templates: Vec<RunTemplate>,
}

impl Solution {
    pub fn run_template(&self, run_template_id: &str) -> Option<&RunTemplate> {
        self.run_templates.iter().find(|t| t.id == run_template_id)
    }

    /// Parameter ids declared by the groups a run template references, in the
    /// solution's group order, without duplicates.
    pub fn run_template_parameter_ids(&self, run_template: &RunTemplate) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        for group in self
            .parameter_groups
            .iter()
            .filter(|g| run_template.parameter_groups.contains(&g.id))
        {
            for parameter_id in &group.parameters {
                if !ids.contains(parameter_id) {
                    ids.push(parameter_id.clone());
                }
            }
        }
        ids
    }

    pub fn image(&self) -> String {
        format!("{}:{}", self.repository, self.version)
    }
}
