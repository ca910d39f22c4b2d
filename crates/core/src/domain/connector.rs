use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectorParameter {
    pub id: String,
    #[serde(default)]
    pub label: Option<String>,
    /// Environment variable the value is exposed as. Unbound parameters are passed
    /// as positional arguments instead.
    #[serde(default)]
    pub env_var: Option<String>,
}

impl ConnectorParameter {
    pub fn argument(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: None,
            env_var: None,
        }
    }

    pub fn env(id: impl Into<String>, env_var: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: None,
            env_var: Some(env_var.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectorParameterGroup {
    pub id: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub parameters: Vec<ConnectorParameter>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Connector {
    pub id: String,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    pub repository: String,
    pub version: String,
    #[serde(default)]
    pub parameter_groups: Vec<ConnectorParameterGroup>,
}

impl Connector {
    /// All parameters across groups, in declaration order.
    pub fn parameters(&self) -> impl Iterator<Item = &ConnectorParameter> {
        self.parameter_groups.iter().flat_map(|g| g.parameters.iter())
    }

    pub fn image(&self) -> String {
        format!("{}:{}", self.repository, self.version)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DatasetConnector {
    pub id: String,
    #[serde(default)]
    pub parameters_values: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Dataset {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub connector: DatasetConnector,
}

impl Dataset {
    pub fn parameter_value(&self, parameter_id: &str) -> &str {
        self.connector
            .parameters_values
            .get(parameter_id)
            .map(String::as_str)
            .unwrap_or("")
    }
}
