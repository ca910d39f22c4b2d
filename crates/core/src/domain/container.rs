use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One container-equivalent step of a simulation run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutionUnit {
    pub name: String,
    pub image: String,
    #[serde(default)]
    pub env_vars: BTreeMap<String, String>,
    #[serde(default)]
    pub run_args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<String>,
}

impl ExecutionUnit {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            env_vars: BTreeMap::new(),
            run_args: Vec::new(),
            entrypoint: None,
        }
    }

    pub fn with_env_vars(mut self, env_vars: BTreeMap<String, String>) -> Self {
        self.env_vars = env_vars;
        self
    }

    pub fn with_run_args(mut self, run_args: Vec<String>) -> Self {
        self.run_args = run_args;
        self
    }

    pub fn with_entrypoint(mut self, entrypoint: impl Into<String>) -> Self {
        self.entrypoint = Some(entrypoint.into());
        self
    }

    pub fn env(&self, key: &str) -> Option<&str> {
        self.env_vars.get(key).map(String::as_str)
    }
}
