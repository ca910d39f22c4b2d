use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkspaceSolution {
    #[serde(default)]
    pub solution_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Workspace {
    pub id: String,
    /// Short identifier, also used as the data warehouse database name.
    pub key: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub solution: WorkspaceSolution,
    #[serde(default)]
    pub send_input_to_data_warehouse: Option<bool>,
}

impl Workspace {
    pub fn new(id: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            key: key.into(),
            name: None,
            solution: WorkspaceSolution::default(),
            send_input_to_data_warehouse: None,
        }
    }

    pub fn with_solution(mut self, solution_id: impl Into<String>) -> Self {
        self.solution.solution_id = Some(solution_id.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Organization {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub name: String,
}
