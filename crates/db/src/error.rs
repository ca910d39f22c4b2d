use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Scenario {scenario_id} not found in workspace {workspace_id} of organization {organization_id}")]
    ScenarioNotFound {
        organization_id: String,
        workspace_id: String,
        scenario_id: String,
    },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
}

impl DbError {
    pub fn scenario_not_found(
        organization_id: &str,
        workspace_id: &str,
        scenario_id: &str,
    ) -> Self {
        Self::ScenarioNotFound {
            organization_id: organization_id.to_string(),
            workspace_id: workspace_id.to_string(),
            scenario_id: scenario_id.to_string(),
        }
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ScenarioNotFound { .. } | Self::NotFound { .. })
    }
}
