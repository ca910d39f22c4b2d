use scenario_core::Scenario;

use crate::error::DbError;

/// Stored scenario: the full document plus the columns queried on.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ScenarioRow {
    pub organization_id: String,
    pub workspace_id: String,
    pub id: String,
    pub owner_id: String,
    pub parent_id: Option<String>,
    pub root_id: Option<String>,
    pub document: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ScenarioRow {
    pub fn from_domain(
        organization_id: &str,
        workspace_id: &str,
        scenario: &Scenario,
    ) -> Result<Self, DbError> {
        Ok(Self {
            organization_id: organization_id.to_string(),
            workspace_id: workspace_id.to_string(),
            id: scenario.id.clone(),
            owner_id: scenario.owner_id.clone(),
            parent_id: scenario.parent_id.clone(),
            root_id: scenario.root_id.clone(),
            document: serde_json::to_string(scenario)?,
            created_at: scenario.creation_date.timestamp_millis(),
            updated_at: scenario.last_update.timestamp_millis(),
        })
    }

    pub fn into_domain(self) -> Result<Scenario, DbError> {
        let mut scenario: Scenario = serde_json::from_str(&self.document)?;
        // Columns are authoritative for the hierarchy.
        scenario.parent_id = self.parent_id;
        scenario.root_id = self.root_id;
        Ok(scenario)
    }
}
