//! Read-only lookups for the entities a scenario references.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use scenario_core::{Connector, Dataset, Organization, Solution, User, Workspace};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::DbError;

#[async_trait]
pub trait Catalog: Send + Sync {
    async fn find_organization(&self, organization_id: &str) -> Result<Organization, DbError>;

    async fn find_user(&self, user_id: &str) -> Result<User, DbError>;

    async fn find_workspace(
        &self,
        organization_id: &str,
        workspace_id: &str,
    ) -> Result<Workspace, DbError>;

    async fn find_solution(
        &self,
        organization_id: &str,
        solution_id: &str,
    ) -> Result<Solution, DbError>;

    async fn find_connector(&self, connector_id: &str) -> Result<Connector, DbError>;

    async fn find_dataset(
        &self,
        organization_id: &str,
        dataset_id: &str,
    ) -> Result<Dataset, DbError>;
}

/// On-disk shape of a catalog file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogDocument {
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub connectors: Vec<Connector>,
    #[serde(default)]
    pub organizations: Vec<OrganizationEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizationEntry {
    #[serde(flatten)]
    pub organization: Organization,
    #[serde(default)]
    pub workspaces: Vec<Workspace>,
    #[serde(default)]
    pub solutions: Vec<Solution>,
    #[serde(default)]
    pub datasets: Vec<Dataset>,
}

type Scoped<T> = BTreeMap<(String, String), T>;

#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    organizations: BTreeMap<String, Organization>,
    users: BTreeMap<String, User>,
    connectors: BTreeMap<String, Connector>,
    workspaces: Scoped<Workspace>,
    solutions: Scoped<Solution>,
    datasets: Scoped<Dataset>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_document(document: CatalogDocument) -> Self {
        let mut catalog = Self::new();
        for user in document.users {
            catalog = catalog.with_user(user);
        }
        for connector in document.connectors {
            catalog = catalog.with_connector(connector);
        }
        for entry in document.organizations {
            let organization_id = entry.organization.id.clone();
            catalog = catalog.with_organization(entry.organization);
            for workspace in entry.workspaces {
                catalog = catalog.with_workspace(&organization_id, workspace);
            }
            for solution in entry.solutions {
                catalog = catalog.with_solution(&organization_id, solution);
            }
            for dataset in entry.datasets {
                catalog = catalog.with_dataset(&organization_id, dataset);
            }
        }
        catalog
    }

    pub async fn from_json_file(path: &Path) -> Result<Self, DbError> {
        let content = tokio::fs::read_to_string(path).await?;
        let document: CatalogDocument = serde_json::from_str(&content)?;
        debug!(
            path = %path.display(),
            organizations = document.organizations.len(),
            "Catalog loaded"
        );
        Ok(Self::from_document(document))
    }

    pub fn with_organization(mut self, organization: Organization) -> Self {
        self.organizations.insert(organization.id.clone(), organization);
        self
    }

    pub fn with_user(mut self, user: User) -> Self {
        self.users.insert(user.id.clone(), user);
        self
    }

    pub fn with_connector(mut self, connector: Connector) -> Self {
        self.connectors.insert(connector.id.clone(), connector);
        self
    }

    pub fn with_workspace(mut self, organization_id: &str, workspace: Workspace) -> Self {
        self.workspaces
            .insert((organization_id.to_string(), workspace.id.clone()), workspace);
        self
    }

    pub fn with_solution(mut self, organization_id: &str, solution: Solution) -> Self {
        self.solutions
            .insert((organization_id.to_string(), solution.id.clone()), solution);
        self
    }

    pub fn with_dataset(mut self, organization_id: &str, dataset: Dataset) -> Self {
        self.datasets
            .insert((organization_id.to_string(), dataset.id.clone()), dataset);
        self
    }
}

fn scoped<T: Clone>(
    entries: &Scoped<T>,
    kind: &'static str,
    organization_id: &str,
    id: &str,
) -> Result<T, DbError> {
    entries
        .get(&(organization_id.to_string(), id.to_string()))
        .cloned()
        .ok_or_else(|| DbError::not_found(kind, format!("{} in organization {}", id, organization_id)))
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn find_organization(&self, organization_id: &str) -> Result<Organization, DbError> {
        self.organizations
            .get(organization_id)
            .cloned()
            .ok_or_else(|| DbError::not_found("Organization", organization_id))
    }

    async fn find_user(&self, user_id: &str) -> Result<User, DbError> {
        self.users
            .get(user_id)
            .cloned()
            .ok_or_else(|| DbError::not_found("User", user_id))
    }

    async fn find_workspace(
        &self,
        organization_id: &str,
        workspace_id: &str,
    ) -> Result<Workspace, DbError> {
        scoped(&self.workspaces, "Workspace", organization_id, workspace_id)
    }

    async fn find_solution(
        &self,
        organization_id: &str,
        solution_id: &str,
    ) -> Result<Solution, DbError> {
        scoped(&self.solutions, "Solution", organization_id, solution_id)
    }

    async fn find_connector(&self, connector_id: &str) -> Result<Connector, DbError> {
        self.connectors
            .get(connector_id)
            .cloned()
            .ok_or_else(|| DbError::not_found("Connector", connector_id))
    }

    async fn find_dataset(
        &self,
        organization_id: &str,
        dataset_id: &str,
    ) -> Result<Dataset, DbError> {
        scoped(&self.datasets, "Dataset", organization_id, dataset_id)
    }
}
