use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use scenario_core::Scenario;
use tokio::sync::RwLock;

use crate::error::DbError;
use crate::repositories::ScenarioRepository;

type ScenarioKey = (String, String, String);

#[derive(Debug, Clone)]
struct StoredScenario {
    sequence: u64,
    scenario: Scenario,
}

/// Process-local scenario store. Query results come back in insertion order.
#[derive(Clone, Default)]
pub struct InMemoryScenarioRepository {
    scenarios: Arc<RwLock<BTreeMap<ScenarioKey, StoredScenario>>>,
    sequence: Arc<AtomicU64>,
}

impl InMemoryScenarioRepository {
    pub fn new() -> Self {
        Self::default()
    }

    async fn filter<F>(&self, organization_id: &str, workspace_id: &str, predicate: F) -> Vec<Scenario>
    where
        F: Fn(&Scenario) -> bool,
    {
        let scenarios = self.scenarios.read().await;
        let mut matching: Vec<&StoredScenario> = scenarios
            .iter()
            .filter(|((org, ws, _), stored)| {
                org == organization_id && ws == workspace_id && predicate(&stored.scenario)
            })
            .map(|(_, stored)| stored)
            .collect();
        matching.sort_by_key(|stored| stored.sequence);
        matching.into_iter().map(|s| s.scenario.clone()).collect()
    }
}

fn key(organization_id: &str, workspace_id: &str, scenario_id: &str) -> ScenarioKey {
    (
        organization_id.to_string(),
        workspace_id.to_string(),
        scenario_id.to_string(),
    )
}

#[async_trait]
impl ScenarioRepository for InMemoryScenarioRepository {
    async fn get(
        &self,
        organization_id: &str,
        workspace_id: &str,
        scenario_id: &str,
    ) -> Result<Scenario, DbError> {
        self.scenarios
            .read()
            .await
            .get(&key(organization_id, workspace_id, scenario_id))
            .map(|stored| stored.scenario.clone())
            .ok_or_else(|| DbError::scenario_not_found(organization_id, workspace_id, scenario_id))
    }

    async fn query_all(
        &self,
        organization_id: &str,
        workspace_id: &str,
    ) -> Result<Vec<Scenario>, DbError> {
        Ok(self.filter(organization_id, workspace_id, |_| true).await)
    }

    async fn query_children(
        &self,
        organization_id: &str,
        workspace_id: &str,
        parent_id: &str,
    ) -> Result<Vec<Scenario>, DbError> {
        Ok(self
            .filter(organization_id, workspace_id, |s| {
                s.parent_id.as_deref() == Some(parent_id)
            })
            .await)
    }

    async fn query_by_root(
        &self,
        organization_id: &str,
        workspace_id: &str,
        root_id: &str,
    ) -> Result<Vec<Scenario>, DbError> {
        Ok(self
            .filter(organization_id, workspace_id, |s| {
                s.root_id.as_deref() == Some(root_id)
            })
            .await)
    }

    async fn upsert(
        &self,
        organization_id: &str,
        workspace_id: &str,
        scenario: &Scenario,
    ) -> Result<(), DbError> {
        let mut scenarios = self.scenarios.write().await;
        let entry_key = key(organization_id, workspace_id, &scenario.id);
        let sequence = match scenarios.get(&entry_key) {
            Some(existing) => existing.sequence,
            None => self.sequence.fetch_add(1, Ordering::Relaxed),
        };
        scenarios.insert(
            entry_key,
            StoredScenario {
                sequence,
                scenario: scenario.clone(),
            },
        );
        Ok(())
    }

    async fn delete(
        &self,
        organization_id: &str,
        workspace_id: &str,
        scenario_id: &str,
    ) -> Result<bool, DbError> {
        Ok(self
            .scenarios
            .write()
            .await
            .remove(&key(organization_id, workspace_id, scenario_id))
            .is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_query_all_keeps_insertion_order() {
        let repo = InMemoryScenarioRepository::new();
        let first = Scenario::new("First", "alice");
        let second = Scenario::new("Second", "alice");

        repo.upsert("o-1", "w-1", &first).await.unwrap();
        repo.upsert("o-1", "w-1", &second).await.unwrap();
        // Re-upserting does not move the record.
        repo.upsert("o-1", "w-1", &first).await.unwrap();

        let names: Vec<String> = repo
            .query_all("o-1", "w-1")
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["First", "Second"]);
    }

    #[tokio::test]
    async fn test_scoping_and_not_found() {
        let repo = InMemoryScenarioRepository::new();
        let scenario = Scenario::new("Scoped", "alice");
        repo.upsert("o-1", "w-1", &scenario).await.unwrap();

        assert!(repo.get("o-1", "w-1", &scenario.id).await.is_ok());
        assert!(repo.get("o-2", "w-1", &scenario.id).await.unwrap_err().is_not_found());
        assert!(repo.query_all("o-1", "w-2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_children_and_delete() {
        let repo = InMemoryScenarioRepository::new();
        let root = Scenario::new("Root", "alice");
        let mut child = Scenario::new("Child", "alice");
        child.parent_id = Some(root.id.clone());
        child.root_id = Some(root.id.clone());
        repo.upsert("o-1", "w-1", &root).await.unwrap();
        repo.upsert("o-1", "w-1", &child).await.unwrap();

        assert_eq!(repo.query_children("o-1", "w-1", &root.id).await.unwrap().len(), 1);
        assert_eq!(repo.query_by_root("o-1", "w-1", &root.id).await.unwrap().len(), 1);

        assert!(repo.delete("o-1", "w-1", &child.id).await.unwrap());
        assert_eq!(repo.query_all("o-1", "w-1").await.unwrap().len(), 1);
    }
}
