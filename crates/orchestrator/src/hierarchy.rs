//! Inheritance between a scenario and its ancestors.

use std::sync::Arc;

use db::ScenarioRepository;
use scenario_core::{CreateScenarioRequest, ParameterValue, Scenario, Solution};
use tracing::{debug, info};

use crate::error::{OrchestratorError, Result};
use crate::fan_out::{FanOut, FanOutOutcome};

/// What a new scenario takes from its parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedHierarchy {
    pub dataset_list: Vec<String>,
    pub root_id: Option<String>,
    pub parameters_values: Vec<ParameterValue>,
}

#[derive(Clone)]
pub struct HierarchyResolver {
    repository: Arc<dyn ScenarioRepository>,
}

impl HierarchyResolver {
    pub fn new(repository: Arc<dyn ScenarioRepository>) -> Self {
        Self { repository }
    }

    /// Compute the dataset list, root and parameter values of a scenario about to
    /// be created under `parent`.
    pub fn resolve_on_create(
        request: &CreateScenarioRequest,
        parent: Option<&Scenario>,
        solution: Option<&Solution>,
    ) -> Result<ResolvedHierarchy> {
        let run_template = match request.run_template_id.as_deref() {
            Some(run_template_id) => {
                let solution = solution.ok_or_else(|| {
                    OrchestratorError::configuration(format!(
                        "Run template {} requested but the workspace has no solution",
                        run_template_id
                    ))
                })?;
                let run_template = solution.run_template(run_template_id).ok_or_else(|| {
                    OrchestratorError::run_template_not_found(run_template_id, &solution.id)
                })?;
                Some((solution, run_template))
            }
            None => None,
        };

        let (dataset_list, root_id) = match parent {
            Some(parent) => (
                parent.dataset_list.clone(),
                Some(parent.root_id.clone().unwrap_or_else(|| parent.id.clone())),
            ),
            None => (request.dataset_list.clone(), None),
        };

        let mut parameters_values = explicit_values(&request.parameters_values);

        if let (Some(parent), Some((solution, run_template))) = (parent, run_template) {
            for parameter_id in solution.run_template_parameter_ids(run_template) {
                if parameters_values
                    .iter()
                    .any(|p| p.parameter_id == parameter_id)
                {
                    continue;
                }
                if let Some(inherited) = parent.parameter(&parameter_id) {
                    debug!(
                        parent_id = %parent.id,
                        parameter_id = %parameter_id,
                        "Inheriting parameter value"
                    );
                    parameters_values.push(inherited.clone().inherited());
                }
            }
        }

        Ok(ResolvedHierarchy {
            dataset_list,
            root_id,
            parameters_values,
        })
    }

    /// Write `dataset_list` to every scenario under `root_id`.
    pub async fn propagate_dataset_list(
        &self,
        organization_id: &str,
        workspace_id: &str,
        root_id: &str,
        dataset_list: Vec<String>,
        wait: bool,
    ) -> Result<FanOutOutcome> {
        let descendants = self
            .repository
            .query_by_root(organization_id, workspace_id, root_id)
            .await?;
        info!(
            root_id,
            descendants = descendants.len(),
            "Propagating dataset list"
        );

        let tasks = descendants
            .into_iter()
            .map(|mut scenario| {
                let repository = Arc::clone(&self.repository);
                let organization_id = organization_id.to_string();
                let workspace_id = workspace_id.to_string();
                let dataset_list = dataset_list.clone();
                (scenario.id.clone(), async move {
                    scenario.dataset_list = dataset_list;
                    scenario.touch();
                    repository
                        .upsert(&organization_id, &workspace_id, &scenario)
                        .await?;
                    Ok::<(), OrchestratorError>(())
                })
            })
            .collect();

        Ok(FanOut::dispatch("propagate_dataset_list", tasks, wait).await)
    }

    /// Move the direct children of a deleted scenario up to its parent.
    pub async fn on_scenario_deleted(
        &self,
        organization_id: &str,
        workspace_id: &str,
        deleted: &Scenario,
        wait: bool,
    ) -> Result<FanOutOutcome> {
        let children = self
            .repository
            .query_children(organization_id, workspace_id, &deleted.id)
            .await?;
        info!(
            scenario_id = %deleted.id,
            children = children.len(),
            "Reparenting children of deleted scenario"
        );

        let tasks = children
            .into_iter()
            .map(|mut child| {
                let repository = Arc::clone(&self.repository);
                let organization_id = organization_id.to_string();
                let workspace_id = workspace_id.to_string();
                let new_parent = deleted.parent_id.clone();
                (child.id.clone(), async move {
                    child.parent_id = new_parent;
                    child.touch();
                    repository
                        .upsert(&organization_id, &workspace_id, &child)
                        .await?;
                    Ok::<(), OrchestratorError>(())
                })
            })
            .collect();

        Ok(FanOut::dispatch("reparent_children", tasks, wait).await)
    }
}

/// Explicit values in request order, first position and last value per id.
pub(crate) fn explicit_values(values: &[ParameterValue]) -> Vec<ParameterValue> {
    let mut merged: Vec<ParameterValue> = Vec::with_capacity(values.len());
    for value in values {
        if value.parameter_id.trim().is_empty() {
            continue;
        }
        let value = value.clone().explicit();
        match merged
            .iter_mut()
            .find(|p| p.parameter_id == value.parameter_id)
        {
            Some(existing) => *existing = value,
            None => merged.push(value),
        }
    }
    merged
}

pub(crate) fn merge_parameter_values(
    existing: &mut Vec<ParameterValue>,
    incoming: &[ParameterValue],
) {
    for value in explicit_values(incoming) {
        match existing
            .iter_mut()
            .find(|p| p.parameter_id == value.parameter_id)
        {
            Some(current) => *current = value,
            None => existing.push(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use db::{DbError, InMemoryScenarioRepository};
    use scenario_core::{ParameterGroup, RunTemplate};

    const ORG: &str = "o-1";
    const WS: &str = "w-1";

    fn solution() -> Solution {
        let mut run_template = RunTemplate::new("rt-1");
        run_template.parameter_groups = vec!["g-stock".to_string(), "g-price".to_string()];
        Solution {
            id: "sol-1".to_string(),
            key: None,
            name: None,
            repository: "registry/supply".to_string(),
            version: "1.0.0".to_string(),
            parameter_groups: vec![
                ParameterGroup {
                    id: "g-price".to_string(),
                    label: None,
                    parameters: vec!["price".to_string(), "stock".to_string()],
                },
                ParameterGroup {
                    id: "g-stock".to_string(),
                    label: None,
                    parameters: vec!["stock".to_string(), "restock".to_string()],
                },
                ParameterGroup {
                    id: "g-unused".to_string(),
                    label: None,
                    parameters: vec!["ignored".to_string()],
                },
            ],
            run_templates: vec![run_template],
        }
    }

    fn parent() -> Scenario {
        let mut parent = Scenario::new("Parent", "alice").with_id("s-parent");
        parent.dataset_list = vec!["d-1".to_string(), "d-2".to_string()];
        parent.parameters_values = vec![
            ParameterValue::new("price", "10"),
            ParameterValue::new("stock", "100"),
            ParameterValue::new("ignored", "x"),
        ];
        parent
    }

    #[test]
    fn test_root_keeps_requested_datasets() {
        let request = CreateScenarioRequest::new("Root").with_datasets(vec!["d-9".to_string()]);

        let resolved = HierarchyResolver::resolve_on_create(&request, None, None).unwrap();

        assert_eq!(resolved.dataset_list, vec!["d-9"]);
        assert_eq!(resolved.root_id, None);
        assert!(resolved.parameters_values.is_empty());
    }

    #[test]
    fn test_child_inherits_from_parent() {
        let solution = solution();
        let request = CreateScenarioRequest::new("Child")
            .with_run_template("rt-1")
            .with_datasets(vec!["d-ignored".to_string()])
            .with_parameter(ParameterValue::new("stock", "5"));

        let resolved =
            HierarchyResolver::resolve_on_create(&request, Some(&parent()), Some(&solution))
                .unwrap();

        assert_eq!(resolved.dataset_list, vec!["d-1", "d-2"]);
        assert_eq!(resolved.root_id.as_deref(), Some("s-parent"));
        assert_eq!(
            resolved.parameters_values,
            vec![
                ParameterValue::new("stock", "5"),
                ParameterValue::new("price", "10").inherited(),
            ]
        );
    }

    #[test]
    fn test_grandchild_root_is_parent_root() {
        let mut parent = parent();
        parent.root_id = Some("s-root".to_string());
        let request = CreateScenarioRequest::new("Grandchild");

        let resolved = HierarchyResolver::resolve_on_create(&request, Some(&parent), None).unwrap();

        assert_eq!(resolved.root_id.as_deref(), Some("s-root"));
    }

    #[test]
    fn test_explicit_values_deduplicated() {
        let request = CreateScenarioRequest::new("Root")
            .with_parameter(ParameterValue::new("a", "1"))
            .with_parameter(ParameterValue::new(" ", "dropped"))
            .with_parameter(ParameterValue::new("b", "2"))
            .with_parameter(ParameterValue::new("a", "3").inherited());

        let resolved = HierarchyResolver::resolve_on_create(&request, None, None).unwrap();

        assert_eq!(
            resolved.parameters_values,
            vec![ParameterValue::new("a", "3"), ParameterValue::new("b", "2")]
        );
    }

    #[test]
    fn test_unknown_run_template_is_configuration_error() {
        let request = CreateScenarioRequest::new("Child").with_run_template("rt-404");

        let err = HierarchyResolver::resolve_on_create(&request, Some(&parent()), Some(&solution()))
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Configuration(ref m) if m.contains("rt-404")));

        let err = HierarchyResolver::resolve_on_create(&request, None, None).unwrap_err();
        assert!(matches!(err, OrchestratorError::Configuration(_)));
    }

    #[test]
    fn test_merge_parameter_values_replaces_in_place() {
        let mut existing = vec![
            ParameterValue::new("a", "1").inherited(),
            ParameterValue::new("b", "2"),
        ];
        merge_parameter_values(
            &mut existing,
            &[ParameterValue::new("a", "9").inherited(), ParameterValue::new("c", "3")],
        );
        assert_eq!(
            existing,
            vec![
                ParameterValue::new("a", "9"),
                ParameterValue::new("b", "2"),
                ParameterValue::new("c", "3"),
            ]
        );
    }

    async fn seed_tree(repository: &InMemoryScenarioRepository) {
        let root = Scenario::new("Root", "alice").with_id("s-root");
        let mut child = Scenario::new("Child", "alice").with_id("s-child");
        child.parent_id = Some("s-root".to_string());
        child.root_id = Some("s-root".to_string());
        let mut grandchild = Scenario::new("Grandchild", "alice").with_id("s-grand");
        grandchild.parent_id = Some("s-child".to_string());
        grandchild.root_id = Some("s-root".to_string());
        let other = Scenario::new("Other", "alice").with_id("s-other");

        for scenario in [root, child, grandchild, other] {
            repository.upsert(ORG, WS, &scenario).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_propagate_reaches_whole_subtree() {
        let repository = InMemoryScenarioRepository::new();
        seed_tree(&repository).await;
        let resolver = HierarchyResolver::new(Arc::new(repository.clone()));

        let outcome = resolver
            .propagate_dataset_list(ORG, WS, "s-root", vec!["d-new".to_string()], true)
            .await
            .unwrap();

        assert!(outcome.report().unwrap().is_complete_success());
        assert_eq!(outcome.dispatched(), 2);
        for id in ["s-child", "s-grand"] {
            let scenario = repository.get(ORG, WS, id).await.unwrap();
            assert_eq!(scenario.dataset_list, vec!["d-new"]);
        }
        let other = repository.get(ORG, WS, "s-other").await.unwrap();
        assert!(other.dataset_list.is_empty());
    }

    #[tokio::test]
    async fn test_deleted_scenario_children_move_to_grandparent() {
        let repository = InMemoryScenarioRepository::new();
        seed_tree(&repository).await;
        let resolver = HierarchyResolver::new(Arc::new(repository.clone()));
        let deleted = repository.get(ORG, WS, "s-child").await.unwrap();

        let outcome = resolver
            .on_scenario_deleted(ORG, WS, &deleted, true)
            .await
            .unwrap();

        assert_eq!(outcome.dispatched(), 1);
        let grandchild = repository.get(ORG, WS, "s-grand").await.unwrap();
        assert_eq!(grandchild.parent_id.as_deref(), Some("s-root"));
        assert_eq!(grandchild.root_id.as_deref(), Some("s-root"));
    }

    struct RejectingRepository {
        inner: InMemoryScenarioRepository,
        reject: &'static str,
    }

    #[async_trait]
    impl ScenarioRepository for RejectingRepository {
        async fn get(&self, o: &str, w: &str, id: &str) -> std::result::Result<Scenario, DbError> {
            self.inner.get(o, w, id).await
        }

        async fn query_all(&self, o: &str, w: &str) -> std::result::Result<Vec<Scenario>, DbError> {
            self.inner.query_all(o, w).await
        }

        async fn query_children(
            &self,
            o: &str,
            w: &str,
            parent_id: &str,
        ) -> std::result::Result<Vec<Scenario>, DbError> {
            self.inner.query_children(o, w, parent_id).await
        }

        async fn query_by_root(
            &self,
            o: &str,
            w: &str,
            root_id: &str,
        ) -> std::result::Result<Vec<Scenario>, DbError> {
            self.inner.query_by_root(o, w, root_id).await
        }

        async fn upsert(
            &self,
            o: &str,
            w: &str,
            scenario: &Scenario,
        ) -> std::result::Result<(), DbError> {
            if scenario.id == self.reject {
                return Err(DbError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "write rejected",
                )));
            }
            self.inner.upsert(o, w, scenario).await
        }

        async fn delete(&self, o: &str, w: &str, id: &str) -> std::result::Result<bool, DbError> {
            self.inner.delete(o, w, id).await
        }
    }

    #[tokio::test]
    async fn test_failed_descendant_does_not_block_siblings() {
        let inner = InMemoryScenarioRepository::new();
        seed_tree(&inner).await;
        let resolver = HierarchyResolver::new(Arc::new(RejectingRepository {
            inner: inner.clone(),
            reject: "s-child",
        }));

        let outcome = resolver
            .propagate_dataset_list(ORG, WS, "s-root", vec!["d-new".to_string()], true)
            .await
            .unwrap();

        let report = outcome.report().unwrap();
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].target, "s-child");
        let grandchild = inner.get(ORG, WS, "s-grand").await.unwrap();
        assert_eq!(grandchild.dataset_list, vec!["d-new"]);
    }
}
