use async_trait::async_trait;
use scenario_core::Scenario;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbError;
use crate::models::ScenarioRow;

/// Storage access for scenario records, scoped by organization and workspace.
///
/// Implementations own any locking or optimistic-concurrency control; callers
/// treat the last upsert as the winner.
#[async_trait]
pub trait ScenarioRepository: Send + Sync {
    /// Fetch one scenario, failing with [`DbError::ScenarioNotFound`] when absent.
    async fn get(
        &self,
        organization_id: &str,
        workspace_id: &str,
        scenario_id: &str,
    ) -> Result<Scenario, DbError>;

    async fn query_all(
        &self,
        organization_id: &str,
        workspace_id: &str,
    ) -> Result<Vec<Scenario>, DbError>;

    /// Direct children of `parent_id`.
    async fn query_children(
        &self,
        organization_id: &str,
        workspace_id: &str,
        parent_id: &str,
    ) -> Result<Vec<Scenario>, DbError>;

    /// Every scenario whose root is `root_id`.
    async fn query_by_root(
        &self,
        organization_id: &str,
        workspace_id: &str,
        root_id: &str,
    ) -> Result<Vec<Scenario>, DbError>;

    async fn upsert(
        &self,
        organization_id: &str,
        workspace_id: &str,
        scenario: &Scenario,
    ) -> Result<(), DbError>;

    /// Returns whether a record was removed.
    async fn delete(
        &self,
        organization_id: &str,
        workspace_id: &str,
        scenario_id: &str,
    ) -> Result<bool, DbError>;
}

const SELECT_COLUMNS: &str = "SELECT organization_id, workspace_id, id, owner_id, parent_id, root_id, document, created_at, updated_at FROM scenarios";

#[derive(Clone)]
pub struct SqliteScenarioRepository {
    pool: SqlitePool,
}

impl SqliteScenarioRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn into_scenarios(rows: Vec<ScenarioRow>) -> Result<Vec<Scenario>, DbError> {
        rows.into_iter().map(ScenarioRow::into_domain).collect()
    }
}

#[async_trait]
impl ScenarioRepository for SqliteScenarioRepository {
    async fn get(
        &self,
        organization_id: &str,
        workspace_id: &str,
        scenario_id: &str,
    ) -> Result<Scenario, DbError> {
        let row: Option<ScenarioRow> = sqlx::query_as(&format!(
            "{} WHERE organization_id = ? AND workspace_id = ? AND id = ?",
            SELECT_COLUMNS
        ))
        .bind(organization_id)
        .bind(workspace_id)
        .bind(scenario_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row.into_domain(),
            None => Err(DbError::scenario_not_found(
                organization_id,
                workspace_id,
                scenario_id,
            )),
        }
    }

    async fn query_all(
        &self,
        organization_id: &str,
        workspace_id: &str,
    ) -> Result<Vec<Scenario>, DbError> {
        let rows: Vec<ScenarioRow> = sqlx::query_as(&format!(
            "{} WHERE organization_id = ? AND workspace_id = ? ORDER BY created_at, id",
            SELECT_COLUMNS
        ))
        .bind(organization_id)
        .bind(workspace_id)
        .fetch_all(&self.pool)
        .await?;

        Self::into_scenarios(rows)
    }

    async fn query_children(
        &self,
        organization_id: &str,
        workspace_id: &str,
        parent_id: &str,
    ) -> Result<Vec<Scenario>, DbError> {
        let rows: Vec<ScenarioRow> = sqlx::query_as(&format!(
            "{} WHERE organization_id = ? AND workspace_id = ? AND parent_id = ? ORDER BY created_at, id",
            SELECT_COLUMNS
        ))
        .bind(organization_id)
        .bind(workspace_id)
        .bind(parent_id)
        .fetch_all(&self.pool)
        .await?;

        Self::into_scenarios(rows)
    }

    async fn query_by_root(
        &self,
        organization_id: &str,
        workspace_id: &str,
        root_id: &str,
    ) -> Result<Vec<Scenario>, DbError> {
        let rows: Vec<ScenarioRow> = sqlx::query_as(&format!(
            "{} WHERE organization_id = ? AND workspace_id = ? AND root_id = ? ORDER BY created_at, id",
            SELECT_COLUMNS
        ))
        .bind(organization_id)
        .bind(workspace_id)
        .bind(root_id)
        .fetch_all(&self.pool)
        .await?;

        Self::into_scenarios(rows)
    }

    async fn upsert(
        &self,
        organization_id: &str,
        workspace_id: &str,
        scenario: &Scenario,
    ) -> Result<(), DbError> {
        let row = ScenarioRow::from_domain(organization_id, workspace_id, scenario)?;

        sqlx::query(
            r#"
            INSERT INTO scenarios (organization_id, workspace_id, id, owner_id, parent_id, root_id, document, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (organization_id, workspace_id, id) DO UPDATE SET
                owner_id = excluded.owner_id,
                parent_id = excluded.parent_id,
                root_id = excluded.root_id,
                document = excluded.document,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&row.organization_id)
        .bind(&row.workspace_id)
        .bind(&row.id)
        .bind(&row.owner_id)
        .bind(&row.parent_id)
        .bind(&row.root_id)
        .bind(&row.document)
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await?;

        debug!(scenario_id = %scenario.id, "Scenario upserted");
        Ok(())
    }

    async fn delete(
        &self,
        organization_id: &str,
        workspace_id: &str,
        scenario_id: &str,
    ) -> Result<bool, DbError> {
        let result = sqlx::query(
            "DELETE FROM scenarios WHERE organization_id = ? AND workspace_id = ? AND id = ?",
        )
        .bind(organization_id)
        .bind(workspace_id)
        .bind(scenario_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations};

    async fn setup_test_db() -> SqlitePool {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    fn child_of(name: &str, parent: &Scenario, root_id: &str) -> Scenario {
        let mut scenario = Scenario::new(name, "alice");
        scenario.parent_id = Some(parent.id.clone());
        scenario.root_id = Some(root_id.to_string());
        scenario
    }

    #[tokio::test]
    async fn test_upsert_and_get() {
        let repo = SqliteScenarioRepository::new(setup_test_db().await);

        let scenario = Scenario::new("Baseline", "alice");
        repo.upsert("o-1", "w-1", &scenario).await.unwrap();

        let found = repo.get("o-1", "w-1", &scenario.id).await.unwrap();
        assert_eq!(found.name, "Baseline");
    }

    #[tokio::test]
    async fn test_get_is_scoped_by_workspace() {
        let repo = SqliteScenarioRepository::new(setup_test_db().await);

        let scenario = Scenario::new("Baseline", "alice");
        repo.upsert("o-1", "w-1", &scenario).await.unwrap();

        let err = repo.get("o-1", "w-2", &scenario.id).await.unwrap_err();
        assert!(matches!(err, DbError::ScenarioNotFound { .. }));
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_upsert_replaces_existing_document() {
        let repo = SqliteScenarioRepository::new(setup_test_db().await);

        let mut scenario = Scenario::new("Baseline", "alice");
        repo.upsert("o-1", "w-1", &scenario).await.unwrap();

        scenario.name = "Renamed".to_string();
        scenario.dataset_list = vec!["d-1".to_string()];
        repo.upsert("o-1", "w-1", &scenario).await.unwrap();

        let all = repo.query_all("o-1", "w-1").await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "Renamed");
        assert_eq!(all[0].dataset_list, vec!["d-1"]);
    }

    #[tokio::test]
    async fn test_query_children_and_root() {
        let repo = SqliteScenarioRepository::new(setup_test_db().await);

        let root = Scenario::new("Root", "alice");
        let child = child_of("Child", &root, &root.id);
        let grandchild = child_of("Grandchild", &child, &root.id);
        let other_root = Scenario::new("Other", "alice");
        for scenario in [&root, &child, &grandchild, &other_root] {
            repo.upsert("o-1", "w-1", scenario).await.unwrap();
        }

        let children = repo.query_children("o-1", "w-1", &root.id).await.unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].id, child.id);

        let subtree = repo.query_by_root("o-1", "w-1", &root.id).await.unwrap();
        let mut ids: Vec<String> = subtree.into_iter().map(|s| s.id).collect();
        ids.sort();
        let mut expected = vec![child.id.clone(), grandchild.id.clone()];
        expected.sort();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn test_delete() {
        let repo = SqliteScenarioRepository::new(setup_test_db().await);

        let scenario = Scenario::new("To delete", "alice");
        repo.upsert("o-1", "w-1", &scenario).await.unwrap();

        assert!(repo.delete("o-1", "w-1", &scenario.id).await.unwrap());
        assert!(!repo.delete("o-1", "w-1", &scenario.id).await.unwrap());
        assert!(repo.get("o-1", "w-1", &scenario.id).await.is_err());
    }
}
