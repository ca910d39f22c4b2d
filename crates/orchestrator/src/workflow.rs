//! Workflow status lookups against the execution engine.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error)]
pub enum WorkflowStatusError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),

    #[error("Workflow API error ({status}): {message}")]
    Api { status: u16, message: String },
}

/// Reports the current phase of a submitted workflow.
///
/// Implementations are queried on every scenario read that carries a last run;
/// they must not cache on behalf of the caller.
#[async_trait]
pub trait WorkflowStatusProvider: Send + Sync {
    async fn query(
        &self,
        workflow_id: &str,
        workflow_name: &str,
    ) -> std::result::Result<String, WorkflowStatusError>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ArgoClientConfig {
    /// Base URL of the Argo server, e.g. `https://argo.example.com`.
    pub base_url: String,
    pub namespace: String,
    pub token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ArgoClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:2746".to_string(),
            namespace: "argo".to_string(),
            token: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WorkflowDocument {
    #[serde(default)]
    metadata: WorkflowMetadata,
    #[serde(default)]
    status: WorkflowStatusBody,
}

#[derive(Debug, Default, Deserialize)]
struct WorkflowMetadata {
    #[serde(default)]
    uid: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WorkflowStatusBody {
    #[serde(default)]
    phase: Option<String>,
}

/// Client for the Argo Workflows REST API.
#[derive(Clone)]
pub struct ArgoWorkflowClient {
    client: Client,
    base_url: String,
    namespace: String,
    token: Option<String>,
}

impl ArgoWorkflowClient {
    pub fn new(config: &ArgoClientConfig) -> std::result::Result<Self, WorkflowStatusError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            namespace: config.namespace.clone(),
            token: config.token.clone(),
        })
    }

    fn workflow_url(&self, workflow_name: &str) -> String {
        format!(
            "{}/api/v1/workflows/{}/{}",
            self.base_url, self.namespace, workflow_name
        )
    }
}

#[async_trait]
impl WorkflowStatusProvider for ArgoWorkflowClient {
    async fn query(
        &self,
        workflow_id: &str,
        workflow_name: &str,
    ) -> std::result::Result<String, WorkflowStatusError> {
        let url = self.workflow_url(workflow_name);
        debug!(%url, workflow_id, "Querying workflow status");

        let mut request = self.client.get(&url);
        if let Some(ref token) = self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(WorkflowStatusError::WorkflowNotFound(
                workflow_name.to_string(),
            ));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(WorkflowStatusError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let document: WorkflowDocument = response.json().await?;
        if let Some(uid) = document.metadata.uid.as_deref() {
            if uid != workflow_id {
                warn!(
                    workflow_name,
                    expected = workflow_id,
                    actual = uid,
                    "Workflow uid does not match the recorded workflow id"
                );
            }
        }

        // A freshly submitted workflow has no phase yet.
        Ok(document.status.phase.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, token: Option<&str>) -> ArgoWorkflowClient {
        ArgoWorkflowClient::new(&ArgoClientConfig {
            base_url: format!("{}/", server.uri()),
            namespace: "phoenix".to_string(),
            token: token.map(str::to_string),
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_query_returns_phase() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/workflows/phoenix/run-abc"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "metadata": { "name": "run-abc", "uid": "wf-1" },
                "status": { "phase": "Succeeded" }
            })))
            .mount(&server)
            .await;

        let client = client_for(&server, Some("secret"));
        let phase = client.query("wf-1", "run-abc").await.unwrap();

        assert_eq!(phase, "Succeeded");
    }

    #[tokio::test]
    async fn test_missing_phase_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/workflows/phoenix/run-new"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "metadata": { "name": "run-new" }
            })))
            .mount(&server)
            .await;

        let phase = client_for(&server, None).query("wf-2", "run-new").await.unwrap();
        assert_eq!(phase, "");
    }

    #[tokio::test]
    async fn test_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = client_for(&server, None)
            .query("wf-3", "gone")
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowStatusError::WorkflowNotFound(ref name) if name == "gone"));
    }

    #[tokio::test]
    async fn test_server_error_is_propagated() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .mount(&server)
            .await;

        let err = client_for(&server, None)
            .query("wf-4", "busy")
            .await
            .unwrap_err();
        match err {
            WorkflowStatusError::Api { status, message } => {
                assert_eq!(status, 503);
                assert_eq!(message, "unavailable");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
