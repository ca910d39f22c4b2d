use thiserror::Error;

use crate::workflow::WorkflowStatusError;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Mismatch: {0}")]
    Mismatch(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Database error: {0}")]
    Database(db::DbError),

    #[error("Workflow status error: {0}")]
    WorkflowStatus(#[from] WorkflowStatusError),
}

impl OrchestratorError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn run_template_not_found(run_template_id: &str, solution_id: &str) -> Self {
        Self::Configuration(format!(
            "Run template {} not found in solution {}",
            run_template_id, solution_id
        ))
    }
}

impl From<db::DbError> for OrchestratorError {
    fn from(err: db::DbError) -> Self {
        if err.is_not_found() {
            Self::NotFound(err.to_string())
        } else {
            Self::Database(err)
        }
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
