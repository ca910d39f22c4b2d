//! Best-effort fan-out of independent record updates.
//!
//! Each task runs on its own tokio task. A failing task never cancels or rolls back
//! its siblings; failures are logged where they happen and, when the caller waits,
//! collected into a [`FanOutReport`].

use std::future::Future;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
    /// Identifier of the record the task was writing.
    pub target: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanOutReport {
    pub dispatched: usize,
    pub succeeded: usize,
    pub failures: Vec<TaskFailure>,
}

impl FanOutReport {
    pub fn is_complete_success(&self) -> bool {
        self.failures.is_empty() && self.succeeded == self.dispatched
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FanOutOutcome {
    /// The caller waited; every task has finished.
    Completed(FanOutReport),
    /// Tasks were left running; their completion is not observable.
    Detached { dispatched: usize },
    /// The targets could not be listed, so nothing was dispatched.
    Skipped { reason: String },
}

impl FanOutOutcome {
    pub fn dispatched(&self) -> usize {
        match self {
            Self::Completed(report) => report.dispatched,
            Self::Detached { dispatched } => *dispatched,
            Self::Skipped { .. } => 0,
        }
    }

    pub fn report(&self) -> Option<&FanOutReport> {
        match self {
            Self::Completed(report) => Some(report),
            Self::Detached { .. } | Self::Skipped { .. } => None,
        }
    }
}

pub struct FanOut;

impl FanOut {
    /// Spawn one task per `(target, future)` pair. With `wait` the call returns once
    /// all of them have finished; otherwise it returns immediately.
    pub async fn dispatch<F>(
        operation: &'static str,
        tasks: Vec<(String, F)>,
        wait: bool,
    ) -> FanOutOutcome
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let dispatched = tasks.len();
        let mut targets = Vec::with_capacity(dispatched);
        let mut handles: Vec<JoinHandle<Result<()>>> = Vec::with_capacity(dispatched);

        for (target, task) in tasks {
            let log_target = target.clone();
            handles.push(tokio::spawn(async move {
                let result = task.await;
                if let Err(ref e) = result {
                    warn!(operation, target = %log_target, error = %e, "Fan-out task failed");
                }
                result
            }));
            targets.push(target);
        }

        if !wait {
            debug!(operation, dispatched, "Fan-out dispatched without waiting");
            return FanOutOutcome::Detached { dispatched };
        }

        let results = futures::future::join_all(handles).await;
        let mut report = FanOutReport {
            dispatched,
            ..Default::default()
        };
        for (target, result) in targets.into_iter().zip(results) {
            match result {
                Ok(Ok(())) => report.succeeded += 1,
                Ok(Err(e)) => report.failures.push(TaskFailure {
                    target,
                    reason: e.to_string(),
                }),
                Err(join_error) => {
                    warn!(operation, target = %target, error = %join_error, "Fan-out task aborted");
                    report.failures.push(TaskFailure {
                        target,
                        reason: join_error.to_string(),
                    });
                }
            }
        }

        info!(
            operation,
            dispatched,
            succeeded = report.succeeded,
            failed = report.failures.len(),
            "Fan-out completed"
        );
        FanOutOutcome::Completed(report)
    }
}
