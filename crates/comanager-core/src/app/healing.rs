//! SelfHealingCoordinator - 失敗したタスクの再試行
//!
//! retry は古いタスクを再開しない。self-healing service から修正済みの goal を
//! もらい、新しいタスクとして create する。新タスクの作成に成功した後でだけ、
//! 元のタスクを superseded にする。

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::app::engine::TaskEngine;
use crate::app::locks::KeyedLocks;
use crate::domain::{DomainEvent, ManagerError, Task, TaskId, TaskOrigin, TaskPatch, TaskStatus};
use crate::ports::{HealingRequest, SelfHealingService};

/// Sent to the self-healing service when the failed step recorded no log.
pub const MISSING_FAILURE_LOG: &str = "No log available for the failure.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryOutcome {
    /// The failed task, now superseded.
    pub original: Task,
    /// The freshly created replacement.
    pub replacement: Task,
}

#[derive(Clone)]
pub struct SelfHealingCoordinator {
    engine: TaskEngine,
    healer: Arc<dyn SelfHealingService>,
    locks: KeyedLocks,
}

impl SelfHealingCoordinator {
    pub fn new(engine: TaskEngine, healer: Arc<dyn SelfHealingService>) -> Self {
        Self {
            engine,
            healer,
            locks: KeyedLocks::new(),
        }
    }

    pub async fn retry(&self, id: TaskId) -> Result<RetryOutcome, ManagerError> {
        let _guard = self.locks.lock(id).await;

        let task = self
            .engine
            .get(id)
            .await?
            .ok_or(ManagerError::TaskNotFound(id))?;
        if let Some(replacement) = task.superseded_by {
            return Err(ManagerError::precondition(format!(
                "task {id} was already superseded by {replacement}"
            )));
        }
        let Some((index, step)) = task.first_failed_step() else {
            return Err(ManagerError::precondition(format!(
                "task {id} has no failed step"
            )));
        };
        if task.status != TaskStatus::Failed {
            return Err(ManagerError::precondition(format!(
                "task {id} is {}, not failed",
                task.status
            )));
        }

        let request = HealingRequest {
            goal: task.goal.clone(),
            failure_log: step
                .log
                .clone()
                .unwrap_or_else(|| MISSING_FAILURE_LOG.to_string()),
        };
        info!(task_id = %id, failed_step = index + 1, "requesting corrected goal");
        let response = self.healer.heal(&request).await?;

        let replacement = self
            .engine
            .create_with_origin(&response.goal, TaskOrigin::SelfHealing { supersedes: id })
            .await?;

        let patch = TaskPatch::new()
            .expect_status(TaskStatus::Failed)
            .status(TaskStatus::Superseded)
            .superseded_by(replacement.id);
        let original = self
            .engine
            .update(id, patch, "supersede_task")
            .await
            .map_err(|e| {
                error!(
                    task_id = %id,
                    replacement = %replacement.id,
                    error = %e,
                    "replacement created but original could not be superseded"
                );
                e
            })?;

        info!(task_id = %id, replacement = %replacement.id, "task superseded");
        self.engine.events().emit(DomainEvent::TaskSuperseded {
            task_id: id,
            replacement: replacement.id,
        });

        Ok(RetryOutcome {
            original,
            replacement,
        })
    }
}
