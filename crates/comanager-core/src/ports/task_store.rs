//! Store ports - task / report / step-log の正本（source of truth）
//!
//! # 設計原則
//! - 更新は部分マージ（`TaskPatch`）。steps 配列を丸ごと書き換える操作は持たない
//! - patch の検証は `Task::apply_patch` に集約し、各実装はロックの下でそれを呼ぶだけ
//! - not-found は `get` ではエラーではなく `None`

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{Report, StoreError, Task, TaskId, TaskPatch, TaskStatus};

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn get(&self, id: TaskId) -> Result<Option<Task>, StoreError>;

    /// Insert a new task. Fails with `AlreadyExists` if the id is taken.
    async fn create(&self, task: Task) -> Result<(), StoreError>;

    /// Apply `patch` atomically and return the updated task.
    async fn update(&self, id: TaskId, patch: TaskPatch) -> Result<Task, StoreError>;

    /// Tasks with the given status, oldest first.
    async fn query_by_status(&self, status: TaskStatus) -> Result<Vec<Task>, StoreError>;

    /// Every task, oldest first.
    async fn list(&self) -> Result<Vec<Task>, StoreError>;
}

#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn get(&self, task_id: TaskId) -> Result<Option<Report>, StoreError>;

    /// Insert `report` unless one already exists for its task; returns the stored report.
    /// An existing report is never overwritten.
    async fn create(&self, report: Report) -> Result<Report, StoreError>;
}

/// One appended log line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepLogLine {
    pub step_index: usize,
    pub text: String,
}

#[async_trait]
pub trait StepLogStore: Send + Sync {
    /// Record `text` for the step at `step_index`. The step's own `log` field is
    /// updated too once that step has been attempted.
    async fn append(&self, task_id: TaskId, step_index: usize, text: &str)
    -> Result<(), StoreError>;

    /// Every line appended for the task, in append order.
    async fn lines(&self, task_id: TaskId) -> Result<Vec<StepLogLine>, StoreError>;
}

/// Store handle passed to the engine, the coordinator and the reporter.
#[derive(Clone)]
pub struct Stores {
    pub tasks: Arc<dyn TaskStore>,
    pub reports: Arc<dyn ReportStore>,
    pub step_logs: Arc<dyn StepLogStore>,
}

impl Stores {
    /// Use one backend for all three collections.
    pub fn from_backend<S>(backend: Arc<S>) -> Self
    where
        S: TaskStore + ReportStore + StepLogStore + 'static,
    {
        Self {
            tasks: backend.clone(),
            reports: backend.clone(),
            step_logs: backend,
        }
    }

    pub fn in_memory() -> Self {
        Self::from_backend(Arc::new(crate::impls::InMemoryStore::new()))
    }
}
