//! StepExecutor port - ステップの実行
//!
//! The engine hands one step at a time to the executor. The signature is
//! infallible: whatever happens, the executor reports exactly one terminal
//! outcome with a log line, so a step is never left in-progress by the executor.

use async_trait::async_trait;

use crate::domain::{StepOutcome, TaskId};

/// What the executor knows about the step it runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepContext {
    pub task_id: TaskId,
    pub goal: String,
    pub index: usize,
    pub total: usize,
    pub description: String,
}

impl StepContext {
    /// 1-based position, as shown in logs.
    pub fn number(&self) -> usize {
        self.index + 1
    }
}

#[async_trait]
pub trait StepExecutor: Send + Sync {
    async fn execute(&self, step: &StepContext) -> StepOutcome;
}
