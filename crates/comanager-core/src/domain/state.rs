//! Task and step state machines.
//!
//! State transitions (task):
//! - Pending -> InProgress (Start)
//! - InProgress -> Completed (Complete)
//! - InProgress -> Failed (Fail)
//! - Failed -> Superseded (Supersede)
//!
//! State transitions (step):
//! - Pending -> InProgress (Start)
//! - InProgress -> Completed | Failed
//!
//! Every status change goes through `apply`, so an illegal transition is an
//! error value instead of a silently written string.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Task status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    /// Persisted, execution deferred until `start`.
    Pending,

    /// Steps are being executed.
    InProgress,

    /// All steps completed.
    Completed,

    /// A step failed; later steps were never attempted.
    Failed,

    /// Replaced by a self-healing task.
    Superseded,
}

/// Events that move a task between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskTransition {
    Start,
    Complete,
    Fail,
    Supersede,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 5] = [
        TaskStatus::Pending,
        TaskStatus::InProgress,
        TaskStatus::Completed,
        TaskStatus::Failed,
        TaskStatus::Superseded,
    ];

    pub fn apply(self, transition: TaskTransition) -> Result<TaskStatus, TransitionError> {
        match (self, transition) {
            (TaskStatus::Pending, TaskTransition::Start) => Ok(TaskStatus::InProgress),
            (TaskStatus::InProgress, TaskTransition::Complete) => Ok(TaskStatus::Completed),
            (TaskStatus::InProgress, TaskTransition::Fail) => Ok(TaskStatus::Failed),
            (TaskStatus::Failed, TaskTransition::Supersede) => Ok(TaskStatus::Superseded),
            (from, transition) => Err(TransitionError::Task { from, transition }),
        }
    }

    /// Whether `next` is reachable from `self` in exactly one transition.
    pub fn can_become(self, next: TaskStatus) -> bool {
        [
            TaskTransition::Start,
            TaskTransition::Complete,
            TaskTransition::Fail,
            TaskTransition::Supersede,
        ]
        .into_iter()
        .any(|t| self.apply(t) == Ok(next))
    }

    /// The engine never moves a task out of these states on its own.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Superseded
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in-progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Superseded => "superseded",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown task status '{s}'"))
    }
}

/// Step status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepTransition {
    Start,
    Complete,
    Fail,
}

impl StepStatus {
    pub fn apply(self, transition: StepTransition) -> Result<StepStatus, TransitionError> {
        match (self, transition) {
            (StepStatus::Pending, StepTransition::Start) => Ok(StepStatus::InProgress),
            (StepStatus::InProgress, StepTransition::Complete) => Ok(StepStatus::Completed),
            (StepStatus::InProgress, StepTransition::Fail) => Ok(StepStatus::Failed),
            (from, transition) => Err(TransitionError::Step { from, transition }),
        }
    }

    pub fn can_become(self, next: StepStatus) -> bool {
        [
            StepTransition::Start,
            StepTransition::Complete,
            StepTransition::Fail,
        ]
        .into_iter()
        .any(|t| self.apply(t) == Ok(next))
    }

    /// Completed or failed: the step has its one outcome.
    pub fn is_terminal(self) -> bool {
        matches!(self, StepStatus::Completed | StepStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::InProgress => "in-progress",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// An illegal state change.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("task cannot {transition:?} from {from}")]
    Task {
        from: TaskStatus,
        transition: TaskTransition,
    },

    #[error("step cannot {transition:?} from {from}")]
    Step {
        from: StepStatus,
        transition: StepTransition,
    },
}
