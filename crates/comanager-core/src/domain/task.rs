//! Task document: goal, ordered steps, derived progress.
//!
//! Design:
//! - `Task` is the single source of truth for a task's state.
//! - All mutation goes through `TaskPatch` + `Task::apply_patch`, which validates the
//!   whole patch on a copy and commits atomically. Stores call it under their own
//!   lock, so every backend enforces the same rules.
//! - Steps are addressed by index. The steps array is never rewritten wholesale.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::TaskId;
use super::state::{StepStatus, TaskStatus};

/// Classification tag of a step. The core never interprets it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "kind", content = "name")]
pub enum StepAction {
    #[default]
    Unknown,
    Named(String),
}

/// One ordered unit of a task's plan. Owned by its task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub description: String,
    pub status: StepStatus,
    #[serde(default)]
    pub action: StepAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<String>,
}

impl Step {
    pub fn pending(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            status: StepStatus::Pending,
            action: StepAction::Unknown,
            log: None,
        }
    }
}

/// Where a task came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "kind")]
pub enum TaskOrigin {
    #[default]
    User,
    Alert {
        title: String,
    },
    SelfHealing {
        supersedes: TaskId,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub goal: String,
    pub status: TaskStatus,
    pub steps: Vec<Step>,
    pub progress: u8,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub origin: TaskOrigin,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub superseded_by: Option<TaskId>,
    /// Incremented on every applied patch.
    #[serde(default)]
    pub version: u64,
}

/// Round-half-up of `100 * completed / total`, in integer arithmetic.
///
/// Only a fully completed plan reaches 100; anything short of that caps at 99.
pub fn progress_for(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let completed = completed.min(total);
    let rounded = ((completed * 200 + total) / (total * 2)) as u8;
    if completed < total {
        rounded.min(99)
    } else {
        rounded
    }
}

impl Task {
    pub fn new(
        id: TaskId,
        goal: impl Into<String>,
        descriptions: impl IntoIterator<Item = String>,
        status: TaskStatus,
        created_at: DateTime<Utc>,
        origin: TaskOrigin,
    ) -> Self {
        Self {
            id,
            goal: goal.into(),
            status,
            steps: descriptions.into_iter().map(Step::pending).collect(),
            progress: 0,
            created_at,
            origin,
            superseded_by: None,
            version: 0,
        }
    }

    pub fn completed_steps(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .count()
    }

    pub fn first_failed_step(&self) -> Option<(usize, &Step)> {
        self.steps
            .iter()
            .enumerate()
            .find(|(_, s)| s.status == StepStatus::Failed)
    }

    /// Index of the next step execution would attempt, if any.
    pub fn next_pending_step(&self) -> Option<usize> {
        if self.first_failed_step().is_some() {
            return None;
        }
        self.steps
            .iter()
            .position(|s| s.status != StepStatus::Completed)
    }

    fn execution_started(&self) -> bool {
        self.status != TaskStatus::Pending
            || self.steps.iter().any(|s| s.status != StepStatus::Pending)
    }

    /// Validate `patch` and apply it atomically; on error `self` is untouched.
    pub fn apply_patch(&mut self, patch: &TaskPatch) -> Result<(), PatchError> {
        if let Some(expected) = patch.expect_status
            && self.status != expected
        {
            return Err(PatchError::StatusMismatch {
                expected,
                found: self.status,
            });
        }

        let mut next = self.clone();

        for update in &patch.steps {
            let total = next.steps.len();
            let step = next
                .steps
                .get_mut(update.index)
                .ok_or(PatchError::StepOutOfRange {
                    index: update.index,
                    total,
                })?;
            if step.status != update.status {
                if !step.status.can_become(update.status) {
                    return Err(PatchError::IllegalStep {
                        index: update.index,
                        from: step.status,
                        to: update.status,
                    });
                }
                step.status = update.status;
            }
            if let Some(log) = &update.log {
                step.log = Some(log.clone());
            }
        }

        if let Some(status) = patch.status
            && status != next.status
        {
            if !next.status.can_become(status) {
                return Err(PatchError::IllegalStatus {
                    from: next.status,
                    to: status,
                });
            }
            next.status = status;
        }

        if let Some(progress) = patch.progress {
            if progress > 100 {
                return Err(PatchError::ProgressOutOfRange(progress));
            }
            if next.status == TaskStatus::InProgress && progress < self.progress {
                return Err(PatchError::ProgressRegressed {
                    from: self.progress,
                    to: progress,
                });
            }
            next.progress = progress;
        }

        if let Some(replacement) = patch.superseded_by {
            next.superseded_by = Some(replacement);
        }

        next.check_invariants()?;
        next.version = self.version + 1;
        *self = next;
        Ok(())
    }

    /// Check the step-ordering and progress invariants.
    pub fn check_invariants(&self) -> Result<(), PatchError> {
        let active = self
            .steps
            .iter()
            .filter(|s| s.status == StepStatus::InProgress)
            .count();
        if active > 1 {
            return Err(PatchError::Invariant(format!(
                "{active} steps are in-progress"
            )));
        }

        // Everything before the first non-completed step is completed, and
        // nothing after it has left pending.
        if let Some(frontier) = self
            .steps
            .iter()
            .position(|s| s.status != StepStatus::Completed)
            && let Some(offset) = self.steps[frontier + 1..]
                .iter()
                .position(|s| s.status != StepStatus::Pending)
        {
            return Err(PatchError::Invariant(format!(
                "step {} moved before step {frontier} finished",
                frontier + 1 + offset
            )));
        }

        if self.execution_started() {
            let expected = progress_for(self.completed_steps(), self.steps.len());
            if self.progress != expected {
                return Err(PatchError::Invariant(format!(
                    "progress is {} but {} of {} steps are completed",
                    self.progress,
                    self.completed_steps(),
                    self.steps.len()
                )));
            }
        }

        if (self.progress == 100) != (self.status == TaskStatus::Completed)
            && self.execution_started()
            && !self.steps.is_empty()
        {
            return Err(PatchError::Invariant(format!(
                "progress {} does not match status {}",
                self.progress, self.status
            )));
        }

        Ok(())
    }
}

/// A change to a single step, addressed by index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepUpdate {
    pub index: usize,
    pub status: StepStatus,
    pub log: Option<String>,
}

/// Partial update of a task document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskPatch {
    /// Check-and-set guard: reject the patch unless the task is in this status.
    pub expect_status: Option<TaskStatus>,
    pub status: Option<TaskStatus>,
    pub progress: Option<u8>,
    pub steps: Vec<StepUpdate>,
    pub superseded_by: Option<TaskId>,
}

impl TaskPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expect_status(mut self, status: TaskStatus) -> Self {
        self.expect_status = Some(status);
        self
    }

    pub fn status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn step(mut self, index: usize, status: StepStatus, log: Option<String>) -> Self {
        self.steps.push(StepUpdate { index, status, log });
        self
    }

    pub fn superseded_by(mut self, replacement: TaskId) -> Self {
        self.superseded_by = Some(replacement);
        self
    }
}

/// A patch that would break the task's state machine or invariants.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatchError {
    #[error("expected status {expected}, found {found}")]
    StatusMismatch {
        expected: TaskStatus,
        found: TaskStatus,
    },

    #[error("illegal status change {from} -> {to}")]
    IllegalStatus { from: TaskStatus, to: TaskStatus },

    #[error("illegal change of step {index}: {from} -> {to}")]
    IllegalStep {
        index: usize,
        from: StepStatus,
        to: StepStatus,
    },

    #[error("step index {index} out of range ({total} steps)")]
    StepOutOfRange { index: usize, total: usize },

    #[error("progress {0} is out of range")]
    ProgressOutOfRange(u8),

    #[error("progress cannot go from {from} back to {to}")]
    ProgressRegressed { from: u8, to: u8 },

    #[error("invariant violated: {0}")]
    Invariant(String),
}
