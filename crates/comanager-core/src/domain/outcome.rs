//! Step outcome: the one terminal result every executed step yields.
//!
//! This module is executor-agnostic: a simulated executor and a real one both
//! report through the same shape.

use serde::{Deserialize, Serialize};

use super::state::StepStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeKind {
    Success,
    Failure,
}

/// Result of executing one step, with the log line recorded for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub kind: OutcomeKind,
    pub log: String,
}

impl StepOutcome {
    pub fn success(log: impl Into<String>) -> Self {
        Self {
            kind: OutcomeKind::Success,
            log: log.into(),
        }
    }

    pub fn failure(log: impl Into<String>) -> Self {
        Self {
            kind: OutcomeKind::Failure,
            log: log.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.kind == OutcomeKind::Success
    }

    /// The terminal step status this outcome maps to.
    pub fn step_status(&self) -> StepStatus {
        match self.kind {
            OutcomeKind::Success => StepStatus::Completed,
            OutcomeKind::Failure => StepStatus::Failed,
        }
    }
}
