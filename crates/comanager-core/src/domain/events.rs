//! Events - ドメインイベント
//!
//! Published through `ports::EventSink` after the corresponding store write.

use serde::{Deserialize, Serialize};

use super::ids::TaskId;
use super::outcome::OutcomeKind;
use super::state::TaskStatus;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    TaskCreated {
        task_id: TaskId,
        steps: usize,
    },
    StepFinished {
        task_id: TaskId,
        index: usize,
        outcome: OutcomeKind,
        progress: u8,
    },
    TaskFinished {
        task_id: TaskId,
        status: TaskStatus,
    },
    TaskSuperseded {
        task_id: TaskId,
        replacement: TaskId,
    },
    ReportGenerated {
        task_id: TaskId,
    },
}

impl DomainEvent {
    pub fn task_id(&self) -> TaskId {
        match self {
            DomainEvent::TaskCreated { task_id, .. }
            | DomainEvent::StepFinished { task_id, .. }
            | DomainEvent::TaskFinished { task_id, .. }
            | DomainEvent::TaskSuperseded { task_id, .. }
            | DomainEvent::ReportGenerated { task_id } => *task_id,
        }
    }
}
