//! Errors - エラー型と分類
//!
//! - `StoreError`: persistence failures (task / report / step-log stores)
//! - `ServiceError`: failures of the external generation services
//! - `ManagerError`: what a top-level operation returns to its caller
//!
//! Step failures are not errors: they are a normal outcome recorded on the task.

use thiserror::Error;

use super::ids::TaskId;
use super::task::PatchError;

/// ErrorKind は呼び出し側に見せる分類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A plan / resolution / self-healing / report / console service failed.
    Generation,
    /// The request does not apply to the current state (no failed step, unknown task, ...).
    Precondition,
    /// The store failed or rejected a write.
    Store,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("task {0} not found")]
    TaskNotFound(TaskId),

    #[error("task {0} already exists")]
    AlreadyExists(TaskId),

    #[error("update of {task_id} rejected: {source}")]
    Rejected {
        task_id: TaskId,
        #[source]
        source: PatchError,
    },

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt document: {0}")]
    Corrupt(#[from] serde_json::Error),
}

impl StoreError {
    /// Worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Io(_))
    }
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{service} failed: {message}")]
    Failed {
        service: &'static str,
        message: String,
    },

    #[error("{service} returned an unusable response: {message}")]
    InvalidResponse {
        service: &'static str,
        message: String,
    },
}

impl ServiceError {
    pub fn failed(service: &'static str, message: impl Into<String>) -> Self {
        ServiceError::Failed {
            service,
            message: message.into(),
        }
    }

    pub fn invalid(service: &'static str, message: impl Into<String>) -> Self {
        ServiceError::InvalidResponse {
            service,
            message: message.into(),
        }
    }
}

/// Error of a top-level operation.
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("generation failed: {0}")]
    Generation(#[from] ServiceError),

    #[error("task {0} not found")]
    TaskNotFound(TaskId),

    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for ManagerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::TaskNotFound(id) => ManagerError::TaskNotFound(id),
            other => ManagerError::Store(other),
        }
    }
}

impl ManagerError {
    pub fn precondition(message: impl Into<String>) -> Self {
        ManagerError::Precondition(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ManagerError::Generation(_) => ErrorKind::Generation,
            ManagerError::TaskNotFound(_) | ManagerError::Precondition(_) => {
                ErrorKind::Precondition
            }
            ManagerError::Store(StoreError::Rejected {
                source: PatchError::StatusMismatch { .. },
                ..
            }) => ErrorKind::Precondition,
            ManagerError::Store(_) => ErrorKind::Store,
        }
    }

    /// Short generic message for end users. Details belong in the logs.
    pub fn user_message(&self) -> &'static str {
        match self {
            ManagerError::TaskNotFound(_) => "Task not found.",
            ManagerError::Precondition(_) => "The request does not apply to this task.",
            ManagerError::Generation(_) => "The assistant could not complete the request.",
            ManagerError::Store(_) => "Could not save or load task data.",
        }
    }
}
