//! JSON document store on the local filesystem.
//!
//! Layout under the data directory:
//! - `tasks/<task-id>.json`
//! - `reports/<task-id>.json`
//! - `logs/<task-id>.json` (array of `StepLogLine`)
//!
//! Writes go to a temporary file that is renamed into place. A process-wide
//! mutex serializes read-modify-write cycles; separate processes sharing one
//! directory are not coordinated.

use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::domain::{Report, StepStatus, StoreError, Task, TaskId, TaskPatch, TaskStatus};
use crate::ports::{ReportStore, StepLogLine, StepLogStore, TaskStore};

const TASKS: &str = "tasks";
const REPORTS: &str = "reports";
const LOGS: &str = "logs";

pub struct JsonFileStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Open (and create if needed) a store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        for collection in [TASKS, REPORTS, LOGS] {
            tokio::fs::create_dir_all(root.join(collection)).await?;
        }
        debug!(root = %root.display(), "opened json file store");
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, collection: &str, id: TaskId) -> PathBuf {
        self.root.join(collection).join(format!("{id}.json"))
    }

    async fn read<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>, StoreError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write<T: Serialize>(&self, path: &Path, value: &T) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(value)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    async fn scan_tasks(&self) -> Result<Vec<Task>, StoreError> {
        let mut entries = tokio::fs::read_dir(self.root.join(TASKS)).await?;
        let mut tasks = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            match self.read::<Task>(&path).await {
                Ok(Some(task)) => tasks.push(task),
                Ok(None) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable task document"),
            }
        }
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(tasks)
    }
}

#[async_trait]
impl TaskStore for JsonFileStore {
    async fn get(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
        self.read(&self.path(TASKS, id)).await
    }

    async fn create(&self, task: Task) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let path = self.path(TASKS, task.id);
        if tokio::fs::try_exists(&path).await? {
            return Err(StoreError::AlreadyExists(task.id));
        }
        self.write(&path, &task).await
    }

    async fn update(&self, id: TaskId, patch: TaskPatch) -> Result<Task, StoreError> {
        let _guard = self.write_lock.lock().await;
        let path = self.path(TASKS, id);
        let mut task: Task = self
            .read(&path)
            .await?
            .ok_or(StoreError::TaskNotFound(id))?;
        task.apply_patch(&patch)
            .map_err(|source| StoreError::Rejected {
                task_id: id,
                source,
            })?;
        self.write(&path, &task).await?;
        Ok(task)
    }

    async fn query_by_status(&self, status: TaskStatus) -> Result<Vec<Task>, StoreError> {
        let mut tasks = self.scan_tasks().await?;
        tasks.retain(|t| t.status == status);
        Ok(tasks)
    }

    async fn list(&self) -> Result<Vec<Task>, StoreError> {
        self.scan_tasks().await
    }
}

#[async_trait]
impl ReportStore for JsonFileStore {
    async fn get(&self, task_id: TaskId) -> Result<Option<Report>, StoreError> {
        self.read(&self.path(REPORTS, task_id)).await
    }

    async fn create(&self, report: Report) -> Result<Report, StoreError> {
        let _guard = self.write_lock.lock().await;
        let path = self.path(REPORTS, report.task_id);
        if let Some(existing) = self.read::<Report>(&path).await? {
            return Ok(existing);
        }
        self.write(&path, &report).await?;
        Ok(report)
    }
}

#[async_trait]
impl StepLogStore for JsonFileStore {
    async fn append(
        &self,
        task_id: TaskId,
        step_index: usize,
        text: &str,
    ) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;

        let task_path = self.path(TASKS, task_id);
        if let Some(mut task) = self.read::<Task>(&task_path).await?
            && let Some(step) = task.steps.get_mut(step_index)
            && step.status != StepStatus::Pending
        {
            step.log = Some(text.to_string());
            task.version += 1;
            self.write(&task_path, &task).await?;
        }

        let log_path = self.path(LOGS, task_id);
        let mut lines: Vec<StepLogLine> = self.read(&log_path).await?.unwrap_or_default();
        lines.push(StepLogLine {
            step_index,
            text: text.to_string(),
        });
        self.write(&log_path, &lines).await
    }

    async fn lines(&self, task_id: TaskId) -> Result<Vec<StepLogLine>, StoreError> {
        Ok(self
            .read(&self.path(LOGS, task_id))
            .await?
            .unwrap_or_default())
    }
}
