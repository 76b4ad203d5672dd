//! In-memory document store implementing all three store ports.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{Report, StepStatus, StoreError, Task, TaskId, TaskPatch, TaskStatus};
use crate::ports::{ReportStore, StepLogLine, StepLogStore, TaskStore};

/// In-memory store state.
#[derive(Default)]
struct InMemoryState {
    /// All task documents (single source of truth for tasks).
    tasks: HashMap<TaskId, Task>,

    /// One report per task.
    reports: HashMap<TaskId, Report>,

    /// Append history of step log lines.
    logs: HashMap<TaskId, Vec<StepLogLine>>,
}

impl InMemoryState {
    fn sorted(&self, filter: impl Fn(&Task) -> bool) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.tasks.values().filter(|t| filter(t)).cloned().collect();
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        tasks
    }
}

/// In-memory store. Cheap to clone; clones share state.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<InMemoryState>>,
    /// Number of upcoming operations that fail with `Unavailable`.
    failures: Arc<AtomicUsize>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` operations fail with a transient error.
    #[cfg(test)]
    pub(crate) fn fail_next(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        let injected = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match injected {
            Ok(_) => Err(StoreError::Unavailable("injected failure".into())),
            Err(_) => Ok(()),
        }
    }
}

#[async_trait]
impl TaskStore for InMemoryStore {
    async fn get(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
        self.check_available()?;
        let state = self.state.lock().await;
        Ok(state.tasks.get(&id).cloned())
    }

    async fn create(&self, task: Task) -> Result<(), StoreError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        match state.tasks.entry(task.id) {
            Entry::Occupied(_) => Err(StoreError::AlreadyExists(task.id)),
            Entry::Vacant(slot) => {
                slot.insert(task);
                Ok(())
            }
        }
    }

    async fn update(&self, id: TaskId, patch: TaskPatch) -> Result<Task, StoreError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        let task = state
            .tasks
            .get_mut(&id)
            .ok_or(StoreError::TaskNotFound(id))?;
        task.apply_patch(&patch)
            .map_err(|source| StoreError::Rejected {
                task_id: id,
                source,
            })?;
        Ok(task.clone())
    }

    async fn query_by_status(&self, status: TaskStatus) -> Result<Vec<Task>, StoreError> {
        self.check_available()?;
        let state = self.state.lock().await;
        Ok(state.sorted(|t| t.status == status))
    }

    async fn list(&self) -> Result<Vec<Task>, StoreError> {
        self.check_available()?;
        let state = self.state.lock().await;
        Ok(state.sorted(|_| true))
    }
}

#[async_trait]
impl ReportStore for InMemoryStore {
    async fn get(&self, task_id: TaskId) -> Result<Option<Report>, StoreError> {
        self.check_available()?;
        let state = self.state.lock().await;
        Ok(state.reports.get(&task_id).cloned())
    }

    async fn create(&self, report: Report) -> Result<Report, StoreError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        Ok(state.reports.entry(report.task_id).or_insert(report).clone())
    }
}

#[async_trait]
impl StepLogStore for InMemoryStore {
    async fn append(
        &self,
        task_id: TaskId,
        step_index: usize,
        text: &str,
    ) -> Result<(), StoreError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        if let Some(task) = state.tasks.get_mut(&task_id)
            && let Some(step) = task.steps.get_mut(step_index)
            && step.status != StepStatus::Pending
        {
            step.log = Some(text.to_string());
            task.version += 1;
        }
        state.logs.entry(task_id).or_default().push(StepLogLine {
            step_index,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn lines(&self, task_id: TaskId) -> Result<Vec<StepLogLine>, StoreError> {
        self.check_available()?;
        let state = self.state.lock().await;
        Ok(state.logs.get(&task_id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PatchError, TaskOrigin};
    use chrono::{Duration, Utc};
    use ulid::Ulid;

    fn task(steps: usize) -> Task {
        Task::new(
            TaskId::from_ulid(Ulid::new()),
            "Rotate TLS certificates",
            (1..=steps).map(|i| format!("step {i}")),
            TaskStatus::InProgress,
            Utc::now(),
            TaskOrigin::User,
        )
    }

    #[tokio::test]
    async fn create_then_get() {
        let store = InMemoryStore::new();
        let t = task(2);
        TaskStore::create(&store, t.clone()).await.unwrap();

        let loaded = TaskStore::get(&store, t.id).await.unwrap();
        assert_eq!(loaded, Some(t));
    }

    #[tokio::test]
    async fn get_missing_is_none() {
        let store = InMemoryStore::new();
        let missing = TaskStore::get(&store, TaskId::from_ulid(Ulid::new()))
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn duplicate_create_is_rejected() {
        let store = InMemoryStore::new();
        let t = task(1);
        TaskStore::create(&store, t.clone()).await.unwrap();

        let err = TaskStore::create(&store, t.clone()).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(id) if id == t.id));
    }

    #[tokio::test]
    async fn update_applies_patch_and_returns_snapshot() {
        let store = InMemoryStore::new();
        let t = task(2);
        TaskStore::create(&store, t.clone()).await.unwrap();

        let updated = store
            .update(t.id, TaskPatch::new().step(0, StepStatus::InProgress, None))
            .await
            .unwrap();
        assert_eq!(updated.steps[0].status, StepStatus::InProgress);
        assert_eq!(updated.version, 1);
    }

    #[tokio::test]
    async fn rejected_update_leaves_document_alone() {
        let store = InMemoryStore::new();
        let t = task(2);
        TaskStore::create(&store, t.clone()).await.unwrap();

        let err = store
            .update(t.id, TaskPatch::new().status(TaskStatus::Superseded))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Rejected {
                source: PatchError::IllegalStatus { .. },
                ..
            }
        ));
        assert_eq!(TaskStore::get(&store, t.id).await.unwrap(), Some(t));
    }

    #[tokio::test]
    async fn update_missing_task() {
        let store = InMemoryStore::new();
        let id = TaskId::from_ulid(Ulid::new());
        let err = store.update(id, TaskPatch::new()).await.unwrap_err();
        assert!(matches!(err, StoreError::TaskNotFound(found) if found == id));
    }

    #[tokio::test]
    async fn query_by_status_filters_and_orders() {
        let store = InMemoryStore::new();
        let mut older = task(1);
        older.created_at = Utc::now() - Duration::minutes(5);
        let newer = task(1);
        let mut pending = task(1);
        pending.status = TaskStatus::Pending;

        for t in [newer.clone(), pending.clone(), older.clone()] {
            TaskStore::create(&store, t).await.unwrap();
        }

        let running = store.query_by_status(TaskStatus::InProgress).await.unwrap();
        let ids: Vec<TaskId> = running.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![older.id, newer.id]);

        let all = store.list().await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn report_create_never_overwrites() {
        let store = InMemoryStore::new();
        let id = TaskId::from_ulid(Ulid::new());

        let first = ReportStore::create(&store, Report::new(id, "first", Utc::now()))
            .await
            .unwrap();
        let second = ReportStore::create(&store, Report::new(id, "second", Utc::now()))
            .await
            .unwrap();

        assert_eq!(first.report, "first");
        assert_eq!(second, first);
        assert_eq!(ReportStore::get(&store, id).await.unwrap(), Some(first));
    }

    #[tokio::test]
    async fn append_records_history_and_mirrors_attempted_step() {
        let store = InMemoryStore::new();
        let t = task(2);
        TaskStore::create(&store, t.clone()).await.unwrap();
        store
            .update(t.id, TaskPatch::new().step(0, StepStatus::InProgress, None))
            .await
            .unwrap();
        store
            .update(
                t.id,
                TaskPatch::new()
                    .step(0, StepStatus::Completed, Some("done".into()))
                    .progress(50),
            )
            .await
            .unwrap();

        store.append(t.id, 0, "Step 1 completed successfully.").await.unwrap();
        store.append(t.id, 1, "not attempted yet").await.unwrap();

        let loaded = TaskStore::get(&store, t.id).await.unwrap().unwrap();
        assert_eq!(
            loaded.steps[0].log.as_deref(),
            Some("Step 1 completed successfully.")
        );
        assert_eq!(loaded.steps[1].log, None);
        assert_eq!(loaded.version, 3);

        let lines = store.lines(t.id).await.unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].step_index, 0);
    }

    #[tokio::test]
    async fn injected_failures_are_transient_and_run_out() {
        let store = InMemoryStore::new();
        store.fail_next(2);

        for _ in 0..2 {
            let err = store.list().await.unwrap_err();
            assert!(err.is_transient());
        }
        assert!(store.list().await.unwrap().is_empty());
    }
}
