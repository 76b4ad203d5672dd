//! RcaReporter - root-cause-analysis レポート
//!
//! 1 タスクにつき 1 レポート。既に保存済みなら report writer を呼ばずにそのまま返す。

use std::sync::Arc;

use tracing::{info, warn};

use crate::app::locks::KeyedLocks;
use crate::app::retry::RetryPolicy;
use crate::domain::{DomainEvent, ManagerError, Report, ReportSummary, Step, TaskId};
use crate::impls::NoopEventSink;
use crate::ports::{Clock, EventSink, ReportRequest, ReportWriter, Stores, SystemClock};

/// Stands in for a step that recorded no log.
pub const MISSING_STEP_LOG: &str = "No log";

/// Formatting guidance handed to the report writer.
pub const REPORT_GUIDANCE: &str = "Write a concise root cause analysis in markdown with the \
sections \"## Summary\", \"## Root Cause\" and \"## Resolution / Outcome\". Base it only on \
the goal and the step log provided.";

/// `[status] description: log` for one step.
pub fn step_log_line(step: &Step) -> String {
    format!(
        "[{}] {}: {}",
        step.status,
        step.description,
        step.log.as_deref().unwrap_or(MISSING_STEP_LOG)
    )
}

#[derive(Clone)]
pub struct RcaReporter {
    stores: Stores,
    writer: Arc<dyn ReportWriter>,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventSink>,
    retry: RetryPolicy,
    locks: KeyedLocks,
}

impl RcaReporter {
    pub fn new(stores: Stores, writer: Arc<dyn ReportWriter>) -> Self {
        Self {
            stores,
            writer,
            clock: Arc::new(SystemClock),
            events: Arc::new(NoopEventSink),
            retry: RetryPolicy::default(),
            locks: KeyedLocks::new(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Return the stored report for `task_id`, writing it first if there is none.
    pub async fn generate_report(&self, task_id: TaskId) -> Result<Report, ManagerError> {
        let _guard = self.locks.lock(task_id).await;

        if let Some(existing) = self.report(task_id).await? {
            return Ok(existing);
        }

        let tasks = &self.stores.tasks;
        let task = self
            .retry
            .run("get_task", || tasks.get(task_id))
            .await?
            .ok_or(ManagerError::TaskNotFound(task_id))?;
        if !task.status.is_terminal() {
            warn!(task_id = %task_id, status = %task.status, "reporting on an unfinished task");
        }

        let request = ReportRequest {
            goal: task.goal.clone(),
            logs: task.steps.iter().map(step_log_line).collect(),
            guidance: REPORT_GUIDANCE.to_string(),
        };
        let body = self.writer.write_report(&request).await.map_err(|e| {
            warn!(task_id = %task_id, error = %e, "report writer failed");
            e
        })?;

        let report = Report::new(task_id, body, self.clock.now());
        let reports = &self.stores.reports;
        let stored = self
            .retry
            .run("create_report", || reports.create(report.clone()))
            .await?;

        info!(task_id = %task_id, chars = stored.report.chars().count(), "report generated");
        self.events.emit(DomainEvent::ReportGenerated { task_id });
        Ok(stored)
    }

    /// The stored report, if any. Never calls the writer.
    pub async fn report(&self, task_id: TaskId) -> Result<Option<Report>, ManagerError> {
        let reports = &self.stores.reports;
        Ok(self
            .retry
            .run("get_report", || reports.get(task_id))
            .await?)
    }

    /// Short preview of the stored report, if any.
    pub async fn summary(&self, task_id: TaskId) -> Result<Option<ReportSummary>, ManagerError> {
        Ok(self.report(task_id).await?.map(|r| r.summary()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ErrorKind, StepStatus, Task, TaskOrigin, TaskPatch, TaskStatus};
    use crate::impls::InMemoryStore;
    use crate::ports::TaskStore;
    use crate::testing::FakeServices;
    use chrono::Utc;
    use std::sync::atomic::Ordering;
    use ulid::Ulid;

    async fn seed(store: &InMemoryStore) -> Task {
        let task = Task::new(
            TaskId::from_ulid(Ulid::new()),
            "Patch all production servers",
            ["drain".to_string(), "patch".to_string(), "restore".to_string()],
            TaskStatus::InProgress,
            Utc::now(),
            TaskOrigin::User,
        );
        TaskStore::create(store, task.clone()).await.unwrap();
        for patch in [
            TaskPatch::new().step(0, StepStatus::InProgress, None),
            TaskPatch::new()
                .step(0, StepStatus::Completed, Some("Step 1 completed successfully.".into()))
                .progress(33),
            TaskPatch::new().step(1, StepStatus::InProgress, None),
            TaskPatch::new()
                .step(1, StepStatus::Failed, Some("Step 2 failed due to a simulated error.".into()))
                .status(TaskStatus::Failed),
        ] {
            store.update(task.id, patch).await.unwrap();
        }
        TaskStore::get(store, task.id).await.unwrap().unwrap()
    }

    fn reporter(fake: FakeServices, store: &InMemoryStore) -> (RcaReporter, Arc<FakeServices>) {
        let (fake, services) = fake.into_services();
        let reporter = RcaReporter::new(
            Stores::from_backend(Arc::new(store.clone())),
            services.report_writer,
        );
        (reporter, fake)
    }

    #[test]
    fn log_lines_use_placeholder_for_missing_logs() {
        let mut step = Step::pending("verify");
        assert_eq!(step_log_line(&step), "[pending] verify: No log");

        step.status = StepStatus::Failed;
        step.log = Some("disk full".into());
        assert_eq!(step_log_line(&step), "[failed] verify: disk full");
    }

    #[tokio::test]
    async fn second_call_returns_stored_report_without_writing() {
        let store = InMemoryStore::new();
        let task = seed(&store).await;
        let (reporter, fake) = reporter(FakeServices::default(), &store);

        let first = reporter.generate_report(task.id).await.unwrap();
        let second = reporter.generate_report(task.id).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(fake.write_calls.load(Ordering::SeqCst), 1);
        assert!(first.report.contains("[completed] drain: Step 1 completed successfully."));
        assert!(first.report.contains("[failed] patch: Step 2 failed due to a simulated error."));
        assert!(first.report.contains("[pending] restore: No log"));
    }

    #[tokio::test]
    async fn concurrent_calls_write_once() {
        let store = InMemoryStore::new();
        let task = seed(&store).await;
        let (reporter, fake) = reporter(FakeServices::default(), &store);

        let (a, b) = tokio::join!(
            reporter.generate_report(task.id),
            reporter.generate_report(task.id)
        );
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(fake.write_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_task_is_not_found() {
        let store = InMemoryStore::new();
        let (reporter, fake) = reporter(FakeServices::default(), &store);

        let err = reporter
            .generate_report(TaskId::from_ulid(Ulid::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, ManagerError::TaskNotFound(_)));
        assert_eq!(err.kind(), ErrorKind::Precondition);
        assert_eq!(fake.write_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn writer_failure_stores_nothing() {
        let store = InMemoryStore::new();
        let task = seed(&store).await;
        let (reporter, _fake) = reporter(
            FakeServices {
                fail_writer: true,
                ..FakeServices::default()
            },
            &store,
        );

        let err = reporter.generate_report(task.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Generation);
        assert!(reporter.report(task.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn summary_previews_stored_report() {
        let store = InMemoryStore::new();
        let task = seed(&store).await;
        let (reporter, _fake) = reporter(FakeServices::default(), &store);

        assert!(reporter.summary(task.id).await.unwrap().is_none());
        reporter.generate_report(task.id).await.unwrap();

        let summary = reporter.summary(task.id).await.unwrap().unwrap();
        assert_eq!(summary.task_id, task.id);
        assert!(summary.summary.starts_with("## Summary"));
    }
}
