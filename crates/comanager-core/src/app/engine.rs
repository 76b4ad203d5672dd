//! TaskEngine - タスクのライフサイクル
//!
//! create → (start) → execute の流れ:
//! 1. goal を PlanGenerator に渡して steps を得る
//! 2. Task を in-progress（deferred mode では pending）で保存
//! 3. 実行ユニットを detach して spawn（呼び出し元は待たない）
//! 4. 実行ユニットは steps を順番に 1 つずつ実行し、失敗したら止まる
//!
//! 実行中の状態は store の再読込でしか観測できない。

use std::sync::Arc;

use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::app::locks::KeyedLocks;
use crate::app::retry::RetryPolicy;
use crate::domain::{
    DomainEvent, ManagerError, PatchError, ServiceError, StepStatus, StoreError, Task, TaskId,
    TaskOrigin, TaskPatch, TaskStatus, progress_for,
};
use crate::impls::NoopEventSink;
use crate::ports::{
    Clock, EventSink, IdGenerator, PlanGenerator, StepContext, StepExecutor, Stores, SystemClock,
    UlidGenerator,
};

/// Everything the engine needs besides the stores, the planner and the executor.
#[derive(Clone)]
pub struct EngineOptions {
    pub clock: Arc<dyn Clock>,
    pub ids: Arc<dyn IdGenerator>,
    pub events: Arc<dyn EventSink>,
    pub retry: RetryPolicy,
    /// Spawn execution right after creation. Otherwise tasks wait in `pending`.
    pub auto_start: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            clock: Arc::new(SystemClock),
            ids: Arc::new(UlidGenerator::new(SystemClock)),
            events: Arc::new(NoopEventSink),
            retry: RetryPolicy::default(),
            auto_start: true,
        }
    }
}

/// Cheap to clone; clones share the same driver registry.
#[derive(Clone)]
pub struct TaskEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    stores: Stores,
    planner: Arc<dyn PlanGenerator>,
    executor: Arc<dyn StepExecutor>,
    options: EngineOptions,
    drivers: KeyedLocks,
}

/// How one step ended, as far as the loop is concerned.
enum StepResult {
    Continue,
    Finished,
}

impl TaskEngine {
    pub fn new(
        stores: Stores,
        planner: Arc<dyn PlanGenerator>,
        executor: Arc<dyn StepExecutor>,
        options: EngineOptions,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                stores,
                planner,
                executor,
                options,
                drivers: KeyedLocks::new(),
            }),
        }
    }

    pub fn stores(&self) -> &Stores {
        &self.inner.stores
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.inner.options.retry
    }

    pub(crate) fn events(&self) -> &dyn EventSink {
        self.inner.options.events.as_ref()
    }

    /// Plan `goal`, persist the task and start executing it in the background.
    pub async fn create(&self, goal: &str) -> Result<Task, ManagerError> {
        self.create_with_origin(goal, TaskOrigin::User).await
    }

    /// Like [`TaskEngine::create`], recording where the goal came from.
    ///
    /// Nothing is persisted unless planning succeeds with at least one step.
    pub async fn create_with_origin(
        &self,
        goal: &str,
        origin: TaskOrigin,
    ) -> Result<Task, ManagerError> {
        let goal = goal.trim();
        if goal.is_empty() {
            return Err(ManagerError::precondition("goal is empty"));
        }

        let plan = self.inner.planner.plan(goal).await.map_err(|e| {
            warn!(goal, error = %e, "plan generation failed");
            e
        })?;
        if plan.steps.is_empty() {
            warn!(goal, "planner returned no steps");
            return Err(ServiceError::invalid("planner", "plan has no steps").into());
        }

        let opts = &self.inner.options;
        let status = if opts.auto_start {
            TaskStatus::InProgress
        } else {
            TaskStatus::Pending
        };
        let task = Task::new(
            opts.ids.generate_task_id(),
            goal,
            plan.steps.into_iter().map(|s| s.description),
            status,
            opts.clock.now(),
            origin,
        );

        let tasks = &self.inner.stores.tasks;
        opts.retry
            .run("create_task", || tasks.create(task.clone()))
            .await?;

        info!(task_id = %task.id, steps = task.steps.len(), %status, "task created");
        opts.events.emit(DomainEvent::TaskCreated {
            task_id: task.id,
            steps: task.steps.len(),
        });

        if opts.auto_start {
            self.spawn_execution(task.id);
        }
        Ok(task)
    }

    /// Move a `pending` task to `in-progress` and start executing it.
    pub async fn start(&self, id: TaskId) -> Result<Task, ManagerError> {
        let task = self.get(id).await?.ok_or(ManagerError::TaskNotFound(id))?;
        if task.status != TaskStatus::Pending {
            return Err(ManagerError::precondition(format!(
                "task {id} is {}, not pending",
                task.status
            )));
        }

        let patch = TaskPatch::new()
            .expect_status(TaskStatus::Pending)
            .status(TaskStatus::InProgress);
        let started = self.update(id, patch, "start_task").await?;
        info!(task_id = %id, "task started");

        self.spawn_execution(id);
        Ok(started)
    }

    pub async fn get(&self, id: TaskId) -> Result<Option<Task>, ManagerError> {
        let tasks = &self.inner.stores.tasks;
        Ok(self
            .inner
            .options
            .retry
            .run("get_task", || tasks.get(id))
            .await?)
    }

    /// Every task, or only those with `status`. Oldest first.
    pub async fn list(&self, status: Option<TaskStatus>) -> Result<Vec<Task>, ManagerError> {
        let tasks = &self.inner.stores.tasks;
        let retry = &self.inner.options.retry;
        let found = match status {
            Some(status) => {
                retry
                    .run("query_tasks", || tasks.query_by_status(status))
                    .await?
            }
            None => retry.run("list_tasks", || tasks.list()).await?,
        };
        Ok(found)
    }

    /// Detach an execution unit for `id`. Errors are logged, never returned.
    fn spawn_execution(&self, id: TaskId) {
        let engine = self.clone();
        let span = info_span!("execute", task_id = %id);
        tokio::spawn(
            async move {
                if let Err(e) = engine.execute(id).await {
                    error!(error = %e, "execution aborted; task left as last persisted");
                }
            }
            .instrument(span),
        );
    }

    /// Drive `id` until it completes or a step fails.
    ///
    /// No-op when the task is missing, not in progress, or already driven by
    /// another execution unit.
    pub async fn execute(&self, id: TaskId) -> Result<(), ManagerError> {
        let Some(_driver) = self.inner.drivers.try_lock(id).await else {
            debug!(task_id = %id, "task already has a driver");
            return Ok(());
        };

        loop {
            let Some(task) = self.get(id).await? else {
                debug!(task_id = %id, "task vanished; nothing to execute");
                return Ok(());
            };
            if task.status != TaskStatus::InProgress {
                debug!(task_id = %id, status = %task.status, "task not in progress");
                return Ok(());
            }

            match task.next_pending_step() {
                Some(index) => match self.run_step(&task, index).await? {
                    StepResult::Continue => {}
                    StepResult::Finished => return Ok(()),
                },
                None => {
                    // Every step is completed but the status was never written.
                    self.finish_completed(&task).await?;
                    return Ok(());
                }
            }
        }
    }

    async fn run_step(&self, task: &Task, index: usize) -> Result<StepResult, ManagerError> {
        let total = task.steps.len();
        let start = TaskPatch::new()
            .expect_status(TaskStatus::InProgress)
            .step(index, StepStatus::InProgress, None);
        match self.update(task.id, start, "start_step").await {
            Ok(_) => {}
            Err(ManagerError::Store(StoreError::Rejected {
                source: PatchError::StatusMismatch { found, .. },
                ..
            })) => {
                debug!(task_id = %task.id, status = %found, "task left in-progress before step start");
                return Ok(StepResult::Finished);
            }
            Err(e) => return Err(e),
        }

        let ctx = StepContext {
            task_id: task.id,
            goal: task.goal.clone(),
            index,
            total,
            description: task.steps[index].description.clone(),
        };
        debug!(task_id = %task.id, step = ctx.number(), total, "step started");
        let outcome = self.inner.executor.execute(&ctx).await;

        let completed = task.completed_steps() + usize::from(outcome.is_success());
        let progress = progress_for(completed, total);
        let terminal = if !outcome.is_success() {
            Some(TaskStatus::Failed)
        } else if completed == total {
            Some(TaskStatus::Completed)
        } else {
            None
        };

        // The log line lands before the outcome patch, so a terminal status
        // implies every log line is already stored.
        let step_logs = &self.inner.stores.step_logs;
        self.inner
            .options
            .retry
            .run("append_log", || step_logs.append(task.id, index, &outcome.log))
            .await?;

        let mut patch = TaskPatch::new()
            .expect_status(TaskStatus::InProgress)
            .step(index, outcome.step_status(), Some(outcome.log.clone()))
            .progress(progress);
        if let Some(status) = terminal {
            patch = patch.status(status);
        }
        self.update(task.id, patch, "finish_step").await?;

        info!(
            task_id = %task.id,
            step = ctx.number(),
            total,
            outcome = ?outcome.kind,
            progress,
            "step finished"
        );
        let events = &self.inner.options.events;
        events.emit(DomainEvent::StepFinished {
            task_id: task.id,
            index,
            outcome: outcome.kind,
            progress,
        });

        match terminal {
            Some(status) => {
                info!(task_id = %task.id, %status, "task finished");
                events.emit(DomainEvent::TaskFinished {
                    task_id: task.id,
                    status,
                });
                Ok(StepResult::Finished)
            }
            None => Ok(StepResult::Continue),
        }
    }

    async fn finish_completed(&self, task: &Task) -> Result<(), ManagerError> {
        let patch = TaskPatch::new()
            .expect_status(TaskStatus::InProgress)
            .status(TaskStatus::Completed)
            .progress(100);
        self.update(task.id, patch, "complete_task").await?;
        self.inner.options.events.emit(DomainEvent::TaskFinished {
            task_id: task.id,
            status: TaskStatus::Completed,
        });
        Ok(())
    }

    pub(crate) async fn update(
        &self,
        id: TaskId,
        patch: TaskPatch,
        label: &'static str,
    ) -> Result<Task, ManagerError> {
        let tasks = &self.inner.stores.tasks;
        Ok(self
            .inner
            .options
            .retry
            .run(label, || tasks.update(id, patch.clone()))
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ErrorKind, OutcomeKind};
    use crate::impls::{BroadcastEventSink, InMemoryStore};
    use crate::ports::{StepLogStore, TaskStore};
    use crate::testing::{FakeServices, ScriptedExecutor, wait_for_terminal};
    use std::time::Duration;

    struct Harness {
        engine: TaskEngine,
        store: InMemoryStore,
        fake: Arc<FakeServices>,
        executor: Arc<ScriptedExecutor>,
    }

    fn harness(fake: FakeServices, executor: ScriptedExecutor, auto_start: bool) -> Harness {
        let store = InMemoryStore::new();
        let (fake, services) = fake.into_services();
        let executor = Arc::new(executor);
        let engine = TaskEngine::new(
            Stores::from_backend(Arc::new(store.clone())),
            services.planner,
            executor.clone(),
            EngineOptions {
                retry: RetryPolicy {
                    max_attempts: 3,
                    base_delay: Duration::from_millis(1),
                    multiplier: 1.0,
                },
                auto_start,
                ..EngineOptions::default()
            },
        );
        Harness {
            engine,
            store,
            fake,
            executor,
        }
    }

    #[tokio::test]
    async fn three_successful_steps_complete_the_task() {
        let h = harness(FakeServices::with_steps(3), ScriptedExecutor::all_succeed(), true);

        let created = h.engine.create("Patch all production servers").await.unwrap();
        assert_eq!(created.status, TaskStatus::InProgress);
        assert_eq!(created.progress, 0);
        assert_eq!(created.steps.len(), 3);
        assert_eq!(created.goal, "Patch all production servers");

        let done = wait_for_terminal(&h.store, created.id).await;
        assert_eq!(done.status, TaskStatus::Completed);
        assert_eq!(done.progress, 100);
        assert!(done.steps.iter().all(|s| s.status == StepStatus::Completed));
        assert_eq!(
            done.steps[2].log.as_deref(),
            Some("Step 3 completed successfully.")
        );
        done.check_invariants().unwrap();

        let lines = h.store.lines(created.id).await.unwrap();
        let indices: Vec<usize> = lines.iter().map(|l| l.step_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn failing_second_step_halts_execution() {
        let h = harness(FakeServices::with_steps(3), ScriptedExecutor::failing_at(1), true);

        let created = h.engine.create("Patch all production servers").await.unwrap();
        let done = wait_for_terminal(&h.store, created.id).await;

        assert_eq!(done.status, TaskStatus::Failed);
        assert_eq!(done.progress, 33);
        let statuses: Vec<StepStatus> = done.steps.iter().map(|s| s.status).collect();
        assert_eq!(
            statuses,
            vec![StepStatus::Completed, StepStatus::Failed, StepStatus::Pending]
        );
        assert_eq!(
            done.steps[1].log.as_deref(),
            Some("Step 2 failed due to a simulated error.")
        );
        assert_eq!(done.steps[2].log, None);
        assert_eq!(h.executor.calls(), 2);
    }

    #[tokio::test]
    async fn long_plan_reaches_completion() {
        let h = harness(FakeServices::with_steps(200), ScriptedExecutor::all_succeed(), true);

        let created = h.engine.create("Patch the whole fleet").await.unwrap();
        let done = wait_for_terminal(&h.store, created.id).await;

        assert_eq!(done.status, TaskStatus::Completed);
        assert_eq!(done.progress, 100);
        assert_eq!(done.completed_steps(), 200);
        done.check_invariants().unwrap();
        assert_eq!(h.executor.calls(), 200);
    }

    #[tokio::test]
    async fn blank_goal_is_a_precondition_failure() {
        let h = harness(FakeServices::with_steps(3), ScriptedExecutor::all_succeed(), true);

        let err = h.engine.create("   ").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Precondition);
        assert_eq!(h.fake.plan_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn planner_failure_persists_nothing() {
        let fake = FakeServices {
            fail_planner: true,
            ..FakeServices::with_steps(3)
        };
        let h = harness(fake, ScriptedExecutor::all_succeed(), true);

        let err = h.engine.create("Rotate logs").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Generation);
        assert!(h.store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_plan_is_a_generation_failure() {
        let h = harness(FakeServices::with_steps(0), ScriptedExecutor::all_succeed(), true);

        let err = h.engine.create("Do nothing at all").await.unwrap_err();
        assert!(matches!(
            err,
            ManagerError::Generation(ServiceError::InvalidResponse { .. })
        ));
        assert!(h.store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn deferred_tasks_wait_for_start() {
        let h = harness(FakeServices::with_steps(2), ScriptedExecutor::all_succeed(), false);

        let created = h.engine.create("Renew certificates").await.unwrap();
        assert_eq!(created.status, TaskStatus::Pending);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(h.executor.calls(), 0);

        let started = h.engine.start(created.id).await.unwrap();
        assert_eq!(started.status, TaskStatus::InProgress);

        let done = wait_for_terminal(&h.store, created.id).await;
        assert_eq!(done.status, TaskStatus::Completed);

        let err = h.engine.start(created.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Precondition);
    }

    #[tokio::test]
    async fn start_missing_task_is_not_found() {
        let h = harness(FakeServices::with_steps(1), ScriptedExecutor::all_succeed(), false);
        let id = TaskId::from_ulid(ulid::Ulid::new());
        assert!(matches!(
            h.engine.start(id).await,
            Err(ManagerError::TaskNotFound(found)) if found == id
        ));
    }

    #[tokio::test]
    async fn executing_a_missing_task_is_a_noop() {
        let h = harness(FakeServices::with_steps(1), ScriptedExecutor::all_succeed(), true);
        h.engine
            .execute(TaskId::from_ulid(ulid::Ulid::new()))
            .await
            .unwrap();
        assert_eq!(h.executor.calls(), 0);
    }

    #[tokio::test]
    async fn finished_tasks_are_not_re_executed() {
        let h = harness(FakeServices::with_steps(2), ScriptedExecutor::all_succeed(), true);
        let created = h.engine.create("Flush caches").await.unwrap();
        wait_for_terminal(&h.store, created.id).await;
        let calls = h.executor.calls();

        h.engine.execute(created.id).await.unwrap();
        assert_eq!(h.executor.calls(), calls);
    }

    #[tokio::test]
    async fn one_driver_per_task() {
        let h = harness(FakeServices::with_steps(3), ScriptedExecutor::all_succeed(), false);
        let created = h.engine.create("Rebuild index").await.unwrap();
        h.store
            .update(
                created.id,
                TaskPatch::new().status(TaskStatus::InProgress),
            )
            .await
            .unwrap();

        let (a, b) = tokio::join!(h.engine.execute(created.id), h.engine.execute(created.id));
        a.unwrap();
        b.unwrap();

        assert_eq!(h.executor.calls(), 3);
        let done = TaskStore::get(&h.store, created.id).await.unwrap().unwrap();
        assert_eq!(done.status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn transient_store_errors_are_retried() {
        let h = harness(FakeServices::with_steps(1), ScriptedExecutor::all_succeed(), true);
        h.store.fail_next(2);

        let created = h.engine.create("Vacuum database").await.unwrap();
        let done = wait_for_terminal(&h.store, created.id).await;
        assert_eq!(done.status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn events_follow_store_writes() {
        let store = InMemoryStore::new();
        let (_fake, services) = FakeServices::with_steps(2).into_services();
        let sink = BroadcastEventSink::new(16);
        let mut rx = sink.subscribe();
        let engine = TaskEngine::new(
            Stores::from_backend(Arc::new(store.clone())),
            services.planner,
            Arc::new(ScriptedExecutor::all_succeed()),
            EngineOptions {
                events: Arc::new(sink),
                ..EngineOptions::default()
            },
        );

        let created = engine.create("Restart workers").await.unwrap();
        wait_for_terminal(&store, created.id).await;

        let mut events = Vec::new();
        while let Ok(Ok(event)) = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await {
            let last = matches!(event, DomainEvent::TaskFinished { .. });
            events.push(event);
            if last {
                break;
            }
        }
        assert_eq!(
            events,
            vec![
                DomainEvent::TaskCreated {
                    task_id: created.id,
                    steps: 2
                },
                DomainEvent::StepFinished {
                    task_id: created.id,
                    index: 0,
                    outcome: OutcomeKind::Success,
                    progress: 50
                },
                DomainEvent::StepFinished {
                    task_id: created.id,
                    index: 1,
                    outcome: OutcomeKind::Success,
                    progress: 100
                },
                DomainEvent::TaskFinished {
                    task_id: created.id,
                    status: TaskStatus::Completed
                },
            ]
        );
    }

    #[tokio::test]
    async fn list_filters_by_status() {
        let h = harness(FakeServices::with_steps(1), ScriptedExecutor::all_succeed(), false);
        let a = h.engine.create("First").await.unwrap();
        h.engine.create("Second").await.unwrap();
        h.engine.start(a.id).await.unwrap();
        wait_for_terminal(&h.store, a.id).await;

        assert_eq!(h.engine.list(None).await.unwrap().len(), 2);
        let pending = h.engine.list(Some(TaskStatus::Pending)).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].goal, "Second");
    }
}
