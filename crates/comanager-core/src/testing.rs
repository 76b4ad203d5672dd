//! Test doubles shared by the app-layer tests.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{ServiceError, StepOutcome, Task, TaskId};
use crate::ports::{
    AlertRequest, CommandSimulator, GoalResponse, HealingRequest, Plan, PlanGenerator,
    ReportRequest, ReportWriter, ResolutionService, SelfHealingService, Services, StepContext,
    StepExecutor, TaskStore,
};

/// Succeeds on every step except the listed (0-based) indices.
#[derive(Default)]
pub struct ScriptedExecutor {
    fail_at: HashSet<usize>,
    pub calls: AtomicUsize,
}

impl ScriptedExecutor {
    pub fn all_succeed() -> Self {
        Self::default()
    }

    pub fn failing_at(index: usize) -> Self {
        Self {
            fail_at: HashSet::from([index]),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StepExecutor for ScriptedExecutor {
    async fn execute(&self, step: &StepContext) -> StepOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        if self.fail_at.contains(&step.index) {
            StepOutcome::failure(format!("Step {} failed due to a simulated error.", step.number()))
        } else {
            StepOutcome::success(format!("Step {} completed successfully.", step.number()))
        }
    }
}

/// Answers every collaborator call with canned text, counting calls.
#[derive(Default)]
pub struct FakeServices {
    pub steps: Vec<String>,
    pub fail_planner: bool,
    pub fail_healer: bool,
    pub fail_resolver: bool,
    pub fail_writer: bool,
    pub plan_calls: AtomicUsize,
    pub heal_calls: AtomicUsize,
    pub write_calls: AtomicUsize,
}

impl FakeServices {
    pub fn with_steps(n: usize) -> Self {
        Self {
            steps: (1..=n).map(|i| format!("step {i}")).collect(),
            ..Self::default()
        }
    }

    pub fn into_services(self) -> (Arc<Self>, Services) {
        let fake = Arc::new(self);
        let services = Services {
            planner: fake.clone(),
            resolver: fake.clone(),
            healer: fake.clone(),
            report_writer: fake.clone(),
            console: fake.clone(),
        };
        (fake, services)
    }
}

#[async_trait]
impl PlanGenerator for FakeServices {
    async fn plan(&self, goal: &str) -> Result<Plan, ServiceError> {
        self.plan_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_planner {
            return Err(ServiceError::failed("planner", "backend unreachable"));
        }
        Ok(Plan::new(goal, self.steps.clone()))
    }
}

#[async_trait]
impl ResolutionService for FakeServices {
    async fn resolve(&self, alert: &AlertRequest) -> Result<GoalResponse, ServiceError> {
        if self.fail_resolver {
            return Err(ServiceError::failed("resolver", "backend unreachable"));
        }
        Ok(GoalResponse {
            goal: format!("Resolve {}", alert.title),
        })
    }
}

#[async_trait]
impl SelfHealingService for FakeServices {
    async fn heal(&self, request: &HealingRequest) -> Result<GoalResponse, ServiceError> {
        self.heal_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_healer {
            return Err(ServiceError::failed("healer", "backend unreachable"));
        }
        Ok(GoalResponse {
            goal: format!("[Self-Correction] {} ({})", request.goal, request.failure_log),
        })
    }
}

#[async_trait]
impl ReportWriter for FakeServices {
    async fn write_report(&self, request: &ReportRequest) -> Result<String, ServiceError> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        if self.fail_writer {
            return Err(ServiceError::failed("report writer", "backend unreachable"));
        }
        Ok(format!(
            "## Summary\n{}\n## Root Cause\n{}\n## Resolution / Outcome\n",
            request.goal,
            request.transcript()
        ))
    }
}

#[async_trait]
impl CommandSimulator for FakeServices {
    async fn simulate(&self, command: &str) -> Result<String, ServiceError> {
        Ok(format!("$ {command}"))
    }
}

/// Poll the store until the task reaches a terminal status.
pub async fn wait_for_terminal(tasks: &dyn TaskStore, id: TaskId) -> Task {
    let poll = async {
        loop {
            if let Ok(Some(task)) = tasks.get(id).await
                && task.status.is_terminal()
            {
                return task;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(5), poll)
        .await
        .expect("task did not reach a terminal status")
}
