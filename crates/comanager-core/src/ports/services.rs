//! Collaborator ports - 外部の生成サービス
//!
//! The language-generation backend is out of scope; the core only sees these
//! request/response shapes. `impls::template` provides offline implementations.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::ServiceError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedStep {
    pub description: String,
}

/// Output of the plan generator: the goal plus its ordered steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub goal: String,
    pub steps: Vec<PlannedStep>,
}

impl Plan {
    pub fn new<I, S>(goal: impl Into<String>, steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            goal: goal.into(),
            steps: steps
                .into_iter()
                .map(|s| PlannedStep {
                    description: s.into(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRequest {
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealingRequest {
    pub goal: String,
    pub failure_log: String,
}

/// Response of the resolution and self-healing services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalResponse {
    pub goal: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRequest {
    pub goal: String,
    /// One `[status] description: log` line per step, in step order.
    pub logs: Vec<String>,
    /// Formatting guidance for the writer. Advisory; the output is not parsed.
    pub guidance: String,
}

impl ReportRequest {
    pub fn transcript(&self) -> String {
        self.logs.join("\n")
    }
}

#[async_trait]
pub trait PlanGenerator: Send + Sync {
    async fn plan(&self, goal: &str) -> Result<Plan, ServiceError>;
}

#[async_trait]
pub trait ResolutionService: Send + Sync {
    async fn resolve(&self, alert: &AlertRequest) -> Result<GoalResponse, ServiceError>;
}

#[async_trait]
pub trait SelfHealingService: Send + Sync {
    async fn heal(&self, request: &HealingRequest) -> Result<GoalResponse, ServiceError>;
}

#[async_trait]
pub trait ReportWriter: Send + Sync {
    /// Returns the report body as markdown.
    async fn write_report(&self, request: &ReportRequest) -> Result<String, ServiceError>;
}

#[async_trait]
pub trait CommandSimulator: Send + Sync {
    /// Returns what the command would print.
    async fn simulate(&self, command: &str) -> Result<String, ServiceError>;
}

/// Collaborator handle bundle.
#[derive(Clone)]
pub struct Services {
    pub planner: Arc<dyn PlanGenerator>,
    pub resolver: Arc<dyn ResolutionService>,
    pub healer: Arc<dyn SelfHealingService>,
    pub report_writer: Arc<dyn ReportWriter>,
    pub console: Arc<dyn CommandSimulator>,
}
