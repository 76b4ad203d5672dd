//! Offline collaborators that answer from fixed templates.
//!
//! They let the engine, the CLI and the tests run without a generation
//! backend. Output is deterministic for a given input.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::ServiceError;
use crate::ports::{
    AlertRequest, CommandSimulator, GoalResponse, HealingRequest, Plan, PlanGenerator,
    ReportRequest, ReportWriter, ResolutionService, SelfHealingService, Services,
};

fn require(service: &'static str, field: &str, value: &str) -> Result<String, ServiceError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::invalid(service, format!("{field} is empty")));
    }
    Ok(trimmed.to_string())
}

/// Plans every goal as inspect / act / verify.
#[derive(Debug, Clone, Default)]
pub struct TemplatePlanner;

#[async_trait]
impl PlanGenerator for TemplatePlanner {
    async fn plan(&self, goal: &str) -> Result<Plan, ServiceError> {
        let goal = require("planner", "goal", goal)?;
        Ok(Plan::new(
            goal.clone(),
            [
                format!("Inspect current state relevant to: {goal}"),
                format!("Apply the change: {goal}"),
                "Verify the result and record the outcome".to_string(),
            ],
        ))
    }
}

#[derive(Debug, Clone, Default)]
pub struct TemplateResolver;

#[async_trait]
impl ResolutionService for TemplateResolver {
    async fn resolve(&self, alert: &AlertRequest) -> Result<GoalResponse, ServiceError> {
        let title = require("resolver", "alert title", &alert.title)?;
        let description = alert.description.trim();
        let goal = if description.is_empty() {
            format!("Investigate and resolve alert \"{title}\"")
        } else {
            format!("Investigate and resolve alert \"{title}\": {description}")
        };
        Ok(GoalResponse { goal })
    }
}

#[derive(Debug, Clone, Default)]
pub struct TemplateHealer;

#[async_trait]
impl SelfHealingService for TemplateHealer {
    async fn heal(&self, request: &HealingRequest) -> Result<GoalResponse, ServiceError> {
        let goal = require("healer", "goal", &request.goal)?;
        let log = request.failure_log.trim();
        Ok(GoalResponse {
            goal: format!(
                "[Self-Correction] The previous attempt to \"{goal}\" failed ({log}). \
                 Retry with an alternative approach and verify the result."
            ),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct TemplateReportWriter;

#[async_trait]
impl ReportWriter for TemplateReportWriter {
    async fn write_report(&self, request: &ReportRequest) -> Result<String, ServiceError> {
        let failed: Vec<&String> = request
            .logs
            .iter()
            .filter(|line| line.starts_with("[failed]"))
            .collect();

        let root_cause = match failed.first() {
            Some(line) => format!("The first failing step was:\n\n    {line}"),
            None => "No step failed.".to_string(),
        };
        let outcome = if failed.is_empty() {
            "All steps completed."
        } else {
            "The task did not complete. A self-healing retry may address the failure."
        };

        Ok(format!(
            "## Summary\n\nGoal: {goal}\n\n{transcript}\n\n## Root Cause\n\n{root_cause}\n\n## Resolution / Outcome\n\n{outcome}\n",
            goal = request.goal,
            transcript = request.transcript(),
        ))
    }
}

/// A pretend shell.
#[derive(Debug, Clone, Default)]
pub struct TemplateConsole;

#[async_trait]
impl CommandSimulator for TemplateConsole {
    async fn simulate(&self, command: &str) -> Result<String, ServiceError> {
        let command = require("console", "command", command)?;
        let (program, rest) = match command.split_once(char::is_whitespace) {
            Some((p, r)) => (p, r.trim()),
            None => (command.as_str(), ""),
        };
        let output = match program {
            "echo" => rest.to_string(),
            "whoami" => "root".to_string(),
            "hostname" => "comanager-sim".to_string(),
            "pwd" => "/root".to_string(),
            "uptime" => " 10:42:07 up 12 days,  3:14,  1 user,  load average: 0.08, 0.12, 0.10".to_string(),
            "df" => "Filesystem     1K-blocks    Used Available Use% Mounted on\n\
                     /dev/sda1       41152736 9865212  29174092  26% /"
                .to_string(),
            "systemctl" if !rest.is_empty() => format!("{rest}: ok"),
            _ => format!("bash: {program}: command not found"),
        };
        Ok(output)
    }
}

impl Services {
    /// Bundle of the template collaborators.
    pub fn templates() -> Self {
        Self {
            planner: Arc::new(TemplatePlanner),
            resolver: Arc::new(TemplateResolver),
            healer: Arc::new(TemplateHealer),
            report_writer: Arc::new(TemplateReportWriter),
            console: Arc::new(TemplateConsole),
        }
    }
}
