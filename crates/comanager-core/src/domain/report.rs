//! RCA report and monitoring alert documents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::TaskId;

/// Length of the excerpt returned by `Report::summary`.
pub const SUMMARY_CHARS: usize = 200;

/// Root-cause-analysis report. One per task, keyed by the task id, never rewritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub task_id: TaskId,
    /// Markdown body.
    pub report: String,
    pub generated_at: DateTime<Utc>,
}

impl Report {
    pub fn new(task_id: TaskId, report: impl Into<String>, generated_at: DateTime<Utc>) -> Self {
        Self {
            task_id,
            report: report.into(),
            generated_at,
        }
    }

    /// Short excerpt of the report body.
    pub fn summary(&self) -> ReportSummary {
        let mut chars = self.report.chars();
        let head: String = chars.by_ref().take(SUMMARY_CHARS).collect();
        let summary = if chars.next().is_some() {
            format!("{head}...")
        } else {
            head
        };
        ReportSummary {
            task_id: self.task_id,
            summary,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub task_id: TaskId,
    pub summary: String,
}

/// A monitoring alert that can be turned into a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub title: String,
    pub description: String,
}

impl Alert {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    #[test]
    fn summary_truncates_long_reports() {
        let body = "x".repeat(SUMMARY_CHARS + 50);
        let report = Report::new(TaskId::from_ulid(Ulid::new()), body, Utc::now());

        let summary = report.summary().summary;
        assert_eq!(summary.len(), SUMMARY_CHARS + 3);
        assert!(summary.ends_with("..."));
    }

    #[test]
    fn summary_keeps_short_reports_whole() {
        let report = Report::new(TaskId::from_ulid(Ulid::new()), "## Summary\nok", Utc::now());
        assert_eq!(report.summary().summary, "## Summary\nok");
    }

    #[test]
    fn summary_counts_characters_not_bytes() {
        let body = "é".repeat(SUMMARY_CHARS + 1);
        let report = Report::new(TaskId::from_ulid(Ulid::new()), body, Utc::now());
        assert_eq!(report.summary().summary.chars().count(), SUMMARY_CHARS + 3);
    }
}
