use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::Finding;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportStatus {
    Ok,
    ProblemsFound,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticReport {
    pub status: ReportStatus,
    pub problem_count: u64,
    pub findings: Vec<Finding>,
}

impl DiagnosticReport {
    /// Decodes the tool's JSON document. Never fails: unknown shapes decode
    /// to an empty report.
    pub fn from_value(value: &Value) -> Self {
        let findings: Vec<Finding> = value
            .get("results")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Finding::from_value).collect())
            .unwrap_or_default();

        let problems = value.get("problems").and_then(Value::as_u64);
        let status_ok = value
            .get("status")
            .and_then(Value::as_str)
            .is_some_and(|s| s.trim().eq_ignore_ascii_case("ok"));

        // A missing `problems` count is not read as zero: findings that are
        // present are still reported.
        let status = if status_ok
            || problems == Some(0)
            || (problems.is_none() && findings.is_empty())
        {
            ReportStatus::Ok
        } else {
            ReportStatus::ProblemsFound
        };

        let problem_count = problems
            .unwrap_or_else(|| findings.iter().filter(|f| f.is_actionable()).count() as u64);

        Self {
            status,
            problem_count,
            findings,
        }
    }

    pub fn has_problems(&self) -> bool {
        self.status == ReportStatus::ProblemsFound
    }
}
