use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::core::SolutionEntry;
use crate::diagnostic::Attempt;
use crate::executor::ExecutorOutcome;

const MAX_CMD_OUTPUT_BYTES: usize = 64 * 1024;

#[derive(Debug, Serialize)]
struct SolutionRunLog {
    schema_version: &'static str,
    tool_version: String,
    command: &'static str,
    started_at: String,
    finished_at: String,
    status: String,
    diagnostic: DiagnosticLog,
    solution: SolutionLog,
    attempt: CommandAttemptLog,
}

#[derive(Debug, Serialize)]
struct DiagnosticLog {
    cmd: String,
    attempts: Vec<Attempt>,
}

#[derive(Debug, Serialize)]
struct SolutionLog {
    id: usize,
    kind: String,
    name: String,
    error: String,
    step: String,
    is_custom: bool,
}

#[derive(Debug, Serialize)]
struct CommandAttemptLog {
    cmd: String,
    args: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    exit_code: Option<i32>,
    completion: &'static str,
    forced_kill: bool,
    elapsed_ms: u128,
    #[serde(skip_serializing_if = "String::is_empty")]
    stdout: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    stderr: String,
}

pub fn logs_dir(home_dir: &Path) -> PathBuf {
    home_dir.join(".config/k8s2ai/logs")
}

/// What was run on the diagnostic side before a solution was executed.
#[derive(Debug, Clone, Copy)]
pub struct DiagnosticTrail<'a> {
    pub cmd: &'a str,
    pub attempts: &'a [Attempt],
}

pub fn write_solution_run_log(
    home_dir: &Path,
    started_at: OffsetDateTime,
    finished_at: OffsetDateTime,
    diagnostic: DiagnosticTrail<'_>,
    entry: &SolutionEntry,
    executor_cmd: &str,
    outcome: &ExecutorOutcome,
) -> Result<PathBuf> {
    let dir = logs_dir(home_dir);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create log directory: {}", dir.display()))?;

    let pid = std::process::id();
    let ts = finished_at.unix_timestamp_nanos();
    let file_name = format!("solution-run-{pid}-{ts}.json");
    let path = dir.join(file_name);

    let status = if outcome.success() { "ok" } else { "error" };

    let log = SolutionRunLog {
        schema_version: "1.0",
        tool_version: env!("CARGO_PKG_VERSION").to_string(),
        command: "solution run",
        started_at: started_at
            .format(&Rfc3339)
            .unwrap_or_else(|_| "unknown".to_string()),
        finished_at: finished_at
            .format(&Rfc3339)
            .unwrap_or_else(|_| "unknown".to_string()),
        status: status.to_string(),
        diagnostic: DiagnosticLog {
            cmd: diagnostic.cmd.to_string(),
            attempts: diagnostic.attempts.to_vec(),
        },
        solution: SolutionLog {
            id: entry.id,
            kind: entry.resource_kind.clone(),
            name: entry.resource_name.clone(),
            error: entry.error_text.clone(),
            step: entry.step_text.clone(),
            is_custom: entry.is_custom,
        },
        attempt: CommandAttemptLog {
            cmd: executor_cmd.to_string(),
            args: outcome.args.clone(),
            exit_code: outcome.exit_code,
            completion: outcome.completion.as_str(),
            forced_kill: outcome.forced_kill,
            elapsed_ms: outcome.elapsed.as_millis(),
            stdout: truncate_string(&outcome.stdout, MAX_CMD_OUTPUT_BYTES),
            stderr: truncate_string(&outcome.stderr, MAX_CMD_OUTPUT_BYTES),
        },
    };

    let buf = serde_json::to_vec_pretty(&log).context("failed to serialize log (JSON)")?;
    std::fs::write(&path, buf)
        .with_context(|| format!("failed to write log: {}", path.display()))?;
    Ok(path)
}

fn truncate_string(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let mut idx = max_bytes;
    while idx > 0 && !s.is_char_boundary(idx) {
        idx = idx.saturating_sub(1);
    }
    let head = &s[..idx];
    format!("{head}\n...(truncated, total={} bytes)", s.len())
}
