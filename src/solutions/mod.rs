use crate::core::{DiagnosticReport, SolutionEntry};

pub const SOLUTION_MARKER: &str = "Solution:";

/// Flattens a report into atomic remediation steps. Ids run across the whole
/// report, starting at 1.
pub fn decompose(report: &DiagnosticReport) -> Vec<SolutionEntry> {
    let mut entries = Vec::new();
    for finding in &report.findings {
        if !finding.is_actionable() {
            continue;
        }
        for step in split_steps(&finding.details_text) {
            let id = entries.len() + 1;
            entries.push(SolutionEntry::from_finding(id, finding, step));
        }
    }
    entries
}

/// Splits remediation text into steps.
///
/// Without the `Solution:` marker the whole trimmed text is one step. With
/// it, numbered lines (`1. ...`) open steps and other non-blank lines are
/// joined onto the current one.
pub fn split_steps(details: &str) -> Vec<String> {
    let Some((_, solution)) = details.split_once(SOLUTION_MARKER) else {
        let whole = details.trim();
        if whole.is_empty() {
            return vec![];
        }
        return vec![whole.to_string()];
    };

    let mut steps = Vec::new();
    let mut current = String::new();
    for line in solution.trim().lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if is_numbered_step(line) {
            if !current.is_empty() {
                steps.push(std::mem::take(&mut current));
            }
            current.push_str(line);
        } else if current.is_empty() {
            current.push_str(line);
        } else {
            current.push(' ');
            current.push_str(line);
        }
    }
    if !current.is_empty() {
        steps.push(current);
    }
    steps
}

/// `<digits>.<whitespace><text>`, for an already trimmed line.
pub fn is_numbered_step(line: &str) -> bool {
    let digits = line.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return false;
    }
    let mut rest = line[digits..].chars();
    if rest.next() != Some('.') {
        return false;
    }
    let rest = rest.as_str();
    rest.starts_with(char::is_whitespace) && !rest.trim().is_empty()
}

/// Drops a leading `N. ` label, for display.
pub fn strip_step_label(step: &str) -> &str {
    if !is_numbered_step(step) {
        return step;
    }
    match step.split_once('.') {
        Some((_, rest)) => rest.trim_start(),
        None => step,
    }
}
