use anyhow::Error;
use std::io::{self, Write};
use unicode_width::UnicodeWidthChar;

use crate::core::SolutionEntry;
use crate::executor::{Completion, ExecutorOutcome};
use crate::selection::{SolutionGroup, SolutionIndex};

pub const RULE_WIDTH: usize = 80;
pub const MAX_ERROR_WIDTH: usize = 100;

#[derive(Debug, Clone)]
pub struct UiConfig {
    pub color: bool,
    pub stderr_is_tty: bool,
    pub verbose: bool,
}

pub fn eprintln_error(err: &Error) {
    let mut stderr = io::stderr().lock();
    let _ = writeln!(stderr, "error:");
    let _ = writeln!(stderr, "  {err}");

    let mut causes = err.chain().skip(1).peekable();
    if causes.peek().is_some() {
        let _ = writeln!(stderr, "caused by:");
        for cause in causes {
            let _ = writeln!(stderr, "  - {cause}");
        }
    }

    if crate::exit::is_not_found(err) {
        return;
    }
    let _ = writeln!(stderr, "next:");
    let _ = writeln!(stderr, "  - rerun with `--verbose` for more detail");
    let _ = writeln!(stderr, "  - see `k8s2ai --help` for available options");
}

pub fn print_no_problems(cfg: &UiConfig) {
    let mut out = io::stdout().lock();
    let _ = writeln!(out, "{}", paint("✓ No problems detected!", "32", cfg.color));
}

pub fn print_no_solutions() {
    let mut out = io::stdout().lock();
    let _ = writeln!(out, "No solutions found in the analysis results.");
}

pub fn print_solutions(index: &SolutionIndex, cfg: &UiConfig) {
    let mut out = io::stdout().lock();
    write_solutions(&mut out, index, cfg.color);
}

fn write_solutions(out: &mut dyn Write, index: &SolutionIndex, color: bool) {
    let _ = writeln!(out);
    let _ = writeln!(out, "{}", "=".repeat(RULE_WIDTH));
    let _ = writeln!(out, "{}", paint("DETECTED ISSUES AND SOLUTIONS", "1", color));
    let _ = writeln!(out, "{}", "=".repeat(RULE_WIDTH));
    let _ = writeln!(out);

    for (gi, group) in index.groups().iter().enumerate() {
        let _ = writeln!(
            out,
            "[{}] {}: {}",
            gi + 1,
            paint(&group.key.resource_kind, "36", color),
            group.key.resource_name
        );
        let _ = writeln!(
            out,
            "    Error: {}",
            paint(
                &truncate_display(&group.key.error_text, MAX_ERROR_WIDTH),
                "31",
                color
            )
        );
        for (li, entry) in group.entries.iter().enumerate() {
            let _ = writeln!(out, "    {}) {}", li + 1, step_label(entry));
        }
        let _ = writeln!(out);
    }
}

/// The group list shown when several issues were found.
pub fn write_group_menu(out: &mut dyn Write, index: &SolutionIndex, color: bool) {
    let _ = writeln!(out);
    let _ = writeln!(out, "{}", "-".repeat(RULE_WIDTH));
    let _ = writeln!(out, "Issues:");
    for (gi, group) in index.groups().iter().enumerate() {
        let count = group.len();
        let noun = if count == 1 { "solution" } else { "solutions" };
        let _ = writeln!(
            out,
            "  {}. {}: {} ({count} {noun})",
            gi + 1,
            paint(&group.key.resource_kind, "36", color),
            group.key.resource_name
        );
        let _ = writeln!(
            out,
            "     {}",
            truncate_display(&group.key.error_text, MAX_ERROR_WIDTH)
        );
    }
}

/// The entries of one group, numbered locally from 1.
pub fn write_entry_menu(out: &mut dyn Write, group: &SolutionGroup, color: bool) {
    let _ = writeln!(out);
    let _ = writeln!(out, "{}", "-".repeat(RULE_WIDTH));
    let _ = writeln!(
        out,
        "{}: {}",
        paint(&group.key.resource_kind, "36", color),
        group.key.resource_name
    );
    let _ = writeln!(
        out,
        "Error: {}",
        truncate_display(&group.key.error_text, MAX_ERROR_WIDTH)
    );
    for (li, entry) in group.entries.iter().enumerate() {
        let _ = writeln!(out, "  {}. {}", li + 1, step_label(entry));
    }
}

/// Step text without its own `N.` label, which would clash with the menu
/// numbering.
fn step_label(entry: &SolutionEntry) -> &str {
    if entry.is_custom {
        return &entry.step_text;
    }
    crate::solutions::strip_step_label(&entry.step_text)
}

pub fn print_explain_hint() {
    let mut out = io::stdout().lock();
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "(Use --explain flag to interactively select and execute solutions)"
    );
}

pub fn print_execution_start(entry: &SolutionEntry, cmdline: &str, cfg: &UiConfig) {
    let mut out = io::stdout().lock();
    let _ = writeln!(out);
    let _ = writeln!(out, "Executing solution with kubectl-ai...");
    let label = if entry.is_custom { "Custom solution" } else { "Solution" };
    let _ = writeln!(out, "{label}: {}", entry.step_text);
    if cfg.verbose {
        let _ = writeln!(io::stderr(), "executor: {}", truncate_display(cmdline, 200));
    }
    let _ = out.flush();
}

pub fn print_execution_result(outcome: &ExecutorOutcome, cfg: &UiConfig) {
    if outcome.success() {
        let mut out = io::stdout().lock();
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "{}",
            paint("✓ Solution executed successfully!", "32", cfg.color)
        );
        if cfg.verbose && outcome.completion == Completion::Idle {
            let _ = writeln!(
                io::stderr(),
                "executor went idle after {:.1}s and was stopped",
                outcome.elapsed.as_secs_f64()
            );
        }
        return;
    }

    let mut stderr = io::stderr().lock();
    let reason = match (outcome.completion, outcome.exit_code) {
        (Completion::HardTimeout, _) => "timed out".to_string(),
        (Completion::Interrupted, _) => "interrupted".to_string(),
        (_, Some(code)) => format!("exit code: {code}"),
        (_, None) => "terminated by signal".to_string(),
    };
    let _ = writeln!(stderr);
    let _ = writeln!(
        stderr,
        "{}",
        paint(
            &format!("✗ Error executing solution ({reason})"),
            "31",
            cfg.color && cfg.stderr_is_tty
        )
    );
    if outcome.forced_kill {
        let _ = writeln!(stderr, "the executor did not stop after SIGTERM and was killed");
    }
}

/// Shows captured output when no report could be recovered from it.
pub fn print_raw_output(stdout: &str, stderr_text: &str) {
    let mut stderr = io::stderr().lock();
    let (preamble, _) = crate::extract::split_preamble(stdout);
    let shown = if preamble.trim().is_empty() { stdout } else { preamble };
    if !shown.trim().is_empty() {
        let _ = writeln!(stderr, "Output was:");
        let _ = writeln!(stderr, "{}", shown.trim_end());
    }
    if !stderr_text.trim().is_empty() {
        let _ = writeln!(stderr, "Error output:");
        let _ = writeln!(stderr, "{}", stderr_text.trim_end());
    }
}

pub fn paint(s: &str, code: &str, color: bool) -> String {
    if !color {
        return s.to_string();
    }
    format!("\x1b[{code}m{s}\x1b[0m")
}

/// Cuts `s` to at most `max_width` display columns, marking the cut with
/// `...`.
pub fn truncate_display(s: &str, max_width: usize) -> String {
    if visible_width_ansi(s) <= max_width {
        return s.to_string();
    }
    let mut out = String::new();
    let mut width: usize = 0;
    for ch in s.chars() {
        let w = UnicodeWidthChar::width(ch).unwrap_or(0);
        if width + w > max_width {
            break;
        }
        width += w;
        out.push(ch);
    }
    out.push_str("...");
    out
}

fn visible_width_ansi(s: &str) -> usize {
    let mut width: usize = 0;
    let mut chars = s.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\x1b' && chars.peek() == Some(&'[') {
            let _ = chars.next();
            for ch2 in chars.by_ref() {
                if ch2 == 'm' {
                    break;
                }
            }
            continue;
        }
        width = width.saturating_add(UnicodeWidthChar::width(ch).unwrap_or(0));
    }
    width
}
