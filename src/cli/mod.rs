use std::io;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use clap::error::ErrorKind;
use time::OffsetDateTime;

use crate::core::{DiagnosticReport, SolutionEntry};
use crate::executor::Completion;
use crate::platform::{Interrupts, TerminalEcho};
use crate::selection::SolutionIndex;
use crate::ui::UiConfig;

mod interactive;

pub const DEFAULT_DIAGNOSTIC_ARGS: [&str; 2] = ["analyze", "--explain"];
pub const EXPLAIN_FLAG: &str = "--explain";

/// Flags handled locally. Every other argument is forwarded to the
/// diagnostic tool.
#[derive(Debug, Parser)]
#[command(
    name = "k8s2ai",
    version,
    about = "Analyze Kubernetes issues with k8sgpt and execute solutions via kubectl-ai",
    after_help = "Any other arguments are passed to k8sgpt (default: analyze --explain)."
)]
pub struct Cli {
    /// Automatically select solution N without prompting
    #[arg(long, value_name = "N")]
    pub auto_select: Option<i64>,
    /// Print the JSON report from k8sgpt and exit
    #[arg(long)]
    pub json_output: bool,
    /// Model passed to kubectl-ai
    #[arg(long)]
    pub model: Option<String>,
    #[arg(long = "no-color")]
    pub no_color: bool,
    #[arg(long)]
    pub verbose: bool,
    #[arg(long)]
    pub config: Option<PathBuf>,
}

const VALUE_FLAGS: [&str; 3] = ["--auto-select", "--model", "--config"];
const SWITCH_FLAGS: [&str; 6] = [
    "--json-output",
    "--no-color",
    "--verbose",
    "--help",
    "-h",
    "--version",
];

/// Splits argv into local flags and arguments for the diagnostic tool.
/// Local flags that take a value come back in `--flag=value` form; a `--`
/// ends local parsing and everything after it is forwarded.
pub fn partition_args(argv: &[String]) -> (Vec<String>, Vec<String>) {
    let mut local = Vec::new();
    let mut forwarded = Vec::new();
    let mut iter = argv.iter();
    while let Some(arg) = iter.next() {
        if arg == "--" {
            forwarded.extend(iter.by_ref().cloned());
            break;
        }
        if SWITCH_FLAGS.contains(&arg.as_str()) {
            local.push(arg.clone());
            continue;
        }
        if VALUE_FLAGS.contains(&arg.as_str()) {
            match iter.next() {
                Some(value) => local.push(format!("{arg}={value}")),
                None => local.push(arg.clone()),
            }
            continue;
        }
        let is_inline_value = arg
            .split_once('=')
            .is_some_and(|(flag, _)| VALUE_FLAGS.contains(&flag));
        if is_inline_value {
            local.push(arg.clone());
            continue;
        }
        forwarded.push(arg.clone());
    }
    (local, forwarded)
}

const ANALYZE_COMMANDS: [&str; 2] = ["analyze", "analyse"];

/// k8sgpt subcommands that do not produce a report.
const PASSTHROUGH_COMMANDS: [&str; 11] = [
    "auth",
    "cache",
    "completion",
    "custom-analyzer",
    "dump",
    "filters",
    "generate",
    "help",
    "integration",
    "serve",
    "version",
];

/// Structured output is requested unless the arguments name a k8sgpt
/// subcommand that does not produce a report and do not name `analyze`.
/// Flag values are not told apart from subcommands, so `analyze` anywhere
/// keeps the run structured.
pub fn needs_structured_output(args: &[String]) -> bool {
    if args.iter().any(|a| ANALYZE_COMMANDS.contains(&a.as_str())) {
        return true;
    }
    !args
        .iter()
        .any(|a| PASSTHROUGH_COMMANDS.contains(&a.as_str()))
}

pub fn run() -> Result<i32> {
    let argv: Vec<String> = std::env::args().skip(1).collect();
    let (local, forwarded) = partition_args(&argv);

    let cli = match Cli::try_parse_from(std::iter::once("k8s2ai".to_string()).chain(local)) {
        Ok(cli) => cli,
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            err.print()?;
            return Ok(0);
        }
        Err(err) => {
            return Err(crate::exit::invalid_args(err.to_string().trim_end().to_string()));
        }
    };

    let stdout_is_tty = io::stdout().is_terminal();
    let stderr_is_tty = io::stderr().is_terminal();

    let home_dir = crate::platform::effective_home_dir()?;

    let mut cfg = crate::config::load(cli.config.as_deref(), &home_dir)
        .map_err(crate::exit::invalid_args_err)?;
    if let Some(model) = cli.model.as_deref().map(str::trim).filter(|m| !m.is_empty()) {
        cfg.executor.model = Some(model.to_string());
    }

    let ui_cfg = UiConfig {
        color: stdout_is_tty && cfg.ui.color && !cli.no_color,
        stderr_is_tty,
        verbose: cli.verbose,
    };

    if cli.verbose {
        match &cfg.config_path {
            Some(path) => eprintln!("config: {path}"),
            None => eprintln!("config: defaults (no config file)"),
        }
    }

    let interrupts = Interrupts::install()?;

    let args: Vec<String> = if forwarded.is_empty() {
        DEFAULT_DIAGNOSTIC_ARGS.iter().map(|s| s.to_string()).collect()
    } else {
        forwarded
    };
    let structured = needs_structured_output(&args);

    let started_at = OffsetDateTime::now_utc();
    let diag_opts = cfg.diagnostic_options(cli.verbose);
    let diag = crate::diagnostic::run_diagnostic(&diag_opts, &args, structured, &TerminalEcho, &interrupts)?;
    if cli.verbose {
        for attempt in &diag.attempts {
            eprintln!(
                "attempt: {} -> exit {}",
                crate::platform::format_cmdline(&diag_opts.program, &attempt.args),
                attempt.exit_code
            );
        }
    }
    let tool_code = diag.exit_code();

    if !structured {
        return Ok(tool_code);
    }

    let value = match crate::extract::extract_json(&diag.output.stdout) {
        Ok(value) => value,
        Err(err) => {
            crate::ui::print_raw_output(&diag.output.stdout, &diag.output.stderr);
            if tool_code != 0 {
                return Err(crate::exit::tool_failed(
                    tool_code,
                    format!("{} exited with code {tool_code}", diag_opts.program),
                ));
            }
            return Err(crate::exit::malformed_output(format!(
                "could not read the {} report: {err}",
                diag_opts.program
            )));
        }
    };

    if cli.json_output {
        write_json(&value)?;
        return Ok(tool_code);
    }

    let report = DiagnosticReport::from_value(&value);
    if !report.has_problems() {
        crate::ui::print_no_problems(&ui_cfg);
        return Ok(tool_code);
    }

    let entries = crate::solutions::decompose(&report);
    if entries.is_empty() {
        crate::ui::print_no_solutions();
        return Ok(tool_code);
    }

    let index = SolutionIndex::group(entries);
    crate::ui::print_solutions(&index, &ui_cfg);

    if !args.iter().any(|a| a == EXPLAIN_FLAG) {
        if cli.auto_select.is_some() {
            eprintln!("Note: --auto-select requires --explain flag to execute solutions.");
        }
        crate::ui::print_explain_hint();
        return Ok(tool_code);
    }

    let selected = match cli.auto_select {
        Some(n) => Some(
            index
                .select_auto(n)
                .map_err(|e| crate::exit::selection(e.to_string()))?
                .clone(),
        ),
        None => {
            let mut input = interactive::TerminalInput::new(interrupts.clone());
            let mut prompt_out = io::stderr();
            interactive::select_interactively(
                &index,
                &mut input,
                &mut prompt_out,
                ui_cfg.stderr_is_tty && cfg.ui.color && !cli.no_color,
            )?
        }
    };

    let Some(entry) = selected else {
        println!("No solution selected. Exiting.");
        return Ok(0);
    };

    execute_solution(
        &cfg,
        &ui_cfg,
        &home_dir,
        &interrupts,
        started_at,
        crate::logs::DiagnosticTrail {
            cmd: &diag_opts.program,
            attempts: &diag.attempts,
        },
        &entry,
    )
}

fn execute_solution(
    cfg: &crate::config::EffectiveConfig,
    ui_cfg: &UiConfig,
    home_dir: &std::path::Path,
    interrupts: &Interrupts,
    started_at: OffsetDateTime,
    trail: crate::logs::DiagnosticTrail<'_>,
    entry: &SolutionEntry,
) -> Result<i32> {
    let command = cfg.executor_command();
    let prompt = crate::executor::render_prompt(entry);
    let cmdline = crate::platform::format_cmdline(&command.program, &command.args(&prompt));
    crate::ui::print_execution_start(entry, &cmdline, ui_cfg);

    let outcome = crate::executor::run_until_idle(
        &command,
        &prompt,
        &cfg.monitor_options(),
        &TerminalEcho,
        interrupts,
    )?;
    let interrupted = interrupts.take() || outcome.completion == Completion::Interrupted;

    if ui_cfg.verbose {
        eprintln!(
            "executor finished: {} after {:.1}s",
            outcome.completion.as_str(),
            outcome.elapsed.as_secs_f64()
        );
    }

    if cfg.log.enabled {
        match crate::logs::write_solution_run_log(
            home_dir,
            started_at,
            OffsetDateTime::now_utc(),
            trail,
            entry,
            &command.program,
            &outcome,
        ) {
            Ok(path) => {
                if ui_cfg.verbose {
                    eprintln!("log: {}", path.display());
                }
            }
            Err(err) => eprintln!("warning: failed to write log: {err:#}"),
        }
    }

    crate::ui::print_execution_result(&outcome, ui_cfg);
    if interrupted {
        return Err(crate::exit::interrupted());
    }
    Ok(if outcome.success() { 0 } else { 1 })
}

fn write_json(value: &serde_json::Value) -> Result<()> {
    use std::io::Write;

    let mut buf = serde_json::to_vec_pretty(value)?;
    buf.push(b'\n');

    let mut stdout = std::io::stdout().lock();
    match stdout.write_all(&buf) {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::BrokenPipe => return Ok(()),
        Err(err) => return Err(err.into()),
    }
    Ok(())
}
