use std::io::{Read, Write};
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use wait_timeout::ChildExt;

use crate::platform::{CommandOutput, Echo, Interrupts};

pub const OUTPUT_FLAG: &str = "--output";
pub const OUTPUT_FLAG_SHORT: &str = "-o";
pub const CHUNK_SIZE: usize = 4096;

const NOT_FOUND_HINT: &str = "Please install k8sgpt first.";

#[derive(Debug, Clone)]
pub struct DiagnosticOptions {
    pub program: String,
    pub timeout: Duration,
    pub join_timeout: Duration,
    pub verbose: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attempt {
    pub args: Vec<String>,
    pub exit_code: i32,
}

#[derive(Debug, Clone)]
pub struct DiagnosticRun {
    pub output: CommandOutput,
    pub attempts: Vec<Attempt>,
}

impl DiagnosticRun {
    pub fn exit_code(&self) -> i32 {
        self.output.exit_code
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EchoMode {
    /// Echo until the first `{` in the cumulative stream.
    UntilJsonBoundary,
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamKind {
    Stdout,
    Stderr,
}

/// What a drain thread reports to the coordinator.
#[derive(Debug)]
enum Drained {
    Chunk(StreamKind, Vec<u8>),
    Closed,
}

/// Whether `args` already choose an output format.
pub fn has_output_flag(args: &[String]) -> bool {
    args.iter().any(|a| {
        a == OUTPUT_FLAG
            || a == OUTPUT_FLAG_SHORT
            || a.starts_with("--output=")
            || a.starts_with("-o=")
    })
}

/// Adds `--output json` unless a format was given. The flag is reported as
/// synthesized only when it was added here.
pub fn structured_args(args: &[String]) -> (Vec<String>, bool) {
    if has_output_flag(args) {
        return (args.to_vec(), false);
    }
    let mut out = args.to_vec();
    out.push(OUTPUT_FLAG.to_string());
    out.push("json".to_string());
    (out, true)
}

/// Runs the diagnostic tool.
///
/// With `need_structured`, both streams are captured and echoed live, and a
/// failure under a synthesized `--output json` is retried once with `args`
/// as given. Without it the tool inherits this process's streams and the
/// returned buffers are empty.
pub fn run_diagnostic(
    opts: &DiagnosticOptions,
    args: &[String],
    need_structured: bool,
    echo: &dyn Echo,
    interrupts: &Interrupts,
) -> Result<DiagnosticRun> {
    if !need_structured {
        let exit_code = run_passthrough(opts, args, interrupts)?;
        return Ok(DiagnosticRun {
            output: CommandOutput {
                exit_code,
                ..CommandOutput::default()
            },
            attempts: vec![Attempt {
                args: args.to_vec(),
                exit_code,
            }],
        });
    }

    let (first_args, synthesized) = structured_args(args);
    announce(&opts.program, &first_args, "Running");
    let output = run_streaming(opts, &first_args, echo, interrupts)?;
    let mut attempts = vec![Attempt {
        args: first_args,
        exit_code: output.exit_code,
    }];

    if output.exit_code == 0 || !synthesized {
        return Ok(DiagnosticRun { output, attempts });
    }

    if opts.verbose {
        eprintln!(
            "diagnostic exited with {} under --output json; retrying once",
            output.exit_code
        );
    }
    announce(&opts.program, args, "Retrying without --output json");
    let retry = run_streaming(opts, args, echo, interrupts)?;
    attempts.push(Attempt {
        args: args.to_vec(),
        exit_code: retry.exit_code,
    });
    Ok(DiagnosticRun {
        output: retry,
        attempts,
    })
}

fn announce(program: &str, args: &[String], label: &str) {
    eprintln!(
        "{label}: {}",
        crate::platform::format_cmdline(program, args)
    );
}

fn run_passthrough(opts: &DiagnosticOptions, args: &[String], interrupts: &Interrupts) -> Result<i32> {
    let mut child = Command::new(&opts.program)
        .args(args)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|e| crate::platform::spawn_error(&opts.program, e, NOT_FOUND_HINT))?;
    let _guard = interrupts.track_child(child.id());

    let status = match child
        .wait_timeout(opts.timeout)
        .with_context(|| format!("failed to wait for process: {}", opts.program))?
    {
        Some(status) => status,
        None => {
            let _ = crate::platform::terminate_gracefully(&mut child, Duration::from_secs(2));
            return Err(anyhow!("timed out ({:?}): {}", opts.timeout, opts.program));
        }
    };
    if interrupts.take() {
        return Err(crate::exit::interrupted());
    }
    Ok(crate::platform::exit_code(&status))
}

/// One captured invocation: both pipes drained concurrently in chunks,
/// stdout echoed up to the JSON boundary, stderr echoed throughout.
pub fn run_streaming(
    opts: &DiagnosticOptions,
    args: &[String],
    echo: &dyn Echo,
    interrupts: &Interrupts,
) -> Result<CommandOutput> {
    let mut child = Command::new(&opts.program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| crate::platform::spawn_error(&opts.program, e, NOT_FOUND_HINT))?;
    let _guard = interrupts.track_child(child.id());

    let (tx, rx) = mpsc::channel::<Drained>();
    let mut open_streams = 0;
    if let Some(stdout) = child.stdout.take() {
        spawn_drain(
            StreamKind::Stdout,
            stdout,
            echo.stdout(),
            EchoMode::UntilJsonBoundary,
            tx.clone(),
        )?;
        open_streams += 1;
    }
    if let Some(stderr) = child.stderr.take() {
        spawn_drain(
            StreamKind::Stderr,
            stderr,
            echo.stderr(),
            EchoMode::Always,
            tx.clone(),
        )?;
        open_streams += 1;
    }
    drop(tx);

    let status = match child
        .wait_timeout(opts.timeout)
        .with_context(|| format!("failed to wait for process: {}", opts.program))?
    {
        Some(status) => status,
        None => {
            let _ = crate::platform::terminate_gracefully(&mut child, Duration::from_secs(2));
            return Err(anyhow!("timed out ({:?}): {}", opts.timeout, opts.program));
        }
    };

    // Chunks are appended as they come so a pipe held open by a grandchild
    // still leaves everything received before the deadline.
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let deadline = Instant::now().checked_add(opts.join_timeout);
    while open_streams > 0 {
        let msg = match deadline {
            Some(deadline) => rx.recv_timeout(deadline.saturating_duration_since(Instant::now())),
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        match msg {
            Ok(Drained::Chunk(StreamKind::Stdout, bytes)) => stdout.extend_from_slice(&bytes),
            Ok(Drained::Chunk(StreamKind::Stderr, bytes)) => stderr.extend_from_slice(&bytes),
            Ok(Drained::Closed) => open_streams -= 1,
            Err(RecvTimeoutError::Timeout) => {
                if opts.verbose {
                    eprintln!(
                        "output streams of {} did not close within {:?}; using what was received",
                        opts.program, opts.join_timeout
                    );
                }
                break;
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    if interrupts.take() {
        return Err(crate::exit::interrupted());
    }

    Ok(CommandOutput {
        exit_code: crate::platform::exit_code(&status),
        stdout: String::from_utf8_lossy(&stdout).to_string(),
        stderr: String::from_utf8_lossy(&stderr).to_string(),
    })
}

fn spawn_drain<R: Read + Send + 'static>(
    kind: StreamKind,
    reader: R,
    echo: Box<dyn Write + Send>,
    mode: EchoMode,
    tx: mpsc::Sender<Drained>,
) -> Result<()> {
    let name = match kind {
        StreamKind::Stdout => "diagnostic-stdout",
        StreamKind::Stderr => "diagnostic-stderr",
    };
    thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            drain_chunks(reader, echo, mode, CHUNK_SIZE, |bytes| {
                tx.send(Drained::Chunk(kind, bytes.to_vec())).is_ok()
            });
            let _ = tx.send(Drained::Closed);
        })
        .context("failed to spawn output reader")?;
    Ok(())
}

/// Reads `reader` to the end in fixed-size chunks, mirroring to `echo` per
/// `mode` and handing every chunk to `forward` in order. Stops early when
/// `forward` returns false.
pub fn drain_chunks<R: Read>(
    reader: R,
    mut echo: Box<dyn Write + Send>,
    mode: EchoMode,
    chunk_size: usize,
    mut forward: impl FnMut(&[u8]) -> bool,
) {
    let mut echoing = true;
    crate::platform::read_chunks(reader, chunk_size, |bytes| {
        if echoing {
            let visible = match mode {
                EchoMode::Always => bytes,
                EchoMode::UntilJsonBoundary => match bytes.iter().position(|b| *b == b'{') {
                    Some(idx) => {
                        echoing = false;
                        &bytes[..idx]
                    }
                    None => bytes,
                },
            };
            if !visible.is_empty() {
                let _ = echo.write_all(visible);
                let _ = echo.flush();
            }
        }
        forward(bytes)
    });
}
