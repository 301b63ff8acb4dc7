use std::io::{Read, Write};
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::core::SolutionEntry;
use crate::platform::{Echo, Interrupts};

const NOT_FOUND_HINT: &str = "Please install kubectl with the kubectl-ai plugin first.";
const CHUNK_SIZE: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorCommand {
    pub program: String,
    pub subcommand: String,
    pub model: Option<String>,
}

impl ExecutorCommand {
    /// `<subcommand> [--model <name>] <prompt>`
    pub fn args(&self, prompt: &str) -> Vec<String> {
        let mut args = vec![self.subcommand.clone()];
        if let Some(model) = self.model.as_deref().filter(|m| !m.trim().is_empty()) {
            args.push("--model".to_string());
            args.push(model.to_string());
        }
        args.push(prompt.to_string());
        args
    }
}

pub fn render_prompt(entry: &SolutionEntry) -> String {
    format!(
        "Fix the following Kubernetes issue:\n\nKind: {}\nName: {}\nError: {}\n\nApply this solution: {}",
        entry.resource_kind, entry.resource_name, entry.error_text, entry.step_text
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorOptions {
    pub poll_interval: Duration,
    pub idle_timeout: Duration,
    pub hard_timeout: Duration,
    pub grace_period: Duration,
    pub join_timeout: Duration,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            idle_timeout: Duration::from_millis(3000),
            hard_timeout: Duration::from_secs(300),
            grace_period: Duration::from_millis(2000),
            join_timeout: Duration::from_millis(2000),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Completion {
    /// The executor exited on its own.
    Exited,
    /// Output went quiet for the idle timeout and the session was stopped.
    Idle,
    HardTimeout,
    Interrupted,
}

impl Completion {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exited => "exited",
            Self::Idle => "idle",
            Self::HardTimeout => "hard_timeout",
            Self::Interrupted => "interrupted",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecutorOutcome {
    pub args: Vec<String>,
    /// `None` when the executor died from a signal, including the SIGTERM
    /// sent after it went idle.
    pub exit_code: Option<i32>,
    pub completion: Completion,
    pub forced_kill: bool,
    pub elapsed: Duration,
    pub stdout: String,
    pub stderr: String,
}

impl ExecutorOutcome {
    pub fn success(&self) -> bool {
        !self.forced_kill
            && self.exit_code == Some(0)
            && matches!(self.completion, Completion::Exited | Completion::Idle)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamKind {
    Stdout,
    Stderr,
}

/// Runs the executor and decides when its interactive session is over.
///
/// The executor may keep waiting for input after it has finished, so besides
/// a normal exit the session also ends once output has been seen and then
/// stayed quiet for `idle_timeout`, or when `hard_timeout` passes.
pub fn run_until_idle(
    command: &ExecutorCommand,
    prompt: &str,
    opts: &MonitorOptions,
    echo: &dyn Echo,
    interrupts: &Interrupts,
) -> Result<ExecutorOutcome> {
    let args = command.args(prompt);
    let started = Instant::now();
    let mut child = Command::new(&command.program)
        .args(&args)
        .stdin(Stdio::inherit())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| crate::platform::spawn_error(&command.program, e, NOT_FOUND_HINT))?;
    let _guard = interrupts.track_child(child.id());

    let (tx, rx) = mpsc::channel::<(StreamKind, Vec<u8>)>();
    if let Some(stdout) = child.stdout.take() {
        spawn_chunk_reader(StreamKind::Stdout, stdout, tx.clone())?;
    }
    if let Some(stderr) = child.stderr.take() {
        spawn_chunk_reader(StreamKind::Stderr, stderr, tx.clone())?;
    }
    drop(tx);

    let mut transcript = Transcript::new(echo);
    let mut last_output: Option<Instant> = None;
    let mut streams_open = true;

    let (completion, termination) = loop {
        if streams_open {
            match rx.recv_timeout(opts.poll_interval) {
                Ok((kind, chunk)) => {
                    transcript.push(kind, &chunk);
                    last_output = Some(Instant::now());
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => streams_open = false,
            }
        } else {
            thread::sleep(opts.poll_interval);
        }

        if let Some(status) = child.try_wait().context("failed to poll executor")? {
            let completion = if interrupts.is_pending() {
                Completion::Interrupted
            } else {
                Completion::Exited
            };
            break (
                completion,
                crate::platform::Termination {
                    status,
                    forced: false,
                },
            );
        }
        if interrupts.is_pending() {
            let t = crate::platform::terminate_gracefully(&mut child, opts.grace_period)?;
            break (Completion::Interrupted, t);
        }
        if started.elapsed() >= opts.hard_timeout {
            let t = crate::platform::terminate_gracefully(&mut child, opts.grace_period)?;
            break (Completion::HardTimeout, t);
        }
        if let Some(last) = last_output {
            if last.elapsed() >= opts.idle_timeout {
                let t = crate::platform::terminate_gracefully(&mut child, opts.grace_period)?;
                break (Completion::Idle, t);
            }
        }
    };

    let deadline = Instant::now().checked_add(opts.join_timeout);
    while streams_open {
        let remaining = deadline.map_or(opts.join_timeout, |d| {
            d.saturating_duration_since(Instant::now())
        });
        match rx.recv_timeout(remaining) {
            Ok((kind, chunk)) => transcript.push(kind, &chunk),
            Err(_) => streams_open = false,
        }
    }

    let (stdout, stderr) = transcript.finish();
    Ok(ExecutorOutcome {
        args,
        exit_code: termination.status.code(),
        completion,
        forced_kill: termination.forced,
        elapsed: started.elapsed(),
        stdout,
        stderr,
    })
}

fn spawn_chunk_reader<R: Read + Send + 'static>(
    kind: StreamKind,
    reader: R,
    tx: mpsc::Sender<(StreamKind, Vec<u8>)>,
) -> Result<()> {
    let name = match kind {
        StreamKind::Stdout => "executor-stdout",
        StreamKind::Stderr => "executor-stderr",
    };
    thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            crate::platform::read_chunks(reader, CHUNK_SIZE, |chunk| {
                tx.send((kind, chunk.to_vec())).is_ok()
            });
        })
        .context("failed to spawn output reader")?;
    Ok(())
}

/// Echoes output as it arrives and keeps a copy of each stream.
struct Transcript {
    out: Box<dyn Write + Send>,
    err: Box<dyn Write + Send>,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

impl Transcript {
    fn new(echo: &dyn Echo) -> Self {
        Self {
            out: echo.stdout(),
            err: echo.stderr(),
            stdout: Vec::new(),
            stderr: Vec::new(),
        }
    }

    fn push(&mut self, kind: StreamKind, chunk: &[u8]) {
        let (sink, buf) = match kind {
            StreamKind::Stdout => (&mut self.out, &mut self.stdout),
            StreamKind::Stderr => (&mut self.err, &mut self.stderr),
        };
        let _ = sink.write_all(chunk);
        let _ = sink.flush();
        buf.extend_from_slice(chunk);
    }

    fn finish(self) -> (String, String) {
        (
            String::from_utf8_lossy(&self.stdout).to_string(),
            String::from_utf8_lossy(&self.stderr).to_string(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> SolutionEntry {
        SolutionEntry {
            id: 2,
            resource_kind: "Pod".to_string(),
            resource_name: "default/web-7d9f".to_string(),
            error_text: "Back-off restarting failed container".to_string(),
            step_text: "2. Check the container logs".to_string(),
            full_details: String::new(),
            is_custom: false,
        }
    }

    #[test]
    fn prompt_names_resource_error_and_step() {
        assert_eq!(
            render_prompt(&entry()),
            "Fix the following Kubernetes issue:\n\nKind: Pod\nName: default/web-7d9f\nError: Back-off restarting failed container\n\nApply this solution: 2. Check the container logs"
        );
    }

    #[test]
    fn args_include_model_only_when_set() {
        let mut cmd = ExecutorCommand {
            program: "kubectl".to_string(),
            subcommand: "ai".to_string(),
            model: None,
        };
        assert_eq!(cmd.args("fix it"), vec!["ai", "fix it"]);
        cmd.model = Some("gemini-2.5-pro".to_string());
        assert_eq!(
            cmd.args("fix it"),
            vec!["ai", "--model", "gemini-2.5-pro", "fix it"]
        );
        cmd.model = Some("  ".to_string());
        assert_eq!(cmd.args("fix it"), vec!["ai", "fix it"]);
    }

    #[test]
    fn success_requires_clean_completion() {
        let outcome = |exit_code, completion, forced_kill| ExecutorOutcome {
            args: vec![],
            exit_code,
            completion,
            forced_kill,
            elapsed: Duration::ZERO,
            stdout: String::new(),
            stderr: String::new(),
        };
        assert!(outcome(Some(0), Completion::Exited, false).success());
        assert!(outcome(Some(0), Completion::Idle, false).success());
        assert!(!outcome(None, Completion::Idle, false).success());
        assert!(!outcome(Some(1), Completion::Exited, false).success());
        assert!(!outcome(None, Completion::Idle, true).success());
        assert!(!outcome(Some(0), Completion::HardTimeout, false).success());
        assert!(!outcome(Some(0), Completion::Interrupted, false).success());
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use crate::platform::CaptureEcho;
        use std::os::unix::fs::PermissionsExt;
        use std::path::PathBuf;
        use std::sync::atomic::{AtomicU64, Ordering};

        fn fake_executor(body: &str) -> (PathBuf, ExecutorCommand) {
            static SEQ: AtomicU64 = AtomicU64::new(0);
            let seq = SEQ.fetch_add(1, Ordering::Relaxed);
            let dir = std::env::temp_dir().join(format!(
                "k8s2ai-executor-test-{}-{seq}",
                std::process::id()
            ));
            let _ = std::fs::remove_dir_all(&dir);
            std::fs::create_dir_all(&dir).expect("create dir");
            let path = dir.join("kubectl");
            std::fs::write(&path, format!("#!/bin/sh\n{body}")).expect("write script");
            let mut perms = std::fs::metadata(&path).expect("metadata").permissions();
            perms.set_mode(0o755);
            std::fs::set_permissions(&path, perms).expect("chmod");
            let cmd = ExecutorCommand {
                program: path.display().to_string(),
                subcommand: "ai".to_string(),
                model: None,
            };
            (dir, cmd)
        }

        fn fast_opts() -> MonitorOptions {
            MonitorOptions {
                poll_interval: Duration::from_millis(20),
                idle_timeout: Duration::from_millis(300),
                hard_timeout: Duration::from_secs(20),
                grace_period: Duration::from_millis(500),
                join_timeout: Duration::from_millis(500),
            }
        }

        #[test]
        fn idle_session_killed_by_sigterm_is_not_success() {
            let (dir, cmd) = fake_executor("printf '>>> '\nexec sleep 30\n");
            let echo = CaptureEcho::default();
            let outcome = run_until_idle(
                &cmd,
                "fix it",
                &fast_opts(),
                &echo,
                &Interrupts::detached(),
            )
            .expect("run");
            assert_eq!(outcome.completion, Completion::Idle);
            assert_eq!(outcome.exit_code, None);
            assert!(!outcome.success());
            assert!(!outcome.forced_kill);
            assert!(outcome.elapsed < Duration::from_secs(10));
            assert_eq!(echo.out.contents(), ">>> ");
            let _ = std::fs::remove_dir_all(&dir);
        }

        #[test]
        fn idle_session_exiting_zero_on_sigterm_is_success() {
            let (dir, cmd) = fake_executor(
                "trap 'echo bye; exit 0' TERM\necho hello\nwhile :; do sleep 0.1; done\n",
            );
            let echo = CaptureEcho::default();
            let outcome = run_until_idle(
                &cmd,
                "fix it",
                &fast_opts(),
                &echo,
                &Interrupts::detached(),
            )
            .expect("run");
            assert_eq!(outcome.completion, Completion::Idle);
            assert_eq!(outcome.exit_code, Some(0));
            assert!(outcome.success());
            assert_eq!(outcome.stdout, "hello\nbye\n");
            let _ = std::fs::remove_dir_all(&dir);
        }

        #[test]
        fn output_without_newlines_keeps_the_session_alive() {
            let (dir, cmd) = fake_executor(
                "echo start\ni=0\nwhile [ $i -lt 10 ]; do printf .; sleep 0.1; i=$((i+1)); done\nexit 0\n",
            );
            let echo = CaptureEcho::default();
            let outcome = run_until_idle(
                &cmd,
                "fix it",
                &fast_opts(),
                &echo,
                &Interrupts::detached(),
            )
            .expect("run");
            assert_eq!(outcome.completion, Completion::Exited);
            assert!(outcome.success());
            assert_eq!(outcome.stdout, "start\n..........");
            assert_eq!(echo.out.contents(), "start\n..........");
            let _ = std::fs::remove_dir_all(&dir);
        }

        #[test]
        fn ctrl_c_stops_the_session_as_interrupted() {
            let (dir, cmd) = fake_executor("echo working\nexec sleep 30\n");
            let mut opts = fast_opts();
            opts.idle_timeout = Duration::from_secs(20);
            let interrupts = Interrupts::detached();
            let trigger = interrupts.clone();
            let waiter = std::thread::spawn(move || {
                let started = Instant::now();
                while trigger.tracked_child().is_none() {
                    assert!(started.elapsed() < Duration::from_secs(10));
                    std::thread::sleep(Duration::from_millis(10));
                }
                std::thread::sleep(Duration::from_millis(200));
                trigger.trigger();
            });

            let outcome = run_until_idle(
                &cmd,
                "fix it",
                &opts,
                &CaptureEcho::default(),
                &interrupts,
            )
            .expect("run");
            waiter.join().expect("trigger thread");
            assert_eq!(outcome.completion, Completion::Interrupted);
            assert!(!outcome.success());
            assert!(outcome.elapsed < Duration::from_secs(10));
            assert!(interrupts.tracked_child().is_none());
            let _ = std::fs::remove_dir_all(&dir);
        }

        #[test]
        fn exit_zero_is_success_and_prompt_is_last_argument() {
            let (dir, cmd) = fake_executor("for a in \"$@\"; do last=\"$a\"; done\necho \"$1|$last\"\nexit 0\n");
            let echo = CaptureEcho::default();
            let outcome = run_until_idle(
                &cmd,
                "Apply this",
                &fast_opts(),
                &echo,
                &Interrupts::detached(),
            )
            .expect("run");
            assert_eq!(outcome.completion, Completion::Exited);
            assert!(outcome.success());
            assert_eq!(outcome.stdout, "ai|Apply this\n");
            let _ = std::fs::remove_dir_all(&dir);
        }

        #[test]
        fn non_zero_exit_is_failure() {
            let (dir, cmd) = fake_executor("echo 'cannot reach cluster' >&2\nexit 3\n");
            let echo = CaptureEcho::default();
            let outcome = run_until_idle(
                &cmd,
                "fix it",
                &fast_opts(),
                &echo,
                &Interrupts::detached(),
            )
            .expect("run");
            assert_eq!(outcome.exit_code, Some(3));
            assert!(!outcome.success());
            assert_eq!(echo.err.contents(), "cannot reach cluster\n");
            let _ = std::fs::remove_dir_all(&dir);
        }

        #[test]
        fn silent_session_hits_the_hard_ceiling() {
            let (dir, cmd) = fake_executor("exec sleep 30\n");
            let mut opts = fast_opts();
            opts.hard_timeout = Duration::from_millis(400);
            let outcome = run_until_idle(
                &cmd,
                "fix it",
                &opts,
                &CaptureEcho::default(),
                &Interrupts::detached(),
            )
            .expect("run");
            assert_eq!(outcome.completion, Completion::HardTimeout);
            assert!(!outcome.success());
            let _ = std::fs::remove_dir_all(&dir);
        }

        #[test]
        fn missing_executor_is_fatal() {
            let cmd = ExecutorCommand {
                program: "/nonexistent/k8s2ai-test/kubectl".to_string(),
                subcommand: "ai".to_string(),
                model: None,
            };
            let err = run_until_idle(
                &cmd,
                "fix it",
                &fast_opts(),
                &CaptureEcho::default(),
                &Interrupts::detached(),
            )
            .expect_err("missing");
            assert_eq!(crate::exit::exit_code(&err), 127);
        }
    }
}
