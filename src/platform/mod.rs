use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::{Child, ExitStatus};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use wait_timeout::ChildExt;

mod interrupt;

pub use interrupt::{ChildGuard, Interrupts};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Where live output from a child process is mirrored.
pub trait Echo: Send + Sync {
    fn stdout(&self) -> Box<dyn Write + Send>;
    fn stderr(&self) -> Box<dyn Write + Send>;
}

/// Mirrors child output onto this process's own stdout/stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalEcho;

impl Echo for TerminalEcho {
    fn stdout(&self) -> Box<dyn Write + Send> {
        Box::new(io::stdout())
    }

    fn stderr(&self) -> Box<dyn Write + Send> {
        Box::new(io::stderr())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Termination {
    pub status: ExitStatus,
    pub forced: bool,
}

/// Maps a spawn failure to the fatal missing-executable error when that is
/// what happened.
pub fn spawn_error(program: &str, err: io::Error, hint: &str) -> anyhow::Error {
    if err.kind() == io::ErrorKind::NotFound {
        return crate::exit::not_found(program, hint);
    }
    anyhow!(err).context(format!("failed to start process: {program}"))
}

/// Asks `child` to stop with SIGTERM, then kills it if it is still running
/// after `grace`.
pub fn terminate_gracefully(child: &mut Child, grace: Duration) -> Result<Termination> {
    send_sigterm(child);

    if let Some(status) = child
        .wait_timeout(grace)
        .context("failed to wait for process")?
    {
        return Ok(Termination {
            status,
            forced: false,
        });
    }

    let _ = child.kill();
    let status = child.wait().context("failed to wait for process")?;
    Ok(Termination {
        status,
        forced: true,
    })
}

#[cfg(unix)]
fn send_sigterm(child: &mut Child) {
    unsafe {
        libc::kill(child.id() as libc::pid_t, libc::SIGTERM);
    }
}

#[cfg(not(unix))]
fn send_sigterm(child: &mut Child) {
    let _ = child.kill();
}

pub fn effective_home_dir() -> Result<PathBuf> {
    std::env::var_os("HOME")
        .filter(|h| !h.is_empty())
        .map(PathBuf::from)
        .ok_or_else(|| anyhow!("HOME environment variable is not set"))
}

pub fn exit_code(status: &ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

/// Reads `reader` to the end in chunks of at most `chunk_size` bytes, as
/// soon as each arrives. Stops early when `on_chunk` returns false.
pub fn read_chunks<R: Read>(
    mut reader: R,
    chunk_size: usize,
    mut on_chunk: impl FnMut(&[u8]) -> bool,
) {
    let mut chunk = vec![0u8; chunk_size.max(1)];
    loop {
        let n = match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        };
        if !on_chunk(&chunk[..n]) {
            break;
        }
    }
}

pub fn format_cmdline(cmd: &str, args: &[String]) -> String {
    let mut out = String::from(cmd);
    for arg in args {
        out.push(' ');
        if arg.is_empty() || arg.contains(char::is_whitespace) {
            out.push('\'');
            out.push_str(&arg.replace('\'', r"'\''"));
            out.push('\'');
        } else {
            out.push_str(arg);
        }
    }
    out
}

/// An [`Echo`] that records everything written, for tests.
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub(crate) struct CaptureEcho {
    pub out: SharedBuffer,
    pub err: SharedBuffer,
}

#[cfg(test)]
impl Echo for CaptureEcho {
    fn stdout(&self) -> Box<dyn Write + Send> {
        Box::new(self.out.clone())
    }

    fn stderr(&self) -> Box<dyn Write + Send> {
        Box::new(self.err.clone())
    }
}

#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub(crate) struct SharedBuffer(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

#[cfg(test)]
impl SharedBuffer {
    pub fn contents(&self) -> String {
        let buf = self.0.lock().expect("lock");
        String::from_utf8_lossy(&buf).to_string()
    }
}

#[cfg(test)]
impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().expect("lock").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_error_maps_not_found() {
        let err = spawn_error(
            "k8sgpt",
            io::Error::from(io::ErrorKind::NotFound),
            "install it",
        );
        assert_eq!(crate::exit::exit_code(&err), 127);
        assert!(err.to_string().contains("k8sgpt"));

        let err = spawn_error(
            "k8sgpt",
            io::Error::from(io::ErrorKind::PermissionDenied),
            "install it",
        );
        assert_eq!(crate::exit::exit_code(&err), 1);
    }

    #[test]
    fn format_cmdline_quotes_arguments_with_spaces() {
        let args = vec![
            "ai".to_string(),
            "Fix it now".to_string(),
            "it's".to_string(),
        ];
        assert_eq!(format_cmdline("kubectl", &args), "kubectl ai 'Fix it now' it's");
    }

    #[test]
    fn read_chunks_hands_over_partial_data_and_can_stop_early() {
        let mut seen = Vec::new();
        read_chunks(io::Cursor::new(b"abcdefg".to_vec()), 3, |c| {
            seen.push(c.to_vec());
            true
        });
        assert_eq!(seen, vec![b"abc".to_vec(), b"def".to_vec(), b"g".to_vec()]);

        let mut count = 0;
        read_chunks(io::Cursor::new(b"abcdefg".to_vec()), 3, |_| {
            count += 1;
            false
        });
        assert_eq!(count, 1);
    }

    #[cfg(unix)]
    #[test]
    fn terminate_gracefully_stops_a_sleeping_child() {
        let mut child = std::process::Command::new("sleep")
            .arg("30")
            .spawn()
            .expect("spawn sleep");
        let t = terminate_gracefully(&mut child, Duration::from_secs(5)).expect("terminate");
        assert!(!t.forced);
        use std::os::unix::process::ExitStatusExt;
        assert_eq!(t.status.signal(), Some(libc::SIGTERM));
        assert_eq!(t.status.code(), None);
    }

    #[cfg(unix)]
    #[test]
    fn terminate_gracefully_kills_a_child_ignoring_sigterm() {
        let mut child = std::process::Command::new("sh")
            .args(["-c", "trap '' TERM; while :; do sleep 1; done"])
            .spawn()
            .expect("spawn sh");
        std::thread::sleep(Duration::from_millis(200));
        let t = terminate_gracefully(&mut child, Duration::from_millis(300)).expect("terminate");
        assert!(t.forced);
        assert!(!t.status.success());
    }
}
