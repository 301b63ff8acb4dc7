use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};

use anyhow::{Context, Result};

#[derive(Debug, Default)]
struct InterruptState {
    pending: AtomicBool,
    child_pid: AtomicU32,
}

/// Ctrl-C bookkeeping shared between the signal handler and the run.
///
/// The handler records the interrupt and forwards SIGINT to the tracked
/// child, so a wedged child is never left running behind an interrupted run.
#[derive(Debug, Clone, Default)]
pub struct Interrupts {
    state: Arc<InterruptState>,
}

static INSTALLED: OnceLock<Interrupts> = OnceLock::new();

impl Interrupts {
    /// A handle not wired to any signal handler.
    pub fn detached() -> Self {
        Self::default()
    }

    /// Installs the process-wide Ctrl-C handler once and returns its handle.
    pub fn install() -> Result<Self> {
        if let Some(existing) = INSTALLED.get() {
            return Ok(existing.clone());
        }
        let interrupts = Self::default();
        let handler = interrupts.clone();
        ctrlc::set_handler(move || handler.trigger()).context("failed to set Ctrl-C handler")?;
        Ok(INSTALLED.get_or_init(|| interrupts).clone())
    }

    /// Records an interrupt and forwards it to the tracked child, if any.
    pub fn trigger(&self) {
        self.state.pending.store(true, Ordering::SeqCst);
        let pid = self.state.child_pid.load(Ordering::SeqCst);
        if pid != 0 {
            forward_sigint(pid);
        }
    }

    pub fn is_pending(&self) -> bool {
        self.state.pending.load(Ordering::SeqCst)
    }

    /// Clears and returns the pending flag.
    pub fn take(&self) -> bool {
        self.state.pending.swap(false, Ordering::SeqCst)
    }

    /// Tracks `pid` as the forwarding target until the guard drops.
    pub fn track_child(&self, pid: u32) -> ChildGuard {
        self.state.child_pid.store(pid, Ordering::SeqCst);
        ChildGuard {
            state: self.state.clone(),
        }
    }

    pub fn tracked_child(&self) -> Option<u32> {
        match self.state.child_pid.load(Ordering::SeqCst) {
            0 => None,
            pid => Some(pid),
        }
    }
}

pub struct ChildGuard {
    state: Arc<InterruptState>,
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        self.state.child_pid.store(0, Ordering::SeqCst);
    }
}

#[cfg(unix)]
fn forward_sigint(pid: u32) {
    unsafe {
        libc::kill(pid as libc::pid_t, libc::SIGINT);
    }
}

#[cfg(not(unix))]
fn forward_sigint(_pid: u32) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_clears_pending() {
        let interrupts = Interrupts::detached();
        assert!(!interrupts.take());
        interrupts.trigger();
        assert!(interrupts.is_pending());
        assert!(interrupts.take());
        assert!(!interrupts.is_pending());
    }

    #[test]
    fn child_guard_untracks_on_drop() {
        let interrupts = Interrupts::detached();
        {
            let _guard = interrupts.track_child(424_242);
            assert_eq!(interrupts.tracked_child(), Some(424_242));
        }
        assert_eq!(interrupts.tracked_child(), None);
    }
}
