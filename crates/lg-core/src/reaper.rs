//! Forced teardown of probe processes after stream completion.
//!
//! Runs unconditionally on every dispatch exit path. The probe tool
//! may fork helper workers (mtr does), so signals go to the process
//! group the runner created at spawn time; signaling and group
//! membership are atomic with respect to our own process table, unlike
//! enumerating children through an external utility.

use crate::runner::ProcessHandle;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// Grace period between SIGTERM and SIGKILL in milliseconds.
const TERM_GRACE_MS: u64 = 500;

/// What the reaper had to do to get the process tree down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReapOutcome {
    /// Process had already exited when the streams were drained.
    AlreadyExited,
    /// Process group exited after SIGTERM.
    Terminated,
    /// Process group required SIGKILL escalation.
    Killed,
}

/// Reaps a probe process and its descendants.
#[derive(Debug, Clone)]
pub struct ProcessReaper {
    term_grace_ms: u64,
}

impl Default for ProcessReaper {
    fn default() -> Self {
        Self {
            term_grace_ms: TERM_GRACE_MS,
        }
    }
}

impl ProcessReaper {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    fn with_grace_ms(term_grace_ms: u64) -> Self {
        Self { term_grace_ms }
    }

    /// Tear down the process tree behind `handle` and collect its exit
    /// status. Idempotent; safe to call on an already-exited process.
    ///
    /// A process still running here outlived its output stream; that
    /// is corrected silently but logged for operational visibility.
    pub fn reap(&self, handle: &mut ProcessHandle) -> ReapOutcome {
        let pid = handle.pid();
        match handle.try_wait() {
            Ok(Some(status)) => {
                debug!(pid, ?status, "probe process already exited");
                // Stragglers in the group die with their leader's group id.
                signal_group(pid, ForceKind::Kill);
                ReapOutcome::AlreadyExited
            }
            Ok(None) => {
                warn!(pid, "probe process still running after stream end; terminating group");
                self.kill_group(handle)
            }
            Err(e) => {
                warn!(pid, error = %e, "could not query probe process; terminating group");
                self.kill_group(handle)
            }
        }
    }

    /// SIGTERM the group, grace, escalate to SIGKILL, then collect.
    fn kill_group(&self, handle: &mut ProcessHandle) -> ReapOutcome {
        let pid = handle.pid();
        signal_group(pid, ForceKind::Term);
        thread::sleep(Duration::from_millis(self.term_grace_ms));

        let outcome = match handle.try_wait() {
            Ok(Some(_)) => {
                debug!(pid, "probe group exited after SIGTERM");
                // Catch workers that ignored SIGTERM.
                signal_group(pid, ForceKind::Kill);
                ReapOutcome::Terminated
            }
            _ => {
                warn!(pid, "probe group survived SIGTERM; sending SIGKILL");
                signal_group(pid, ForceKind::Kill);
                ReapOutcome::Killed
            }
        };
        if let Err(e) = handle.wait() {
            warn!(pid, error = %e, "failed to collect probe exit status");
        }
        outcome
    }
}

#[derive(Debug, Clone, Copy)]
enum ForceKind {
    Term,
    Kill,
}

/// Signal every member of the probe's process group.
#[cfg(unix)]
fn signal_group(pid: u32, kind: ForceKind) {
    let signal = match kind {
        ForceKind::Term => libc::SIGTERM,
        ForceKind::Kill => libc::SIGKILL,
    };
    let rc = unsafe { libc::kill(-(pid as i32), signal) };
    if rc != 0 {
        let err = std::io::Error::last_os_error();
        // ESRCH means the whole group is gone already.
        if err.raw_os_error() != Some(libc::ESRCH) {
            warn!(pid, signal, error = %err, "failed to signal probe group");
        }
    }
}

#[cfg(not(unix))]
fn signal_group(_pid: u32, _kind: ForceKind) {}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::runner::{CommandSpec, ProcessRunner};

    fn group_is_gone(pid: u32) -> bool {
        unsafe { libc::kill(-(pid as i32), 0) != 0 }
    }

    #[test]
    fn test_reap_exited_process() {
        let runner = ProcessRunner::new();
        let mut handle = runner
            .spawn(&CommandSpec {
                program: "true".into(),
                args: vec![],
            })
            .unwrap();
        // Give it a moment to exit on its own.
        std::thread::sleep(Duration::from_millis(100));
        let outcome = ProcessReaper::new().reap(&mut handle);
        assert_eq!(outcome, ReapOutcome::AlreadyExited);
        assert!(!handle.is_alive());
    }

    #[test]
    fn test_reap_running_process() {
        let runner = ProcessRunner::new();
        let mut handle = runner
            .spawn(&CommandSpec {
                program: "sleep".into(),
                args: vec!["30".into()],
            })
            .unwrap();
        let pid = handle.pid();
        let outcome = ProcessReaper::new().reap(&mut handle);
        assert_ne!(outcome, ReapOutcome::AlreadyExited);
        assert!(!handle.is_alive());
        assert!(group_is_gone(pid), "group for pid {pid} still alive");
    }

    #[test]
    fn test_reap_process_with_children() {
        // sh forks a grandchild sleeping in the same group.
        let runner = ProcessRunner::new();
        let mut handle = runner
            .spawn(&CommandSpec {
                program: "sh".into(),
                args: vec!["-c".into(), "sleep 30 & sleep 30".into()],
            })
            .unwrap();
        let pid = handle.pid();
        std::thread::sleep(Duration::from_millis(100));
        let outcome = ProcessReaper::new().reap(&mut handle);
        assert_ne!(outcome, ReapOutcome::AlreadyExited);
        assert!(
            group_is_gone(pid),
            "grandchildren of pid {pid} still running"
        );
    }

    #[test]
    fn test_sigterm_immune_process_gets_killed() {
        let runner = ProcessRunner::new();
        let mut handle = runner
            .spawn(&CommandSpec {
                program: "sh".into(),
                args: vec!["-c".into(), "trap '' TERM; sleep 30".into()],
            })
            .unwrap();
        let pid = handle.pid();
        // Let the trap install before we start signaling.
        std::thread::sleep(Duration::from_millis(200));
        let outcome = ProcessReaper::with_grace_ms(100).reap(&mut handle);
        assert_eq!(outcome, ReapOutcome::Killed);
        assert!(group_is_gone(pid));
    }
}
