//! Probe command construction and process spawning.
//!
//! Commands are built as literal argument vectors; the validated
//! target is always appended as a single discrete argument and is
//! never interpreted by a shell. Each probe process is started as the
//! leader of its own session/process group so that teardown can signal
//! the whole tree atomically, including tool-spawned workers.

use lg_common::{Error, ProbeKind, Result};
use lg_config::ToolPaths;
use std::net::IpAddr;
use std::process::{Child, ChildStderr, ChildStdout, Command, ExitStatus, Stdio};
use tracing::{debug, error};

/// A fully built probe invocation: program plus discrete arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    /// Build the argument vector for a probe kind.
    ///
    /// `source` is the egress link's source address for the kind's
    /// family; v4 variants bind to it when present, v6 variants run
    /// unbound.
    pub fn for_probe(
        kind: ProbeKind,
        target: &str,
        source: Option<IpAddr>,
        tools: &ToolPaths,
    ) -> Self {
        let program = tools.for_tool(kind.tool()).to_string();
        let mut args: Vec<String> = Vec::new();
        match kind {
            ProbeKind::Ping => {
                if let Some(src) = source {
                    args.push("-I".into());
                    args.push(src.to_string());
                }
                args.extend(["-c", "4", "-w", "15"].map(String::from));
            }
            ProbeKind::Ping6 => {
                args.extend(["-6", "-c", "4", "-w", "15"].map(String::from));
            }
            ProbeKind::Mtr => {
                args.push("-4".into());
                if let Some(src) = source {
                    args.push("-a".into());
                    args.push(src.to_string());
                }
                args.extend(["--report", "--report-wide"].map(String::from));
            }
            ProbeKind::Mtr6 => {
                args.extend(["-6", "--report", "--report-wide"].map(String::from));
            }
            ProbeKind::Traceroute => {
                args.push("-4".into());
                if let Some(src) = source {
                    args.push("-s".into());
                    args.push(src.to_string());
                }
                args.extend(["-w", "2"].map(String::from));
            }
            ProbeKind::Traceroute6 => {
                args.extend(["-6", "-w", "2"].map(String::from));
            }
        }
        args.push(target.to_string());
        Self { program, args }
    }

    /// One-line rendering for logs.
    pub fn display(&self) -> String {
        let mut out = self.program.clone();
        for arg in &self.args {
            out.push(' ');
            out.push_str(arg);
        }
        out
    }
}

/// Handle to a running probe process.
///
/// Exclusively owned by the dispatch call that spawned it. Drop is a
/// last-resort group kill; ordinary paths go through the reaper.
#[derive(Debug)]
pub struct ProcessHandle {
    pid: u32,
    child: Child,
}

impl ProcessHandle {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Take ownership of the stdout pipe. Yields `Some` once.
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    /// Take ownership of the stderr pipe. Yields `Some` once.
    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.child.stderr.take()
    }

    /// Non-blocking liveness probe.
    pub fn try_wait(&mut self) -> std::io::Result<Option<ExitStatus>> {
        self.child.try_wait()
    }

    /// Block until the direct child exits.
    pub fn wait(&mut self) -> std::io::Result<ExitStatus> {
        self.child.wait()
    }

    /// True while the direct child has not been collected.
    pub fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            #[cfg(unix)]
            {
                // Whole group: the tool may have forked workers.
                unsafe {
                    libc::kill(-(self.pid as i32), libc::SIGKILL);
                }
            }
            #[cfg(not(unix))]
            {
                let _ = self.child.kill();
            }
            let _ = self.child.wait();
        }
    }
}

/// Spawns probe processes with piped output and a scrubbed environment.
#[derive(Debug, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }

    /// Spawn a probe process.
    ///
    /// stdin is closed immediately; stdout and stderr are piped back
    /// to the caller. Spawn failure (binary missing, resource
    /// exhaustion) is surfaced as [`Error::Spawn`] and never retried.
    pub fn spawn(&self, spec: &CommandSpec) -> Result<ProcessHandle> {
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        command.env_clear();
        if let Ok(path) = std::env::var("PATH") {
            command.env("PATH", path);
        }
        // The stderr mismatch scan matches English tool messages.
        command.env("LC_ALL", "C");
        command.env("LANG", "C");

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // SAFETY: setsid is async-signal-safe and runs in the child
            // between fork and exec.
            unsafe {
                command.pre_exec(|| {
                    libc::setsid();
                    Ok(())
                });
            }
        }

        let child = command.spawn().map_err(|e| {
            error!(command = %spec.program, error = %e, "failed to spawn probe process");
            Error::Spawn {
                command: spec.program.clone(),
                reason: e.to_string(),
            }
        })?;
        let pid = child.id();
        debug!(pid, command = %spec.display(), "spawned probe process");
        Ok(ProcessHandle { pid, child })
    }
}
