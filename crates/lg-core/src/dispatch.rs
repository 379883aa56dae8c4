//! Request orchestration: validate, spawn, stream, reap.
//!
//! One dispatch call owns one probe process and its pipes from spawn
//! to teardown. The calling thread blocks on the tool's output;
//! forward progress depends on the tool producing output or exiting
//! (per-hop timeouts are baked into the spawned command). Hosts that
//! want a hard wall-clock cap wrap the dispatch in an external
//! deadline and invoke the reaper directly on expiry.

use crate::reaper::ProcessReaper;
use crate::runner::{CommandSpec, ProcessHandle, ProcessRunner};
use crate::transform::{OutputLine, OutputTransformer, StreamVerdict, MAX_LINE_BYTES};
use crate::validate;
use lg_common::{Error, ProbeRequest, Result};
use lg_config::Settings;
use std::io::BufRead;
use std::io::BufReader;
use tracing::{debug, info, info_span};
use uuid::Uuid;

/// Terminal status of one probe dispatch.
///
/// Mismatch and early-abort are diagnostic conclusions, not faults;
/// only validation and spawn problems surface as errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeStatus {
    /// Tool ran to completion.
    Completed,
    /// Trace cut short after repeated consecutive timeouts.
    AbortedTimeouts,
    /// Target does not exist in the requested family; rejection
    /// sentinel emitted.
    Rejected,
}

impl std::fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeStatus::Completed => write!(f, "completed"),
            ProbeStatus::AbortedTimeouts => write!(f, "aborted"),
            ProbeStatus::Rejected => write!(f, "rejected"),
        }
    }
}

/// Caller seam for delivered lines.
///
/// Each delivery is one chunk-padded line; implementations must hand
/// it on immediately (flush-per-line) so a live client display updates
/// incrementally. There is no end-of-stream buffering.
pub trait LineSink {
    fn deliver(&mut self, line: &OutputLine) -> std::io::Result<()>;
}

/// Collecting sink for tests and embedding hosts.
impl LineSink for Vec<OutputLine> {
    fn deliver(&mut self, line: &OutputLine) -> std::io::Result<()> {
        self.push(line.clone());
        Ok(())
    }
}

/// Maps validated requests to probe invocations and supervises one
/// execution end to end.
#[derive(Debug)]
pub struct ProbeDispatcher {
    settings: Settings,
    runner: ProcessRunner,
    reaper: ProcessReaper,
}

impl ProbeDispatcher {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            runner: ProcessRunner::new(),
            reaper: ProcessReaper::new(),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Execute one probe request, delivering transformed lines to
    /// `sink` as they are produced.
    ///
    /// The spawned process and any descendants are torn down before
    /// this returns, on every path.
    pub fn run(&self, request: &ProbeRequest, sink: &mut dyn LineSink) -> Result<ProbeStatus> {
        let run_id = Uuid::new_v4();
        let span = info_span!("probe", run = %run_id, kind = %request.kind, link = request.link);
        let _guard = span.enter();

        if !self.settings.allows(request.kind) {
            return Err(Error::KindNotAllowed(request.kind.to_string()));
        }
        let link = self
            .settings
            .link(request.link)
            .ok_or(Error::UnknownLink(request.link))?;

        // No target string reaches command construction unvalidated.
        let family = request.kind.family();
        let target = validate::validate_target(&request.target, family)?;

        let spec = CommandSpec::for_probe(
            request.kind,
            &target,
            link.source_for(family),
            &self.settings.tools,
        );
        info!(target = %target, command = %spec.display(), "dispatching probe");

        let mut handle = self.runner.spawn(&spec)?;
        let status = self.stream(request, &mut handle, sink)?;
        info!(status = %status, "probe finished");
        Ok(status)
    }

    /// Drive stdout through the transformer, then scan stderr, with
    /// the reaper guaranteed on both the normal and the abort path.
    /// (Stream errors additionally fall back to the handle's drop
    /// teardown.)
    fn stream(
        &self,
        request: &ProbeRequest,
        handle: &mut ProcessHandle,
        sink: &mut dyn LineSink,
    ) -> Result<ProbeStatus> {
        let mut transformer = OutputTransformer::new(
            request.kind,
            request.fail_threshold,
            self.settings.chunk_bytes,
        );

        let stdout = handle
            .take_stdout()
            .ok_or_else(|| Error::Config("probe process has no stdout pipe".into()))?;
        let mut reader = BufReader::new(stdout);
        let mut buf = Vec::with_capacity(MAX_LINE_BYTES);
        let mut aborted = false;
        loop {
            buf.clear();
            if read_line_bounded(&mut reader, &mut buf, MAX_LINE_BYTES)? == 0 {
                break;
            }
            let (line, verdict) = transformer.transform(&buf);
            sink.deliver(&line)?;
            if verdict == StreamVerdict::Abort {
                aborted = true;
                break;
            }
        }
        drop(reader);

        if aborted {
            // Kill before touching stderr: the tool is still running
            // and could hold the pipe open indefinitely. Buffered
            // stderr remains readable after the group is down.
            let outcome = self.reaper.reap(handle);
            debug!(?outcome, "reaped after early abort");
            self.scan_stderr(handle, &transformer, sink)?;
            return Ok(ProbeStatus::AbortedTimeouts);
        }

        let rejected = self.scan_stderr(handle, &transformer, sink)?;
        let outcome = self.reaper.reap(handle);
        debug!(?outcome, "reaped");
        Ok(if rejected {
            ProbeStatus::Rejected
        } else {
            ProbeStatus::Completed
        })
    }

    /// Scan stderr for address-resolution failure; stops at the first
    /// match and delivers the rejection sentinel.
    fn scan_stderr(
        &self,
        handle: &mut ProcessHandle,
        transformer: &OutputTransformer,
        sink: &mut dyn LineSink,
    ) -> Result<bool> {
        let Some(stderr) = handle.take_stderr() else {
            return Ok(false);
        };
        let mut reader = BufReader::new(stderr);
        let mut buf = Vec::with_capacity(MAX_LINE_BYTES);
        loop {
            buf.clear();
            if read_line_bounded(&mut reader, &mut buf, MAX_LINE_BYTES)? == 0 {
                return Ok(false);
            }
            if let Some(line) = transformer.scan_stderr(&buf) {
                sink.deliver(&line)?;
                return Ok(true);
            }
        }
    }
}

/// Read one newline-terminated line into `buf`, capped at `max` bytes.
///
/// Returns 0 only at end of stream with nothing read; a line longer
/// than the cap is split and continues in the next call. The newline
/// itself is consumed but not stored.
fn read_line_bounded<R: BufRead>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    max: usize,
) -> std::io::Result<usize> {
    loop {
        let available = match reader.fill_buf() {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        if available.is_empty() {
            return Ok(buf.len());
        }
        let limit = max - buf.len();
        match available.iter().position(|&b| b == b'\n') {
            Some(pos) if pos < limit => {
                buf.extend_from_slice(&available[..pos]);
                reader.consume(pos + 1);
                return Ok(buf.len() + 1);
            }
            _ => {
                let take = available.len().min(limit);
                buf.extend_from_slice(&available[..take]);
                reader.consume(take);
                if buf.len() == max {
                    return Ok(buf.len());
                }
            }
        }
    }
}
