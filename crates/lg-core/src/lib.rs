//! Looking glass probe execution and output-streaming engine.
//!
//! The engine turns one validated [`ProbeRequest`](lg_common::ProbeRequest)
//! into one external tool invocation and one ordered stream of
//! display-safe output lines:
//!
//! - [`validate`] — target address/hostname validation with
//!   family-restricted DNS
//! - [`runner`] — literal argument vectors per probe kind and process
//!   spawning in a fresh process group
//! - [`transform`] — line sanitization, hop reformatting, and the
//!   consecutive-timeout failure window
//! - [`reaper`] — unconditional group-wide teardown after the streams
//!   are drained or aborted
//! - [`dispatch`] — orchestration of the above for one request
//!
//! The model is synchronous and single-owner: one request, one
//! process, one output stream, no sharing across dispatch calls.

pub mod dispatch;
pub mod exit_codes;
pub mod logging;
pub mod reaper;
pub mod runner;
pub mod transform;
pub mod validate;

pub use dispatch::{LineSink, ProbeDispatcher, ProbeStatus};
pub use runner::{CommandSpec, ProcessHandle, ProcessRunner};
pub use transform::{OutputLine, OutputTransformer, StreamVerdict};
