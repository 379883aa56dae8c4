//! Probe kinds, address families, and the request type.
//!
//! A `ProbeRequest` is created once per submission by the web/session
//! layer, validated, then consumed exactly once by the dispatcher.
//! The engine never keeps ambient state about the current target; the
//! request value is the only carrier.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Default consecutive-timeout abort limit for path traces.
pub const DEFAULT_FAIL_THRESHOLD: u32 = 4;

/// Sentinel line emitted when the target does not exist in the address
/// family the chosen tool expects. Reserved; the display layer matches
/// it verbatim.
pub const SENTINEL_REJECTED: &str = "Unauthorized request";

/// Sentinel appended to the last line when a trace is cut short after
/// repeated consecutive timeouts. Reserved; matched by the display
/// layer.
pub const SENTINEL_TRACE_ABORTED: &str = "-- Traceroute timed out --";

/// IP address family a probe operates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressFamily {
    V4,
    V6,
}

impl std::fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AddressFamily::V4 => write!(f, "ipv4"),
            AddressFamily::V6 => write!(f, "ipv6"),
        }
    }
}

/// External diagnostic tool behind a probe kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolKind {
    Ping,
    Traceroute,
    Mtr,
}

/// Kind of probe an operator can expose.
///
/// The string forms are the operator-facing method names used in the
/// allow-list and on the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
#[value(rename_all = "lower")]
pub enum ProbeKind {
    /// IPv4 reachability (ping, 4 probes, 15s wait).
    Ping,
    /// IPv6 reachability.
    Ping6,
    /// IPv4 path trace (traceroute, 2s per-hop wait).
    Traceroute,
    /// IPv6 path trace.
    Traceroute6,
    /// IPv4 path report (mtr wide report).
    Mtr,
    /// IPv6 path report.
    Mtr6,
}

impl ProbeKind {
    /// Address family the tool variant expects the target to resolve in.
    pub fn family(&self) -> AddressFamily {
        match self {
            ProbeKind::Ping | ProbeKind::Traceroute | ProbeKind::Mtr => AddressFamily::V4,
            ProbeKind::Ping6 | ProbeKind::Traceroute6 | ProbeKind::Mtr6 => AddressFamily::V6,
        }
    }

    /// External tool this kind invokes.
    pub fn tool(&self) -> ToolKind {
        match self {
            ProbeKind::Ping | ProbeKind::Ping6 => ToolKind::Ping,
            ProbeKind::Traceroute | ProbeKind::Traceroute6 => ToolKind::Traceroute,
            ProbeKind::Mtr | ProbeKind::Mtr6 => ToolKind::Mtr,
        }
    }

    /// Whether this kind's output carries numbered hop lines.
    pub fn is_path_trace(&self) -> bool {
        !matches!(self, ProbeKind::Ping | ProbeKind::Ping6)
    }

    /// All probe kinds, in display order.
    pub fn all() -> [ProbeKind; 6] {
        [
            ProbeKind::Ping,
            ProbeKind::Ping6,
            ProbeKind::Mtr,
            ProbeKind::Mtr6,
            ProbeKind::Traceroute,
            ProbeKind::Traceroute6,
        ]
    }
}

impl std::fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ProbeKind::Ping => "ping",
            ProbeKind::Ping6 => "ping6",
            ProbeKind::Traceroute => "traceroute",
            ProbeKind::Traceroute6 => "traceroute6",
            ProbeKind::Mtr => "mtr",
            ProbeKind::Mtr6 => "mtr6",
        };
        write!(f, "{name}")
    }
}

/// One validated probe submission.
///
/// Invariant: `target` is never used to build a process invocation
/// before the validator has accepted it; the dispatcher enforces this
/// before any spawn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeRequest {
    /// Target address literal or hostname.
    pub target: String,
    /// Index of the egress link the probe originates from.
    pub link: usize,
    /// Probe kind drawn from the operator allow-list.
    pub kind: ProbeKind,
    /// Consecutive-timeout abort limit for path traces.
    pub fail_threshold: u32,
}

impl ProbeRequest {
    pub fn new(target: impl Into<String>, link: usize, kind: ProbeKind) -> Self {
        Self {
            target: target.into(),
            link,
            kind,
            fail_threshold: DEFAULT_FAIL_THRESHOLD,
        }
    }

    /// Override the consecutive-timeout abort limit.
    pub fn with_fail_threshold(mut self, threshold: u32) -> Self {
        self.fail_threshold = threshold;
        self
    }
}
