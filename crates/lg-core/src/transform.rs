//! Line-by-line output sanitization and hop reformatting.
//!
//! The transformer consumes the probe tool's stdout one bounded line
//! at a time, HTML-escapes it (reverse-DNS hostnames embedded in tool
//! output are attacker-influenced), aligns hop columns for mtr and
//! traceroute, and watches for runs of timed-out hops. Each produced
//! line is padded to the transport chunk size so intermediary
//! buffering layers flush per line.

use lg_common::{ProbeKind, ToolKind, SENTINEL_REJECTED, SENTINEL_TRACE_ABORTED};
use regex::Regex;
use std::sync::OnceLock;

/// Bound on a single output line read; longer lines are split.
pub const MAX_LINE_BYTES: usize = 4096;

/// Timeout marker traceroute prints for an unanswered hop.
const TIMEOUT_MARKER: &str = "* * *";

/// Stderr phrasings that mean the target does not exist in the family
/// the tool expects.
const RESOLUTION_FAILURES: [&str; 2] = ["Name or service not known", "unknown host"];

fn mtr_single_hop_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9]\. ").expect("mtr hop regex"))
}

fn mtr_double_hop_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9]{2}\. ").expect("mtr wide hop regex"))
}

fn trace_hop_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9] ").expect("traceroute hop regex"))
}

/// One transformed output line. Transient: produced and consumed
/// within a single streaming pass.
#[derive(Debug, Clone)]
pub struct OutputLine {
    /// Raw bytes as read from the pipe (without trailing newline).
    pub raw: Vec<u8>,
    /// Display-safe rendering: escaped, reformatted, chunk-padded.
    pub display: String,
    /// Hop index parsed from the line, when it carries one.
    pub hop: Option<u32>,
}

/// Whether the caller should keep reading the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamVerdict {
    Continue,
    /// Stop reading stdout now; the trace is dead.
    Abort,
}

/// Per-execution failure tracking for consecutive timed-out hops.
/// Reset at the start of each execution, mutated only here.
#[derive(Debug, Default)]
struct FailureWindow {
    /// Timeout lines seen so far.
    consecutive: u32,
    /// Line index of the most recent timeout.
    last_timeout: Option<u32>,
    /// Running line counter (increments on every traceroute line).
    hops_seen: u32,
}

/// Stateful transformer for one probe execution's output.
pub struct OutputTransformer {
    kind: ProbeKind,
    fail_threshold: u32,
    chunk_bytes: usize,
    window: FailureWindow,
    /// Single-digit hop lines reformatted so far (capped at 10).
    matched: u32,
}

impl OutputTransformer {
    pub fn new(kind: ProbeKind, fail_threshold: u32, chunk_bytes: usize) -> Self {
        Self {
            kind,
            fail_threshold,
            chunk_bytes,
            window: FailureWindow::default(),
            matched: 0,
        }
    }

    /// Transform one raw stdout line into its display form and decide
    /// whether the stream should keep going.
    pub fn transform(&mut self, raw: &[u8]) -> (OutputLine, StreamVerdict) {
        let text = String::from_utf8_lossy(raw);
        let trimmed = text.trim();
        let hop = leading_hop_index(trimmed);
        let mut line = html_escape(trimmed);
        let mut verdict = StreamVerdict::Continue;

        match self.kind.tool() {
            ToolKind::Mtr => {
                line = self.reindent_mtr(line);
            }
            ToolKind::Traceroute => {
                line = self.reindent_traceroute(line);
                if trimmed.contains(TIMEOUT_MARKER) {
                    verdict = self.record_timeout();
                }
                self.window.hops_seen += 1;
            }
            ToolKind::Ping => {}
        }

        let display = match verdict {
            StreamVerdict::Continue => self.pad(format!("{line}<br />")),
            StreamVerdict::Abort => {
                self.pad(format!("{line}<br />{SENTINEL_TRACE_ABORTED}<br />"))
            }
        };
        (
            OutputLine {
                raw: raw.to_vec(),
                display,
                hop,
            },
            verdict,
        )
    }

    /// Scan one stderr line for address-resolution failure. Returns the
    /// rejection sentinel line when matched; the caller stops reading
    /// further error output after that.
    pub fn scan_stderr(&self, raw: &[u8]) -> Option<OutputLine> {
        let text = String::from_utf8_lossy(raw);
        if RESOLUTION_FAILURES.iter().any(|m| text.contains(m)) {
            return Some(OutputLine {
                raw: raw.to_vec(),
                display: self.pad(format!("{SENTINEL_REJECTED}<br />")),
                hop: None,
            });
        }
        None
    }

    /// Update the failure window for a timed-out hop line. Aborts once
    /// the previous timeout sits at exactly the preceding line index
    /// and the run length has reached the threshold.
    fn record_timeout(&mut self) -> StreamVerdict {
        self.window.consecutive += 1;
        let index = self.window.hops_seen;
        if let Some(last) = self.window.last_timeout {
            if index > 0 && last == index - 1 && self.window.consecutive >= self.fail_threshold {
                return StreamVerdict::Abort;
            }
        }
        self.window.last_timeout = Some(index);
        StreamVerdict::Continue
    }

    /// Align mtr hop columns: the first ten single-digit hops get a
    /// two-space marker, wider indices a one-space marker built from
    /// the first four characters of the line.
    fn reindent_mtr(&mut self, line: String) -> String {
        if self.matched < 10 {
            if let Some(m) = mtr_single_hop_re().find(&line) {
                self.matched += 1;
                let rest = &line[m.end()..];
                return format!("&nbsp;&nbsp;{}{rest}", m.as_str());
            }
        }
        if let Some(m) = mtr_double_hop_re().find(&line) {
            let label: String = line.chars().take(4).collect();
            let rest = &line[m.end()..];
            return format!("&nbsp;{label}{rest}");
        }
        line
    }

    /// Insert a one-space marker before the first ten single-digit
    /// traceroute hop lines.
    fn reindent_traceroute(&mut self, line: String) -> String {
        if self.matched < 10 {
            if let Some(m) = trace_hop_re().find(&line) {
                self.matched += 1;
                let rest = &line[m.end()..];
                return format!("&nbsp;{}{rest}", m.as_str());
            }
        }
        line
    }

    /// Right-pad to the transport chunk size.
    fn pad(&self, mut line: String) -> String {
        if line.len() < self.chunk_bytes {
            line.push_str(&" ".repeat(self.chunk_bytes - line.len()));
        }
        line
    }
}

/// HTML-escape untrusted tool output for the display layer.
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

/// Hop index from the leading digits of a trimmed line, if any.
fn leading_hop_index(text: &str) -> Option<u32> {
    let digits: &str = text
        .split(|c: char| !c.is_ascii_digit())
        .next()
        .unwrap_or("");
    if digits.is_empty() {
        None
    } else {
        digits.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHUNK: usize = 4096;

    fn transformer(kind: ProbeKind) -> OutputTransformer {
        OutputTransformer::new(kind, 4, CHUNK)
    }

    #[test]
    fn test_ping_line_escaped_and_padded() {
        let mut t = transformer(ProbeKind::Ping);
        let (line, verdict) = t.transform(b"64 bytes from 8.8.8.8: icmp_seq=1 ttl=118\n");
        assert_eq!(verdict, StreamVerdict::Continue);
        assert_eq!(line.display.len(), CHUNK);
        assert!(line
            .display
            .starts_with("64 bytes from 8.8.8.8: icmp_seq=1 ttl=118<br />"));
    }

    #[test]
    fn test_rdns_markup_escaped() {
        let mut t = transformer(ProbeKind::Traceroute);
        let (line, _) = t.transform(b"11  <script>alert(1)</script>.example.net  1.2 ms");
        assert!(line.display.contains("&lt;script&gt;alert(1)&lt;/script&gt;"));
        assert!(!line.display.contains("<script>"));
    }

    #[test]
    fn test_traceroute_hop_marker_first_ten() {
        let mut t = transformer(ProbeKind::Traceroute);
        let (line, _) = t.transform(b"1  gateway (203.0.113.1)  0.5 ms");
        assert!(line.display.starts_with("&nbsp;1 "));
        assert_eq!(line.hop, Some(1));
        // double-digit hops pass through untouched
        let (line, _) = t.transform(b"12  core2.example  8.1 ms");
        assert!(line.display.starts_with("12"));
    }

    #[test]
    fn test_mtr_hop_markers() {
        let mut t = transformer(ProbeKind::Mtr);
        let (line, _) = t.transform(b"1. gateway    0.0%    10   0.4");
        assert!(line.display.starts_with("&nbsp;&nbsp;1. "));
        let (line, _) = t.transform(b"12. hop-twelve  0.0%   10   9.9");
        assert!(line.display.starts_with("&nbsp;12. "));
        assert_eq!(line.hop, Some(12));
    }

    #[test]
    fn test_mtr_single_digit_cap() {
        let mut t = transformer(ProbeKind::Mtr);
        for i in 1..=9 {
            let raw = format!("{i}. hop  0.0%  10  1.0");
            let (line, _) = t.transform(raw.as_bytes());
            assert!(line.display.starts_with("&nbsp;&nbsp;"));
        }
        // header-style lines are left alone
        let (line, _) = t.transform(b"HOST: lg1   Loss%   Snt   Last");
        assert!(line.display.starts_with("HOST:"));
    }

    #[test]
    fn test_consecutive_timeouts_abort() {
        let mut t = transformer(ProbeKind::Traceroute);
        let mut emitted = Vec::new();
        let stream: Vec<&[u8]> = vec![
            b"traceroute to 192.0.78.12, 30 hops max",
            b"1  gateway  0.4 ms",
            b"2  upstream  1.1 ms",
            b"3  peer  4.0 ms",
            b"4  dark  5.0 ms",
            b"5  * * *",
            b"6  * * *",
            b"7  * * *",
            b"8  * * *",
        ];
        let mut aborted = false;
        for raw in stream {
            let (line, verdict) = t.transform(raw);
            emitted.push(line.display.clone());
            if verdict == StreamVerdict::Abort {
                aborted = true;
                break;
            }
        }
        assert!(aborted, "four consecutive timeouts must abort");
        let notices: usize = emitted
            .iter()
            .filter(|l| l.contains(SENTINEL_TRACE_ABORTED))
            .count();
        assert_eq!(notices, 1, "exactly one terminal notice");
        assert!(emitted.last().unwrap().contains(SENTINEL_TRACE_ABORTED));
    }

    #[test]
    fn test_nonconsecutive_timeouts_do_not_abort() {
        let mut t = OutputTransformer::new(ProbeKind::Traceroute, 3, CHUNK);
        let stream: Vec<&[u8]> = vec![
            b"traceroute to 192.0.78.12, 30 hops max",
            b"1  gateway  0.4 ms",
            b"2  * * *",
            b"3  peer  4.0 ms",
            b"4  hop  2.0 ms",
            b"5  * * *",
            b"6  hop  2.2 ms",
            b"7  hop  2.5 ms",
            b"8  * * *",
        ];
        for raw in stream {
            let (_, verdict) = t.transform(raw);
            assert_eq!(verdict, StreamVerdict::Continue);
        }
    }

    #[test]
    fn test_below_threshold_run_does_not_abort() {
        let mut t = transformer(ProbeKind::Traceroute);
        for raw in [&b"1  hop  1 ms"[..], b"2  * * *", b"3  * * *", b"4  * * *"] {
            let (_, verdict) = t.transform(raw);
            assert_eq!(verdict, StreamVerdict::Continue);
        }
    }

    #[test]
    fn test_all_lines_padded_to_chunk() {
        let mut t = transformer(ProbeKind::Traceroute);
        for raw in [
            &b"short"[..],
            b"1  gateway  0.4 ms",
            b"  trailing whitespace   \n",
            b"",
        ] {
            let (line, _) = t.transform(raw);
            assert_eq!(line.display.len(), CHUNK, "raw {raw:?}");
        }
    }

    #[test]
    fn test_stderr_resolution_failure() {
        let t = transformer(ProbeKind::Ping);
        let hit = t
            .scan_stderr(b"ping: v6only.example: Name or service not known")
            .expect("must match");
        assert!(hit.display.contains(SENTINEL_REJECTED));
        assert_eq!(hit.display.len(), CHUNK);
        assert!(t.scan_stderr(b"ping: permission denied").is_none());
    }

    #[test]
    fn test_stderr_unknown_host_variant() {
        let t = transformer(ProbeKind::Traceroute6);
        assert!(t
            .scan_stderr(b"traceroute: unknown host example.invalid")
            .is_some());
    }

    #[test]
    fn test_hop_index_extraction() {
        assert_eq!(leading_hop_index("7  hop"), Some(7));
        assert_eq!(leading_hop_index("12. hop"), Some(12));
        assert_eq!(leading_hop_index("traceroute to"), None);
        assert_eq!(leading_hop_index(""), None);
    }
}
