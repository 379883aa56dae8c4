//! Typed deployment settings for a looking glass instance.
//!
//! Settings are read from a TOML file once at startup. Every field has
//! a default so a minimal deployment only needs to declare its egress
//! links.

use lg_common::{AddressFamily, Error, ProbeKind, Result, ToolKind, DEFAULT_FAIL_THRESHOLD};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::Path;

/// Deployment settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Human-readable location label for this instance.
    pub location: String,

    /// Probe kinds the operator exposes. A request for a kind outside
    /// this list is rejected before validation of the target.
    pub allowed: Vec<ProbeKind>,

    /// Consecutive-timeout abort limit for path traces.
    pub fail_threshold: u32,

    /// Transport chunk size; every delivered line is padded to this
    /// many bytes.
    pub chunk_bytes: usize,

    /// Egress links, addressed by index in probe requests.
    pub links: Vec<EgressLink>,

    /// External tool paths.
    pub tools: ToolPaths,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            location: String::new(),
            allowed: ProbeKind::all().to_vec(),
            fail_threshold: DEFAULT_FAIL_THRESHOLD,
            chunk_bytes: crate::DEFAULT_CHUNK_BYTES,
            links: Vec::new(),
            tools: ToolPaths::default(),
        }
    }
}

impl Settings {
    /// Load and validate settings from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        let settings: Settings = toml::from_str(&raw)
            .map_err(|e| Error::Config(format!("cannot parse {}: {e}", path.display())))?;
        crate::validate_settings(&settings)?;
        Ok(settings)
    }

    /// Egress link by index.
    pub fn link(&self, index: usize) -> Option<&EgressLink> {
        self.links.get(index)
    }

    /// Whether the operator exposes the given probe kind.
    pub fn allows(&self, kind: ProbeKind) -> bool {
        self.allowed.contains(&kind)
    }
}

/// One operator-selected outbound network path a probe can be bound to
/// originate from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EgressLink {
    /// Display name (e.g. "transit-a").
    pub name: String,

    /// IPv4 source address probes bind to on this link.
    #[serde(default)]
    pub ipv4: Option<Ipv4Addr>,

    /// IPv6 source address for this link. Declared for completeness;
    /// the v6 tool variants currently run unbound.
    #[serde(default)]
    pub ipv6: Option<Ipv6Addr>,
}

impl EgressLink {
    /// Source address for the given family, when configured.
    pub fn source_for(&self, family: AddressFamily) -> Option<IpAddr> {
        match family {
            AddressFamily::V4 => self.ipv4.map(IpAddr::V4),
            AddressFamily::V6 => self.ipv6.map(IpAddr::V6),
        }
    }
}

/// Paths of the external diagnostic tools.
///
/// Defaults to bare command names resolved through PATH; deployments
/// can pin absolute paths here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolPaths {
    pub ping: String,
    pub traceroute: String,
    pub mtr: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            ping: "ping".to_string(),
            traceroute: "traceroute".to_string(),
            mtr: "mtr".to_string(),
        }
    }
}

impl ToolPaths {
    /// Path for the given tool.
    pub fn for_tool(&self, tool: ToolKind) -> &str {
        match tool {
            ToolKind::Ping => &self.ping,
            ToolKind::Traceroute => &self.traceroute,
            ToolKind::Mtr => &self.mtr,
        }
    }
}
