//! Target validation: routable address literals and family-restricted
//! hostname resolution.
//!
//! Probes are launched only against targets that exist in the address
//! family the chosen tool variant expects; anything else is rejected
//! here, before any process is spawned.

use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::Resolver;
use lg_common::{AddressFamily, Error, Result};
use regex::Regex;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::OnceLock;
use tracing::debug;

fn hostname_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // DNS labels joined by dots, alphabetic TLD, optional root dot.
        Regex::new(r"^(?:[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?\.)+[A-Za-z]{2,63}\.?$")
            .expect("hostname regex")
    })
}

/// Check that an address literal is of the requested family and
/// globally routable. Private and reserved ranges are rejected. No
/// side effects.
pub fn is_valid_address(addr: IpAddr, family: AddressFamily) -> bool {
    match (addr, family) {
        (IpAddr::V4(v4), AddressFamily::V4) => is_routable_v4(&v4),
        (IpAddr::V6(v6), AddressFamily::V6) => is_routable_v6(&v6),
        _ => false,
    }
}

fn is_routable_v4(addr: &Ipv4Addr) -> bool {
    if addr.is_unspecified()
        || addr.is_loopback()
        || addr.is_private()
        || addr.is_link_local()
        || addr.is_multicast()
        || addr.is_broadcast()
        || addr.is_documentation()
    {
        return false;
    }
    let octets = addr.octets();
    // Shared address space 100.64.0.0/10 (RFC 6598)
    if octets[0] == 100 && (octets[1] & 0xc0) == 64 {
        return false;
    }
    // IETF protocol assignments 192.0.0.0/24
    if octets[0] == 192 && octets[1] == 0 && octets[2] == 0 {
        return false;
    }
    // Benchmarking 198.18.0.0/15
    if octets[0] == 198 && (octets[1] & 0xfe) == 18 {
        return false;
    }
    // Reserved 240.0.0.0/4
    if octets[0] >= 240 {
        return false;
    }
    true
}

fn is_routable_v6(addr: &Ipv6Addr) -> bool {
    if addr.is_unspecified() || addr.is_loopback() || addr.is_multicast() {
        return false;
    }
    if addr.to_ipv4_mapped().is_some() {
        return false;
    }
    let segments = addr.segments();
    // Unique local fc00::/7
    if (segments[0] & 0xfe00) == 0xfc00 {
        return false;
    }
    // Link local fe80::/10
    if (segments[0] & 0xffc0) == 0xfe80 {
        return false;
    }
    // Documentation 2001:db8::/32
    if segments[0] == 0x2001 && segments[1] == 0x0db8 {
        return false;
    }
    true
}

/// Pure half of hostname validation: strip scheme and path, require a
/// domain separator, check hostname syntax. Returns the bare lowercase
/// hostname. A `None` here means no DNS lookup is ever attempted for
/// the input.
pub fn normalize_host(host: &str) -> Option<String> {
    let host = host.trim();
    let host = host
        .strip_prefix("http://")
        .or_else(|| host.strip_prefix("https://"))
        .unwrap_or(host);
    let host = host.split(['/', '?', '#']).next().unwrap_or("");
    let host = host.split(':').next().unwrap_or("");
    if !host.contains('.') {
        return None;
    }
    if !hostname_re().is_match(host) {
        return None;
    }
    Some(host.trim_end_matches('.').to_ascii_lowercase())
}

/// Resolve a hostname in the requested family only (A for v4, AAAA
/// for v6). Returns the normalized hostname when at least one record
/// of that family exists, `None` otherwise.
pub fn resolve_host(host: &str, family: AddressFamily) -> Option<String> {
    let host = normalize_host(host)?;
    let resolver = match Resolver::new(ResolverConfig::default(), ResolverOpts::default()) {
        Ok(resolver) => resolver,
        Err(e) => {
            debug!(error = %e, "resolver unavailable");
            return None;
        }
    };
    let found = match family {
        AddressFamily::V4 => resolver
            .ipv4_lookup(host.as_str())
            .map(|records| records.iter().next().is_some())
            .unwrap_or(false),
        AddressFamily::V6 => resolver
            .ipv6_lookup(host.as_str())
            .map(|records| records.iter().next().is_some())
            .unwrap_or(false),
    };
    if !found {
        debug!(host = %host, family = %family, "no records in requested family");
        return None;
    }
    Some(host)
}

/// Validate a submitted target for the given family.
///
/// Literals must be routable addresses of that family; hostnames must
/// resolve in it. The returned string is safe to append to a probe
/// argument vector.
pub fn validate_target(target: &str, family: AddressFamily) -> Result<String> {
    if let Ok(addr) = target.parse::<IpAddr>() {
        if is_valid_address(addr, family) {
            return Ok(addr.to_string());
        }
        return Err(Error::InvalidTarget(format!(
            "{target} is not a routable {family} address"
        )));
    }
    resolve_host(target, family).ok_or_else(|| {
        Error::InvalidTarget(format!("{target} does not resolve in {family}"))
    })
}
