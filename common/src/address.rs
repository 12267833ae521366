//! Splitting user supplied `host[:port]` tokens.
//!
//! No resolution or reachability check happens here; a bogus host only
//! shows up later as an unreachable probe.
//!
//! Known limitation: bare IPv6 literals (`::1`, `2001:db8::1`) are split on
//! their last colon like any other token, so their final group is taken as
//! the port when it happens to be numeric.

use core::fmt;

/// Port used when a token carries none. SSH is what most people keep open on a VPS.
pub const DEFAULT_PROBE_PORT: u16 = 22;

/// Longest accepted host, matching the DNS name limit.
pub const MAX_HOST_LEN: usize = 253;

/// A host with the port to probe on it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Parses a token into host and port, falling back to `default_port`.
///
/// The token is split on its **last** colon. The right side only counts as a
/// port if it is all digits and within `1..=65535`, and the left side is not
/// empty. In every other case the whole token is the host.
#[must_use]
pub fn parse_address(token: &str, default_port: u16) -> Address {
    let token = token.trim();
    if let Some((host, port)) = token.rsplit_once(':')
        && !host.is_empty()
        && let Some(port) = parse_port(port)
    {
        return Address {
            host: host.to_owned(),
            port,
        };
    }
    Address {
        host: token.to_owned(),
        port: default_port,
    }
}

fn parse_port(raw: &str) -> Option<u16> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    // Values above u16::MAX fail to parse and fall through as well.
    raw.parse::<u16>().ok().filter(|&port| port != 0)
}

/// Whether `host` is plausible enough to store.
///
/// Allows hostnames, IPv4 literals and bracketed or bare IPv6 characters.
#[must_use]
pub fn is_valid_host(host: &str) -> bool {
    !host.is_empty()
        && host.len() <= MAX_HOST_LEN
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ':' | '[' | ']'))
}
