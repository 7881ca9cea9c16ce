//! Parser for the `-scriptport`/`-httpd`/`-callback` bind-specification
//! grammar: `port | :port | host:port | [ip6]:port`, with `*` meaning
//! "all interfaces".

use crate::error::BindError;
use std::net::{SocketAddr, ToSocketAddrs};

/// A parsed, not-yet-resolved bind specification.
#[derive(Debug, Clone, PartialEq)]
pub struct BindSpec {
    pub host: String,
    pub port: u16,
}

impl BindSpec {
    /// Parses a bind spec per the grammar in §4.7. A bare port implies
    /// `127.0.0.1`.
    pub fn parse(spec: &str) -> Result<BindSpec, BindError> {
        let trimmed = spec.trim();
        if trimmed.is_empty() {
            return Err(BindError::Malformed { spec: spec.to_string() });
        }

        // [ip6]:port
        if let Some(rest) = trimmed.strip_prefix('[') {
            let close = rest.find(']').ok_or_else(|| BindError::Malformed { spec: spec.to_string() })?;
            let host = &rest[..close];
            let after = &rest[close + 1..];
            let port_str = after
                .strip_prefix(':')
                .ok_or_else(|| BindError::Malformed { spec: spec.to_string() })?;
            let port = parse_port(port_str, spec)?;
            return Ok(BindSpec { host: host.to_string(), port });
        }

        // Bare port, e.g. "3000"
        if trimmed.chars().all(|c| c.is_ascii_digit()) {
            let port = parse_port(trimmed, spec)?;
            return Ok(BindSpec { host: "127.0.0.1".to_string(), port });
        }

        // ":port"
        if let Some(port_str) = trimmed.strip_prefix(':') {
            let port = parse_port(port_str, spec)?;
            return Ok(BindSpec { host: "127.0.0.1".to_string(), port });
        }

        // "host:port" or "*:port"
        let idx = trimmed.rfind(':').ok_or_else(|| BindError::Malformed { spec: spec.to_string() })?;
        let (host, port_str) = (&trimmed[..idx], &trimmed[idx + 1..]);
        if host.is_empty() {
            return Err(BindError::Malformed { spec: spec.to_string() });
        }
        let port = parse_port(port_str, spec)?;
        let host = if host == "*" { "0.0.0.0".to_string() } else { host.to_string() };
        Ok(BindSpec { host, port })
    }

    /// Resolves the host/port pair to a concrete socket address via the
    /// system resolver.
    pub fn resolve(&self) -> Result<SocketAddr, BindError> {
        let candidate = if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        };
        candidate
            .to_socket_addrs()
            .map_err(|e| BindError::ResolutionFailed { host: self.host.clone(), reason: e.to_string() })?
            .next()
            .ok_or_else(|| BindError::ResolutionFailed {
                host: self.host.clone(),
                reason: "resolver returned no addresses".to_string(),
            })
    }
}

fn parse_port(s: &str, spec: &str) -> Result<u16, BindError> {
    let n: u32 = s.parse().map_err(|_| BindError::InvalidPort { spec: spec.to_string() })?;
    if n == 0 || n > 65535 {
        return Err(BindError::InvalidPort { spec: spec.to_string() });
    }
    Ok(n as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_port_implies_loopback() {
        let spec = BindSpec::parse(":9999").unwrap();
        assert_eq!(spec.host, "127.0.0.1");
        assert_eq!(spec.port, 9999);
    }

    #[test]
    fn star_means_all_interfaces() {
        let spec = BindSpec::parse("*:8080").unwrap();
        assert_eq!(spec.host, "0.0.0.0");
        assert_eq!(spec.port, 8080);
    }

    #[test]
    fn bracketed_ipv6() {
        let spec = BindSpec::parse("[::1]:7000").unwrap();
        assert_eq!(spec.host, "::1");
        assert_eq!(spec.port, 7000);
    }

    #[test]
    fn host_and_port() {
        let spec = BindSpec::parse("example.com:443").unwrap();
        assert_eq!(spec.host, "example.com");
        assert_eq!(spec.port, 443);
    }

    #[test]
    fn rejects_out_of_range_port() {
        assert!(BindSpec::parse(":70000").is_err());
        assert!(BindSpec::parse(":0").is_err());
    }

    #[test]
    fn rejects_malformed_spec() {
        assert!(BindSpec::parse("[::1").is_err());
        assert!(BindSpec::parse("").is_err());
    }

    #[test]
    fn resolves_loopback_address() {
        let spec = BindSpec::parse(":9").unwrap();
        let addr = spec.resolve().unwrap();
        assert!(addr.ip().is_loopback());
    }
}
