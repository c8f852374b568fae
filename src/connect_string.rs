//! Connection-string parsing.
//!
//! `scheme://host[,host…][/chroot][?opt=val&…]`. Grounded on
//! `examples/original_source/src/zk/client.cpp`/`client.hpp` for the option
//! surface (randomize hosts, read-only, timeout), reimplemented as a small
//! hand-rolled parser in the style of the teacher's other small parsers
//! rather than pulling in a URL crate for a format this constrained.

use std::fmt;
use std::time::Duration;

use crate::error::{Error, ErrorKind};
use crate::path::Path;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// One `host:port` pair from a connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPort {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for HostPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Parsed connection parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectParams {
    pub scheme: String,
    pub hosts: Vec<HostPort>,
    pub chroot: Option<Path>,
    pub randomize_hosts: bool,
    pub read_only: bool,
    pub timeout: Duration,
}

impl ConnectParams {
    /// Parses a connection string of the form
    /// `scheme://host[,host…][/chroot][?opt=val&…]`.
    ///
    /// Recognized options: `randomize_hosts` (`true`/`false`),
    /// `read_only` (`true`/`false`), `timeout` (decimal seconds).
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidArguments`] for a missing scheme, an
    /// empty host list, a malformed `host:port` pair, an empty chroot, an
    /// unknown option key, or an empty option value.
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let invalid = |msg: &str| Error::new(ErrorKind::InvalidArguments).with_context(msg.to_string());

        let (scheme, rest) = raw.split_once("://").ok_or_else(|| invalid("missing '://' scheme separator"))?;
        if scheme.is_empty() {
            return Err(invalid("empty scheme"));
        }

        let (authority, query) = match rest.split_once('?') {
            Some((a, q)) => (a, Some(q)),
            None => (rest, None),
        };
        let (host_part, chroot_part) = match authority.split_once('/') {
            Some((h, c)) => (h, Some(c)),
            None => (authority, None),
        };

        if host_part.is_empty() {
            return Err(invalid("empty host list"));
        }
        let mut hosts = Vec::new();
        for entry in host_part.split(',') {
            let (host, port) = entry
                .rsplit_once(':')
                .ok_or_else(|| invalid("host entry missing ':port'"))?;
            if host.is_empty() {
                return Err(invalid("empty host name"));
            }
            let port: u16 = port.parse().map_err(|_| invalid("port is not a valid u16"))?;
            hosts.push(HostPort { host: host.to_string(), port });
        }

        let chroot = match chroot_part {
            None | Some("") => None,
            Some(c) => Some(Path::new(format!("/{c}"))?),
        };

        let mut randomize_hosts = false;
        let mut read_only = false;
        let mut timeout = DEFAULT_TIMEOUT;

        if let Some(query) = query {
            for pair in query.split('&') {
                if pair.is_empty() {
                    continue;
                }
                let (key, value) = pair
                    .split_once('=')
                    .ok_or_else(|| invalid("option missing '=value'"))?;
                if value.is_empty() {
                    return Err(invalid("option has an empty value"));
                }
                match key {
                    "randomize_hosts" => {
                        randomize_hosts = parse_bool(value).ok_or_else(|| invalid("randomize_hosts must be true/false"))?;
                    }
                    "read_only" => {
                        read_only = parse_bool(value).ok_or_else(|| invalid("read_only must be true/false"))?;
                    }
                    "timeout" => {
                        timeout = parse_timeout_seconds(value)
                            .ok_or_else(|| invalid("timeout must be a decimal number of seconds"))?;
                    }
                    other => return Err(invalid(&format!("unknown connection option '{other}'"))),
                }
            }
        }

        Ok(Self {
            scheme: scheme.to_string(),
            hosts,
            chroot,
            randomize_hosts,
            read_only,
            timeout,
        })
    }

    /// The exact inverse of [`Self::parse`] for a value produced by it
    /// (round-trip property: `parse(to_connect_string(parse(s))) == parse(s)`).
    #[must_use]
    pub fn to_connect_string(&self) -> String {
        let mut out = format!("{}://", self.scheme);
        out.push_str(
            &self
                .hosts
                .iter()
                .map(HostPort::to_string)
                .collect::<Vec<_>>()
                .join(","),
        );
        if let Some(chroot) = &self.chroot {
            out.push_str(chroot.as_str());
        }
        let mut opts = Vec::new();
        if self.randomize_hosts {
            opts.push("randomize_hosts=true".to_string());
        }
        if self.read_only {
            opts.push("read_only=true".to_string());
        }
        if self.timeout != DEFAULT_TIMEOUT {
            opts.push(format!("timeout={}", format_timeout_seconds(self.timeout)));
        }
        if !opts.is_empty() {
            out.push('?');
            out.push_str(&opts.join("&"));
        }
        out
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

/// Parses a decimal-seconds duration (`"5"`, `"5.25"`) without going
/// through floating point, so that [`format_timeout_seconds`] is an exact
/// inverse for any [`Duration`] (`Duration::subsec_nanos` never needs more
/// than 9 fractional digits, which is also the most this parser accepts).
fn parse_timeout_seconds(s: &str) -> Option<Duration> {
    let (whole, frac) = match s.split_once('.') {
        Some((w, f)) => (w, f),
        None => (s, ""),
    };
    if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if !frac.bytes().all(|b| b.is_ascii_digit()) || frac.len() > 9 {
        return None;
    }
    let secs: u64 = whole.parse().ok()?;
    let nanos: u32 = if frac.is_empty() {
        0
    } else {
        let scaled = format!("{frac:0<9}");
        scaled.parse().ok()?
    };
    Some(Duration::new(secs, nanos))
}

/// Exact inverse of [`parse_timeout_seconds`].
fn format_timeout_seconds(d: Duration) -> String {
    let nanos = d.subsec_nanos();
    if nanos == 0 {
        return d.as_secs().to_string();
    }
    let frac = format!("{nanos:09}");
    format!("{}.{}", d.as_secs(), frac.trim_end_matches('0'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_host_no_options() {
        let p = ConnectParams::parse("zk://host1:2181").unwrap();
        assert_eq!(p.scheme, "zk");
        assert_eq!(p.hosts, vec![HostPort { host: "host1".into(), port: 2181 }]);
        assert_eq!(p.chroot, None);
        assert!(!p.randomize_hosts);
    }

    #[test]
    fn parses_multiple_hosts_chroot_and_options() {
        let p = ConnectParams::parse("zk://a:2181,b:2182/app/db?randomize_hosts=true&timeout=5.25").unwrap();
        assert_eq!(p.hosts.len(), 2);
        assert_eq!(p.chroot.unwrap().as_str(), "/app/db");
        assert!(p.randomize_hosts);
        assert_eq!(p.timeout, Duration::new(5, 250_000_000));
    }

    #[test]
    fn timeout_accepts_whole_seconds() {
        let p = ConnectParams::parse("zk://a:2181?timeout=30").unwrap();
        assert_eq!(p.timeout, Duration::from_secs(30));
    }

    #[test]
    fn timeout_rejects_non_decimal_value() {
        assert!(ConnectParams::parse("zk://a:2181?timeout=soon").is_err());
        assert!(ConnectParams::parse("zk://a:2181?timeout=-1").is_err());
    }

    #[test]
    fn rejects_unknown_option_and_empty_value() {
        assert!(ConnectParams::parse("zk://a:2181?bogus=1").is_err());
        assert!(ConnectParams::parse("zk://a:2181?read_only=").is_err());
    }

    #[test]
    fn rejects_missing_scheme_and_empty_hosts() {
        assert!(ConnectParams::parse("a:2181").is_err());
        assert!(ConnectParams::parse("zk:///chroot").is_err());
    }

    #[test]
    fn round_trips_through_display() {
        let original = "zk://a:2181,b:2182/app?read_only=true";
        let parsed = ConnectParams::parse(original).unwrap();
        let rendered = parsed.to_connect_string();
        let reparsed = ConnectParams::parse(&rendered).unwrap();
        assert_eq!(parsed, reparsed);
    }
}
