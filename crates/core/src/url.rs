//! Parsing and normalization of request targets.
//!
//! A forward proxy request target arrives in one of two shapes this proxy
//! accepts: absolute-form (`GET http://host:port/path HTTP/1.1`) for
//! GET/HEAD/POST, and authority-form (`CONNECT host:port HTTP/1.1`) for
//! CONNECT. Everything else is a bad request.

use crate::error::ProxyError;

/// The parts of an absolute-form request target, already defaulted (no
/// scheme-default port guessing left to callers).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbsoluteUrl {
    /// `http` or `https`, exactly as it appeared (the prefix match is
    /// case-sensitive, so this is already lowercase).
    pub scheme: String,
    /// Lowercased host, without brackets for IPv6 literals.
    pub host: String,
    /// Explicit or scheme-default port.
    pub port: u16,
    /// Path plus query, always starting with `/`. Never includes a
    /// fragment: fragments are client-side only and meaningless to an
    /// origin server, so this proxy strips them before forwarding.
    pub path: String,
}

impl AbsoluteUrl {
    fn default_port(&self) -> u16 {
        match self.scheme.as_str() {
            "https" => 443,
            _ => 80,
        }
    }
}

/// Parses an absolute-form request target. Accepts `http://` or `https://`
/// (case-sensitive prefix), per the request-target grammar; this proxy
/// still forwards both in plaintext since it never terminates TLS — it has
/// no way to honor an `https` scheme other than dialing the same TCP port
/// and speaking HTTP, which is why `https` absolute-form requests in
/// practice only work against origins that happen to speak plaintext HTTP
/// on that port.
pub fn parse_absolute_url(target: &str) -> Result<AbsoluteUrl, ProxyError> {
    let (scheme, rest) = if let Some(rest) = target.strip_prefix("http://") {
        ("http", rest)
    } else if let Some(rest) = target.strip_prefix("https://") {
        ("https", rest)
    } else {
        return Err(ProxyError::BadRequest(format!("unsupported request target: {target}")));
    };

    let (authority, path) = match rest.find('/') {
        Some(idx) => (&rest[..idx], &rest[idx..]),
        None => (rest, "/"),
    };
    if authority.is_empty() {
        return Err(ProxyError::BadRequest("empty authority in request target".into()));
    }

    let path = match path.find('#') {
        Some(idx) => &path[..idx],
        None => path,
    };
    let path = if path.is_empty() { "/" } else { path };

    let default_port = if scheme == "https" { 443 } else { 80 };
    let (host, port) = split_host_port(authority, default_port)?;

    Ok(AbsoluteUrl {
        scheme: scheme.to_string(),
        host: host.to_ascii_lowercase(),
        port,
        path: path.to_string(),
    })
}

/// Parses a CONNECT authority-form target (`host:port`). Rejects anything
/// that looks like absolute-form. Port is required to be numeric; the
/// pipeline, not this function, enforces that it equals 443.
pub fn parse_authority_form(target: &str) -> Result<(String, u16), ProxyError> {
    if target.starts_with("http://") || target.starts_with("https://") {
        return Err(ProxyError::BadRequest(format!(
            "CONNECT target must be authority-form: {target}"
        )));
    }
    let (host, port) = match target.rsplit_once(':') {
        Some((host, port_str)) if !host.is_empty() => {
            let port: u16 = port_str
                .parse()
                .map_err(|_| ProxyError::BadRequest(format!("invalid port: {port_str}")))?;
            (host, port)
        }
        _ => return Err(ProxyError::BadRequest(format!("malformed CONNECT target: {target}"))),
    };
    Ok((host.to_ascii_lowercase(), port))
}

fn split_host_port(authority: &str, default_port: u16) -> Result<(String, u16), ProxyError> {
    if let Some(rest) = authority.strip_prefix('[') {
        let end = rest
            .find(']')
            .ok_or_else(|| ProxyError::BadRequest(format!("unterminated IPv6 literal: {authority}")))?;
        let host = &rest[..end];
        let after = &rest[end + 1..];
        let port = match after.strip_prefix(':') {
            Some(p) => p.parse().map_err(|_| ProxyError::BadRequest(format!("invalid port: {after}")))?,
            None if after.is_empty() => default_port,
            None => return Err(ProxyError::BadRequest(format!("malformed authority: {authority}"))),
        };
        return Ok((host.to_string(), port));
    }

    match authority.rsplit_once(':') {
        Some((host, port_str)) if !host.is_empty() => {
            let port = port_str
                .parse()
                .map_err(|_| ProxyError::BadRequest(format!("invalid port: {port_str}")))?;
            Ok((host.to_string(), port))
        }
        _ => {
            if authority.is_empty() {
                Err(ProxyError::BadRequest("empty host".into()))
            } else {
                Ok((authority.to_string(), default_port))
            }
        }
    }
}

/// Produces the normalized cache key for a request target: lowercases
/// scheme and host, drops the port if it equals the scheme default,
/// normalizes an empty path to `/`, preserves the query case-sensitively,
/// drops any fragment. On any parse failure, returns `target` unchanged so
/// an unparseable input still has a stable cache key. Idempotent:
/// `normalize_url(normalize_url(u)) == normalize_url(u)`.
pub fn normalize_url(target: &str) -> String {
    match parse_absolute_url(target) {
        Ok(url) => {
            if url.port == url.default_port() {
                format!("{}://{}{}", url.scheme, url.host, url.path)
            } else {
                format!("{}://{}:{}{}", url.scheme, url.host, url.port, url.path)
            }
        }
        Err(_) => target.to_string(),
    }
}

/// True iff `port == listen_port` and `hostname` is ASCII-case-equal to
/// `localhost` or equals `127.0.0.1`. Broader local-address detection (e.g.
/// `::1`, `0.0.0.0`) is intentionally not attempted: that detection is
/// optional, and over-matching would reject legitimate requests to hosts
/// that merely share a loopback-adjacent name.
pub fn is_self_loop(hostname: &str, port: u16, listen_port: u16) -> bool {
    port == listen_port && (hostname.eq_ignore_ascii_case("localhost") || hostname == "127.0.0.1")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_absolute_url_with_explicit_port_and_path() {
        let u = parse_absolute_url("http://Example.com:8080/a/b?x=1").unwrap();
        assert_eq!(u.host, "example.com");
        assert_eq!(u.port, 8080);
        assert_eq!(u.path, "/a/b?x=1");
    }

    #[test]
    fn parses_absolute_url_defaulting_port_and_path() {
        let u = parse_absolute_url("http://example.com").unwrap();
        assert_eq!(u.port, 80);
        assert_eq!(u.path, "/");
    }

    #[test]
    fn accepts_https_absolute_form_with_443_default() {
        let u = parse_absolute_url("https://example.com/").unwrap();
        assert_eq!(u.scheme, "https");
        assert_eq!(u.port, 443);
    }

    #[test]
    fn strips_fragment_from_path() {
        let u = parse_absolute_url("http://example.com/a#frag").unwrap();
        assert_eq!(u.path, "/a");
    }

    #[test]
    fn origin_form_target_is_rejected() {
        assert!(parse_absolute_url("/just/a/path").is_err());
    }

    #[test]
    fn parses_authority_form_for_connect() {
        let (host, port) = parse_authority_form("example.com:443").unwrap();
        assert_eq!(host, "example.com");
        assert_eq!(port, 443);
    }

    #[test]
    fn authority_form_rejects_absolute_form_prefix() {
        assert!(parse_authority_form("http://example.com:443").is_err());
    }

    #[test]
    fn authority_form_requires_numeric_port() {
        assert!(parse_authority_form("example.com").is_err());
        assert!(parse_authority_form("example.com:https").is_err());
    }

    #[test]
    fn normalize_strips_default_port_and_is_idempotent() {
        let n1 = normalize_url("http://Example.com:80/a");
        assert_eq!(n1, "http://example.com/a");
        assert_eq!(normalize_url(&n1), n1);
    }

    #[test]
    fn normalize_keeps_non_default_port() {
        assert_eq!(normalize_url("http://example.com:8080/a"), "http://example.com:8080/a");
    }

    #[test]
    fn normalize_returns_unparseable_target_unchanged() {
        let garbage = "not a url at all";
        assert_eq!(normalize_url(garbage), garbage);
    }

    #[test]
    fn self_loop_matches_localhost_and_loopback_ip_on_listen_port() {
        assert!(is_self_loop("localhost", 8888, 8888));
        assert!(is_self_loop("LOCALHOST", 8888, 8888));
        assert!(is_self_loop("127.0.0.1", 8888, 8888));
        assert!(!is_self_loop("127.0.0.1", 80, 8888));
        assert!(!is_self_loop("example.com", 8888, 8888));
    }
}
