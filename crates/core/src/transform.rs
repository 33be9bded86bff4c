//! Request and response rewriting rules applied by the pipeline before
//! forwarding to the origin, and before returning to the client.

use crate::message::{Headers, Request, Response};

/// Rewrites a request in place before it is sent to the origin:
/// - drops `Proxy-Connection` (a non-standard header some clients send that
///   must never reach the origin),
/// - forces `Connection: close` towards the origin (this proxy never keeps
///   an origin connection open across requests),
/// - sets `Host` to the resolved origin hostname, with the port appended
///   unless it is the scheme default (80 or 443), overriding whatever the
///   client sent so the origin always sees the address this proxy actually
///   dialed,
/// - appends this proxy's identity to `Via`.
pub fn rewrite_request(req: &mut Request, proxy_id: &str, hostname: &str, port: u16) {
    req.headers.remove("proxy-connection");
    req.headers.set("Connection", "close");
    let host_value = if port == 80 || port == 443 {
        hostname.to_string()
    } else {
        format!("{hostname}:{port}")
    };
    req.headers.set("Host", host_value);
    append_via(&mut req.headers, proxy_id);
}

/// Rewrites a response in place before it is sent to the client:
/// - drops any `Connection` header the origin sent (the proxy decides
///   persistence towards the client itself),
/// - appends this proxy's identity to `Via`.
///
/// Persistence towards the client is a separate decision; see
/// [`client_wants_persistent`].
pub fn rewrite_response(resp: &mut Response, proxy_id: &str) {
    resp.headers.remove("connection");
    append_via(&mut resp.headers, proxy_id);
}

/// Appends `proxy_id` to `Via`: `<existing>, <proxy_id>` if a `Via` header is
/// already present, otherwise just `<proxy_id>`, per spec §4.2.
fn append_via(headers: &mut Headers, proxy_id: &str) {
    match headers.get("via") {
        Some(existing) => {
            let combined = format!("{existing}, {proxy_id}");
            headers.set("Via", combined);
        }
        None => headers.set("Via", proxy_id),
    }
}

/// Decides whether the connection to the client should be kept open after
/// this response, from the client's own `Connection` header and HTTP
/// version: HTTP/1.1 defaults to persistent unless `Connection: close` was
/// sent; HTTP/1.0 defaults to non-persistent unless `Connection: keep-alive`
/// was sent.
pub fn client_wants_persistent(client_version: &str, client_connection: Option<&str>) -> bool {
    let says_close = client_connection
        .map(|v| v.split(',').any(|tok| tok.trim().eq_ignore_ascii_case("close")))
        .unwrap_or(false);
    let says_keep_alive = client_connection
        .map(|v| v.split(',').any(|tok| tok.trim().eq_ignore_ascii_case("keep-alive")))
        .unwrap_or(false);

    if says_close {
        return false;
    }
    match client_version {
        "HTTP/1.1" => true,
        "HTTP/1.0" => says_keep_alive,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Method;

    fn sample_request() -> Request {
        Request {
            method: Method::Get,
            target: "http://example.com/".to_string(),
            version: "HTTP/1.1".to_string(),
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    #[test]
    fn rewrite_request_drops_proxy_connection_and_forces_close() {
        let mut req = sample_request();
        req.headers.append("Proxy-Connection", "keep-alive");
        rewrite_request(&mut req, "waypoint-1", "example.com", 80);
        assert!(!req.headers.contains("proxy-connection"));
        assert_eq!(req.headers.get("connection"), Some("close"));
    }

    #[test]
    fn rewrite_request_sets_host_without_default_port() {
        let mut req = sample_request();
        rewrite_request(&mut req, "waypoint-1", "example.com", 80);
        assert_eq!(req.headers.get("host"), Some("example.com"));
    }

    #[test]
    fn rewrite_request_sets_host_with_non_default_port() {
        let mut req = sample_request();
        rewrite_request(&mut req, "waypoint-1", "example.com", 8080);
        assert_eq!(req.headers.get("host"), Some("example.com:8080"));
    }

    #[test]
    fn rewrite_request_overrides_client_supplied_host() {
        let mut req = sample_request();
        req.headers.append("Host", "other.example");
        rewrite_request(&mut req, "waypoint-1", "example.com", 80);
        assert_eq!(req.headers.get("host"), Some("example.com"));
    }

    #[test]
    fn rewrite_appends_to_existing_via() {
        let mut req = sample_request();
        req.headers.append("Via", "1.1 upstream-proxy");
        rewrite_request(&mut req, "waypoint-1", "example.com", 80);
        assert_eq!(req.headers.get("via"), Some("1.1 upstream-proxy, waypoint-1"));
    }

    #[test]
    fn rewrite_sets_via_to_just_the_proxy_id_when_absent() {
        let mut req = sample_request();
        rewrite_request(&mut req, "waypoint-1", "example.com", 80);
        assert_eq!(req.headers.get("via"), Some("waypoint-1"));
    }

    #[test]
    fn rewrite_response_drops_connection_header() {
        let mut resp = Response::new(200, "OK");
        resp.headers.append("Connection", "keep-alive");
        rewrite_response(&mut resp, "waypoint-1");
        assert!(!resp.headers.contains("connection"));
    }

    #[test]
    fn http11_defaults_to_persistent() {
        assert!(client_wants_persistent("HTTP/1.1", None));
        assert!(!client_wants_persistent("HTTP/1.1", Some("close")));
    }

    #[test]
    fn http10_defaults_to_non_persistent() {
        assert!(!client_wants_persistent("HTTP/1.0", None));
        assert!(client_wants_persistent("HTTP/1.0", Some("keep-alive")));
    }
}
