//! Per-request orchestration: dispatch by method, cache lookup, origin
//! fetch, tunnel establishment, and error-to-response mapping.

use std::net::TcpStream;
use std::time::Duration;

use waypoint_config::Config;
use waypoint_core::{
    cache::CachedResponse, is_self_loop, normalize_url, parse_absolute_url, parse_authority_form, rewrite_request,
    rewrite_response, Cache, Headers, Method, ProxyError, Request, Response,
};

use crate::deadline::Deadline;
use crate::dialer;
use crate::parser::parse_response_head;
use crate::stream::StreamReader;
use crate::writer::serialize_request;

/// What the caller (the per-connection loop) should do after the pipeline
/// returns.
pub enum PipelineOutcome {
    /// Write this response to the client and continue the connection loop.
    Respond(Response),
    /// Write `confirmation` to the client, then relay raw bytes between the
    /// client socket and `origin` until either side closes or the tunnel's
    /// own overall timeout fires.
    Tunnel {
        /// The origin socket, already connected.
        origin: TcpStream,
        /// The `200 Connection Established` response to write first.
        confirmation: Response,
    },
}

/// Runs one parsed request to completion against cache/origin.
pub fn handle(request: Request, config: &Config, cache: &Cache) -> PipelineOutcome {
    let result = match &request.method {
        Method::Get => handle_get(&request, config, cache),
        Method::Head | Method::Post => handle_forward_only(&request, config),
        Method::Connect => handle_connect(&request, config),
        Method::Other(token) => Err(ProxyError::BadRequest(format!("unsupported method: {token}"))),
    };

    match result {
        Ok(outcome) => outcome,
        Err(err) => PipelineOutcome::Respond(error_response(&err)),
    }
}

fn handle_get(request: &Request, config: &Config, cache: &Cache) -> Result<PipelineOutcome, ProxyError> {
    let key = normalize_url(&request.target);

    if let Some(cached) = cache.get(&key) {
        let mut response = response_from_cached(&cached);
        let persistent = client_persistence(request);
        rewrite_response(&mut response, &config.proxy_id);
        response.headers.set("Connection", if persistent { "keep-alive" } else { "close" });
        return Ok(PipelineOutcome::Respond(response));
    }

    let response = forward_via_origin(request, config)?;

    let body_len = response.body.len() as u64;
    if cache.is_admissible(true, response.status, body_len) {
        cache.put(
            key,
            CachedResponse {
                version: response.version.clone(),
                status: response.status,
                reason: response.reason.clone(),
                headers: response.headers.clone(),
                body: response.body.clone().into(),
            },
            true,
        );
    }

    let mut response = response;
    let persistent = client_persistence(request);
    rewrite_response(&mut response, &config.proxy_id);
    response.headers.set("Connection", if persistent { "keep-alive" } else { "close" });
    Ok(PipelineOutcome::Respond(response))
}

/// `HEAD`/`POST`: identical to the `GET` miss path minus any cache
/// involvement at all — forward, then transform for the client.
fn handle_forward_only(request: &Request, config: &Config) -> Result<PipelineOutcome, ProxyError> {
    let mut response = forward_via_origin(request, config)?;
    let persistent = client_persistence(request);
    rewrite_response(&mut response, &config.proxy_id);
    response.headers.set("Connection", if persistent { "keep-alive" } else { "close" });
    Ok(PipelineOutcome::Respond(response))
}

fn response_from_cached(cached: &CachedResponse) -> Response {
    Response {
        version: cached.version.clone(),
        status: cached.status,
        reason: cached.reason.clone(),
        headers: cached.headers.clone(),
        body: cached.body.to_vec(),
    }
}

fn client_persistence(request: &Request) -> bool {
    waypoint_core::client_wants_persistent(&request.version, request.headers.get("connection"))
}

/// Parses the request target, dials the origin, forwards the (rewritten)
/// request, and reads back a response — used by the `GET` miss path and
/// directly by `HEAD`/`POST`, which never consult the cache at all.
fn forward_via_origin(request: &Request, config: &Config) -> Result<Response, ProxyError> {
    let url = parse_absolute_url(&request.target)?;
    if is_self_loop(&url.host, url.port, config.listen_port) {
        return Err(ProxyError::SelfLoop);
    }

    let idle_timeout = Duration::from_secs(config.idle_timeout);
    let deadline = Deadline::start(Duration::from_secs(config.idle_timeout.saturating_sub(1).max(1)));

    let result = (|| -> Result<Response, ProxyError> {
        let origin = dialer::connect(&url.host, url.port, idle_timeout)?;
        deadline.register_origin(origin.try_clone().map_err(|e| ProxyError::OriginIo(e.to_string()))?);
        if deadline.has_expired() {
            return Err(ProxyError::OriginTimeout);
        }

        let mut outgoing = request.clone();
        outgoing.target = url.path.clone();
        rewrite_request(&mut outgoing, &config.proxy_id, &url.host, url.port);

        let mut reader = StreamReader::new(origin);
        reader.write_all(&serialize_request(&outgoing)).map_err(|e| classify_origin_io(&e, &deadline))?;

        let response = read_origin_response(&mut reader, &outgoing.method).map_err(|e| classify_origin_io(&e, &deadline))?;
        if deadline.has_expired() {
            return Err(ProxyError::OriginTimeout);
        }
        Ok(response)
    })();

    deadline.cancel();
    result
}

fn classify_origin_io(e: &std::io::Error, deadline: &Deadline) -> ProxyError {
    if deadline.has_expired() {
        ProxyError::OriginTimeout
    } else {
        ProxyError::OriginIo(e.to_string())
    }
}

/// Reads a response head then its body, following the response body rule:
/// no body for `HEAD`/204/304; collect-until-close for chunked (a
/// deliberately degenerate policy — no chunk decoding); exact
/// `Content-Length`; read-until-close on `Connection: close`; otherwise
/// empty.
fn read_origin_response(reader: &mut StreamReader, method: &Method) -> std::io::Result<Response> {
    let header_block = reader.read_header_block().map_err(header_read_err_to_io)?;
    let head = parse_response_head(&header_block).map_err(proxy_err_to_io)?;

    let no_body = matches!(method, Method::Head) || head.status == 204 || head.status == 304;
    let body = if no_body {
        Vec::new()
    } else if head
        .headers
        .get("transfer-encoding")
        .map(|v| v.split(',').any(|tok| tok.trim().eq_ignore_ascii_case("chunked")))
        .unwrap_or(false)
    {
        reader.read_until_close()?
    } else if let Some(len) = head.headers.get("content-length") {
        let len: usize = len.trim().parse().map_err(|_| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, format!("malformed content-length: {len}"))
        })?;
        reader.read_exact(len)?
    } else if head
        .headers
        .get("connection")
        .map(|v| v.split(',').any(|tok| tok.trim().eq_ignore_ascii_case("close")))
        .unwrap_or(false)
    {
        reader.read_until_close()?
    } else {
        Vec::new()
    };

    Ok(Response { version: head.version, status: head.status, reason: head.reason, headers: head.headers, body })
}

fn header_read_err_to_io(e: crate::stream::HeaderReadError) -> std::io::Error {
    use crate::stream::HeaderReadError;
    match e {
        HeaderReadError::Eof { .. } => std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "origin closed before sending a response"),
        HeaderReadError::TooLarge => std::io::Error::new(std::io::ErrorKind::InvalidData, "origin response header block too large"),
        HeaderReadError::Timeout => std::io::Error::new(std::io::ErrorKind::TimedOut, "origin response timed out"),
        HeaderReadError::Io(e) => e,
    }
}

fn proxy_err_to_io(e: ProxyError) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
}

fn handle_connect(request: &Request, config: &Config) -> Result<PipelineOutcome, ProxyError> {
    let (host, port) = parse_authority_form(&request.target)?;
    if port != 443 {
        return Err(ProxyError::BadRequest(format!("CONNECT to non-443 port: {port}")));
    }
    if is_self_loop(&host, port, config.listen_port) {
        return Err(ProxyError::SelfLoop);
    }

    let idle_timeout = Duration::from_secs(config.idle_timeout);
    let deadline = Deadline::start(Duration::from_secs(config.idle_timeout.saturating_sub(1).max(1)));
    let origin = dialer::connect(&host, port, idle_timeout);
    let expired = deadline.has_expired();
    deadline.cancel();

    let origin = origin.map_err(|e| if expired { ProxyError::OriginTimeout } else { e })?;

    Ok(PipelineOutcome::Tunnel { origin, confirmation: Response::new(200, "Connection Established") })
}

/// Builds the proxy's own error response: `text/plain`, `Content-Length`,
/// `Connection: close`, body `Error <code>: <reason>\n\n<detail>`.
pub fn error_response(err: &ProxyError) -> Response {
    let code = err.status_code();
    let reason = err.reason();
    let detail = err.to_string();
    let body = format!("Error {code}: {reason}\n\n{detail}");

    let mut headers = Headers::new();
    headers.append("Content-Type", "text/plain");
    headers.append("Content-Length", body.len().to_string());
    headers.append("Connection", "close");

    Response { version: "HTTP/1.1".to_string(), status: code, reason: reason.to_string(), headers, body: body.into_bytes() }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config { listen_port: 8888, idle_timeout: 5, max_object_bytes: 1024, max_cache_bytes: 4096, proxy_id: "wp-test".into() }
    }

    #[test]
    fn unsupported_but_well_formed_method_gets_a_400_from_the_pipeline() {
        let cfg = config();
        let cache = Cache::new(cfg.max_cache_bytes, cfg.max_object_bytes);
        let headers = Headers::new();
        let req = Request {
            method: Method::Other("PATCH".to_string()),
            target: "http://example.com/".into(),
            version: "HTTP/1.1".into(),
            headers,
            body: Vec::new(),
        };
        match handle(req, &cfg, &cache) {
            PipelineOutcome::Respond(resp) => assert_eq!(resp.status, 400),
            PipelineOutcome::Tunnel { .. } => panic!("expected a direct response, not a tunnel"),
        }
    }

    #[test]
    fn connect_to_non_443_port_is_bad_request_not_self_loop() {
        let cfg = config();
        let mut headers = Headers::new();
        headers.append("Host", "example.com:80");
        let req = Request { method: Method::Connect, target: "example.com:80".into(), version: "HTTP/1.1".into(), headers, body: Vec::new() };
        match handle_connect(&req, &cfg) {
            Err(ProxyError::BadRequest(_)) => {}
            other => panic!("expected BadRequest, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn connect_to_localhost_on_listen_port_is_self_loop() {
        let mut cfg = config();
        cfg.listen_port = 443;
        let headers = Headers::new();
        let req = Request {
            method: Method::Connect,
            target: format!("localhost:{}", cfg.listen_port),
            version: "HTTP/1.1".into(),
            headers,
            body: Vec::new(),
        };
        match handle_connect(&req, &cfg) {
            Err(ProxyError::SelfLoop) => {}
            other => panic!("expected SelfLoop, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn error_response_has_the_required_shape() {
        let resp = error_response(&ProxyError::SelfLoop);
        assert_eq!(resp.status, 421);
        assert_eq!(resp.headers.get("content-type"), Some("text/plain"));
        assert_eq!(resp.headers.get("connection"), Some("close"));
        assert!(String::from_utf8(resp.body.clone()).unwrap().starts_with("Error 421: Misdirected Request"));
    }
}
