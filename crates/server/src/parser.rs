//! Decodes a header block (request-line or status-line plus header lines)
//! into the structured types from `waypoint-core`.

use waypoint_core::{Headers, Method, ProxyError};

/// A parsed request head: everything but the body, which the caller reads
/// separately once it knows the method and any `Content-Length`.
pub struct RequestHead {
    /// The request method.
    pub method: Method,
    /// The raw request target, exactly as it appeared.
    pub target: String,
    /// `"HTTP/1.0"` or `"HTTP/1.1"`.
    pub version: String,
    /// Headers, in wire order.
    pub headers: Headers,
}

/// A parsed response head.
pub struct ResponseHead {
    /// `"HTTP/1.0"` or `"HTTP/1.1"`.
    pub version: String,
    /// Three-digit status code.
    pub status: u16,
    /// Reason phrase (possibly empty).
    pub reason: String,
    /// Headers, in wire order.
    pub headers: Headers,
}

fn is_token_char(b: u8) -> bool {
    matches!(b,
        b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.'
        | b'0'..=b'9' | b'A'..=b'Z' | b'^' | b'_' | b'`' | b'a'..=b'z' | b'|' | b'~')
}

fn is_version(s: &str) -> bool {
    let Some(rest) = s.strip_prefix("HTTP/") else { return false };
    let mut parts = rest.splitn(2, '.');
    let (Some(major), Some(minor)) = (parts.next(), parts.next()) else { return false };
    !major.is_empty() && !minor.is_empty() && major.bytes().all(|b| b.is_ascii_digit()) && minor.bytes().all(|b| b.is_ascii_digit())
}

/// Splits a header block into its start-line and the lines that follow,
/// tolerating either `\r\n` or bare `\n` terminators throughout.
fn split_lines(block: &[u8]) -> Vec<&[u8]> {
    let text: &[u8] = block;
    let mut lines = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i < text.len() {
        if text[i] == b'\n' {
            let mut end = i;
            if end > start && text[end - 1] == b'\r' {
                end -= 1;
            }
            lines.push(&text[start..end]);
            start = i + 1;
        }
        i += 1;
    }
    if start < text.len() {
        lines.push(&text[start..]);
    }
    lines
}

fn parse_header_line(line: &[u8]) -> Result<(String, String), ProxyError> {
    let colon = line
        .iter()
        .position(|&b| b == b':')
        .ok_or_else(|| ProxyError::BadRequest(format!("malformed header line: {:?}", String::from_utf8_lossy(line))))?;
    let name = &line[..colon];
    if name.is_empty() || !name.iter().all(|&b| is_token_char(b)) {
        return Err(ProxyError::BadRequest(format!(
            "invalid header name: {:?}",
            String::from_utf8_lossy(name)
        )));
    }
    let value = line[colon + 1..].trim_ascii();
    let name = std::str::from_utf8(name)
        .map_err(|_| ProxyError::BadRequest("header name is not valid UTF-8".into()))?
        .to_string();
    let value = std::str::from_utf8(value)
        .map_err(|_| ProxyError::BadRequest("header value is not valid UTF-8".into()))?
        .to_string();
    Ok((name, value))
}

fn parse_headers(lines: &[&[u8]]) -> Result<Headers, ProxyError> {
    let mut headers = Headers::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let (name, value) = parse_header_line(line)?;
        headers.append(name, value);
    }
    Ok(headers)
}

/// Parses a complete request header block (request-line plus header lines,
/// terminator already stripped of trailing blank line by the caller's
/// `StreamReader::read_header_block`, which still leaves the blank line
/// itself as an empty trailing element here).
pub fn parse_request_head(block: &[u8]) -> Result<RequestHead, ProxyError> {
    let lines = split_lines(block);
    let request_line = lines
        .first()
        .ok_or_else(|| ProxyError::BadRequest("empty request".into()))?;
    let line_str = std::str::from_utf8(request_line)
        .map_err(|_| ProxyError::BadRequest("request line is not valid UTF-8".into()))?;
    let mut parts = line_str.split(' ');
    let (Some(method_tok), Some(target), Some(version), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(ProxyError::BadRequest(format!("malformed request line: {line_str}")));
    };
    // `Method::parse` accepts any well-formed `[A-Z]+` token, including ones
    // this proxy doesn't forward (`PUT`, `DELETE`, ...): the request-line
    // grammar is satisfied either way, so only a token that isn't even
    // `[A-Z]+` is a framing failure here. Whether the verb is one this
    // proxy actually forwards is the pipeline's decision, not the parser's.
    let method = Method::parse(method_tok)
        .ok_or_else(|| ProxyError::BadRequest(format!("malformed method token: {method_tok}")))?;
    if !is_version(version) {
        return Err(ProxyError::BadRequest(format!("malformed version: {version}")));
    }
    let headers = parse_headers(&lines[1..])?;
    Ok(RequestHead { method, target: target.to_string(), version: version.to_string(), headers })
}

/// Parses a complete response header block.
pub fn parse_response_head(block: &[u8]) -> Result<ResponseHead, ProxyError> {
    let lines = split_lines(block);
    let status_line = lines
        .first()
        .ok_or_else(|| ProxyError::BadRequest("empty response".into()))?;
    let line_str = std::str::from_utf8(status_line)
        .map_err(|_| ProxyError::BadRequest("status line is not valid UTF-8".into()))?;
    let mut parts = line_str.splitn(3, ' ');
    let version = parts.next().ok_or_else(|| ProxyError::BadRequest("empty status line".into()))?;
    let status_str = parts.next().ok_or_else(|| ProxyError::BadRequest("missing status code".into()))?;
    let reason = parts.next().unwrap_or("");

    if !is_version(version) {
        return Err(ProxyError::BadRequest(format!("malformed version: {version}")));
    }
    let status: u16 = status_str
        .parse()
        .map_err(|_| ProxyError::BadRequest(format!("malformed status code: {status_str}")))?;
    if !(100..=599).contains(&status) {
        return Err(ProxyError::BadRequest(format!("status code out of range: {status}")));
    }
    let headers = parse_headers(&lines[1..])?;
    Ok(ResponseHead { version: version.to_string(), status, reason: reason.to_string(), headers })
}
