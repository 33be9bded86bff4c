//! Serializes requests and responses back to wire form. Output is always
//! strict `CRLF`, regardless of what leniency the parser accepted on input.

use waypoint_core::{Request, Response};

/// Serializes a request's start-line, headers, and body.
pub fn serialize_request(req: &Request) -> Vec<u8> {
    let mut out = Vec::with_capacity(256 + req.body.len());
    out.extend_from_slice(req.method.as_str().as_bytes());
    out.push(b' ');
    out.extend_from_slice(req.target.as_bytes());
    out.push(b' ');
    out.extend_from_slice(req.version.as_bytes());
    out.extend_from_slice(b"\r\n");
    for (name, value) in req.headers.iter() {
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(&req.body);
    out
}

/// Serializes a response's status-line, headers, and body.
pub fn serialize_response(resp: &Response) -> Vec<u8> {
    let mut out = Vec::with_capacity(256 + resp.body.len());
    out.extend_from_slice(resp.version.as_bytes());
    out.push(b' ');
    out.extend_from_slice(resp.status.to_string().as_bytes());
    out.push(b' ');
    out.extend_from_slice(resp.reason.as_bytes());
    out.extend_from_slice(b"\r\n");
    for (name, value) in resp.headers.iter() {
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(&resp.body);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use waypoint_core::{Headers, Method};

    #[test]
    fn serializes_request_with_headers_and_body() {
        let mut headers = Headers::new();
        headers.append("Host", "example.com");
        let req = Request {
            method: Method::Post,
            target: "/p".to_string(),
            version: "HTTP/1.1".to_string(),
            headers,
            body: b"hi".to_vec(),
        };
        let bytes = serialize_request(&req);
        assert_eq!(bytes, b"POST /p HTTP/1.1\r\nHost: example.com\r\n\r\nhi");
    }

    #[test]
    fn serializes_response_with_empty_reason_and_no_body() {
        let resp = Response::new(204, "");
        let bytes = serialize_response(&resp);
        assert_eq!(bytes, b"HTTP/1.1 204 \r\n\r\n");
    }

    #[test]
    fn connect_confirmation_matches_the_exact_wire_literal() {
        let resp = Response::new(200, "Connection Established");
        let bytes = serialize_response(&resp);
        assert_eq!(bytes, b"HTTP/1.1 200 Connection Established\r\n\r\n");
    }
}
