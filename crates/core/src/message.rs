//! HTTP/1.x message data model: methods, header containers, requests and
//! responses. This module only describes shapes; reading bytes off a socket
//! into these types is the server crate's job.

use std::fmt;

/// The request methods that appear on the wire. `Get`/`Head`/`Post`/`Connect`
/// are the ones this proxy forwards; any other well-formed `[A-Z]+` token
/// (`PUT`, `DELETE`, `PATCH`, ...) parses into `Other` rather than failing
/// outright — the request-line grammar is satisfied, so the framing stays
/// trustworthy and the connection survives. Only the pipeline, not the
/// parser, rejects an `Other` method with `400 Bad Request`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    /// `GET`
    Get,
    /// `HEAD`
    Head,
    /// `POST`
    Post,
    /// `CONNECT`
    Connect,
    /// Any other uppercase method token this proxy does not forward.
    Other(String),
}

impl Method {
    /// Parses a request-line method token. Case-sensitive, as HTTP/1.1
    /// requires: anything other than `[A-Z]+` fails outright, since that is
    /// a grammar violation rather than an unsupported-but-well-formed verb.
    pub fn parse(token: &str) -> Option<Method> {
        if token.is_empty() || !token.bytes().all(|b| b.is_ascii_uppercase()) {
            return None;
        }
        Some(match token {
            "GET" => Method::Get,
            "HEAD" => Method::Head,
            "POST" => Method::Post,
            "CONNECT" => Method::Connect,
            other => Method::Other(other.to_string()),
        })
    }

    /// The wire token for this method.
    pub fn as_str(&self) -> &str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Connect => "CONNECT",
            Method::Other(token) => token.as_str(),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An ordered, case-insensitive-lookup header container. Iteration preserves
/// insertion order and the original casing of each header name, matching
/// what a byte-for-byte correct proxy must forward; lookups are
/// case-insensitive per RFC 7230. Duplicate header names are all retained in
/// order; [`Headers::get`] returns the last one, matching how most origin
/// servers and clients resolve duplicates in practice.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    /// An empty header set.
    pub fn new() -> Self {
        Headers { entries: Vec::new() }
    }

    /// Appends a header, keeping any existing entries with the same name.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Removes every entry with this name (case-insensitive) and inserts a
    /// single entry with the given value in their place, at the position of
    /// the first removed entry (or the end, if none existed).
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        if let Some(pos) = self.entries.iter().position(|(n, _)| n.eq_ignore_ascii_case(&name)) {
            self.entries.retain(|(n, _)| !n.eq_ignore_ascii_case(&name));
            let pos = pos.min(self.entries.len());
            self.entries.insert(pos, (name, value));
        } else {
            self.entries.push((name, value));
        }
    }

    /// Removes every entry with this name (case-insensitive).
    pub fn remove(&mut self, name: &str) {
        self.entries.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    /// Returns the value of the last entry with this name, case-insensitive.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// True if any entry with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n.eq_ignore_ascii_case(name))
    }

    /// Iterates entries in wire order, original casing preserved.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Number of header entries (counting duplicates separately).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if there are no header entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A parsed HTTP/1.x request.
#[derive(Debug, Clone)]
pub struct Request {
    /// The request method.
    pub method: Method,
    /// The raw request target as it appeared on the wire (absolute-form,
    /// authority-form, or origin-form).
    pub target: String,
    /// `"HTTP/1.0"` or `"HTTP/1.1"`, as it appeared on the wire.
    pub version: String,
    /// Request headers, in wire order.
    pub headers: Headers,
    /// The request body, already fully read.
    pub body: Vec<u8>,
}

/// A parsed HTTP/1.x response.
#[derive(Debug, Clone)]
pub struct Response {
    /// `"HTTP/1.0"` or `"HTTP/1.1"`, as it appeared on the wire.
    pub version: String,
    /// Three-digit status code.
    pub status: u16,
    /// Reason phrase, as it appeared on the wire (or a synthesized one for
    /// responses this proxy builds itself).
    pub reason: String,
    /// Response headers, in wire order.
    pub headers: Headers,
    /// The response body, already fully read or assembled.
    pub body: Vec<u8>,
}

impl Response {
    /// Builds a minimal response this proxy generates itself (error pages,
    /// the CONNECT tunnel confirmation), with no body unless one is set
    /// afterward.
    pub fn new(status: u16, reason: impl Into<String>) -> Self {
        Response {
            version: "HTTP/1.1".to_string(),
            status,
            reason: reason.into(),
            headers: Headers::new(),
            body: Vec::new(),
        }
    }
}
