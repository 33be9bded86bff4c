//! Transaction events: one per completed request, emitted as a structured
//! `tracing` record. Formatting the fields into a concrete log line or
//! format is delegated to whatever `tracing_subscriber` layer the binary
//! installs — this module only decides what fields exist.

use std::net::SocketAddr;

/// The cache-status tag recorded *before* the pipeline runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTag {
    /// `GET`, and the normalized key was present in the cache.
    Hit,
    /// `GET`, and the normalized key was absent.
    Miss,
    /// Any method other than `GET`.
    NotApplicable,
}

impl CacheTag {
    /// The single-character tag used in transaction events (`H`/`M`/`-`).
    pub fn as_char(&self) -> char {
        match self {
            CacheTag::Hit => 'H',
            CacheTag::Miss => 'M',
            CacheTag::NotApplicable => '-',
        }
    }
}

/// One fully-formed transaction event.
#[derive(Debug, Clone)]
pub struct TransactionEvent<'a> {
    /// The client's IP address.
    pub client_ip: std::net::IpAddr,
    /// The client's ephemeral source port.
    pub client_port: u16,
    /// `H`/`M`/`-`, recorded before the pipeline ran.
    pub cache_tag: CacheTag,
    /// The request-line, verbatim as received.
    pub request_line: &'a str,
    /// The response status code, parsed back from the response bytes
    /// (defaulting to 502 if that parse fails — see [`parse_status_code`]).
    pub status_code: u16,
    /// The number of bytes in the response body after the final header
    /// terminator — not the total wire size.
    pub response_body_bytes: usize,
}

impl TransactionEvent<'_> {
    /// Emits this event as a single structured `tracing::info!` record.
    pub fn emit(&self) {
        tracing::info!(
            client_ip = %self.client_ip,
            client_port = self.client_port,
            cache_tag = %self.cache_tag.as_char(),
            request_line = self.request_line,
            status = self.status_code,
            body_bytes = self.response_body_bytes,
            "transaction",
        );
    }
}

/// Builds a [`TransactionEvent`] from a client address and the already
/// computed response facts.
pub fn event<'a>(
    client_addr: SocketAddr,
    cache_tag: CacheTag,
    request_line: &'a str,
    status_code: u16,
    response_body_bytes: usize,
) -> TransactionEvent<'a> {
    TransactionEvent {
        client_ip: client_addr.ip(),
        client_port: client_addr.port(),
        cache_tag,
        request_line,
        status_code,
        response_body_bytes,
    }
}

/// Parses the status code back out of a serialized response's first line,
/// defaulting to 502 if the bytes don't parse — a defensive fallback for
/// logging only, never consulted by the pipeline itself.
pub fn parse_status_code(response_bytes: &[u8]) -> u16 {
    (|| {
        let line_end = memchr::memchr(b'\n', response_bytes)?;
        let line = std::str::from_utf8(&response_bytes[..line_end]).ok()?;
        let mut parts = line.split_whitespace();
        parts.next()?;
        parts.next()?.parse::<u16>().ok()
    })()
    .unwrap_or(502)
}
