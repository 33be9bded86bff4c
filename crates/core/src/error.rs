//! Error types for Waypoint.
//!
//! All errors are non-panicking and propagate via `Result`. The set of
//! variants is closed: every failure the proxy can observe while handling a
//! connection maps onto exactly one of these, and each variant maps onto
//! exactly one HTTP status code via [`ProxyError::status_code`].

use thiserror::Error;

/// Errors the proxy pipeline can produce while handling one request.
#[derive(Error, Debug)]
pub enum ProxyError {
    /// The client sent a message that failed the request-line/header grammar,
    /// or a header block exceeded the maximum size.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The request target resolves to this proxy's own listening address.
    #[error("self loop: request target is this proxy")]
    SelfLoop,

    /// DNS resolution for the origin host did not complete within the bound.
    #[error("resolve failure: {0}")]
    ResolveFailure(String),

    /// The origin host actively refused the TCP connection.
    #[error("connection refused: {0}")]
    ConnectionRefused(String),

    /// The origin host or an intermediate network was unreachable.
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    /// An I/O error occurred while talking to the origin after connecting.
    #[error("origin io error: {0}")]
    OriginIo(String),

    /// The origin did not respond within the per-request deadline.
    #[error("origin timeout")]
    OriginTimeout,

    /// An error not attributable to the client or the origin.
    #[error("internal error: {0}")]
    InternalError(String),
}

impl ProxyError {
    /// Returns the HTTP status code the pipeline reports to the client for
    /// this error. Origin-side errors never surface the origin's own status;
    /// they are translated to the proxy's own 502/504 per the error table.
    pub fn status_code(&self) -> u16 {
        match self {
            ProxyError::BadRequest(_) => 400,
            ProxyError::SelfLoop => 421,
            ProxyError::ResolveFailure(_) => 502,
            ProxyError::ConnectionRefused(_) => 502,
            ProxyError::NetworkUnreachable(_) => 502,
            ProxyError::OriginIo(_) => 502,
            ProxyError::OriginTimeout => 504,
            ProxyError::InternalError(_) => 502,
        }
    }

    /// Short reason phrase used in the proxy's own error response bodies.
    pub fn reason(&self) -> &'static str {
        match self {
            ProxyError::BadRequest(_) => "Bad Request",
            ProxyError::SelfLoop => "Misdirected Request",
            ProxyError::ResolveFailure(_) => "Bad Gateway",
            ProxyError::ConnectionRefused(_) => "Bad Gateway",
            ProxyError::NetworkUnreachable(_) => "Bad Gateway",
            ProxyError::OriginIo(_) => "Bad Gateway",
            ProxyError::OriginTimeout => "Gateway Timeout",
            ProxyError::InternalError(_) => "Bad Gateway",
        }
    }
}

/// Result type alias using [`ProxyError`].
pub type Result<T> = std::result::Result<T, ProxyError>;
