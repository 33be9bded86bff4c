//! Waypoint Core - data model, URL handling, forwarding rules and cache for
//! the Waypoint caching HTTP/1.x forward proxy.
//!
//! This crate holds everything that is pure logic: no sockets, no threads.
//! Byte-level framing and the network-facing pipeline live in
//! `waypoint-server`, which depends on this crate for the data model and the
//! rules it applies to it.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cache;
pub mod error;
pub mod message;
pub mod stats;
pub mod transform;
pub mod url;

pub use cache::{Cache, CacheStats, CachedResponse};
pub use error::{ProxyError, Result};
pub use message::{Headers, Method, Request, Response};
pub use stats::{ConnectionSnapshot, ConnectionStats};
pub use transform::{client_wants_persistent, rewrite_request, rewrite_response};
pub use url::{is_self_loop, normalize_url, parse_absolute_url, parse_authority_form, AbsoluteUrl};
