//! Waypoint Server - blocking, thread-per-connection server for the
//! Waypoint caching HTTP/1.x forward proxy.
//!
//! Built on `std::net` rather than an async runtime: every suspension point
//! in the proxy (client read, origin read, DNS resolution, TCP connect) is
//! already bounded by an explicit timeout, so a fixed worker-thread pool
//! gives the same bounded-concurrency guarantees an async executor would,
//! without one.

#![warn(missing_docs)]

pub mod connection;
pub mod deadline;
pub mod dialer;
pub mod parser;
pub mod pipeline;
pub mod pool;
pub mod server;
pub mod stream;
pub mod transaction;
pub mod tunnel;
pub mod writer;

pub use server::{Server, ServerHandle};
