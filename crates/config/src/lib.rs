//! Waypoint Config - loading, validation and hot reload for the proxy's
//! `Config` (`listen_port`, `idle_timeout`, `max_object_bytes`,
//! `max_cache_bytes`, `proxy_id`).

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod loader;
pub mod types;

pub use loader::{ConfigError, ConfigLoader};
pub use types::{Config, ValidationError};
