//! Configuration types for the Waypoint forward proxy.
//!
//! Fields: `listen_port`, `idle_timeout`, `max_object_bytes`,
//! `max_cache_bytes`, `proxy_id`. All fields are required except
//! `proxy_id`, which has an implementation-chosen default.

use serde::{Deserialize, Serialize};

fn default_proxy_id() -> String {
    "waypoint".to_string()
}

/// Immutable proxy configuration, validated at load time.
///
/// Once constructed via [`Config::validate`] (called by the loader), every
/// field is guaranteed to be within its required range; the `Cache`,
/// `Pipeline` and `Server` never re-check these bounds themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// TCP port the proxy listens on. Must be in `1024..=65535`.
    pub listen_port: u16,

    /// Idle/read timeout, in seconds, applied to client reads, origin
    /// connects, and origin reads (subject to the reductions the server
    /// applies for close-delimited reads and DNS resolution). Must be
    /// positive.
    pub idle_timeout: u64,

    /// Largest single response body admitted into the cache, in bytes. Must
    /// be positive.
    pub max_object_bytes: u64,

    /// Total cache budget across all entries, in bytes. Must be `>=
    /// max_object_bytes`.
    pub max_cache_bytes: u64,

    /// Short ASCII token appended to `Via` headers this proxy forwards.
    #[serde(default = "default_proxy_id")]
    pub proxy_id: String,
}

/// A validation failure: which field, and why.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// `listen_port` was outside `1024..=65535`.
    #[error("listen_port must be in 1024..=65535, got {0}")]
    ListenPortOutOfRange(u16),
    /// `idle_timeout` was zero.
    #[error("idle_timeout must be a positive number of seconds")]
    IdleTimeoutNotPositive,
    /// `max_object_bytes` was zero.
    #[error("max_object_bytes must be positive")]
    MaxObjectBytesNotPositive,
    /// `max_cache_bytes` was smaller than `max_object_bytes`.
    #[error("max_cache_bytes ({max_cache_bytes}) must be >= max_object_bytes ({max_object_bytes})")]
    CacheSmallerThanObject {
        /// The configured `max_cache_bytes`.
        max_cache_bytes: u64,
        /// The configured `max_object_bytes`.
        max_object_bytes: u64,
    },
    /// `proxy_id` was empty or contained non-ASCII bytes.
    #[error("proxy_id must be a non-empty ASCII token")]
    ProxyIdInvalid,
}

impl Config {
    /// Checks every field against its required range. Called by the
    /// loader before a `Config` is ever handed to the server; nothing
    /// downstream re-validates.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(1024..=65535).contains(&self.listen_port) {
            return Err(ValidationError::ListenPortOutOfRange(self.listen_port));
        }
        if self.idle_timeout == 0 {
            return Err(ValidationError::IdleTimeoutNotPositive);
        }
        if self.max_object_bytes == 0 {
            return Err(ValidationError::MaxObjectBytesNotPositive);
        }
        if self.max_cache_bytes < self.max_object_bytes {
            return Err(ValidationError::CacheSmallerThanObject {
                max_cache_bytes: self.max_cache_bytes,
                max_object_bytes: self.max_object_bytes,
            });
        }
        if self.proxy_id.is_empty() || !self.proxy_id.is_ascii() {
            return Err(ValidationError::ProxyIdInvalid);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> Config {
        Config {
            listen_port: 8888,
            idle_timeout: 30,
            max_object_bytes: 1_000_000,
            max_cache_bytes: 10_000_000,
            proxy_id: "waypoint-1".to_string(),
        }
    }

    #[test]
    fn accepts_a_valid_config() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn rejects_listen_port_below_1024() {
        let mut c = valid();
        c.listen_port = 80;
        assert_eq!(c.validate(), Err(ValidationError::ListenPortOutOfRange(80)));
    }

    #[test]
    fn rejects_zero_idle_timeout() {
        let mut c = valid();
        c.idle_timeout = 0;
        assert_eq!(c.validate(), Err(ValidationError::IdleTimeoutNotPositive));
    }

    #[test]
    fn rejects_cache_smaller_than_object_budget() {
        let mut c = valid();
        c.max_cache_bytes = c.max_object_bytes - 1;
        assert!(matches!(c.validate(), Err(ValidationError::CacheSmallerThanObject { .. })));
    }

    #[test]
    fn rejects_empty_proxy_id() {
        let mut c = valid();
        c.proxy_id = String::new();
        assert_eq!(c.validate(), Err(ValidationError::ProxyIdInvalid));
    }

    #[test]
    fn proxy_id_defaults_when_omitted_from_toml() {
        let toml = r#"
listen_port = 8888
idle_timeout = 30
max_object_bytes = 1000000
max_cache_bytes = 10000000
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.proxy_id, "waypoint");
    }
}
