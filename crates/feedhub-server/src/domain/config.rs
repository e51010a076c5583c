//! Server configuration types.
//!
//! [`ServerConfig`] is the single source of truth for all runtime settings of
//! the `feedhub` binary.  `main.rs` builds it from CLI flags, an optional
//! TOML file and the defaults below, then calls [`ServerConfig::validate`]
//! before anything is bound.
//!
//! The hub-level subset is handed to `feedhub-core` through
//! [`ServerConfig::hub_config`].

use std::net::SocketAddr;
use std::time::Duration;

use feedhub_core::{Endpoint, HubConfig};
use thiserror::Error;

/// A setting that cannot be used to start the server.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidConfig {
    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("{name} must start with '/', got {value:?}")]
    PathWithoutSlash { name: &'static str, value: String },

    #[error("chat path and live-feed path must differ (both are {0:?})")]
    SamePaths(String),
}

/// All runtime configuration for the feedhub server.
///
/// # Example
///
/// ```rust
/// use feedhub_server::domain::ServerConfig;
///
/// let cfg = ServerConfig::default();
/// assert_eq!(cfg.bind_addr.port(), 3000);
/// assert!(cfg.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// Address and port the WebSocket listener binds to.
    pub bind_addr: SocketAddr,

    /// Request path that selects the chat endpoint.
    pub chat_path: String,

    /// Request path that selects the live-feed endpoint.
    pub live_feed_path: String,

    /// Period between two live-feed pushes.
    pub live_feed_interval: Duration,

    /// Upper bound for a single write to one peer.  A peer that does not
    /// accept a frame within this time is treated as dead.
    pub write_timeout: Duration,

    /// Upper bound for the HTTP upgrade of a freshly accepted socket.
    pub handshake_timeout: Duration,

    /// Size of the per-connection read buffer, in bytes.
    pub read_buffer_size: usize,

    /// Deliver chat messages back to their sender as well.
    pub echo_to_sender: bool,

    /// How long shutdown waits for per-connection tasks before giving up.
    pub shutdown_grace: Duration,
}

impl Default for ServerConfig {
    /// | Field              | Default        |
    /// |--------------------|----------------|
    /// | bind_addr          | `0.0.0.0:3000` |
    /// | chat_path          | `/chat`        |
    /// | live_feed_path     | `/live-feed`   |
    /// | live_feed_interval | 2 seconds      |
    /// | write_timeout      | 5 seconds      |
    /// | handshake_timeout  | 10 seconds     |
    /// | read_buffer_size   | 1024 bytes     |
    /// | echo_to_sender     | false          |
    /// | shutdown_grace     | 3 seconds      |
    fn default() -> Self {
        Self {
            // Constant, known-valid socket address.
            bind_addr: "0.0.0.0:3000".parse().unwrap(),
            chat_path: "/chat".to_string(),
            live_feed_path: "/live-feed".to_string(),
            live_feed_interval: Duration::from_secs(2),
            write_timeout: Duration::from_secs(5),
            handshake_timeout: Duration::from_secs(10),
            read_buffer_size: 1024,
            echo_to_sender: false,
            shutdown_grace: Duration::from_secs(3),
        }
    }
}

impl ServerConfig {
    /// Checks the settings that would otherwise fail at runtime.
    ///
    /// # Errors
    ///
    /// Returns the first [`InvalidConfig`] found.
    pub fn validate(&self) -> Result<(), InvalidConfig> {
        if self.live_feed_interval.is_zero() {
            return Err(InvalidConfig::Zero("live-feed interval"));
        }
        if self.write_timeout.is_zero() {
            return Err(InvalidConfig::Zero("write timeout"));
        }
        if self.handshake_timeout.is_zero() {
            return Err(InvalidConfig::Zero("handshake timeout"));
        }
        if self.read_buffer_size == 0 {
            return Err(InvalidConfig::Zero("read buffer size"));
        }
        for (name, value) in [
            ("chat path", &self.chat_path),
            ("live-feed path", &self.live_feed_path),
        ] {
            if !value.starts_with('/') {
                return Err(InvalidConfig::PathWithoutSlash {
                    name,
                    value: value.clone(),
                });
            }
        }
        if self.chat_path == self.live_feed_path {
            return Err(InvalidConfig::SamePaths(self.chat_path.clone()));
        }
        Ok(())
    }

    /// Maps an upgrade request path to the endpoint it selects.
    ///
    /// Any query string is ignored.  Returns `None` for unknown paths, which
    /// the server rejects with 404.
    pub fn endpoint_for_path(&self, path: &str) -> Option<Endpoint> {
        let path = path.split('?').next().unwrap_or(path);
        if path == self.chat_path {
            Some(Endpoint::Chat)
        } else if path == self.live_feed_path {
            Some(Endpoint::LiveFeed)
        } else {
            None
        }
    }

    /// The hub-level subset of this configuration.
    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            live_feed_interval: self.live_feed_interval,
            write_timeout: self.write_timeout,
            read_buffer_size: self.read_buffer_size,
            echo_to_sender: self.echo_to_sender,
            ..HubConfig::default()
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_port_is_3000() {
        // Arrange / Act
        let cfg = ServerConfig::default();
        // Assert
        assert_eq!(cfg.bind_addr.port(), 3000);
        assert!(cfg.bind_addr.ip().is_unspecified());
    }

    #[test]
    fn test_default_paths() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.chat_path, "/chat");
        assert_eq!(cfg.live_feed_path, "/live-feed");
    }

    #[test]
    fn test_default_timings() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.live_feed_interval, Duration::from_secs(2));
        assert_eq!(cfg.write_timeout, Duration::from_secs(5));
        assert_eq!(cfg.handshake_timeout, Duration::from_secs(10));
        assert_eq!(cfg.shutdown_grace, Duration::from_secs(3));
    }

    #[test]
    fn test_default_is_valid() {
        assert_eq!(ServerConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        // Arrange
        let cfg = ServerConfig {
            live_feed_interval: Duration::ZERO,
            ..ServerConfig::default()
        };

        // Act
        let result = cfg.validate();

        // Assert
        assert_eq!(result, Err(InvalidConfig::Zero("live-feed interval")));
    }

    #[test]
    fn test_validate_rejects_zero_write_timeout() {
        let cfg = ServerConfig {
            write_timeout: Duration::ZERO,
            ..ServerConfig::default()
        };
        assert_eq!(cfg.validate(), Err(InvalidConfig::Zero("write timeout")));
    }

    #[test]
    fn test_validate_rejects_zero_read_buffer() {
        let cfg = ServerConfig {
            read_buffer_size: 0,
            ..ServerConfig::default()
        };
        assert_eq!(cfg.validate(), Err(InvalidConfig::Zero("read buffer size")));
    }

    #[test]
    fn test_validate_rejects_path_without_leading_slash() {
        let cfg = ServerConfig {
            chat_path: "chat".to_string(),
            ..ServerConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(InvalidConfig::PathWithoutSlash { name: "chat path", .. })
        ));
    }

    #[test]
    fn test_validate_rejects_identical_paths() {
        let cfg = ServerConfig {
            live_feed_path: "/chat".to_string(),
            ..ServerConfig::default()
        };
        assert_eq!(
            cfg.validate(),
            Err(InvalidConfig::SamePaths("/chat".to_string()))
        );
    }

    #[test]
    fn test_endpoint_for_path_routes_known_paths() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.endpoint_for_path("/chat"), Some(Endpoint::Chat));
        assert_eq!(cfg.endpoint_for_path("/live-feed"), Some(Endpoint::LiveFeed));
    }

    #[test]
    fn test_endpoint_for_path_ignores_query_string() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.endpoint_for_path("/chat?room=1"), Some(Endpoint::Chat));
    }

    #[test]
    fn test_endpoint_for_path_unknown_is_none() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.endpoint_for_path("/"), None);
        assert_eq!(cfg.endpoint_for_path("/chat/"), None);
        assert_eq!(cfg.endpoint_for_path("/admin"), None);
    }

    #[test]
    fn test_hub_config_carries_hub_settings() {
        // Arrange
        let cfg = ServerConfig {
            live_feed_interval: Duration::from_millis(250),
            write_timeout: Duration::from_millis(700),
            read_buffer_size: 64,
            echo_to_sender: true,
            ..ServerConfig::default()
        };

        // Act
        let hub = cfg.hub_config();

        // Assert
        assert_eq!(hub.live_feed_interval, Duration::from_millis(250));
        assert_eq!(hub.write_timeout, Duration::from_millis(700));
        assert_eq!(hub.read_buffer_size, 64);
        assert!(hub.echo_to_sender);
        assert_eq!(hub.max_transient_read_retries, 3);
    }
}
