//! Gateway configuration.
//!
//! Tunables for a gateway connection, loadable from TOML:
//! - Write and handshake timeout
//! - Output event queue capacity
//! - Protocol version and encoding used when bootstrapping the URL
//! - REST base used for bootstrap lookups
//! - Optional read deadline
//! - Reconnect retry policy

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::GatewayError;
use crate::reconnect::ReconnectConfig;

/// Gateway protocol version requested by default.
pub const DEFAULT_VERSION: u8 = 6;

/// Payload encoding requested by default.
pub const DEFAULT_ENCODING: &str = "json";

/// REST base used by default for bootstrap lookups.
pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v6/";

/// Main gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GatewayConfig {
    /// Bound on dialing, the handshake, each websocket write, and each
    /// enqueue into the event queue, in seconds.
    pub timeout_secs: u64,
    /// Capacity of the output event queue.
    pub event_buffer: usize,
    /// Gateway protocol version.
    pub version: u8,
    /// Payload encoding.
    pub encoding: String,
    /// REST base URL for bootstrap lookups.
    pub api_base: String,
    /// Member count above which the gateway stops sending offline members.
    pub large_threshold: Option<u32>,
    /// Extra time past the heartbeat interval to wait for any inbound
    /// frame before dropping the connection, in milliseconds. Unset means
    /// only missed heartbeat acks end a silent connection.
    pub read_grace_ms: Option<u64>,
    /// Retry policy after a connection failure.
    pub reconnect: ReconnectConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            event_buffer: 10,
            version: DEFAULT_VERSION,
            encoding: DEFAULT_ENCODING.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            large_threshold: None,
            read_grace_ms: None,
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, GatewayError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            GatewayError::Config(format!(
                "failed to read config file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn from_toml(content: &str) -> Result<Self, GatewayError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| GatewayError::Config(format!("invalid TOML: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.timeout_secs == 0 {
            return Err(GatewayError::Config(
                "timeout_secs must be greater than zero".to_string(),
            ));
        }

        if self.event_buffer == 0 {
            return Err(GatewayError::Config(
                "event_buffer must be at least 1".to_string(),
            ));
        }

        if self.encoding.is_empty() {
            return Err(GatewayError::Config("encoding cannot be empty".to_string()));
        }

        Url::parse(&self.api_base)
            .map_err(|e| GatewayError::Config(format!("invalid api_base '{}': {e}", self.api_base)))?;

        if self.reconnect.backoff_multiplier < 1.0 {
            return Err(GatewayError::Config(
                "reconnect.backoff_multiplier must be at least 1.0".to_string(),
            ));
        }

        if self.reconnect.max_attempts == Some(0) {
            return Err(GatewayError::Config(
                "reconnect.max_attempts must be at least 1 when set".to_string(),
            ));
        }

        Ok(())
    }

    /// The write and handshake bound.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Read deadline on top of `heartrate`, if one is configured.
    #[must_use]
    pub fn read_limit(&self, heartrate: Duration) -> Option<Duration> {
        self.read_grace_ms
            .map(|grace| heartrate.saturating_add(Duration::from_millis(grace)))
    }
}
