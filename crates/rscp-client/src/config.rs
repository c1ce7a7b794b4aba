// ============================================
// File: crates/rscp-client/src/config.rs
// ============================================
//! # Client Configuration
//!
//! ## Creation Reason
//! Provides configuration management for an RSCP session, loaded from a
//! TOML file and validated before any socket is opened.
//!
//! ## Main Functionality
//! - `ClientConfig`: Main configuration structure
//! - TOML file loading and parsing
//! - Configuration validation
//! - Vocabulary loading (built-in subset or JSON table)
//!
//! ## Configuration Sections
//! - `transport`: Local TCP or portal relay, connect bound
//! - `credentials`: Device user, password, RSCP key, portal login
//! - `session`: Request/auth timeouts, fault threshold, queue depth
//! - `keepalive`: Idle window and probe tag
//! - `vocabulary`: Optional JSON tag table
//! - `logging`: Log level
//!
//! ## Example Configuration
//! ```toml
//! [transport]
//! kind = "local"
//! host = "192.168.1.20"
//! port = 5033
//!
//! [credentials]
//! username = "user"
//! password = "secret"
//! rscp_key = "rscp passphrase"
//!
//! [session]
//! request_timeout_ms = 10000
//!
//! [keepalive]
//! idle_window_secs = 30
//! probe_tag = "INFO_REQ_UTC_TIME"
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - `rscp_key` is required for both transports: the relay tunnels the
//!   same encrypted bytes as a local connection
//! - For the relay, `portal_digest` is the password digest the portal
//!   expects; `password` is used when it is absent
//! - Secrets serialize as `***`, so `to_toml` output is not reloadable
//!
//! ## Last Modified
//! v0.1.0 - Initial configuration implementation

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use rscp_common::Secret;
use rscp_core::crypto::KEY_SIZE;
use rscp_core::protocol::TagVocabulary;
use rscp_transport::relay::DEFAULT_RELAY_URL;
use rscp_transport::tcp::DEFAULT_PORT;
use rscp_transport::{PortalLogin, RelayOptions};

use crate::error::{ClientError, Result};

// ============================================
// ClientConfig
// ============================================

/// Main client configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    /// How to reach the device.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Device and portal credentials.
    #[serde(default)]
    pub credentials: CredentialsConfig,

    /// Exchange timing and limits.
    #[serde(default)]
    pub session: SessionConfig,

    /// Idle keep-alive probe.
    #[serde(default)]
    pub keepalive: KeepaliveConfig,

    /// Tag vocabulary source.
    #[serde(default)]
    pub vocabulary: VocabularyConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ClientConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file
    ///
    /// # Errors
    /// Returns error if file cannot be read, parsed or validated.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let path_str = path.display().to_string();

        info!("Loading configuration from: {}", path_str);

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ClientError::config_load(&path_str, e.to_string()))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| ClientError::config_load(&path_str, e.to_string()))?;

        config.validate()?;

        info!("Configuration loaded successfully");
        Ok(config)
    }

    /// Loads configuration from a string (useful for testing).
    ///
    /// # Errors
    /// Returns error if the TOML is malformed or fails validation.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ClientError::config_load("<string>", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// `ConfigInvalid` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        self.transport.validate()?;
        self.credentials.validate(self.transport.kind)?;
        self.session.validate()?;
        self.keepalive.validate()?;
        Ok(())
    }

    /// Serializes configuration to TOML string.
    #[must_use]
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    /// Loads the configured vocabulary, or the built-in subset.
    ///
    /// # Errors
    /// `ConfigLoad` if the file cannot be read, `Core` if it is not a
    /// valid table.
    pub async fn load_vocabulary(&self) -> Result<Arc<TagVocabulary>> {
        let Some(path) = &self.vocabulary.path else {
            return Ok(TagVocabulary::shared_builtin());
        };
        let path_str = path.display().to_string();
        info!("Loading tag vocabulary from: {}", path_str);

        let json = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ClientError::config_load(&path_str, e.to_string()))?;
        let vocabulary = TagVocabulary::from_json(&json)?;

        info!(tags = vocabulary.len(), "Tag vocabulary loaded");
        Ok(Arc::new(vocabulary))
    }

    // ========================================
    // Transport helpers
    // ========================================

    /// Portal login for the relay transport.
    ///
    /// # Errors
    /// `ConfigInvalid` if no serial number is configured.
    pub fn portal_login(&self) -> Result<PortalLogin> {
        let identifier = self
            .credentials
            .serial_number
            .clone()
            .ok_or_else(|| {
                ClientError::config_invalid("credentials.serial_number", "required for relayed transport")
            })?;
        let password_digest = self
            .credentials
            .portal_digest
            .clone()
            .unwrap_or_else(|| self.credentials.password.clone());
        Ok(PortalLogin {
            user: self.credentials.username.clone(),
            password_digest,
            identifier,
        })
    }

    /// Relay connection options.
    #[must_use]
    pub fn relay_options(&self) -> RelayOptions {
        RelayOptions {
            url: self.transport.relay_url.clone(),
            connect_timeout: self.transport.connect_timeout(),
            time_zone: self.transport.time_zone.clone(),
        }
    }
}

// ============================================
// TransportConfig
// ============================================

/// Which transport carries the session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Direct TCP to the device.
    #[default]
    Local,
    /// Websocket tunnel through the vendor portal.
    Relayed,
}

/// Transport configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Transport variant.
    #[serde(default)]
    pub kind: TransportKind,

    /// Device host name or address (local).
    #[serde(default)]
    pub host: String,

    /// Device port (local).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Portal relay URL (relayed).
    #[serde(default = "default_relay_url")]
    pub relay_url: String,

    /// Time zone reported to the portal (relayed).
    #[serde(default = "default_time_zone")]
    pub time_zone: String,

    /// Bound on connect, including relay registration.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_relay_url() -> String {
    DEFAULT_RELAY_URL.to_string()
}

fn default_time_zone() -> String {
    "GMT+0".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

impl TransportConfig {
    fn validate(&self) -> Result<()> {
        match self.kind {
            TransportKind::Local => {
                if self.host.trim().is_empty() {
                    return Err(ClientError::config_invalid(
                        "transport.host",
                        "cannot be empty for local transport",
                    ));
                }
                if self.port == 0 {
                    return Err(ClientError::config_invalid("transport.port", "port cannot be 0"));
                }
            }
            TransportKind::Relayed => {
                if self.relay_url.trim().is_empty() {
                    return Err(ClientError::config_invalid(
                        "transport.relay_url",
                        "cannot be empty for relayed transport",
                    ));
                }
            }
        }

        if self.connect_timeout_ms == 0 {
            return Err(ClientError::config_invalid(
                "transport.connect_timeout_ms",
                "must be greater than 0",
            ));
        }

        Ok(())
    }

    /// Connect bound as a `Duration`.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: TransportKind::default(),
            host: String::new(),
            port: default_port(),
            relay_url: default_relay_url(),
            time_zone: default_time_zone(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

// ============================================
// CredentialsConfig
// ============================================

/// Credentials configuration section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialsConfig {
    /// Device (and portal) user name.
    #[serde(default)]
    pub username: String,

    /// Device password.
    #[serde(default)]
    pub password: Secret,

    /// Encryption passphrase set on the device.
    #[serde(default)]
    pub rscp_key: Secret,

    /// Device serial number, used as the portal identifier (relayed).
    #[serde(default)]
    pub serial_number: Option<String>,

    /// Password digest for the portal login (relayed).
    #[serde(default)]
    pub portal_digest: Option<Secret>,
}

impl CredentialsConfig {
    fn validate(&self, kind: TransportKind) -> Result<()> {
        if self.username.is_empty() {
            return Err(ClientError::config_invalid(
                "credentials.username",
                "cannot be empty",
            ));
        }

        if self.rscp_key.is_empty() {
            return Err(ClientError::config_invalid(
                "credentials.rscp_key",
                "cannot be empty",
            ));
        }

        if self.rscp_key.expose().len() > KEY_SIZE {
            return Err(ClientError::config_invalid(
                "credentials.rscp_key",
                format!("cannot exceed {KEY_SIZE} bytes"),
            ));
        }

        if kind == TransportKind::Relayed
            && self.serial_number.as_deref().map_or(true, |s| s.trim().is_empty())
        {
            return Err(ClientError::config_invalid(
                "credentials.serial_number",
                "required for relayed transport",
            ));
        }

        Ok(())
    }
}

// ============================================
// SessionConfig
// ============================================

/// Session configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Default deadline for one exchange.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Deadline for the authentication reply.
    #[serde(default = "default_auth_timeout_ms")]
    pub auth_timeout_ms: u64,

    /// Request timeouts in a row that fault the connection.
    #[serde(default = "default_max_consecutive_timeouts")]
    pub max_consecutive_timeouts: u32,

    /// Calls that may wait for the dispatcher.
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,

    /// Largest frame accepted from the device.
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_auth_timeout_ms() -> u64 {
    5000
}

fn default_max_consecutive_timeouts() -> u32 {
    3
}

fn default_queue_depth() -> usize {
    32
}

fn default_max_frame_size() -> usize {
    32 * 1024
}

impl SessionConfig {
    fn validate(&self) -> Result<()> {
        if self.request_timeout_ms == 0 {
            return Err(ClientError::config_invalid(
                "session.request_timeout_ms",
                "must be greater than 0",
            ));
        }

        if self.auth_timeout_ms == 0 {
            return Err(ClientError::config_invalid(
                "session.auth_timeout_ms",
                "must be greater than 0",
            ));
        }

        if self.max_consecutive_timeouts == 0 {
            return Err(ClientError::config_invalid(
                "session.max_consecutive_timeouts",
                "must be greater than 0",
            ));
        }

        if self.queue_depth == 0 {
            return Err(ClientError::config_invalid(
                "session.queue_depth",
                "must be greater than 0",
            ));
        }

        // header, trailer and one block of padding
        if self.max_frame_size < 64 {
            return Err(ClientError::config_invalid(
                "session.max_frame_size",
                "must be at least 64",
            ));
        }

        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
            auth_timeout_ms: default_auth_timeout_ms(),
            max_consecutive_timeouts: default_max_consecutive_timeouts(),
            queue_depth: default_queue_depth(),
            max_frame_size: default_max_frame_size(),
        }
    }
}

// ============================================
// KeepaliveConfig
// ============================================

/// Keep-alive configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeepaliveConfig {
    /// Whether to probe an idle connection.
    #[serde(default = "default_keepalive_enabled")]
    pub enabled: bool,

    /// Idle time before a probe is sent.
    #[serde(default = "default_idle_window_secs")]
    pub idle_window_secs: u64,

    /// Vocabulary name of the probe request.
    #[serde(default = "default_probe_tag")]
    pub probe_tag: String,
}

fn default_keepalive_enabled() -> bool {
    true
}

fn default_idle_window_secs() -> u64 {
    30
}

fn default_probe_tag() -> String {
    "INFO_REQ_UTC_TIME".to_string()
}

impl KeepaliveConfig {
    fn validate(&self) -> Result<()> {
        if self.idle_window_secs == 0 {
            return Err(ClientError::config_invalid(
                "keepalive.idle_window_secs",
                "must be greater than 0",
            ));
        }

        if self.probe_tag.is_empty() {
            return Err(ClientError::config_invalid(
                "keepalive.probe_tag",
                "cannot be empty",
            ));
        }

        Ok(())
    }
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            enabled: default_keepalive_enabled(),
            idle_window_secs: default_idle_window_secs(),
            probe_tag: default_probe_tag(),
        }
    }
}

// ============================================
// VocabularyConfig
// ============================================

/// Vocabulary configuration section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VocabularyConfig {
    /// JSON table generated offline. Built-in subset when absent.
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Reject values whose wire type differs from the table.
    #[serde(default)]
    pub strict: bool,
}

// ============================================
// LoggingConfig
// ============================================

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    const LOCAL: &str = r#"
        [transport]
        kind = "local"
        host = "192.168.1.20"

        [credentials]
        username = "user"
        password = "secret"
        rscp_key = "rscp passphrase"
    "#;

    #[test]
    fn test_default_config_needs_credentials() {
        let config = ClientConfig::default();
        let err = config.validate().unwrap_err();
        assert!(err.is_config_error());
        assert!(err.to_string().contains("transport.host"));
    }

    #[test]
    fn test_local_config_with_defaults() {
        let config = ClientConfig::from_str(LOCAL).unwrap();
        assert_eq!(config.transport.kind, TransportKind::Local);
        assert_eq!(config.transport.port, 5033);
        assert_eq!(config.session.request_timeout_ms, 10_000);
        assert_eq!(config.session.max_consecutive_timeouts, 3);
        assert_eq!(config.session.queue_depth, 32);
        assert!(config.keepalive.enabled);
        assert_eq!(config.keepalive.probe_tag, "INFO_REQ_UTC_TIME");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.credentials.password.expose(), "secret");
    }

    #[test]
    fn test_relayed_config() {
        let toml = r#"
            [transport]
            kind = "relayed"
            connect_timeout_ms = 8000

            [credentials]
            username = "portal-user"
            password = "secret"
            rscp_key = "rscp passphrase"
            serial_number = "S10-123456"
            portal_digest = "5ebe2294ecd0e0f08eab7690d2a6ee69"
        "#;

        let config = ClientConfig::from_str(toml).unwrap();
        let login = config.portal_login().unwrap();
        assert_eq!(login.identifier, "S10-123456");
        assert_eq!(login.password_digest.expose(), "5ebe2294ecd0e0f08eab7690d2a6ee69");

        let options = config.relay_options();
        assert_eq!(options.url, DEFAULT_RELAY_URL);
        assert_eq!(options.connect_timeout, Duration::from_secs(8));
    }

    #[test]
    fn test_relayed_requires_serial() {
        let toml = r#"
            [transport]
            kind = "relayed"

            [credentials]
            username = "user"
            rscp_key = "k"
        "#;
        let err = ClientConfig::from_str(toml).unwrap_err();
        assert!(err.to_string().contains("credentials.serial_number"));
    }

    #[test]
    fn test_rejects_invalid_values() {
        let zero_queue = format!("{LOCAL}\n[session]\nqueue_depth = 0\n");
        assert!(ClientConfig::from_str(&zero_queue)
            .unwrap_err()
            .to_string()
            .contains("session.queue_depth"));

        let mut config = ClientConfig::from_str(LOCAL).unwrap();
        config.credentials.rscp_key = Secret::new("x".repeat(33));
        assert!(config.validate().is_err());

        let mut config = ClientConfig::from_str(LOCAL).unwrap();
        config.keepalive.idle_window_secs = 0;
        assert!(config.validate().is_err());

        let mut config = ClientConfig::from_str(LOCAL).unwrap();
        config.session.request_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_secrets_redacted_in_toml() {
        let config = ClientConfig::from_str(LOCAL).unwrap();
        let rendered = config.to_toml();
        assert!(!rendered.contains("secret"));
        assert!(!rendered.contains("rscp passphrase"));
    }

    #[tokio::test]
    async fn test_builtin_vocabulary_without_path() {
        let config = ClientConfig::from_str(LOCAL).unwrap();
        let vocabulary = config.load_vocabulary().await.unwrap();
        assert!(vocabulary.id_of("INFO_REQ_UTC_TIME").is_some());
    }

    #[tokio::test]
    async fn test_missing_vocabulary_file() {
        let mut config = ClientConfig::from_str(LOCAL).unwrap();
        config.vocabulary.path = Some(PathBuf::from("/nonexistent/rscp/tags.json"));
        let err = config.load_vocabulary().await.unwrap_err();
        assert!(err.is_config_error());
    }
}
