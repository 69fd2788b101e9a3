//! Configuration for the call-control registry and its HTTP transport
//!
//! # Usage Examples
//!
//! ```rust
//! use rvoip_call_control::config::CallControlConfig;
//!
//! let config = CallControlConfig::new()
//!     .with_account_level(true)
//!     .with_preload_devices(false);
//!
//! assert!(config.account_level);
//! assert!(config.preload_sessions);
//! ```

use std::time::Duration;

use url::Url;

use crate::error::{CallControlError, CallControlResult};
use crate::types::Extension;

/// Topic fragment identifying telephony session notifications
pub const DEFAULT_NOTIFICATION_TOPIC: &str = "/telephony/sessions";

/// Default platform endpoint
pub const DEFAULT_SERVER_URL: &str = "https://platform.ringcentral.com";

/// Default REST API prefix
pub const DEFAULT_API_PREFIX: &str = "/restapi/v1.0";

/// Registry configuration
#[derive(Debug, Clone)]
pub struct CallControlConfig {
    /// Track every extension of the account instead of the current one
    pub account_level: bool,
    /// Load the currently active calls during bootstrap
    pub preload_sessions: bool,
    /// Load the device inventory during bootstrap
    pub preload_devices: bool,
    /// Identity to act as; resolved from the platform when `None`
    pub extension_info: Option<Extension>,
    /// Capacity of the registry event channel
    pub event_channel_capacity: usize,
    /// Only notifications whose topic contains this string are ingested
    pub notification_topic: String,
}

impl CallControlConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_account_level(mut self, account_level: bool) -> Self {
        self.account_level = account_level;
        self
    }

    pub fn with_preload_sessions(mut self, preload: bool) -> Self {
        self.preload_sessions = preload;
        self
    }

    pub fn with_preload_devices(mut self, preload: bool) -> Self {
        self.preload_devices = preload;
        self
    }

    pub fn with_extension_info(mut self, extension: Extension) -> Self {
        self.extension_info = Some(extension);
        self
    }

    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity;
        self
    }

    pub fn with_notification_topic(mut self, topic: impl Into<String>) -> Self {
        self.notification_topic = topic.into();
        self
    }

    pub fn validate(&self) -> CallControlResult<()> {
        if self.event_channel_capacity == 0 {
            return Err(CallControlError::config("event_channel_capacity must be greater than zero"));
        }
        if self.notification_topic.is_empty() {
            return Err(CallControlError::config("notification_topic must not be empty"));
        }
        Ok(())
    }
}

impl Default for CallControlConfig {
    fn default() -> Self {
        Self {
            account_level: false,
            preload_sessions: true,
            preload_devices: true,
            extension_info: None,
            event_channel_capacity: 256,
            notification_topic: DEFAULT_NOTIFICATION_TOPIC.to_string(),
        }
    }
}

/// Settings for [`HttpTransport`](crate::transport::HttpTransport)
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    /// Platform base URL
    pub server_url: String,
    /// Prefix prepended to every request path
    pub api_prefix: String,
    /// OAuth bearer token
    pub access_token: Option<String>,
    /// Per-request timeout
    pub timeout: Duration,
    /// User-Agent header value
    pub user_agent: String,
}

impl HttpTransportConfig {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            ..Default::default()
        }
    }

    /// Load from `RC_SERVER_URL`, `RC_ACCESS_TOKEN` and `RC_TIMEOUT_SECS`
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("RC_SERVER_URL") {
            config.server_url = url;
        }
        config.access_token = std::env::var("RC_ACCESS_TOKEN").ok().filter(|t| !t.is_empty());
        if let Some(secs) = std::env::var("RC_TIMEOUT_SECS").ok().and_then(|s| s.parse::<u64>().ok()) {
            config.timeout = Duration::from_secs(secs);
        }
        config
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn with_api_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.api_prefix = prefix.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Parse and check the base URL
    pub fn base_url(&self) -> CallControlResult<Url> {
        let url = Url::parse(&self.server_url)
            .map_err(|e| CallControlError::config(format!("invalid server_url '{}': {}", self.server_url, e)))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(CallControlError::config(format!("unsupported scheme '{}'", other))),
        }
    }
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            api_prefix: DEFAULT_API_PREFIX.to_string(),
            access_token: None,
            timeout: Duration::from_secs(30),
            user_agent: format!("rvoip-call-control/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}
