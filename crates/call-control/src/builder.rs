//! Builder for [`CallControl`]
//!
//! ```rust,no_run
//! use rvoip_call_control::{CallControlBuilder, HttpTransportConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let control = CallControlBuilder::new()
//!     .http_transport(HttpTransportConfig::from_env())
//!     .account_level(false)
//!     .build_and_initialize()
//!     .await?;
//!
//! println!("{} active sessions", control.len());
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use crate::config::{CallControlConfig, HttpTransportConfig};
use crate::error::{CallControlError, CallControlResult};
use crate::registry::CallControl;
use crate::transport::{HttpTransport, PlatformTransport};
use crate::types::Extension;

/// Progressive configuration of a [`CallControl`]
#[derive(Default)]
pub struct CallControlBuilder {
    config: CallControlConfig,
    transport: Option<Arc<dyn PlatformTransport>>,
    http: Option<HttpTransportConfig>,
}

impl CallControlBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing config
    pub fn with_config(mut self, config: CallControlConfig) -> Self {
        self.config = config;
        self
    }

    pub fn account_level(mut self, account_level: bool) -> Self {
        self.config.account_level = account_level;
        self
    }

    pub fn preload_sessions(mut self, preload: bool) -> Self {
        self.config.preload_sessions = preload;
        self
    }

    pub fn preload_devices(mut self, preload: bool) -> Self {
        self.config.preload_devices = preload;
        self
    }

    pub fn extension_info(mut self, extension: Extension) -> Self {
        self.config.extension_info = Some(extension);
        self
    }

    pub fn event_channel_capacity(mut self, capacity: usize) -> Self {
        self.config.event_channel_capacity = capacity;
        self
    }

    pub fn notification_topic(mut self, topic: impl Into<String>) -> Self {
        self.config.notification_topic = topic.into();
        self
    }

    /// Use a custom transport
    pub fn transport(mut self, transport: Arc<dyn PlatformTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Use the built-in HTTP transport
    pub fn http_transport(mut self, config: HttpTransportConfig) -> Self {
        self.http = Some(config);
        self
    }

    pub fn build(self) -> CallControlResult<CallControl> {
        let transport: Arc<dyn PlatformTransport> = match (self.transport, self.http) {
            (Some(transport), _) => transport,
            (None, Some(http)) => Arc::new(HttpTransport::new(http)?),
            (None, None) => return Err(CallControlError::config("no transport configured")),
        };
        CallControl::new(self.config, transport)
    }

    /// Build and run the bootstrap before returning
    pub async fn build_and_initialize(self) -> CallControlResult<CallControl> {
        let control = self.build()?;
        control.initialize().await;
        Ok(control)
    }
}
