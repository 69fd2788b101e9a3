//! tracing-subscriber setup for binaries embedding the registry
//!
//! The library itself only emits `tracing` events; installing a subscriber
//! is left to the application. Logs go to stderr so stdout stays free for
//! program output (the CLI prints snapshots there).

use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{CallControlError, CallControlResult};

/// HTTP stack targets that are noisy below `warn`
const QUIET_TARGETS: &[&str] = &["hyper", "hyper_util", "reqwest", "rustls"];

/// Configuration for the logging system
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Level for the registry and the application
    pub level: Level,
    /// Emit one JSON object per line
    pub json: bool,
    /// Name printed in the startup line
    pub app_name: String,
}

impl LoggingConfig {
    pub fn new(level: Level, app_name: impl Into<String>) -> Self {
        LoggingConfig {
            level,
            json: false,
            app_name: app_name.into(),
        }
    }

    pub fn with_json(mut self) -> Self {
        self.json = true;
        self
    }

    /// Filter used when `RUST_LOG` is unset
    fn default_directives(&self) -> String {
        let level = self.level.to_string().to_lowercase();
        let quiet = QUIET_TARGETS.iter().map(|target| format!("{}=warn", target));
        std::iter::once(level).chain(quiet).collect::<Vec<_>>().join(",")
    }
}

/// Install the global subscriber
///
/// `RUST_LOG`, when set, replaces the configured filter entirely. Fails if a
/// global subscriber is already installed.
pub fn setup_logging(config: LoggingConfig) -> CallControlResult<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(config.default_directives())
            .map_err(|e| CallControlError::config(format!("bad log filter: {}", e)))?,
    };

    let builder = fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr);
    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.compact().try_init()
    };
    installed.map_err(|e| CallControlError::config(format!("failed to install subscriber: {}", e)))?;

    tracing::info!("Starting {} v{}", config.app_name, env!("CARGO_PKG_VERSION"));
    Ok(())
}

/// Parse a log level from a string
pub fn parse_log_level(level: &str) -> CallControlResult<Level> {
    Level::from_str(level).map_err(|_| CallControlError::config(format!("Invalid log level: {}", level)))
}
