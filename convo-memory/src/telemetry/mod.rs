//! Telemetry - Structured Logging Setup
//!
//! `TigerStyle`: Optional and explicit. The library only emits `tracing`
//! events; installing a subscriber is the application's call.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use convo_memory::telemetry::{init_telemetry, LogFormat, TelemetryConfig};
//!
//! // Defaults: pretty output, `RUST_LOG` or "info"
//! init_telemetry(TelemetryConfig::default()).expect("telemetry init");
//!
//! // Or configure explicitly
//! let config = TelemetryConfig::builder()
//!     .service_name("my-agent")
//!     .format(LogFormat::Json)
//!     .default_filter("convo_memory=debug")
//!     .build();
//! # let _ = config;
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG` - Filter directives; overrides `default_filter` when set

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use crate::constants::{TELEMETRY_FILTER_DEFAULT, TELEMETRY_SERVICE_NAME_DEFAULT};

/// Telemetry setup errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// Subscriber installation failed
    #[error("telemetry initialization failed: {reason}")]
    InitFailed {
        /// The reason for the failure
        reason: String,
    },

    /// Filter directives did not parse
    #[error("invalid log filter: {filter}")]
    InvalidFilter {
        /// The rejected directive string
        filter: String,
    },
}

/// Result type for telemetry operations
pub type Result<T> = std::result::Result<T, TelemetryError>;

/// Output format of the fmt subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line, human-oriented
    #[default]
    Pretty,
    /// Single-line
    Compact,
    /// Newline-delimited JSON
    Json,
}

/// Configuration for the tracing subscriber
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Service name logged at startup
    pub service_name: String,

    /// Output format
    pub format: LogFormat,

    /// Filter used when `RUST_LOG` is unset
    pub default_filter: String,

    /// Include the event target (module path)
    pub with_target: bool,

    /// Colorize output
    pub ansi: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: TELEMETRY_SERVICE_NAME_DEFAULT.to_string(),
            format: LogFormat::default(),
            default_filter: TELEMETRY_FILTER_DEFAULT.to_string(),
            with_target: true,
            ansi: true,
        }
    }
}

impl TelemetryConfig {
    /// Create a new builder for `TelemetryConfig`
    #[must_use]
    pub fn builder() -> TelemetryConfigBuilder {
        TelemetryConfigBuilder::default()
    }

    fn validate(&self) -> Result<()> {
        if self.service_name.is_empty() {
            return Err(TelemetryError::InitFailed {
                reason: "service_name cannot be empty".to_string(),
            });
        }
        Ok(())
    }

    fn filter(&self) -> Result<EnvFilter> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        EnvFilter::try_new(&self.default_filter).map_err(|_| TelemetryError::InvalidFilter {
            filter: self.default_filter.clone(),
        })
    }
}

/// Builder for `TelemetryConfig`
#[derive(Debug, Default)]
pub struct TelemetryConfigBuilder {
    service_name: Option<String>,
    format: Option<LogFormat>,
    default_filter: Option<String>,
    with_target: Option<bool>,
    ansi: Option<bool>,
}

impl TelemetryConfigBuilder {
    /// Set the service name
    #[must_use]
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    /// Set the output format
    #[must_use]
    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = Some(format);
        self
    }

    /// Set the fallback filter directives
    #[must_use]
    pub fn default_filter(mut self, filter: impl Into<String>) -> Self {
        self.default_filter = Some(filter.into());
        self
    }

    /// Include or omit event targets
    #[must_use]
    pub fn with_target(mut self, with_target: bool) -> Self {
        self.with_target = Some(with_target);
        self
    }

    /// Enable or disable colors
    #[must_use]
    pub fn ansi(mut self, ansi: bool) -> Self {
        self.ansi = Some(ansi);
        self
    }

    /// Build the `TelemetryConfig`
    #[must_use]
    pub fn build(self) -> TelemetryConfig {
        let default = TelemetryConfig::default();
        TelemetryConfig {
            service_name: self.service_name.unwrap_or(default.service_name),
            format: self.format.unwrap_or(default.format),
            default_filter: self.default_filter.unwrap_or(default.default_filter),
            with_target: self.with_target.unwrap_or(default.with_target),
            ansi: self.ansi.unwrap_or(default.ansi),
        }
    }
}

/// Install the global fmt subscriber.
///
/// # Errors
///
/// Returns `TelemetryError::InvalidFilter` if the fallback filter does not
/// parse, and `TelemetryError::InitFailed` if a global subscriber is already
/// installed.
pub fn init_telemetry(config: TelemetryConfig) -> Result<()> {
    config.validate()?;
    let filter = config.filter()?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.with_target)
        .with_ansi(config.ansi);

    let installed = match config.format {
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|e| TelemetryError::InitFailed {
        reason: format!("failed to set global subscriber: {e}"),
    })?;

    tracing::info!(
        service_name = %config.service_name,
        format = ?config.format,
        "telemetry initialized"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_telemetry_config_default() {
        let config = TelemetryConfig::default();
        assert_eq!(config.service_name, TELEMETRY_SERVICE_NAME_DEFAULT);
        assert_eq!(config.format, LogFormat::Pretty);
        assert_eq!(config.default_filter, "info");
    }

    #[test]
    fn test_telemetry_config_builder() {
        let config = TelemetryConfig::builder()
            .service_name("test-service")
            .format(LogFormat::Json)
            .default_filter("debug")
            .ansi(false)
            .build();

        assert_eq!(config.service_name, "test-service");
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.default_filter, "debug");
        assert!(!config.ansi);
        assert!(config.with_target);
    }

    #[test]
    fn test_telemetry_config_validation() {
        assert!(TelemetryConfig::default().validate().is_ok());

        let mut config = TelemetryConfig::default();
        config.service_name = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_format_from_json() {
        let config: TelemetryConfig = serde_json::from_str(r#"{"format": "compact"}"#).unwrap();
        assert_eq!(config.format, LogFormat::Compact);
        assert_eq!(config.default_filter, "info");
    }

    #[test]
    fn test_second_init_fails() {
        let config = TelemetryConfig::builder().format(LogFormat::Compact).build();
        // The first call may already lose to another test's subscriber.
        let _ = init_telemetry(config.clone());
        assert!(matches!(
            init_telemetry(config),
            Err(TelemetryError::InitFailed { .. })
        ));
    }
}
