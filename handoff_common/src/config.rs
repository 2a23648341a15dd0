//! Configuration loading traits and types.
//!
//! This module provides a standardized way to load TOML configuration files
//! for the handoff benchmark.
//!
//! # Usage
//!
//! ```rust,no_run
//! use handoff_common::config::{BenchConfig, ConfigError, ConfigLoader};
//! use std::path::Path;
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = BenchConfig::load(Path::new("handoff.toml"))?;
//!     config.validate()?;
//!     println!("Iterations: {}", config.bench.iterations);
//!     Ok(())
//! }
//! ```

use crate::consts::{DEFAULT_ITERATIONS, DEFAULT_MAX_MESSAGE_SIZE, MAX_PAYLOAD_SIZE};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
///
/// Uses lowercase serde values for TOML compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose, detailed tracing information.
    Trace,
    /// Debug information useful during development.
    Debug,
    /// General information about application operation.
    #[default]
    Info,
    /// Warning messages for potentially problematic situations.
    Warn,
    /// Error messages for serious problems.
    Error,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`.
    pub const fn as_directive(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Common configuration fields.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// service_name = "handoff-bench"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Application instance identifier.
    pub service_name: String,
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            service_name: "handoff-bench".to_string(),
        }
    }
}

impl SharedConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if `service_name` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Report output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One human-readable line per round.
    #[default]
    Text,
    /// One JSON object per round.
    Json,
}

/// Benchmark matrix and spin-wait settings (`[bench]` table).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BenchSection {
    /// Handoffs per message size.
    pub iterations: u64,
    /// Largest message size; sizes double from 1 up to this value.
    pub max_message_size: usize,
    /// Maximum spins per wait. Unbounded when absent.
    pub spin_limit: Option<u64>,
    /// Maximum wall time per wait in milliseconds. Unbounded when absent.
    pub timeout_ms: Option<u64>,
    /// Core to pin the sender process to.
    pub sender_cpu: Option<usize>,
    /// Core to pin the receiver process to.
    pub receiver_cpu: Option<usize>,
    /// Report format.
    pub output: OutputFormat,
}

impl Default for BenchSection {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            spin_limit: None,
            timeout_ms: None,
            sender_cpu: None,
            receiver_cpu: None,
            output: OutputFormat::Text,
        }
    }
}

impl BenchSection {
    /// Per-wait timeout as a `Duration`.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Validate the benchmark settings.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if:
    /// - `iterations` is zero
    /// - `max_message_size` does not fit a shared region
    /// - `spin_limit` or `timeout_ms` is zero
    /// - both roles are pinned to the same core
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.iterations == 0 {
            return Err(ConfigError::ValidationError(
                "iterations must be greater than zero".to_string(),
            ));
        }
        if self.max_message_size > MAX_PAYLOAD_SIZE {
            return Err(ConfigError::ValidationError(format!(
                "max_message_size {} exceeds {MAX_PAYLOAD_SIZE}",
                self.max_message_size
            )));
        }
        if self.spin_limit == Some(0) {
            return Err(ConfigError::ValidationError(
                "spin_limit must be greater than zero".to_string(),
            ));
        }
        if self.timeout_ms == Some(0) {
            return Err(ConfigError::ValidationError(
                "timeout_ms must be greater than zero".to_string(),
            ));
        }
        if let (Some(tx), Some(rx)) = (self.sender_cpu, self.receiver_cpu) {
            if tx == rx {
                return Err(ConfigError::ValidationError(format!(
                    "sender_cpu and receiver_cpu must differ (both {tx})"
                )));
            }
        }
        Ok(())
    }
}

/// Complete benchmark configuration file.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// service_name = "handoff-bench"
///
/// [bench]
/// iterations = 100000
/// max_message_size = 262144
/// timeout_ms = 5000
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BenchConfig {
    /// Common settings.
    #[serde(default)]
    pub shared: SharedConfig,
    /// Benchmark settings.
    #[serde(default)]
    pub bench: BenchSection,
}

impl BenchConfig {
    /// Validate all sections.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        self.bench.validate()
    }
}

/// Trait for loading configuration from TOML files.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

// Blanket implementation for all types that implement DeserializeOwned.
impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_log_level_default() {
        assert_eq!(LogLevel::default(), LogLevel::Info);
    }

    #[test]
    fn test_log_level_deserialization() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct TestWrapper {
            level: LogLevel,
        }

        assert_eq!(
            toml::from_str::<TestWrapper>("level = \"trace\"")
                .unwrap()
                .level,
            LogLevel::Trace
        );
        assert_eq!(
            toml::from_str::<TestWrapper>("level = \"warn\"")
                .unwrap()
                .level,
            LogLevel::Warn
        );
        assert_eq!(LogLevel::Debug.as_directive(), "debug");
    }

    #[test]
    fn test_bench_defaults() {
        let config = BenchConfig::default();
        assert_eq!(config.bench.iterations, DEFAULT_ITERATIONS);
        assert_eq!(config.bench.max_message_size, DEFAULT_MAX_MESSAGE_SIZE);
        assert_eq!(config.bench.timeout(), None);
        assert_eq!(config.bench.output, OutputFormat::Text);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = BenchConfig::from_toml("").unwrap();
        assert_eq!(config.shared.service_name, "handoff-bench");
        assert_eq!(config.bench, BenchSection::default());
    }

    #[test]
    fn test_validation_zero_iterations() {
        let mut config = BenchConfig::default();
        config.bench.iterations = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_validation_same_cpu() {
        let mut config = BenchConfig::default();
        config.bench.sender_cpu = Some(2);
        config.bench.receiver_cpu = Some(2);
        assert!(config.validate().is_err());

        config.bench.receiver_cpu = Some(3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_oversized_message() {
        let mut config = BenchConfig::default();
        config.bench.max_message_size = MAX_PAYLOAD_SIZE + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_zero_bounds() {
        let mut config = BenchConfig::default();
        config.bench.spin_limit = Some(0);
        assert!(config.validate().is_err());

        let mut config = BenchConfig::default();
        config.bench.timeout_ms = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_loader_file_not_found() {
        let result = BenchConfig::load(Path::new("/nonexistent/path/handoff.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound)));
    }

    #[test]
    fn test_config_loader_parse_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "invalid toml {{{{").unwrap();

        let result = BenchConfig::load(file.path());
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_config_loader_unknown_field() {
        let result = BenchConfig::from_toml("[bench]\niteration = 5\n");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_config_loader_success() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[shared]
log_level = "debug"
service_name = "bench-01"

[bench]
iterations = 1000
max_message_size = 65536
timeout_ms = 250
sender_cpu = 1
receiver_cpu = 2
output = "json"
"#
        )
        .unwrap();
        file.flush().unwrap();

        let config = BenchConfig::load(file.path()).unwrap();
        assert_eq!(config.shared.log_level, LogLevel::Debug);
        assert_eq!(config.shared.service_name, "bench-01");
        assert_eq!(config.bench.iterations, 1000);
        assert_eq!(config.bench.max_message_size, 65536);
        assert_eq!(config.bench.timeout(), Some(Duration::from_millis(250)));
        assert_eq!(config.bench.spin_limit, None);
        assert_eq!(config.bench.output, OutputFormat::Json);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_shipped_config_is_valid() {
        let config = BenchConfig::from_toml(include_str!("../../config/handoff.toml")).unwrap();
        assert_eq!(config.bench, BenchSection::default());
        assert!(config.validate().is_ok());
    }
}
