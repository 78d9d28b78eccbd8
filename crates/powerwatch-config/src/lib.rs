//! Configuration parsing and validation for powerwatchd
//!
//! Supports TOML configuration with:
//! - Versioned schema
//! - Broker connection, policy expressions and shutdown command
//! - Layering of command-line values over the file
//! - Validation that reports every error at once

mod schema;
mod settings;
mod validation;

pub use schema::*;
pub use settings::*;
pub use validation::*;

use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation failed: {}", format_errors(.errors))]
    ValidationFailed { errors: Vec<ValidationError> },

    #[error("Unsupported config version: {0}")]
    UnsupportedVersion(u32),
}

fn format_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Current supported config version
pub const CURRENT_CONFIG_VERSION: u32 = 1;

/// Load and validate configuration from a TOML file
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<Settings> {
    let raw = load_raw_config(path)?;
    settings_from_raw(raw)
}

/// Parse and validate configuration from a TOML string
pub fn parse_config(content: &str) -> ConfigResult<Settings> {
    let raw = parse_raw_config(content)?;
    settings_from_raw(raw)
}

/// Read a TOML file without validating it, so it can be layered under
/// command-line values first
pub fn load_raw_config(path: impl AsRef<Path>) -> ConfigResult<RawConfig> {
    let path = path.as_ref();
    debug!(path = %path.display(), "Loading configuration");
    let content = std::fs::read_to_string(path)?;
    parse_raw_config(&content)
}

/// Parse a TOML string and check its version
pub fn parse_raw_config(content: &str) -> ConfigResult<RawConfig> {
    let raw: RawConfig = toml::from_str(content)?;

    if raw.config_version != CURRENT_CONFIG_VERSION {
        return Err(ConfigError::UnsupportedVersion(raw.config_version));
    }

    Ok(raw)
}

/// Validate a (possibly merged) raw configuration
pub fn settings_from_raw(raw: RawConfig) -> ConfigResult<Settings> {
    let errors = validate_config(&raw);
    if !errors.is_empty() {
        return Err(ConfigError::ValidationFailed { errors });
    }

    Ok(Settings::from_raw(raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn parse_minimal_config() {
        let config = r#"
            config_version = 1

            [mqtt]
            server = "mqtt.lan:1883"
            topic = "power/alarms"
        "#;

        let settings = parse_config(config).unwrap();
        assert_eq!(settings.mqtt.topic, "power/alarms");
        assert_eq!(settings.policy.recovery_period, Duration::from_secs(180));
    }

    #[test]
    fn reject_wrong_version() {
        let config = r#"
            config_version = 99

            [mqtt]
            server = "mqtt.lan:1883"
            topic = "power/alarms"
        "#;

        let result = parse_config(config);
        assert!(matches!(result, Err(ConfigError::UnsupportedVersion(99))));
    }

    #[test]
    fn reject_invalid_values() {
        let config = r#"
            config_version = 1

            [mqtt]
            server = "mqtt.lan"
            topic = "power/alarms"

            [policy]
            recovery_period = "0s"
        "#;

        match parse_config(config) {
            Err(ConfigError::ValidationFailed { errors }) => assert_eq!(errors.len(), 2),
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    #[test]
    fn reject_unparsable_toml() {
        let result = parse_config("config_version = ");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            config_version = 1

            [mqtt]
            server = "broker:1884"
            topic = "ups/events"

            [policy]
            recovery_period = "45s"
            strict = true

            [shutdown]
            command = ["systemctl", "poweroff"]
            "#
        )
        .unwrap();

        let settings = load_config(file.path()).unwrap();
        assert_eq!(settings.mqtt.port, 1884);
        assert_eq!(settings.policy.recovery_period, Duration::from_secs(45));
        assert!(settings.policy.strict);
        assert_eq!(settings.shutdown.command, vec!["systemctl", "poweroff"]);
    }

    #[test]
    fn missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_config(dir.path().join("absent.toml"));
        assert!(matches!(result, Err(ConfigError::ReadError(_))));
    }

    #[test]
    fn command_line_completes_file() {
        let file = parse_raw_config(
            r#"
            config_version = 1
            [mqtt]
            topic = "power/alarms"
            "#,
        )
        .unwrap();

        let mut cli = RawConfig::default();
        cli.mqtt.server = Some("mqtt.lan:1883".into());

        let settings = settings_from_raw(file.overlay(cli)).unwrap();
        assert_eq!(settings.mqtt.host, "mqtt.lan");
        assert_eq!(settings.mqtt.topic, "power/alarms");
    }
}
