//! Configuration validation

use crate::schema::{RawConfig, RawMqttConfig, RawPolicyConfig, RawShutdownConfig};
use std::time::Duration;
use thiserror::Error;

/// Validation error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("{0} cannot be empty")]
    EmptyField(&'static str),

    #[error("Invalid server address '{value}': {message}")]
    InvalidServer { value: String, message: String },

    #[error("Topic '{0}' contains a wildcard; subscribe to a concrete topic")]
    TopicWildcard(String),

    #[error("Invalid duration '{value}': {message}")]
    InvalidDuration { value: String, message: String },

    #[error("recovery_period must be greater than zero")]
    ZeroRecoveryPeriod,

    #[error("keep_alive_seconds must be at least 1")]
    ZeroKeepAlive,
}

/// Validate a raw configuration, collecting every error found
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    errors.extend(validate_mqtt(&config.mqtt));
    errors.extend(validate_policy(&config.policy));
    errors.extend(validate_shutdown(&config.shutdown));
    errors
}

fn validate_mqtt(mqtt: &RawMqttConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    match mqtt.server.as_deref() {
        None => errors.push(ValidationError::MissingField("mqtt.server")),
        Some(s) if s.trim().is_empty() => errors.push(ValidationError::EmptyField("mqtt.server")),
        Some(s) => {
            if let Err(e) = parse_server(s) {
                errors.push(e);
            }
        }
    }

    match mqtt.topic.as_deref() {
        None => errors.push(ValidationError::MissingField("mqtt.topic")),
        Some(t) if t.is_empty() => errors.push(ValidationError::EmptyField("mqtt.topic")),
        Some(t) if t.contains(['+', '#']) => {
            errors.push(ValidationError::TopicWildcard(t.to_string()))
        }
        Some(_) => {}
    }

    if let Some(id) = &mqtt.client_id
        && id.is_empty()
    {
        errors.push(ValidationError::EmptyField("mqtt.client_id"));
    }

    if mqtt.keep_alive_seconds == Some(0) {
        errors.push(ValidationError::ZeroKeepAlive);
    }

    errors
}

fn validate_policy(policy: &RawPolicyConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if let Some(expr) = &policy.arm_expr
        && expr.trim().is_empty()
    {
        errors.push(ValidationError::EmptyField("policy.arm_expr"));
    }
    if let Some(expr) = &policy.disarm_expr
        && expr.trim().is_empty()
    {
        errors.push(ValidationError::EmptyField("policy.disarm_expr"));
    }

    if let Some(period) = &policy.recovery_period {
        match parse_duration(period) {
            Ok(d) if d.is_zero() => errors.push(ValidationError::ZeroRecoveryPeriod),
            Ok(_) => {}
            Err(e) => errors.push(e),
        }
    }

    errors
}

fn validate_shutdown(shutdown: &RawShutdownConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if let Some(argv) = &shutdown.command
        && argv.first().is_none_or(|program| program.is_empty())
    {
        errors.push(ValidationError::EmptyField("shutdown.command"));
    }

    errors
}

/// Parse a broker address of the form `host:port`.
///
/// An `mqtt://` or `tcp://` prefix is accepted and ignored.
pub fn parse_server(s: &str) -> Result<(String, u16), ValidationError> {
    let invalid = |message: &str| ValidationError::InvalidServer {
        value: s.to_string(),
        message: message.to_string(),
    };

    let addr = s
        .strip_prefix("mqtt://")
        .or_else(|| s.strip_prefix("tcp://"))
        .unwrap_or(s);

    let (host, port) = addr.rsplit_once(':').ok_or_else(|| invalid("missing port"))?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return Err(invalid("missing host"));
    }

    let port: u16 = port
        .parse()
        .map_err(|_| invalid("port must be a number between 1 and 65535"))?;
    if port == 0 {
        return Err(invalid("port must be a number between 1 and 65535"));
    }

    Ok((host.to_string(), port))
}

/// Parse a human-readable duration such as "3m" or "1m30s".
pub fn parse_duration(s: &str) -> Result<Duration, ValidationError> {
    humantime::parse_duration(s.trim()).map_err(|e| ValidationError::InvalidDuration {
        value: s.to_string(),
        message: e.to_string(),
    })
}
