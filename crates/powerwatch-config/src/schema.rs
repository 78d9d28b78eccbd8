//! Raw configuration schema (as parsed from TOML)
//!
//! Every field is optional so that a file, the command line, or both can
//! supply it. [`RawConfig::overlay`] merges the layers before validation.

use serde::{Deserialize, Serialize};

use crate::CURRENT_CONFIG_VERSION;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Broker connection
    #[serde(default)]
    pub mqtt: RawMqttConfig,

    /// Arm/disarm policy
    #[serde(default)]
    pub policy: RawPolicyConfig,

    /// What to run when a shutdown comes due
    #[serde(default)]
    pub shutdown: RawShutdownConfig,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            config_version: CURRENT_CONFIG_VERSION,
            mqtt: RawMqttConfig::default(),
            policy: RawPolicyConfig::default(),
            shutdown: RawShutdownConfig::default(),
        }
    }
}

impl RawConfig {
    /// Apply every value set in `other` on top of `self`.
    pub fn overlay(mut self, other: RawConfig) -> Self {
        self.mqtt.overlay(other.mqtt);
        self.policy.overlay(other.policy);
        self.shutdown.overlay(other.shutdown);
        self
    }
}

/// Broker connection settings
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct RawMqttConfig {
    /// Broker address as `host:port`
    pub server: Option<String>,

    /// Topic carrying power events
    pub topic: Option<String>,

    pub username: Option<String>,

    pub password: Option<String>,

    /// Client ID (default: `<hostname>/powerwatchd`)
    pub client_id: Option<String>,

    /// Seconds the broker keeps the session after a disconnect
    pub session_expiry_seconds: Option<u32>,

    /// Keep-alive interval in seconds
    pub keep_alive_seconds: Option<u64>,
}

impl RawMqttConfig {
    fn overlay(&mut self, other: RawMqttConfig) {
        overlay(&mut self.server, other.server);
        overlay(&mut self.topic, other.topic);
        overlay(&mut self.username, other.username);
        overlay(&mut self.password, other.password);
        overlay(&mut self.client_id, other.client_id);
        overlay(&mut self.session_expiry_seconds, other.session_expiry_seconds);
        overlay(&mut self.keep_alive_seconds, other.keep_alive_seconds);
    }
}

/// Policy settings
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct RawPolicyConfig {
    /// Expression that schedules a shutdown while idle
    pub arm_expr: Option<String>,

    /// Expression that cancels a pending shutdown
    pub disarm_expr: Option<String>,

    /// Delay between arming and shutting down, e.g. "3m" or "90s"
    pub recovery_period: Option<String>,

    /// Exit on invalid messages, unexpected topics and evaluation failures
    pub strict: Option<bool>,

    /// Reject events whose scope is not a known label
    pub validate_scope: Option<bool>,
}

impl RawPolicyConfig {
    fn overlay(&mut self, other: RawPolicyConfig) {
        overlay(&mut self.arm_expr, other.arm_expr);
        overlay(&mut self.disarm_expr, other.disarm_expr);
        overlay(&mut self.recovery_period, other.recovery_period);
        overlay(&mut self.strict, other.strict);
        overlay(&mut self.validate_scope, other.validate_scope);
    }
}

/// Shutdown action settings
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct RawShutdownConfig {
    /// Command and arguments, e.g. ["systemctl", "poweroff"]
    pub command: Option<Vec<String>>,
}

impl RawShutdownConfig {
    fn overlay(&mut self, other: RawShutdownConfig) {
        overlay(&mut self.command, other.command);
    }
}

fn overlay<T>(slot: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *slot = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_config() {
        let toml_str = r#"
            config_version = 1

            [mqtt]
            server = "mqtt.lan:1883"
            topic = "power/alarms"
            session_expiry_seconds = 600

            [policy]
            arm_expr = "!online"
            recovery_period = "90s"
            strict = true

            [shutdown]
            command = ["systemctl", "poweroff"]
        "#;

        let config: RawConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.mqtt.server.as_deref(), Some("mqtt.lan:1883"));
        assert_eq!(config.mqtt.session_expiry_seconds, Some(600));
        assert_eq!(config.policy.arm_expr.as_deref(), Some("!online"));
        assert_eq!(config.policy.disarm_expr, None);
        assert_eq!(config.policy.strict, Some(true));
        assert_eq!(
            config.shutdown.command,
            Some(vec!["systemctl".to_string(), "poweroff".to_string()])
        );
    }

    #[test]
    fn sections_are_optional() {
        let config: RawConfig = toml::from_str("config_version = 1").unwrap();
        assert_eq!(config, RawConfig::default());
    }

    #[test]
    fn overlay_prefers_set_values() {
        let file: RawConfig = toml::from_str(
            r#"
            config_version = 1
            [mqtt]
            server = "file:1883"
            topic = "power/alarms"
            "#,
        )
        .unwrap();

        let mut cli = RawConfig::default();
        cli.mqtt.server = Some("cli:1883".into());
        cli.policy.strict = Some(false);

        let merged = file.overlay(cli);
        assert_eq!(merged.mqtt.server.as_deref(), Some("cli:1883"));
        assert_eq!(merged.mqtt.topic.as_deref(), Some("power/alarms"));
        assert_eq!(merged.policy.strict, Some(false));
    }
}
