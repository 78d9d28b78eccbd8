//! Validated settings

use crate::schema::{RawConfig, RawMqttConfig, RawPolicyConfig, RawShutdownConfig};
use crate::validation::{parse_duration, parse_server};
use std::time::Duration;

/// Default arm expression: utility power went offline
pub const DEFAULT_ARM_EXPR: &str = "!online && powerType == 1";

/// Default disarm expression: utility power came back
pub const DEFAULT_DISARM_EXPR: &str = "online && powerType == 1";

pub const DEFAULT_RECOVERY_PERIOD: Duration = Duration::from_secs(3 * 60);
pub const DEFAULT_SESSION_EXPIRY_SECONDS: u32 = 5 * 60;
pub const DEFAULT_KEEP_ALIVE_SECONDS: u64 = 20;
pub const DEFAULT_SHUTDOWN_COMMAND: [&str; 3] = ["shutdown", "-h", "now"];

/// Validated settings ready for use by the daemon
#[derive(Debug, Clone)]
pub struct Settings {
    pub mqtt: MqttSettings,
    pub policy: PolicySettings,
    pub shutdown: ShutdownSettings,
}

impl Settings {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        Self {
            mqtt: MqttSettings::from_raw(raw.mqtt),
            policy: PolicySettings::from_raw(raw.policy),
            shutdown: ShutdownSettings::from_raw(raw.shutdown),
        }
    }
}

/// Broker connection
#[derive(Clone)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub topic: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// None means derive one from the hostname
    pub client_id: Option<String>,
    pub session_expiry_seconds: u32,
    pub keep_alive: Duration,
}

impl MqttSettings {
    fn from_raw(raw: RawMqttConfig) -> Self {
        let (host, port) = raw
            .server
            .as_deref()
            .and_then(|s| parse_server(s).ok())
            .unwrap_or_default();

        Self {
            host,
            port,
            topic: raw.topic.unwrap_or_default(),
            username: raw.username.filter(|u| !u.is_empty()),
            password: raw.password.filter(|p| !p.is_empty()),
            client_id: raw.client_id,
            session_expiry_seconds: raw
                .session_expiry_seconds
                .unwrap_or(DEFAULT_SESSION_EXPIRY_SECONDS),
            keep_alive: Duration::from_secs(
                raw.keep_alive_seconds.unwrap_or(DEFAULT_KEEP_ALIVE_SECONDS),
            ),
        }
    }

    /// Broker address as `host:port`
    pub fn server(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl std::fmt::Debug for MqttSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("topic", &self.topic)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("client_id", &self.client_id)
            .field("session_expiry_seconds", &self.session_expiry_seconds)
            .field("keep_alive", &self.keep_alive)
            .finish()
    }
}

/// Arm/disarm policy. Expressions are compiled by the daemon at startup.
#[derive(Debug, Clone)]
pub struct PolicySettings {
    pub arm_expr: String,
    pub disarm_expr: String,
    pub recovery_period: Duration,
    pub strict: bool,
    pub validate_scope: bool,
}

impl PolicySettings {
    fn from_raw(raw: RawPolicyConfig) -> Self {
        Self {
            arm_expr: raw.arm_expr.unwrap_or_else(|| DEFAULT_ARM_EXPR.to_string()),
            disarm_expr: raw
                .disarm_expr
                .unwrap_or_else(|| DEFAULT_DISARM_EXPR.to_string()),
            recovery_period: raw
                .recovery_period
                .as_deref()
                .and_then(|s| parse_duration(s).ok())
                .unwrap_or(DEFAULT_RECOVERY_PERIOD),
            strict: raw.strict.unwrap_or(false),
            validate_scope: raw.validate_scope.unwrap_or(false),
        }
    }
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self::from_raw(RawPolicyConfig::default())
    }
}

/// Shutdown action
#[derive(Debug, Clone)]
pub struct ShutdownSettings {
    pub command: Vec<String>,
}

impl ShutdownSettings {
    fn from_raw(raw: RawShutdownConfig) -> Self {
        Self {
            command: raw.command.unwrap_or_else(|| {
                DEFAULT_SHUTDOWN_COMMAND
                    .iter()
                    .map(|s| s.to_string())
                    .collect()
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_applied() {
        let mut raw = RawConfig::default();
        raw.mqtt.server = Some("mqtt.lan:1883".into());
        raw.mqtt.topic = Some("power/alarms".into());

        let settings = Settings::from_raw(raw);
        assert_eq!(settings.mqtt.host, "mqtt.lan");
        assert_eq!(settings.mqtt.port, 1883);
        assert_eq!(settings.mqtt.session_expiry_seconds, 300);
        assert_eq!(settings.mqtt.keep_alive, Duration::from_secs(20));
        assert_eq!(settings.policy.arm_expr, DEFAULT_ARM_EXPR);
        assert_eq!(settings.policy.disarm_expr, DEFAULT_DISARM_EXPR);
        assert_eq!(settings.policy.recovery_period, Duration::from_secs(180));
        assert!(!settings.policy.strict);
        assert!(!settings.policy.validate_scope);
        assert_eq!(settings.shutdown.command, vec!["shutdown", "-h", "now"]);
    }

    #[test]
    fn empty_credentials_are_unset() {
        let mut raw = RawConfig::default();
        raw.mqtt.username = Some(String::new());
        raw.mqtt.password = Some(String::new());

        let settings = Settings::from_raw(raw);
        assert_eq!(settings.mqtt.username, None);
        assert_eq!(settings.mqtt.password, None);
    }

    #[test]
    fn password_redacted_in_debug() {
        let mut raw = RawConfig::default();
        raw.mqtt.password = Some("hunter2".into());
        let settings = Settings::from_raw(raw);
        let rendered = format!("{:?}", settings.mqtt);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn server_round_trips_ipv6() {
        let mut raw = RawConfig::default();
        raw.mqtt.server = Some("[::1]:1883".into());
        let settings = Settings::from_raw(raw);
        assert_eq!(settings.mqtt.server(), "[::1]:1883");
    }
}
