//! Power event types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of power source an event describes.
///
/// The numeric codes are part of the wire format and are what policy
/// expressions see as `powerType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerType {
    Utility,
    Generator,
    Battery,
    Solar,
    Unknown,
    Other,
}

impl PowerType {
    pub const ALL: [PowerType; 6] = [
        PowerType::Utility,
        PowerType::Generator,
        PowerType::Battery,
        PowerType::Solar,
        PowerType::Unknown,
        PowerType::Other,
    ];

    /// Map a wire code onto the enumeration. Codes outside 1..=6 yield `None`.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(PowerType::Utility),
            2 => Some(PowerType::Generator),
            3 => Some(PowerType::Battery),
            4 => Some(PowerType::Solar),
            5 => Some(PowerType::Unknown),
            6 => Some(PowerType::Other),
            _ => None,
        }
    }

    pub fn code(self) -> i64 {
        match self {
            PowerType::Utility => 1,
            PowerType::Generator => 2,
            PowerType::Battery => 3,
            PowerType::Solar => 4,
            PowerType::Unknown => 5,
            PowerType::Other => 6,
        }
    }
}

impl fmt::Display for PowerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PowerType::Utility => "utility",
            PowerType::Generator => "generator",
            PowerType::Battery => "battery",
            PowerType::Solar => "solar",
            PowerType::Unknown => "unknown",
            PowerType::Other => "other",
        };
        f.write_str(s)
    }
}

/// Known locality labels for the `scope` field.
///
/// Scope is free-form on the wire. These labels are only enforced when the
/// validator is configured to check scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Global,
    Local,
    SinglePhase,
    OneCircuit,
}

impl Scope {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "global" => Some(Scope::Global),
            "local" => Some(Scope::Local),
            "1p" => Some(Scope::SinglePhase),
            "1c" => Some(Scope::OneCircuit),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Scope::Global => "global",
            Scope::Local => "local",
            Scope::SinglePhase => "1p",
            Scope::OneCircuit => "1c",
        }
    }
}

/// Payload shape on the alarm topic, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPowerEvent {
    #[serde(rename = "up")]
    pub online: bool,

    #[serde(rename = "type")]
    pub power_type: i64,

    #[serde(default)]
    pub scope: String,
}

/// A validated power event.
///
/// Built once per inbound message and dropped after the engine has seen it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PowerEvent {
    pub online: bool,
    pub power_type: PowerType,
    pub scope: String,
}

impl PowerEvent {
    pub fn new(online: bool, power_type: PowerType, scope: impl Into<String>) -> Self {
        Self {
            online,
            power_type,
            scope: scope.into(),
        }
    }
}

impl fmt::Display for PowerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} (scope '{}')",
            self.power_type,
            if self.online { "online" } else { "offline" },
            self.scope
        )
    }
}
