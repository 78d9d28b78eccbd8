//! Event validation

use powerwatch_util::ErrorKind;
use thiserror::Error;

use crate::{PowerEvent, PowerType, RawPowerEvent, Scope};

/// Why an inbound payload was rejected
#[derive(Debug, Error)]
pub enum EventError {
    #[error("Failed to decode payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Power type {0} is outside the known range 1-6")]
    UnknownPowerType(i64),

    #[error("Unknown scope '{0}'")]
    UnknownScope(String),
}

impl EventError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EventError::Malformed(_) => ErrorKind::Malformed,
            EventError::UnknownPowerType(_) | EventError::UnknownScope(_) => {
                ErrorKind::InvalidSchema
            }
        }
    }
}

pub type EventResult<T> = Result<T, EventError>;

/// Decode and validate a payload with the default (permissive) rules.
///
/// Only the power type range is checked; scope passes through untouched.
pub fn validate(payload: &[u8]) -> EventResult<PowerEvent> {
    Validator::default().validate(payload)
}

/// Configurable event validator
#[derive(Debug, Clone, Copy, Default)]
pub struct Validator {
    check_scope: bool,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also require `scope` to be one of the known labels.
    pub fn with_scope_check(mut self, check_scope: bool) -> Self {
        self.check_scope = check_scope;
        self
    }

    pub fn validate(&self, payload: &[u8]) -> EventResult<PowerEvent> {
        let raw: RawPowerEvent = serde_json::from_slice(payload)?;
        self.check(raw)
    }

    /// Validate an already decoded event
    pub fn check(&self, raw: RawPowerEvent) -> EventResult<PowerEvent> {
        let power_type = PowerType::from_code(raw.power_type)
            .ok_or(EventError::UnknownPowerType(raw.power_type))?;

        if self.check_scope && Scope::parse(&raw.scope).is_none() {
            return Err(EventError::UnknownScope(raw.scope));
        }

        Ok(PowerEvent {
            online: raw.online,
            power_type,
            scope: raw.scope,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(power_type: i64) -> Vec<u8> {
        format!(r#"{{"up": true, "type": {power_type}, "scope": "global"}}"#).into_bytes()
    }

    #[test]
    fn accepts_every_known_power_type() {
        for code in 1..=6 {
            let event = validate(&payload(code)).unwrap();
            assert_eq!(event.power_type.code(), code);
        }
    }

    #[test]
    fn rejects_out_of_range_power_types() {
        for code in [i64::MIN, -1, 0, 7, 42, i64::MAX] {
            let err = validate(&payload(code)).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidSchema, "code {code}");
        }
    }

    #[test]
    fn undecodable_payload_is_malformed() {
        for bad in [
            &b"not json"[..],
            br#"{"up": "yes", "type": 1}"#,
            br#"{"type": 1}"#,
            br#"{"up": true}"#,
            br#"{"up": true, "type": 1.5}"#,
            b"",
        ] {
            let err = validate(bad).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Malformed);
        }
    }

    #[test]
    fn absent_up_or_type_is_not_defaulted() {
        for bad in [&br#"{"type": 1}"#[..], br#"{"up": false}"#, b"{}"] {
            let err = validate(bad).unwrap_err();
            assert!(matches!(err, EventError::Malformed(_)), "{err}");
        }
    }

    #[test]
    fn scope_is_opaque_by_default() {
        let event = validate(br#"{"up": false, "type": 1, "scope": "kitchen"}"#).unwrap();
        assert_eq!(event.scope, "kitchen");
        assert!(!event.online);
    }

    #[test]
    fn scope_check_rejects_unknown_labels() {
        let validator = Validator::new().with_scope_check(true);

        let err = validator
            .validate(br#"{"up": false, "type": 1, "scope": "kitchen"}"#)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidSchema);

        let event = validator
            .validate(br#"{"up": false, "type": 1, "scope": "1c"}"#)
            .unwrap();
        assert_eq!(event.scope, "1c");
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let event = validate(br#"{"up": true, "type": 2, "scope": "local", "ts": 17}"#).unwrap();
        assert_eq!(event.power_type, PowerType::Generator);
    }
}
