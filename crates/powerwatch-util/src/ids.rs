//! Strongly-typed identifiers for powerwatchd

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identity of one arm cycle of the debounce engine.
///
/// A fresh ID is minted every time a shutdown is scheduled. The timer task
/// carries the ID it was scheduled with and only fires if the pending slot
/// still holds that same ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArmId(Uuid);

impl ArmId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ArmId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ArmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
