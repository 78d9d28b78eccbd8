//! Variables exposed to policy expressions
//!
//! The names and types here are part of the user-facing contract: they are
//! what people write in `arm_expr` and `disarm_expr`.

use powerwatch_expr::{Activation, Schema, Type};

use crate::PowerEvent;

/// Integer code of the power source (1 = utility ... 6 = other)
pub const VAR_POWER_TYPE: &str = "powerType";

/// Whether the power source is available
pub const VAR_ONLINE: &str = "online";

/// Free-form locality label
pub const VAR_SCOPE: &str = "scope";

/// Schema every policy expression is compiled against
pub fn policy_schema() -> Schema {
    Schema::new()
        .with(VAR_POWER_TYPE, Type::Int)
        .with(VAR_ONLINE, Type::Bool)
        .with(VAR_SCOPE, Type::String)
}

impl PowerEvent {
    /// Bind this event's fields to the policy variables.
    pub fn activation(&self) -> Activation {
        Activation::new()
            .bind(VAR_POWER_TYPE, self.power_type.code())
            .bind(VAR_ONLINE, self.online)
            .bind(VAR_SCOPE, self.scope.as_str())
    }
}
