//! Core of powerwatchd
//!
//! This crate decides when the machine shuts down:
//! - Policy evaluation (the arm and disarm expressions)
//! - Debounce engine (Idle -> Armed -> Fired, one pending timer at most)
//! - Serial dispatcher (topic check, validation, engine, error policy)

mod dispatcher;
mod engine;
mod events;
mod policy;

pub use dispatcher::*;
pub use engine::*;
pub use events::*;
pub use policy::*;
