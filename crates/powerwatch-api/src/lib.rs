//! Wire types for powerwatchd
//!
//! This crate defines the stable contract between the transport and the
//! core:
//! - Power events as published on the alarm topic
//! - The validity predicate for those events
//! - Raw inbound messages as delivered by the transport
//! - The variable schema policy expressions are compiled against

mod event;
mod message;
mod schema;
mod validate;

pub use event::*;
pub use message::*;
pub use schema::*;
pub use validate::*;
