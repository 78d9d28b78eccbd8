//! Host action trait interfaces for powerwatchd
//!
//! This crate defines the interface between the daemon core and the
//! platform-specific way of shutting a machine down. It contains no
//! platform code itself.

mod mock;
mod traits;

pub use mock::*;
pub use traits::*;
