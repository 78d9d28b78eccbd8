//! Shared utilities for powerwatchd
//!
//! This crate provides:
//! - ID types (ArmId)
//! - The error taxonomy shared by every component
//! - Default paths for the configuration file

mod error;
mod ids;
mod paths;

pub use error::*;
pub use ids::*;
pub use paths::*;
