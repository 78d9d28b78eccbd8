//! Linux host actions for powerwatchd
//!
//! Provides:
//! - Shutdown by running the configured command
//! - Hostname lookup for building the transport client ID

mod host;
mod shutdown;

pub use host::*;
pub use shutdown::*;
