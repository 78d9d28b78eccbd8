//! MQTT transport for powerwatchd
//!
//! Provides:
//! - MQTT 5 connection with a session that outlives disconnects
//! - Subscription (QoS 1) re-established on every connect; a refused
//!   subscription stops the transport
//! - Forwarding of publishes into the dispatcher mailbox

mod subscriber;

pub use subscriber::*;

use thiserror::Error;

/// Transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Client error: {0}")]
    Client(#[from] rumqttc::v5::ClientError),

    #[error("Broker rejected subscription to '{topic}': {reason}")]
    SubscriptionRejected { topic: String, reason: String },

    #[error("Server requested disconnect")]
    ServerDisconnect,
}

pub type TransportResult<T> = Result<T, TransportError>;
