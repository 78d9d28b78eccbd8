//! Core events emitted by the engine

use chrono::{DateTime, Local};
use powerwatch_api::PowerEvent;
use powerwatch_util::ArmId;
use tokio::sync::mpsc;

/// Events emitted by the debounce engine
#[derive(Debug, Clone)]
pub enum CoreEvent {
    /// A shutdown was scheduled
    Armed {
        arm_id: ArmId,
        deadline: DateTime<Local>,
        event: PowerEvent,
    },

    /// A pending shutdown was cancelled by the disarm expression
    Disarmed { arm_id: ArmId, event: PowerEvent },

    /// The recovery period elapsed and the shutdown action succeeded
    ShutdownInvoked { arm_id: ArmId },

    /// The shutdown action failed. Fatal for the daemon.
    ShutdownFailed { arm_id: ArmId, error: String },

    /// An event arrived after the shutdown action ran
    EventIgnored { event: PowerEvent },
}

impl CoreEvent {
    /// Whether the daemon must stop after seeing this event
    pub fn is_fatal(&self) -> bool {
        matches!(self, CoreEvent::ShutdownFailed { .. })
    }
}

pub type CoreEventSender = mpsc::UnboundedSender<CoreEvent>;
pub type CoreEventReceiver = mpsc::UnboundedReceiver<CoreEvent>;
