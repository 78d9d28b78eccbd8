//! Debounce engine
//!
//! ```text
//!          arm expr true              recovery period elapsed
//!  Idle ─────────────────► Armed ─────────────────────────► Fired
//!   ▲                        │
//!   │   disarm expr true     │
//!   └────────────────────────┘
//! ```
//!
//! - **Idle:** no shutdown pending. Only the arm expression is evaluated.
//! - **Armed:** one timer pending. Only the disarm expression is evaluated.
//! - **Fired:** the shutdown action has been invoked. Terminal; every later
//!   event is ignored.
//!
//! The dispatcher and the timer task mutate the state under one mutex. The
//! timer only takes effect if the slot still holds the [`ArmId`] it was
//! scheduled with, so a cancel that loses the race to the fire (or the other
//! way round) is a no-op.

use chrono::{DateTime, Local};
use powerwatch_api::PowerEvent;
use powerwatch_host_api::ShutdownAction;
use powerwatch_util::{ArmId, ErrorKind};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::{CoreEvent, CoreEventReceiver, CoreEventSender, PolicyError, PolicySet, Slot};

/// Engine errors
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Policy(#[from] PolicyError),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Policy(e) => e.kind(),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

/// What a single event did to the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Idle -> Armed: a shutdown is scheduled for `deadline`
    Armed {
        arm_id: ArmId,
        deadline: DateTime<Local>,
    },

    /// Armed -> Idle: the pending shutdown was cancelled
    Disarmed { arm_id: ArmId },

    /// The evaluated expression was false; state unchanged
    Unchanged { evaluated: Slot },

    /// The shutdown already ran; nothing was evaluated
    Ignored,
}

/// Snapshot of the engine state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Armed {
        arm_id: ArmId,
        deadline: DateTime<Local>,
    },
    Fired,
}

/// A scheduled shutdown
#[derive(Debug)]
struct TimerHandle {
    arm_id: ArmId,
    deadline: DateTime<Local>,
    task: JoinHandle<()>,
}

impl TimerHandle {
    /// Stop the timer. Aborting a finished task does nothing.
    fn cancel(self) {
        self.task.abort();
    }
}

#[derive(Debug)]
enum State {
    Idle,
    Armed(TimerHandle),
    Fired,
}

impl State {
    /// Remove the pending timer, leaving `Idle`. Other states are kept.
    fn take_pending(&mut self) -> Option<TimerHandle> {
        match std::mem::replace(self, State::Idle) {
            State::Armed(handle) => Some(handle),
            other => {
                *self = other;
                None
            }
        }
    }
}

struct Shared {
    state: Mutex<State>,
    policy: PolicySet,
    recovery_period: Duration,
    action: Arc<dyn ShutdownAction>,
    events: CoreEventSender,
}

/// Arms, disarms and fires the delayed shutdown.
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct DebounceEngine {
    shared: Arc<Shared>,
}

impl DebounceEngine {
    /// Create an engine in the `Idle` state.
    ///
    /// Returns the receiving end of the [`CoreEvent`] channel.
    pub fn new(
        policy: PolicySet,
        recovery_period: Duration,
        action: Arc<dyn ShutdownAction>,
    ) -> (Self, CoreEventReceiver) {
        let (events, rx) = mpsc::unbounded_channel();

        info!(
            arm = %policy.arm().source(),
            disarm = %policy.disarm().source(),
            recovery_period = ?recovery_period,
            action = %action.describe(),
            "Debounce engine initialized"
        );

        let engine = Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::Idle),
                policy,
                recovery_period,
                action,
                events,
            }),
        };
        (engine, rx)
    }

    /// Apply one validated event.
    ///
    /// Must be called from within a tokio runtime, since arming spawns the
    /// timer task. On evaluation failure the state is left unchanged.
    pub fn on_event(&self, event: &PowerEvent) -> EngineResult<Transition> {
        let mut state = self.shared.lock();

        match &*state {
            State::Idle => {
                if !self.shared.policy.arm().evaluate(event)? {
                    debug!(event = %event, "Arm expression false; staying idle");
                    return Ok(Transition::Unchanged {
                        evaluated: Slot::Arm,
                    });
                }

                let handle = self.schedule();
                let (arm_id, deadline) = (handle.arm_id, handle.deadline);
                *state = State::Armed(handle);

                info!(
                    arm_id = %arm_id,
                    event = %event,
                    deadline = %deadline,
                    "Power down; shutdown in {}",
                    humantime::format_duration(self.shared.recovery_period)
                );
                self.shared.emit(CoreEvent::Armed {
                    arm_id,
                    deadline,
                    event: event.clone(),
                });
                Ok(Transition::Armed { arm_id, deadline })
            }

            State::Armed(handle) => {
                let arm_id = handle.arm_id;
                if !self.shared.policy.disarm().evaluate(event)? {
                    debug!(event = %event, "Disarm expression false; shutdown still pending");
                    return Ok(Transition::Unchanged {
                        evaluated: Slot::Disarm,
                    });
                }

                if let Some(handle) = state.take_pending() {
                    handle.cancel();
                }

                info!(arm_id = %arm_id, event = %event, "Power recovered; cancelled pending shutdown");
                self.shared.emit(CoreEvent::Disarmed {
                    arm_id,
                    event: event.clone(),
                });
                Ok(Transition::Disarmed { arm_id })
            }

            State::Fired => {
                debug!(event = %event, "Shutdown already invoked; ignoring event");
                self.shared.emit(CoreEvent::EventIgnored {
                    event: event.clone(),
                });
                Ok(Transition::Ignored)
            }
        }
    }

    /// Current state
    pub fn state(&self) -> EngineState {
        match &*self.shared.lock() {
            State::Idle => EngineState::Idle,
            State::Armed(handle) => EngineState::Armed {
                arm_id: handle.arm_id,
                deadline: handle.deadline,
            },
            State::Fired => EngineState::Fired,
        }
    }

    /// Cancel any pending timer. Called when the daemon stops.
    ///
    /// Returns the id of the cancelled arm cycle, if there was one.
    pub fn shutdown(&self) -> Option<ArmId> {
        let handle = self.shared.lock().take_pending()?;
        let arm_id = handle.arm_id;
        handle.cancel();
        info!(arm_id = %arm_id, "Daemon stopping; cancelled pending shutdown");
        Some(arm_id)
    }

    /// Spawn the timer task for a new arm cycle. Caller holds the lock.
    fn schedule(&self) -> TimerHandle {
        let arm_id = ArmId::new();
        let period = self.shared.recovery_period;
        let deadline = deadline_after(period);

        let shared = Arc::clone(&self.shared);
        let task = tokio::spawn(async move {
            tokio::time::sleep(period).await;
            shared.fire(arm_id).await;
        });

        TimerHandle {
            arm_id,
            deadline,
            task,
        }
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn emit(&self, event: CoreEvent) {
        // Nobody listening is fine; diagnostics are optional.
        let _ = self.events.send(event);
    }

    async fn fire(&self, arm_id: ArmId) {
        {
            let mut state = self.lock();
            let current = matches!(&*state, State::Armed(handle) if handle.arm_id == arm_id);
            if !current {
                debug!(arm_id = %arm_id, "Timer fired for a cancelled arm cycle; ignoring");
                return;
            }
            // Dropping our own JoinHandle detaches; it does not abort this task.
            *state = State::Fired;
        }

        info!(arm_id = %arm_id, "Recovery period elapsed without power returning");
        match self.action.invoke().await {
            Ok(()) => self.emit(CoreEvent::ShutdownInvoked { arm_id }),
            Err(e) => {
                error!(arm_id = %arm_id, error = %e, "Shutdown action failed");
                self.emit(CoreEvent::ShutdownFailed {
                    arm_id,
                    error: e.to_string(),
                });
            }
        }
    }
}

fn deadline_after(period: Duration) -> DateTime<Local> {
    let now = Local::now();
    match chrono::Duration::from_std(period)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
    {
        Some(deadline) => deadline,
        None => {
            warn!(period = ?period, "Recovery period out of range for a wall-clock deadline");
            now
        }
    }
}
