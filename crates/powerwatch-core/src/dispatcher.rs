//! Serial dispatcher
//!
//! Takes inbound messages one at a time, in delivery order: topic check,
//! validation, then the debounce engine. Failures are either fatal or
//! logged and dropped, depending on their kind and the strict flag.

use powerwatch_api::{EventError, InboundMessage, Validator};
use powerwatch_util::ErrorKind;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::{DebounceEngine, EngineError, Transition};

/// Dispatch errors
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Received message on unexpected topic '{topic}' (subscribed to '{expected}')")]
    UnexpectedTopic { topic: String, expected: String },

    #[error("Rejected payload: {0}")]
    Event(#[from] EventError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl DispatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DispatchError::UnexpectedTopic { .. } => ErrorKind::UnexpectedTopic,
            DispatchError::Event(e) => e.kind(),
            DispatchError::Engine(e) => e.kind(),
        }
    }
}

pub type DispatchResult<T> = Result<T, DispatchError>;

/// Result of handling one message that did not stop the daemon
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The event reached the engine
    Applied(Transition),
    /// The message was logged and dropped
    Dropped(ErrorKind),
}

/// Feeds inbound messages to the engine, strictly one at a time
pub struct Dispatcher {
    topic: String,
    strict: bool,
    validator: Validator,
    engine: DebounceEngine,
}

impl Dispatcher {
    pub fn new(topic: impl Into<String>, engine: DebounceEngine) -> Self {
        Self {
            topic: topic.into(),
            strict: false,
            validator: Validator::new(),
            engine,
        }
    }

    /// Treat invalid messages, unexpected topics and evaluation failures as
    /// fatal
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn validator(mut self, validator: Validator) -> Self {
        self.validator = validator;
        self
    }

    /// Handle one message.
    ///
    /// Returns an error only when the failure is fatal under the current
    /// mode; anything else is logged and reported as [`Outcome::Dropped`].
    pub fn handle(&self, message: &InboundMessage) -> DispatchResult<Outcome> {
        debug!(
            topic = %message.topic,
            retained = message.retained,
            payload = %message.payload_lossy(),
            "Received message"
        );

        match self.process(message) {
            Ok(transition) => Ok(Outcome::Applied(transition)),
            Err(e) => {
                let kind = e.kind();
                if kind.is_fatal(self.strict) {
                    error!(kind = %kind, error = %e, payload = %message.payload_lossy(), "Fatal message error");
                    Err(e)
                } else {
                    warn!(kind = %kind, error = %e, payload = %message.payload_lossy(), "Dropping message");
                    Ok(Outcome::Dropped(kind))
                }
            }
        }
    }

    fn process(&self, message: &InboundMessage) -> DispatchResult<Transition> {
        if message.topic != self.topic {
            return Err(DispatchError::UnexpectedTopic {
                topic: message.topic.clone(),
                expected: self.topic.clone(),
            });
        }

        let event = self.validator.validate(&message.payload)?;
        Ok(self.engine.on_event(&event)?)
    }

    /// Process the mailbox until it closes or a fatal error occurs.
    pub async fn run(self, mut mailbox: mpsc::Receiver<InboundMessage>) -> DispatchResult<()> {
        info!(topic = %self.topic, strict = self.strict, "Dispatcher started");

        while let Some(message) = mailbox.recv().await {
            self.handle(&message)?;
        }

        info!("Mailbox closed; dispatcher stopping");
        Ok(())
    }
}
