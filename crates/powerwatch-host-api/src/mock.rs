//! Mock shutdown action for testing

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

use crate::{ActionError, ActionResult, ShutdownAction};

/// Records invocations instead of shutting anything down.
///
/// Clones share the same counters, so a test can keep one clone and hand
/// the other to the engine.
#[derive(Debug, Clone, Default)]
pub struct MockShutdown {
    invocations: Arc<AtomicUsize>,
    notify: Arc<Notify>,

    /// Configure invoke to fail
    pub fail: Arc<AtomicBool>,
}

impl MockShutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// A mock whose every invocation fails
    pub fn failing() -> Self {
        let mock = Self::new();
        mock.set_fail(true);
        mock
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Number of times `invoke` has been called
    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    /// Wait until at least one invocation has happened.
    pub async fn invoked(&self) {
        loop {
            let notified = self.notify.notified();
            if self.invocations() > 0 {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl ShutdownAction for MockShutdown {
    async fn invoke(&self) -> ActionResult<()> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        self.notify.notify_waiters();

        if self.fail.load(Ordering::SeqCst) {
            return Err(ActionError::Internal("Mock shutdown failure".into()));
        }
        Ok(())
    }

    fn describe(&self) -> String {
        "mock".into()
    }
}
