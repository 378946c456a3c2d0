//! Single-slot rendezvous between the conversation loop and a renderer.
//!
//! The loop waits on an [`Observable`] owned by an input block; whichever
//! renderer answers the block resolves it, possibly from another thread.

use std::sync::Mutex;

use kubeinteract_core::{InputError, ProtocolError};
use tokio::sync::Notify;

/// A value (or input error) produced exactly once and awaited by one consumer.
#[derive(Debug)]
pub struct Observable<T> {
    slot: Mutex<Option<Result<T, InputError>>>,
    notify: Notify,
}

impl<T: Clone> Observable<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            notify: Notify::new(),
        }
    }

    /// Resolve the observable and wake the waiter.
    ///
    /// Fails with [`ProtocolError::AlreadyResolved`] on a second call; the
    /// first result is kept.
    pub fn set(&self, result: Result<T, InputError>) -> Result<(), ProtocolError> {
        {
            let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
            if slot.is_some() {
                return Err(ProtocolError::AlreadyResolved);
            }
            *slot = Some(result);
        }
        self.notify.notify_waiters();
        Ok(())
    }

    /// Suspend until the observable is resolved, then return its result.
    pub async fn wait(&self) -> Result<T, InputError> {
        loop {
            // Register before checking so a concurrent `set` cannot slip
            // between the check and the await.
            let notified = self.notify.notified();
            if let Some(result) = self.try_get() {
                return result;
            }
            notified.await;
        }
    }

    /// The result if already resolved, without waiting.
    pub fn try_get(&self) -> Option<Result<T, InputError>> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn is_resolved(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }
}

impl<T: Clone> Default for Observable<T> {
    fn default() -> Self {
        Self::new()
    }
}
