//! No-op publisher, selected at startup when eventing is disabled.
//!
//! Callers depend on the `EventPublisher` trait and never check whether
//! publishing is enabled; this implementation makes "disabled" a valid
//! wiring instead of a null check at every call site.

use std::sync::mpsc;

use crate::bus::{EventPublisher, Subscription};

/// Publisher that discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventPublisher;

impl NoopEventPublisher {
    pub fn new() -> Self {
        Self
    }
}

impl<M> EventPublisher<M> for NoopEventPublisher
where
    M: Send + 'static,
{
    type Error = core::convert::Infallible;

    fn publish(&self, _message: M) -> Result<(), Self::Error> {
        Ok(())
    }

    fn subscribe(&self) -> Subscription<M> {
        // A channel whose sender is dropped immediately: recv() reports
        // disconnection, try_recv() reports empty-then-disconnected.
        let (_tx, rx) = mpsc::channel();
        Subscription::new(rx)
    }
}
