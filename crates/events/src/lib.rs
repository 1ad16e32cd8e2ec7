//! `corebank-events`: event publishing seam for the transaction pipeline.
//!
//! Publishing is an optional downstream collaborator: callers hold an
//! `Arc<dyn EventPublisher>` and never null-check. When eventing is
//! disabled by configuration, the no-op publisher is wired in at startup.

pub mod bus;
pub mod event;
pub mod in_memory_bus;
pub mod noop;
pub mod transaction;

pub use bus::{EventPublisher, Subscription};
pub use event::Event;
pub use in_memory_bus::InMemoryEventBus;
pub use noop::NoopEventPublisher;
pub use transaction::TransactionEvent;
