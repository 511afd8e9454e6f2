//! # Event subscriber trait.
//!
//! [`Subscribe`] plugs custom event handlers into an engine through
//! [`EngineBuilder::with_subscribers`](crate::EngineBuilder::with_subscribers).
//!
//! Each subscriber gets a dedicated worker task, a bounded queue
//! ([`Subscribe::queue_capacity`]) and panic isolation.
//!
//! ## Rules
//! - A slow subscriber only affects its own queue.
//! - On overflow the event is dropped for this subscriber only and
//!   `EventKind::SubscriberOverflow` is published.
//! - Events are processed sequentially (FIFO) per subscriber.
//!
//! ## Example
//! ```rust
//! use std::sync::atomic::{AtomicU64, Ordering};
//! use async_trait::async_trait;
//! use crawlvisor::{Event, EventKind, Subscribe};
//!
//! #[derive(Default)]
//! struct FailureCounter(AtomicU64);
//!
//! #[async_trait]
//! impl Subscribe for FailureCounter {
//!     async fn on_event(&self, ev: &Event) {
//!         if matches!(ev.kind, EventKind::TaskFailed) {
//!             self.0.fetch_add(1, Ordering::Relaxed);
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str { "failures" }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Event subscriber for runtime observability.
///
/// Use async I/O and handle errors internally; panics are caught and reported
/// as `SubscriberPanicked`.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Processes a single event, called from this subscriber's own worker task.
    async fn on_event(&self, event: &Event);

    /// Name used in logs and in overflow/panic events.
    ///
    /// The default is `type_name::<Self>()`; override it with something short.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Preferred queue capacity (clamped to at least 1). Default: 1024.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
