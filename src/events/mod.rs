//! Runtime events: types and broadcast bus.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Engine` (pause/resume/shutdown), workers (per-task events),
//!   `LivenessMonitor` (stalls, deadlocks), `SubscriberSet` (overflow/panic).
//! - **Consumers**: the engine's subscriber listener (fans out to `SubscriberSet`) and any
//!   receiver returned by `Engine::subscribe()`.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
