//! # Event subscribers.
//!
//! [`Subscribe`] is the extension point for reacting to engine events (metrics, audit,
//! progress reporting). [`SubscriberSet`] fans events out to subscribers with one bounded
//! queue and one worker task each.
//!
//! ```text
//! Worker ── publish(Event) ──► Bus ──► engine listener ──► SubscriberSet
//!                                                        ┌──────┴──────┐
//!                                                        ▼             ▼
//!                                                  on_event(S1)   on_event(S2)
//! ```

mod subscriber;
mod subscriber_set;

pub use subscriber::Subscribe;
pub(crate) use subscriber_set::SubscriberSet;
