//! Wait policies.
//!
//! ## Contents
//! - [`BackoffPolicy`] how long an idle worker sleeps between polls (first / factor / max + jitter)
//! - [`JitterPolicy`]  randomization so idle workers do not wake in lockstep
//!
//! ## Quick wiring
//! ```text
//! Config { idle_backoff: BackoffPolicy, .. }
//!      └─► core::worker::Worker uses idle_backoff.next(empty_polls)
//!          while waiting for a submission wake-up
//! ```
//!
//! ## Defaults
//! - `BackoffPolicy::default()` → constant 100ms, no jitter.
//! - `JitterPolicy::None` by default; consider `Equal` for large pools.

mod backoff;
mod jitter;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
