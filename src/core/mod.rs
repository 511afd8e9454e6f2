//! Runtime core: queue, lifecycle signal, workers and orchestration.
//!
//! The public API from this module is [`Engine`] (built with [`EngineBuilder`]) plus the
//! types it exposes.
//!
//! Internal modules:
//! - [`queue`]: dedupe + priority queue, or an external source;
//! - [`signal`]: the lifecycle state machine shared by the engine and workers;
//! - [`worker`]: one worker loop and its activity record;
//! - [`runner`]: one crawl with timeout, panic capture and event publishing;
//! - [`monitor`]: periodic stall and deadlock diagnostics;
//! - [`engine`]: startup and both shutdown protocols.

mod builder;
mod config;
mod engine;
mod monitor;
mod queue;
mod runner;
mod signal;
mod worker;

pub use builder::EngineBuilder;
pub use config::Config;
pub use engine::Engine;
pub use queue::CrawlQueue;
pub(crate) use runner::panic_message;
pub use signal::{LifecycleSignal, SignalState};
pub use worker::WorkerStatus;
