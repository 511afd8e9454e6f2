//! # crawlvisor
//!
//! **Crawlvisor** is a concurrent crawl engine for tokio.
//!
//! It deduplicates and prioritizes submitted tasks (usually URLs), runs them on a fixed
//! pool of workers through pluggable hooks, supports runtime pause/resume, offers a
//! graceful and a forced shutdown, and watches workers for stalls.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!  caller ── submit(key, payload) ──► Engine ──► CrawlQueue
//!                                        │        (key → task index + priority order)
//!                                        │             │ take
//!                                        ▼             ▼
//!                               LifecycleSignal ◄── Worker[0..N]
//!                           (Running ⇄ Paused, Stopped)  │
//!                                                        ├─► BeforeCrawl (veto)
//!                                                        ├─► Crawl      (fetch)
//!                                                        └─► AfterCrawl (result | error)
//!
//!  Worker / Engine / LivenessMonitor ── publish ──► Bus ──► SubscriberSet ──► Subscribe
//! ```
//!
//! ### Ordering
//! A task is dequeued by priority (highest first), then by creation time (earliest first).
//! Resubmitting a queued key adds to its priority instead of queueing a duplicate.
//!
//! ### Shutdown
//! - [`Engine::wait_and_shutdown`] crawls everything queued before it was called.
//! - [`Engine::cancel_and_shutdown`] discards the queue, interrupts workers and aborts
//!   them after [`Config::grace`].
//!
//! ## Features
//! | Area              | Description                                              | Key types / traits                               |
//! |-------------------|----------------------------------------------------------|--------------------------------------------------|
//! | **Engine**        | Worker pool, pause/resume, both shutdown protocols.      | [`Engine`], [`EngineBuilder`]                    |
//! | **Queue**         | Dedupe + priority queue, or an external message source.  | [`CrawlQueue`], [`MessageSource`]                |
//! | **Hooks**         | Veto, crawl and result callbacks around each task.       | [`BeforeCrawl`], [`Crawl`], [`AfterCrawl`]       |
//! | **Lifecycle**     | Explicit state machine with lock-free reads.             | [`LifecycleSignal`], [`SignalState`]             |
//! | **Subscriber API**| Hook into engine events (metrics, audit, progress).      | [`Subscribe`], [`Event`]                         |
//! | **Errors**        | Typed errors for the engine and for hooks.               | [`EngineError`], [`CrawlError`]                  |
//! | **Configuration** | Pool size, wait cadence, timeouts, liveness thresholds.  | [`Config`], [`BackoffPolicy`]                    |
//!
//! ## Optional features
//! - `deadlock_detection`: builds `parking_lot` with its deadlock detector; the liveness
//!   monitor then reports deadlocked threads.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use async_trait::async_trait;
//! use tokio_util::sync::CancellationToken;
//! use crawlvisor::{AfterCrawl, Config, CrawlError, CrawlFn, Engine, Task};
//!
//! struct Report;
//!
//! #[async_trait]
//! impl AfterCrawl<String, usize> for Report {
//!     async fn after_crawl(&self, task: &Task<String>, priority: i64, bytes: usize, took: Duration) -> Result<(), CrawlError> {
//!         println!("{} (p={priority}) {bytes}B in {took:?}", task.key());
//!         Ok(())
//!     }
//!     async fn crawl_error(&self, task: &Task<String>, _priority: i64, err: CrawlError, _took: Duration) -> Result<(), CrawlError> {
//!         eprintln!("{}: {err}", task.key());
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut cfg = Config::default();
//!     cfg.workers = 2;
//!     cfg.timeout = Duration::from_secs(5);
//!
//!     let engine = Engine::<String>::builder::<usize>()
//!         .with_config(cfg)
//!         .crawl(CrawlFn::arc(|task: Arc<Task<String>>, _ctx: CancellationToken| async move {
//!             Ok::<_, CrawlError>(task.payload().len())
//!         }))
//!         .after(Arc::new(Report))
//!         .build()?;
//!
//!     engine.submit("https://example.com/", "<html></html>".to_string())?;
//!     engine.submit_with_priority("https://example.com/about", "<p>about</p>".to_string(), 5)?;
//!     engine.wait_and_shutdown().await;
//!     Ok(())
//! }
//! ```
mod core;
mod error;
mod events;
mod policies;
mod subscribers;
mod tasks;

// ---- Public re-exports ----

pub use core::{
    Config, CrawlQueue, Engine, EngineBuilder, LifecycleSignal, SignalState, WorkerStatus,
};
pub use error::{CrawlError, EngineError};
pub use events::{Event, EventKind};
pub use policies::{BackoffPolicy, JitterPolicy};
pub use subscribers::Subscribe;
pub use tasks::{
    AfterCrawl, AfterRef, BeforeCrawl, BeforeRef, Crawl, CrawlFn, CrawlRef, DEFAULT_PRIORITY,
    MessageConverter, MessageSource, Task,
};
