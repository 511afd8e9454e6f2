//! # External task source.
//!
//! Instead of the internal dedupe/priority queue, an engine can pull its work from an
//! external blocking endpoint (a channel fed by a message broker, a file tailer, ...).
//! Each raw message is turned into a [`Task`] by a [`MessageConverter`].
//!
//! ## Rules
//! - No dedupe and no priority merging: every converted message is crawled once.
//! - `Ok(None)` from the converter means "nothing to crawl for this message".
//! - A converter error is logged by the worker and treated like `Ok(None)`.
//! - [`MessageSource::recv`] must be cancel-safe: workers drop the future on shutdown.

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};

use crate::error::CrawlError;
use crate::tasks::task::Task;

/// Blocking pull endpoint shared by all workers.
#[async_trait]
pub trait MessageSource: Send + Sync + 'static {
    /// Raw message type produced by the source.
    type Message: Send + 'static;

    /// Waits for the next message. Returns `None` once the source is exhausted.
    async fn recv(&self) -> Option<Self::Message>;

    /// Best-effort hint whether messages are waiting. Defaults to `false`.
    fn has_pending(&self) -> bool {
        false
    }
}

#[async_trait]
impl<M: Send + 'static> MessageSource for Mutex<mpsc::Receiver<M>> {
    type Message = M;

    async fn recv(&self) -> Option<M> {
        self.lock().await.recv().await
    }

    fn has_pending(&self) -> bool {
        // A worker parked in `recv` holds the lock, which means nothing is buffered.
        self.try_lock().map(|rx| !rx.is_empty()).unwrap_or(false)
    }
}

/// Maps an external message to a task.
///
/// Implemented for every `Fn(M) -> Result<Option<Task<P>>, CrawlError>`:
/// ```
/// use crawlvisor::{CrawlError, MessageConverter, Task};
///
/// let conv = |line: String| -> Result<Option<Task<String>>, CrawlError> {
///     let url = line.trim();
///     if url.is_empty() {
///         return Ok(None);
///     }
///     Ok(Some(Task::new(url, url.to_string())))
/// };
/// assert!(conv.convert("  ".into()).unwrap().is_none());
/// ```
pub trait MessageConverter<M, P>: Send + Sync + 'static {
    fn convert(&self, message: M) -> Result<Option<Task<P>>, CrawlError>;
}

impl<M, P, F> MessageConverter<M, P> for F
where
    F: Fn(M) -> Result<Option<Task<P>>, CrawlError> + Send + Sync + 'static,
{
    fn convert(&self, message: M) -> Result<Option<Task<P>>, CrawlError> {
        self(message)
    }
}
