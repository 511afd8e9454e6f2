//! # Hook capabilities invoked around one crawl.
//!
//! A worker runs these for every task it takes:
//! ```text
//! take ─► BeforeCrawl::before_crawl ─► Crawl::crawl ─┬─ Ok  ─► AfterCrawl::after_crawl
//!          (optional, may veto)         (mandatory)  └─ Err ─► AfterCrawl::crawl_error
//! ```
//!
//! ## Rules
//! - Every call is isolated: errors **and panics** are caught by the worker and logged.
//! - `before_crawl` returning `Ok(false)` drops the task (it is not requeued).
//! - `before_crawl` failing is treated as `Ok(true)`.
//! - `crawl` receives a [`CancellationToken`] cancelled on forced shutdown (and on timeout);
//!   honoring it is optional.
//! - `elapsed` covers the `crawl` call only.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::CrawlError;
use crate::tasks::task::Task;

/// Last-chance veto before a task is crawled.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use crawlvisor::{BeforeCrawl, CrawlError, Task};
///
/// struct SkipImages;
///
/// #[async_trait]
/// impl BeforeCrawl<String> for SkipImages {
///     async fn before_crawl(&self, task: &Task<String>, _priority: i64) -> Result<bool, CrawlError> {
///         Ok(!task.key().ends_with(".png"))
///     }
/// }
/// ```
#[async_trait]
pub trait BeforeCrawl<P>: Send + Sync + 'static {
    /// Returns `Ok(true)` to crawl the task, `Ok(false)` to drop it.
    async fn before_crawl(&self, task: &Task<P>, priority: i64) -> Result<bool, CrawlError>;
}

/// Executes one task (usually a network fetch) and produces a response.
///
/// The only mandatory collaborator of the engine.
#[async_trait]
pub trait Crawl<P, R>: Send + Sync + 'static {
    /// Crawls the task.
    ///
    /// Implementations that can be interrupted should watch `ctx` and return
    /// [`CrawlError::Canceled`] once it fires.
    async fn crawl(&self, task: Arc<Task<P>>, ctx: CancellationToken) -> Result<R, CrawlError>;
}

/// Receives the outcome of every crawl.
#[async_trait]
pub trait AfterCrawl<P, R>: Send + Sync + 'static {
    /// Called when [`Crawl::crawl`] succeeded.
    async fn after_crawl(
        &self,
        task: &Task<P>,
        priority: i64,
        response: R,
        elapsed: Duration,
    ) -> Result<(), CrawlError>;

    /// Called when [`Crawl::crawl`] failed, timed out or panicked.
    async fn crawl_error(
        &self,
        task: &Task<P>,
        priority: i64,
        error: CrawlError,
        elapsed: Duration,
    ) -> Result<(), CrawlError>;
}

/// Shared handle to a before hook.
pub type BeforeRef<P> = Arc<dyn BeforeCrawl<P>>;
/// Shared handle to an execute hook.
pub type CrawlRef<P, R> = Arc<dyn Crawl<P, R>>;
/// Shared handle to an after/error hook.
pub type AfterRef<P, R> = Arc<dyn AfterCrawl<P, R>>;

/// The hook set shared by all workers of one engine.
pub(crate) struct Hooks<P, R> {
    pub before: Option<BeforeRef<P>>,
    pub crawl: CrawlRef<P, R>,
    pub after: AfterRef<P, R>,
}

impl<P, R> Clone for Hooks<P, R> {
    fn clone(&self) -> Self {
        Self {
            before: self.before.clone(),
            crawl: Arc::clone(&self.crawl),
            after: Arc::clone(&self.after),
        }
    }
}
