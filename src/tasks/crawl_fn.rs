//! # Function-backed execute hook (`CrawlFn`)
//!
//! [`CrawlFn`] wraps a closure `F: Fn(Arc<Task<P>>, CancellationToken) -> Fut`, producing a
//! fresh future per crawl. No state is shared between calls unless the closure captures it
//! explicitly (e.g. an `Arc<Client>`).
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use crawlvisor::{CrawlError, CrawlFn, Task};
//!
//! let fetch = CrawlFn::arc(|task: Arc<Task<String>>, _ctx: CancellationToken| async move {
//!     Ok::<_, CrawlError>(task.key().len())
//! });
//! # let _ = fetch;
//! ```

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::CrawlError;
use crate::tasks::hooks::Crawl;
use crate::tasks::task::Task;

/// Function-backed [`Crawl`] implementation.
#[derive(Debug)]
pub struct CrawlFn<F> {
    f: F,
}

impl<F> CrawlFn<F> {
    /// Wraps the closure.
    ///
    /// Prefer [`CrawlFn::arc`] when passing it straight to the builder.
    pub fn new(f: F) -> Self {
        Self { f }
    }

    /// Wraps the closure and returns it as a shared handle.
    pub fn arc(f: F) -> Arc<Self> {
        Arc::new(Self::new(f))
    }
}

#[async_trait]
impl<P, R, F, Fut> Crawl<P, R> for CrawlFn<F>
where
    P: Send + Sync + 'static,
    R: Send + 'static,
    F: Fn(Arc<Task<P>>, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, CrawlError>> + Send + 'static,
{
    async fn crawl(&self, task: Arc<Task<P>>, ctx: CancellationToken) -> Result<R, CrawlError> {
        (self.f)(task, ctx).await
    }
}
