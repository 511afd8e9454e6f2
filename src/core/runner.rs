//! # Run one crawl of a task.
//!
//! [`run_once`] executes the crawl hook for one task with a child cancellation token and an
//! optional timeout, catches panics, measures elapsed time and publishes the outcome.
//!
//! ## Event flow
//! ```text
//! Success:  crawl() → Ok(resp)          → publish TaskCompleted
//! Failure:  crawl() → Err(e) | panic    → publish TaskFailed
//! Timeout:  timeout exceeded → cancel child → publish TimeoutHit
//!                                           → publish TaskFailed (timeout)
//! ```
//!
//! ## Rules
//! - Exactly one terminal event (`TaskCompleted` or `TaskFailed`) per call.
//! - `elapsed` covers the crawl call only, not the surrounding hooks.
//! - Cancelling the child token does not affect the parent.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::error::CrawlError;
use crate::events::{Bus, Event, EventKind};
use crate::tasks::{CrawlRef, Task};

/// Crawls `task` once and reports the result with the elapsed wall time.
pub(crate) async fn run_once<P, R>(
    crawl: &CrawlRef<P, R>,
    task: Arc<Task<P>>,
    parent: &CancellationToken,
    timeout: Option<Duration>,
    worker: usize,
    bus: &Bus,
) -> (Result<R, CrawlError>, Duration)
where
    P: Send + Sync + 'static,
    R: Send + 'static,
{
    let child = parent.child_token();
    let started = Instant::now();
    let fut = guarded(crawl.crawl(Arc::clone(&task), child.clone()));

    let res = match timeout {
        Some(dur) => match time::timeout(dur, fut).await {
            Ok(r) => r,
            Err(_elapsed) => {
                child.cancel();
                bus.publish(
                    Event::new(EventKind::TimeoutHit)
                        .with_task(task.key())
                        .with_worker(worker)
                        .with_timeout(dur),
                );
                Err(CrawlError::Timeout { timeout: dur })
            }
        },
        None => fut.await,
    };
    let elapsed = started.elapsed();

    let ev = match &res {
        Ok(_) => Event::new(EventKind::TaskCompleted),
        Err(e) => {
            if let CrawlError::Panicked { info } = e {
                error!(worker, key = task.key(), panic = %info, "crawl hook panicked");
            }
            Event::new(EventKind::TaskFailed).with_reason(e.to_string())
        }
    };
    bus.publish(
        ev.with_task(task.key())
            .with_worker(worker)
            .with_priority(task.priority())
            .with_elapsed(elapsed),
    );
    (res, elapsed)
}

/// Awaits a hook future, converting a panic into [`CrawlError::Panicked`].
pub(crate) async fn guarded<T, F>(fut: F) -> Result<T, CrawlError>
where
    F: Future<Output = Result<T, CrawlError>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(r) => r,
        Err(panic) => Err(CrawlError::Panicked {
            info: panic_message(panic.as_ref()),
        }),
    }
}

/// Renders a panic payload as text.
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
