//! # Worker loop: take, veto, crawl, report.
//!
//! One [`Worker`] runs per pool slot for the lifetime of the engine. Each iteration:
//!
//! ```text
//! loop:
//!   take() ──────────────► Stopped? ─► exit
//!     │                    Paused?  ─► wait for resume (watch + pause_interval)
//!     ├─ nothing: closure requested? ─► exit
//!     │           else wait: submission | closure | idle backoff | interrupt
//!     ├─ conversion error ─► warn, ConversionFailed, next iteration
//!     └─ task:
//!          before_crawl (optional)  ─ false ─► TaskSkipped, drop task
//!          re-check Stopped / Paused
//!          mark active (last_active, in-flight key)
//!          run_once (crawl hook, child token, timeout)
//!          after_crawl | crawl_error
//!          mark idle
//! ```
//!
//! ## Rules
//! - Hook errors and panics are logged and published as `HookFailed`; the loop never dies.
//! - A vetoed task is dropped, not requeued.
//! - `seek_closure` never interrupts an in-flight crawl; the worker exits at its next
//!   empty take (or at once if idle).
//! - The record's `last_active` moves right before the crawl hook starts.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::core::config::Config;
use crate::core::queue::CrawlQueue;
use crate::core::runner::{guarded, run_once};
use crate::core::signal::{LifecycleSignal, SignalState};
use crate::events::{Bus, Event, EventKind};
use crate::policies::BackoffPolicy;
use crate::tasks::{Hooks, Task};

/// Point-in-time view of one worker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkerStatus {
    /// Worker id (`0..workers`).
    pub id: usize,
    /// True while the worker is inside a crawl.
    pub working: bool,
    /// True once graceful shutdown asked this worker to exit.
    pub closure_requested: bool,
    /// Time since the worker last started a crawl (or since it was spawned).
    pub idle_for: Duration,
    /// Key of the task being crawled, if any.
    pub current: Option<Arc<str>>,
}

/// Per-worker state shared with the engine and the liveness monitor.
///
/// Written only by its own worker (except `closure_requested`), read by anyone.
#[derive(Debug)]
pub(crate) struct WorkerRecord {
    id: usize,
    epoch: Instant,
    last_active_ms: AtomicU64,
    working: AtomicBool,
    closure_requested: AtomicBool,
    closure: Notify,
    current: Mutex<Option<Arc<str>>>,
}

impl WorkerRecord {
    pub(crate) fn new(id: usize, epoch: Instant) -> Self {
        Self {
            id,
            epoch,
            last_active_ms: AtomicU64::new(Self::millis_since(epoch, Instant::now())),
            working: AtomicBool::new(false),
            closure_requested: AtomicBool::new(false),
            closure: Notify::new(),
            current: Mutex::new(None),
        }
    }

    fn millis_since(epoch: Instant, now: Instant) -> u64 {
        now.saturating_duration_since(epoch)
            .as_millis()
            .min(u128::from(u64::MAX)) as u64
    }

    pub(crate) fn id(&self) -> usize {
        self.id
    }

    /// Records the start of a crawl.
    pub(crate) fn mark_active(&self, key: &str) {
        self.last_active_ms
            .store(Self::millis_since(self.epoch, Instant::now()), Ordering::Release);
        *self.current.lock() = Some(Arc::from(key));
        self.working.store(true, Ordering::Release);
    }

    pub(crate) fn mark_idle(&self) {
        self.working.store(false, Ordering::Release);
        *self.current.lock() = None;
    }

    pub(crate) fn is_working(&self) -> bool {
        self.working.load(Ordering::Acquire)
    }

    /// Asks the worker to exit once it finds the queue empty. Set once, never cleared.
    pub(crate) fn seek_closure(&self) {
        self.closure_requested.store(true, Ordering::Release);
        self.closure.notify_one();
    }

    pub(crate) fn is_closure_requested(&self) -> bool {
        self.closure_requested.load(Ordering::Acquire)
    }

    /// Time elapsed between the last crawl start and `now`.
    pub(crate) fn idle_for(&self, now: Instant) -> Duration {
        let last = self.last_active_ms.load(Ordering::Acquire);
        let now_ms = Self::millis_since(self.epoch, now);
        Duration::from_millis(now_ms.saturating_sub(last))
    }

    pub(crate) fn status(&self, now: Instant) -> WorkerStatus {
        WorkerStatus {
            id: self.id,
            working: self.is_working(),
            closure_requested: self.is_closure_requested(),
            idle_for: self.idle_for(now),
            current: self.current.lock().clone(),
        }
    }
}

/// One worker loop.
pub(crate) struct Worker<P, R> {
    record: Arc<WorkerRecord>,
    queue: Arc<CrawlQueue<P>>,
    signal: Arc<LifecycleSignal>,
    hooks: Hooks<P, R>,
    bus: Bus,
    token: CancellationToken,
    idle_backoff: BackoffPolicy,
    pause_interval: Duration,
    timeout: Option<Duration>,
}

impl<P, R> Worker<P, R>
where
    P: Send + Sync + 'static,
    R: Send + 'static,
{
    pub(crate) fn new(
        record: Arc<WorkerRecord>,
        queue: Arc<CrawlQueue<P>>,
        signal: Arc<LifecycleSignal>,
        hooks: Hooks<P, R>,
        bus: Bus,
        token: CancellationToken,
        cfg: &Config,
    ) -> Self {
        Self {
            record,
            queue,
            signal,
            hooks,
            bus,
            token,
            idle_backoff: cfg.idle_backoff,
            pause_interval: cfg.pause_interval,
            timeout: cfg.crawl_timeout(),
        }
    }

    /// Runs until the engine stops, the runtime token fires, or closure is requested
    /// and the queue is empty.
    pub(crate) async fn run(self) {
        let id = self.record.id();
        debug!(worker = id, "worker started");

        let mut empty_polls: u32 = 0;
        loop {
            let work = self.queue.notified();
            tokio::pin!(work);
            work.as_mut().enable();

            let taken = tokio::select! {
                biased;
                res = self.queue.take(&self.token) => res,
                _ = self.record.closure.notified() => Ok(None),
            };

            if self.signal.is_stopping() || self.pause_if_needed().await.is_break() {
                break;
            }

            let task = match taken {
                Ok(Some(task)) => {
                    empty_polls = 0;
                    task
                }
                Ok(None) => {
                    if self.record.is_closure_requested() {
                        debug!(worker = id, "closure requested and queue empty");
                        break;
                    }
                    let delay = self.idle_backoff.next(empty_polls);
                    empty_polls = empty_polls.saturating_add(1);
                    trace!(worker = id, delay_ms = delay.as_millis() as u64, "queue empty");
                    tokio::select! {
                        _ = &mut work => {}
                        _ = self.record.closure.notified() => {}
                        _ = time::sleep(delay) => {}
                        _ = self.token.cancelled() => {}
                    }
                    continue;
                }
                Err(e) => {
                    warn!(worker = id, error = %e, "dropping unconvertible message");
                    self.bus.publish(
                        Event::new(EventKind::ConversionFailed)
                            .with_worker(id)
                            .with_reason(e.to_string()),
                    );
                    continue;
                }
            };

            if self.process(task).await.is_break() {
                break;
            }
        }

        self.record.mark_idle();
        debug!(worker = id, "worker exited");
        self.bus
            .publish(Event::new(EventKind::WorkerExited).with_worker(id));
    }

    /// Runs the hook sequence for one task.
    async fn process(&self, task: Task<P>) -> ControlFlow<()> {
        let id = self.record.id();
        let priority = task.priority();

        if let Some(before) = &self.hooks.before {
            match guarded(before.before_crawl(&task, priority)).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!(worker = id, key = task.key(), priority, "task vetoed");
                    self.bus.publish(
                        Event::new(EventKind::TaskSkipped)
                            .with_task(task.key())
                            .with_worker(id)
                            .with_priority(priority),
                    );
                    return ControlFlow::Continue(());
                }
                Err(e) => {
                    self.hook_failed("before_crawl", &task, &e);
                }
            }
        }

        if self.signal.is_stopping() || self.pause_if_needed().await.is_break() {
            return ControlFlow::Break(());
        }

        let task = Arc::new(task);
        self.record.mark_active(task.key());
        debug!(worker = id, key = task.key(), priority, "crawl starting");
        self.bus.publish(
            Event::new(EventKind::TaskStarting)
                .with_task(task.key())
                .with_worker(id)
                .with_priority(priority),
        );

        let (res, elapsed) = run_once(
            &self.hooks.crawl,
            Arc::clone(&task),
            &self.token,
            self.timeout,
            id,
            &self.bus,
        )
        .await;

        let (stage, outcome) = match res {
            Ok(resp) => (
                "after_crawl",
                guarded(self.hooks.after.after_crawl(&task, priority, resp, elapsed)).await,
            ),
            Err(err) => {
                debug!(
                    worker = id,
                    key = task.key(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    error = %err,
                    "crawl failed"
                );
                (
                    "crawl_error",
                    guarded(self.hooks.after.crawl_error(&task, priority, err, elapsed)).await,
                )
            }
        };
        if let Err(e) = outcome {
            self.hook_failed(stage, &task, &e);
        }

        self.record.mark_idle();
        ControlFlow::Continue(())
    }

    /// Blocks while paused. Breaks if the engine stops or the worker is interrupted.
    async fn pause_if_needed(&self) -> ControlFlow<()> {
        if !self.signal.is_paused() {
            return ControlFlow::Continue(());
        }
        let id = self.record.id();
        let mut state = self.signal.subscribe();
        debug!(worker = id, "worker paused");
        loop {
            match self.signal.state() {
                SignalState::Paused => {}
                SignalState::Stopped => return ControlFlow::Break(()),
                _ => {
                    debug!(worker = id, "worker resumed");
                    return ControlFlow::Continue(());
                }
            }
            tokio::select! {
                _ = state.changed() => {}
                _ = time::sleep(self.pause_interval) => {}
                _ = self.token.cancelled() => return ControlFlow::Break(()),
            }
        }
    }

    fn hook_failed(&self, stage: &'static str, task: &Task<P>, err: &crate::error::CrawlError) {
        let id = self.record.id();
        warn!(worker = id, key = task.key(), stage, error = %err, "hook failed");
        self.bus.publish(
            Event::new(EventKind::HookFailed)
                .with_task(task.key())
                .with_worker(id)
                .with_reason(format!("{stage}: {err}")),
        );
    }
}
