//! # Engine: the crawl orchestrator.
//!
//! [`Engine`] owns one [`CrawlQueue`], one [`LifecycleSignal`] and a fixed pool of workers.
//! It is created through [`EngineBuilder`](crate::EngineBuilder) and is already running
//! when `build()` returns.
//!
//! ## Architecture
//! ```text
//! start():
//!   signal: Uninitialized ─► Initializing
//!   Bus ─► subscriber listener ─► SubscriberSet        (only with subscribers)
//!   Worker[0] .. Worker[N-1]  (shared queue, signal, hooks, runtime token)
//!   LivenessMonitor           (own token, every monitor_interval)
//!   signal: Initializing ─► Running
//!
//! wait_and_shutdown() (graceful):
//!   close ─► DrainRequested ─► wait until queue empty
//!         ─► seek_closure on every worker ─► join (no interruption)
//!            └─ runtime token cancelled meanwhile: join the rest with grace
//!         ─► signal Stopped ─► stop monitor ─► AllStopped ─► flush subscribers
//!
//! cancel_and_shutdown() (forced):
//!   close ─► signal Stopped ─► cancel runtime token ─► drain queue ─► CancelRequested
//!         ─► join rounds of join_timeout (re-interrupt, warn survivors)
//!         ─► after grace: abort survivors, GraceExceeded
//!         ─► stop monitor ─► AllStopped ─► flush subscribers
//! ```
//!
//! ## Rules
//! - Shutdown methods are idempotent; only the first call joins the workers.
//! - A forced shutdown issued during a graceful one interrupts the workers at once. The
//!   graceful join then switches to the grace rounds, so both calls return within `grace`.
//! - Dropping the engine interrupts and stops the workers without waiting.
//! - While paused, a graceful shutdown waits for [`Engine::resume`] because paused
//!   workers keep what they already took.

use std::mem;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::core::config::Config;
use crate::core::monitor::LivenessMonitor;
use crate::core::queue::CrawlQueue;
use crate::core::signal::{LifecycleSignal, SignalState};
use crate::core::worker::{Worker, WorkerRecord, WorkerStatus};
use crate::error::EngineError;
use crate::events::{Bus, Event, EventKind};
use crate::subscribers::{Subscribe, SubscriberSet};
use crate::tasks::{DEFAULT_PRIORITY, Hooks};

/// Background task with its own stop token.
struct Background {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl Background {
    async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.handle.await {
            if e.is_panic() {
                error!(error = %e, "background task panicked");
            }
        }
    }
}

/// Concurrent crawl engine.
///
/// Generic over the task payload `P`; the response type of the crawl hook stays inside
/// the workers.
///
/// # Example
/// ```rust
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::time::Duration;
///
/// use async_trait::async_trait;
/// use tokio_util::sync::CancellationToken;
/// use crawlvisor::{AfterCrawl, CrawlError, CrawlFn, Engine, Task};
///
/// #[derive(Default)]
/// struct Tally(AtomicUsize);
///
/// #[async_trait]
/// impl AfterCrawl<String, usize> for Tally {
///     async fn after_crawl(&self, _t: &Task<String>, _p: i64, _r: usize, _e: Duration) -> Result<(), CrawlError> {
///         self.0.fetch_add(1, Ordering::SeqCst);
///         Ok(())
///     }
///     async fn crawl_error(&self, _t: &Task<String>, _p: i64, _e: CrawlError, _d: Duration) -> Result<(), CrawlError> {
///         Ok(())
///     }
/// }
///
/// #[tokio::main]
/// async fn main() -> Result<(), crawlvisor::EngineError> {
///     let tally = Arc::new(Tally::default());
///     let engine = Engine::<String>::builder::<usize>()
///         .workers(2)
///         .crawl(CrawlFn::arc(|t: Arc<Task<String>>, _ctx: CancellationToken| async move {
///             Ok::<_, CrawlError>(t.payload().len())
///         }))
///         .after(Arc::clone(&tally))
///         .build()?;
///
///     engine.submit("https://example.com/", "https://example.com/".to_string())?;
///     engine.wait_and_shutdown().await;
///     assert_eq!(tally.0.load(Ordering::SeqCst), 1);
///     Ok(())
/// }
/// ```
pub struct Engine<P> {
    cfg: Config,
    queue: Arc<CrawlQueue<P>>,
    signal: Arc<LifecycleSignal>,
    records: Vec<Arc<WorkerRecord>>,
    handles: Mutex<Vec<(usize, JoinHandle<()>)>>,
    runtime_token: CancellationToken,
    monitor: Arc<LivenessMonitor>,
    monitor_task: Mutex<Option<Background>>,
    listener: Mutex<Option<Background>>,
    bus: Bus,
    closed: AtomicBool,
    shutdown: tokio::sync::Mutex<()>,
    finished: AtomicBool,
}

impl<P: Send + Sync + 'static> Engine<P> {
    /// Starts a builder with [`Config::default`].
    pub fn builder<R: Send + 'static>() -> crate::EngineBuilder<P, R> {
        crate::EngineBuilder::new()
    }

    /// Spawns workers and monitor on `runtime` and drives the signal to `Running`.
    pub(crate) fn start<R: Send + 'static>(
        cfg: Config,
        hooks: Hooks<P, R>,
        queue: CrawlQueue<P>,
        subscribers: Vec<Arc<dyn Subscribe>>,
        runtime: &Handle,
    ) -> Result<Self, EngineError> {
        let signal = Arc::new(LifecycleSignal::new());
        signal.initialize_start()?;

        let bus = Bus::new(cfg.bus_capacity_clamped());
        let listener = (!subscribers.is_empty()).then(|| {
            let token = CancellationToken::new();
            let rx = bus.subscribe();
            let _guard = runtime.enter();
            let set = SubscriberSet::new(subscribers, bus.clone());
            let handle = runtime.spawn(Self::subscriber_listener(rx, set, token.clone()));
            Background { token, handle }
        });

        let queue = Arc::new(queue);
        let runtime_token = CancellationToken::new();
        let epoch = Instant::now();
        let records: Vec<Arc<WorkerRecord>> = (0..cfg.workers)
            .map(|id| Arc::new(WorkerRecord::new(id, epoch)))
            .collect();

        let handles = records
            .iter()
            .map(|record| {
                let worker = Worker::new(
                    Arc::clone(record),
                    Arc::clone(&queue),
                    Arc::clone(&signal),
                    hooks.clone(),
                    bus.clone(),
                    runtime_token.clone(),
                    &cfg,
                );
                (record.id(), runtime.spawn(worker.run()))
            })
            .collect();

        let monitor = Arc::new(LivenessMonitor::new(
            records.clone(),
            cfg.stall_threshold,
            bus.clone(),
        ));
        let monitor_task = cfg.monitor_period().map(|period| {
            let token = CancellationToken::new();
            let handle = runtime.spawn(Arc::clone(&monitor).run(period, token.clone()));
            Background { token, handle }
        });

        let engine = Self {
            cfg,
            queue,
            signal,
            records,
            handles: Mutex::new(handles),
            runtime_token,
            monitor,
            monitor_task: Mutex::new(monitor_task),
            listener: Mutex::new(listener),
            bus,
            closed: AtomicBool::new(false),
            shutdown: tokio::sync::Mutex::new(()),
            finished: AtomicBool::new(false),
        };
        engine.signal.initialize_done()?;
        info!(
            workers = engine.cfg.workers,
            queue = if engine.queue.is_internal() { "internal" } else { "external" },
            "engine running"
        );
        Ok(engine)
    }

    /// Forwards bus events to the subscriber set until `token` fires, then flushes it.
    async fn subscriber_listener(
        mut rx: broadcast::Receiver<Event>,
        set: SubscriberSet,
        token: CancellationToken,
    ) {
        loop {
            tokio::select! {
                biased;
                ev = rx.recv() => match ev {
                    Ok(ev) => set.emit(&ev),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "subscriber listener lagged behind the bus");
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = token.cancelled() => break,
            }
        }
        set.shutdown().await;
    }

    /// Queues `key` with the default priority, or bumps an already queued `key` by one.
    pub fn submit(&self, key: impl Into<String>, payload: P) -> Result<bool, EngineError> {
        self.submit_with_priority(key, payload, DEFAULT_PRIORITY)
    }

    /// Queues `key` with priority `delta`, or adds `delta` to an already queued `key`.
    ///
    /// Returns `Ok(false)` for an empty key.
    ///
    /// # Errors
    /// - [`EngineError::Closed`] after [`close`](Self::close) or either shutdown.
    /// - [`EngineError::ExternalQueue`] when tasks come from an external source.
    pub fn submit_with_priority(
        &self,
        key: impl Into<String>,
        payload: P,
        delta: i64,
    ) -> Result<bool, EngineError> {
        if self.is_closed() {
            return Err(EngineError::Closed);
        }
        self.queue.submit(key, payload, delta)
    }

    /// Pauses all workers at their next checkpoint. Pausing twice is a no-op.
    ///
    /// # Errors
    /// [`EngineError::InvalidTransition`] if the engine is not running (or already stopped).
    pub fn pause(&self) -> Result<(), EngineError> {
        if self.signal.pause()? {
            info!("engine paused");
            self.bus.publish(Event::new(EventKind::Paused));
        }
        Ok(())
    }

    /// Resumes paused workers. Resuming a running engine is a no-op.
    ///
    /// # Errors
    /// [`EngineError::InvalidTransition`] if the engine is not running (or already stopped).
    pub fn resume(&self) -> Result<(), EngineError> {
        if self.signal.resume()? {
            info!("engine resumed");
            self.bus.publish(Event::new(EventKind::Resumed));
        }
        Ok(())
    }

    pub fn state(&self) -> SignalState {
        self.signal.state()
    }

    /// True iff the queue holds tasks not yet taken by a worker.
    pub fn has_pending_work(&self) -> bool {
        self.queue.has_pending()
    }

    /// Queued keys with their current priorities, in dequeue order.
    pub fn pending(&self) -> Vec<(String, i64)> {
        self.queue.snapshot()
    }

    /// Stops accepting submissions. Workers keep crawling what is queued.
    pub fn close(&self) {
        self.queue.close_submissions();
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!(pending = self.queue.len(), "engine closed for submissions");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Waits until nothing is queued, without closing the engine.
    ///
    /// Tasks already taken by workers may still be in flight when this returns.
    pub async fn wait_for_completion(&self) {
        self.queue
            .wait_until_drained(self.cfg.drain_interval, &self.runtime_token)
            .await;
    }

    /// Graceful shutdown: every task queued before this call is crawled, then workers exit.
    ///
    /// With an external source, "drained" is what [`MessageSource::has_pending`] reports.
    /// That hint is best-effort: messages a worker is about to pull may still be in the
    /// source when closure is requested, and they are left there.
    ///
    /// [`MessageSource::has_pending`]: crate::MessageSource::has_pending
    pub async fn wait_and_shutdown(&self) {
        self.close();
        let _shutdown = self.shutdown.lock().await;
        info!(pending = self.queue.len(), "graceful shutdown: draining queue");
        self.bus.publish(Event::new(EventKind::DrainRequested));

        self.queue
            .wait_until_drained(self.cfg.drain_interval, &self.runtime_token)
            .await;
        debug!("queue drained; requesting worker closure");
        for record in &self.records {
            record.seek_closure();
        }

        let mut handles = mem::take(&mut *self.handles.lock()).into_iter();
        while let Some((id, mut handle)) = handles.next() {
            let interrupted = tokio::select! {
                res = &mut handle => {
                    Self::reap(id, res);
                    false
                }
                _ = self.runtime_token.cancelled() => true,
            };
            if interrupted {
                warn!(worker = id, "forced shutdown during drain; joining with grace");
                let mut rest = vec![(id, handle)];
                rest.extend(handles);
                self.join_with_grace(rest).await;
                break;
            }
        }
        self.finish().await;
    }

    /// Forced shutdown: queued tasks are discarded and workers are interrupted.
    ///
    /// A crawl already in progress finishes unless its hook honors the cancellation
    /// token; workers still alive after `grace` are aborted.
    pub async fn cancel_and_shutdown(&self) {
        self.close();
        self.signal.stop();
        self.runtime_token.cancel();
        let dropped = self.queue.drain_and_close();
        info!(dropped, "forced shutdown: queue discarded, workers interrupted");
        self.bus
            .publish(Event::new(EventKind::CancelRequested).with_reason(format!("dropped={dropped}")));

        let _shutdown = self.shutdown.lock().await;
        let handles = mem::take(&mut *self.handles.lock());
        self.join_with_grace(handles).await;
        self.finish().await;
    }

    /// Joins workers in rounds of `join_timeout`, interrupting again between rounds,
    /// and aborts whatever is left once `grace` has elapsed.
    async fn join_with_grace(&self, mut pending: Vec<(usize, JoinHandle<()>)>) {
        let deadline = time::Instant::now() + self.cfg.grace;

        while !pending.is_empty() {
            let mut alive = Vec::new();
            for (id, mut handle) in pending {
                let left = deadline.saturating_duration_since(time::Instant::now());
                match time::timeout(self.cfg.join_timeout.min(left), &mut handle).await {
                    Ok(res) => Self::reap(id, res),
                    Err(_) => alive.push((id, handle)),
                }
            }
            if alive.is_empty() {
                return;
            }

            let ids: Vec<usize> = alive.iter().map(|(id, _)| *id).collect();
            if time::Instant::now() >= deadline {
                error!(
                    workers = ?ids,
                    grace_ms = self.cfg.grace.as_millis() as u64,
                    "grace exceeded; aborting workers"
                );
                for (_, handle) in &alive {
                    handle.abort();
                }
                self.bus.publish(
                    Event::new(EventKind::GraceExceeded).with_reason(format!("workers={ids:?}")),
                );
                return;
            }
            warn!(workers = ?ids, "workers still alive; interrupting again");
            self.runtime_token.cancel();
            pending = alive;
        }
    }

    fn reap(id: usize, res: Result<(), tokio::task::JoinError>) {
        if let Err(e) = res {
            if e.is_panic() {
                error!(worker = id, error = %e, "worker panicked");
            }
        }
    }

    /// Common tail of both shutdown protocols.
    async fn finish(&self) {
        if self.finished.swap(true, Ordering::AcqRel) {
            return;
        }
        self.signal.stop();
        let monitor = self.monitor_task.lock().take();
        if let Some(monitor) = monitor {
            monitor.stop().await;
        }
        self.runtime_token.cancel();

        info!("all workers stopped");
        self.bus.publish(Event::new(EventKind::AllStopped));
        let listener = self.listener.lock().take();
        if let Some(listener) = listener {
            listener.stop().await;
        }
    }

    /// Status of every worker.
    pub fn workers(&self) -> Vec<WorkerStatus> {
        let now = Instant::now();
        self.records.iter().map(|r| r.status(now)).collect()
    }

    /// Workers whose last crawl started more than `Config::stall_threshold` ago,
    /// whether or not they are still inside it.
    pub fn stalled_workers(&self) -> Vec<WorkerStatus> {
        self.monitor.stalled(Instant::now())
    }

    /// Receiver for every event published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    pub fn num_workers(&self) -> usize {
        self.records.len()
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }
}

impl<P> Drop for Engine<P> {
    fn drop(&mut self) {
        self.signal.stop();
        self.runtime_token.cancel();
        if let Some(monitor) = self.monitor_task.get_mut().take() {
            monitor.token.cancel();
        }
        if let Some(listener) = self.listener.get_mut().take() {
            listener.token.cancel();
        }
    }
}
