//! # Crawl queue: priority ordering with key dedupe, or an external source.
//!
//! [`CrawlQueue`] is shared by the engine (submitters) and every worker (takers).
//!
//! ## Internal backend
//! ```text
//!             submit(key, payload, delta)
//!                       │
//!      ┌────────────────┴────────────────┐   one mutex
//!      ▼                                 ▼
//!  slots: HashMap<key, Slot>      order: BTreeMap<OrderKey, key>
//!  (dedupe index)                 (priority desc, created_at asc, seq asc)
//!      ▲                                 │
//!      └──────── try_take() ◄── pop_first┘
//! ```
//!
//! ## Rules
//! - At most one queued task per key; resubmission **adds** `delta` to its priority and
//!   re-keys it in `order` inside the same critical section (no lazy re-heapify).
//! - `slots` and `order` always hold the same key set.
//! - Ties on priority go to the earlier `created_at`; `seq` only makes keys unique and
//!   agrees with `created_at` because both are taken under the lock.
//! - A taken key is forgotten: submitting it again creates a brand-new task.
//! - `try_take` never blocks; idle workers wait on [`CrawlQueue::notified`] with a backoff.
//!
//! ## External backend
//! Tasks are pulled from a [`MessageSource`] and converted by a [`MessageConverter`].
//! `submit` fails with [`EngineError::ExternalQueue`]; `take` blocks until a message
//! arrives or the token is cancelled.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{Notify, futures::Notified};
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::error::{CrawlError, EngineError};
use crate::tasks::{MessageConverter, MessageSource, Task};

/// Dequeue order: greater priority first, then earlier creation, then earlier submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct OrderKey {
    priority: Reverse<i64>,
    created_at: Instant,
    seq: u64,
}

struct Slot<P> {
    task: Task<P>,
    seq: u64,
}

impl<P> Slot<P> {
    fn order_key(&self) -> OrderKey {
        OrderKey {
            priority: Reverse(self.task.priority()),
            created_at: self.task.created_at(),
            seq: self.seq,
        }
    }
}

struct Index<P> {
    slots: HashMap<String, Slot<P>>,
    order: BTreeMap<OrderKey, String>,
    next_seq: u64,
}

impl<P> Index<P> {
    fn new() -> Self {
        Self {
            slots: HashMap::new(),
            order: BTreeMap::new(),
            next_seq: 0,
        }
    }

    fn submit(&mut self, key: String, payload: P, delta: i64) {
        if let Some(slot) = self.slots.get_mut(&key) {
            let old = slot.order_key();
            slot.task.add_priority(delta);
            let new = slot.order_key();
            if old != new {
                self.order.remove(&old);
                self.order.insert(new, key);
            }
            return;
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        let slot = Slot {
            task: Task::with_priority(key.clone(), payload, delta),
            seq,
        };
        self.order.insert(slot.order_key(), key.clone());
        self.slots.insert(key, slot);
    }

    fn take(&mut self) -> Option<Task<P>> {
        let (_, key) = self.order.pop_first()?;
        self.slots.remove(&key).map(|slot| slot.task)
    }

    fn clear(&mut self) -> usize {
        let dropped = self.slots.len();
        self.slots.clear();
        self.order.clear();
        dropped
    }
}

/// Outcome of one pull from an external source.
enum Pulled<P> {
    Task(Task<P>),
    Empty,
    Failed(CrawlError),
    Exhausted,
}

#[async_trait]
trait Pull<P>: Send + Sync {
    async fn pull(&self) -> Pulled<P>;
    fn has_pending(&self) -> bool;
}

struct External<S, C> {
    source: S,
    converter: C,
}

#[async_trait]
impl<P, S, C> Pull<P> for External<S, C>
where
    P: Send + 'static,
    S: MessageSource,
    C: MessageConverter<S::Message, P>,
{
    async fn pull(&self) -> Pulled<P> {
        match self.source.recv().await {
            None => Pulled::Exhausted,
            Some(msg) => match self.converter.convert(msg) {
                Ok(Some(task)) => Pulled::Task(task),
                Ok(None) => Pulled::Empty,
                Err(e) => Pulled::Failed(e),
            },
        }
    }

    fn has_pending(&self) -> bool {
        self.source.has_pending()
    }
}

enum Backend<P> {
    Internal(Mutex<Index<P>>),
    External(Box<dyn Pull<P>>),
}

/// Thread-safe task queue shared by submitters and workers.
pub struct CrawlQueue<P> {
    backend: Backend<P>,
    sealed: AtomicBool,
    closed: AtomicBool,
    work: Notify,
    drained: Notify,
}

impl<P: Send + 'static> CrawlQueue<P> {
    /// Creates an internally backed (dedupe + priority) queue.
    pub fn internal() -> Self {
        Self::with_backend(Backend::Internal(Mutex::new(Index::new())))
    }

    /// Creates a queue that pulls from `source` and converts with `converter`.
    pub fn external<S, C>(source: S, converter: C) -> Self
    where
        S: MessageSource,
        C: MessageConverter<S::Message, P>,
    {
        Self::with_backend(Backend::External(Box::new(External { source, converter })))
    }

    fn with_backend(backend: Backend<P>) -> Self {
        Self {
            backend,
            sealed: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            work: Notify::new(),
            drained: Notify::new(),
        }
    }

    /// True for the internal (dedupe + priority) backend.
    pub fn is_internal(&self) -> bool {
        matches!(self.backend, Backend::Internal(_))
    }

    /// Queues `key` or adds `delta` to the priority of the already queued task.
    ///
    /// Returns `Ok(false)` for an empty key. The payload of an already queued key is kept
    /// and the new one is dropped.
    pub fn submit(
        &self,
        key: impl Into<String>,
        payload: P,
        delta: i64,
    ) -> Result<bool, EngineError> {
        let Backend::Internal(index) = &self.backend else {
            return Err(EngineError::ExternalQueue);
        };
        let key = key.into();
        if key.is_empty() {
            return Ok(false);
        }
        {
            let mut index = index.lock();
            if self.sealed.load(Ordering::Acquire) || self.closed.load(Ordering::Acquire) {
                return Err(EngineError::Closed);
            }
            index.submit(key, payload, delta);
        }
        self.work.notify_one();
        Ok(true)
    }

    /// Removes and returns the highest-priority task, if any. Never blocks.
    ///
    /// Always `None` for the external backend and after [`drain_and_close`](Self::drain_and_close).
    pub fn try_take(&self) -> Option<Task<P>> {
        let Backend::Internal(index) = &self.backend else {
            return None;
        };
        let (task, now_empty) = {
            let mut index = index.lock();
            let task = index.take();
            (task, index.slots.is_empty())
        };
        if now_empty {
            self.drained.notify_waiters();
        }
        task
    }

    /// Takes the next task.
    ///
    /// Internal backend: same as [`try_take`](Self::try_take).
    /// External backend: waits for a message until `token` is cancelled. A conversion
    /// failure is returned as `Err` so the caller can log it; it is not fatal.
    pub async fn take(&self, token: &CancellationToken) -> Result<Option<Task<P>>, CrawlError> {
        let src = match &self.backend {
            Backend::Internal(_) => return Ok(self.try_take()),
            Backend::External(src) => src,
        };
        if self.closed.load(Ordering::Acquire) {
            return Ok(None);
        }
        tokio::select! {
            biased;
            _ = token.cancelled() => Ok(None),
            pulled = src.pull() => match pulled {
                Pulled::Task(task) => Ok(Some(task)),
                Pulled::Empty | Pulled::Exhausted => Ok(None),
                Pulled::Failed(e) => Err(e),
            },
        }
    }

    /// True iff tasks are waiting to be taken.
    pub fn has_pending(&self) -> bool {
        match &self.backend {
            Backend::Internal(index) => !index.lock().slots.is_empty(),
            Backend::External(src) => src.has_pending(),
        }
    }

    /// Number of queued tasks (always `0` for the external backend).
    pub fn len(&self) -> usize {
        match &self.backend {
            Backend::Internal(index) => index.lock().slots.len(),
            Backend::External(_) => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queued keys with their current priorities, in dequeue order.
    pub fn snapshot(&self) -> Vec<(String, i64)> {
        let Backend::Internal(index) = &self.backend else {
            return Vec::new();
        };
        let index = index.lock();
        index
            .order
            .iter()
            .map(|(ord, key)| (key.clone(), ord.priority.0))
            .collect()
    }

    /// Refuses further submissions while keeping queued tasks takeable.
    ///
    /// The flag flips under the index lock, so a submission either lands before this
    /// returns or fails with [`EngineError::Closed`].
    pub fn close_submissions(&self) {
        match &self.backend {
            Backend::Internal(index) => {
                let _index = index.lock();
                self.sealed.store(true, Ordering::Release);
            }
            Backend::External(_) => self.sealed.store(true, Ordering::Release),
        }
    }

    /// Drops every queued task and refuses further submissions. Returns the number dropped.
    pub fn drain_and_close(&self) -> usize {
        self.closed.store(true, Ordering::Release);
        let dropped = match &self.backend {
            Backend::Internal(index) => index.lock().clear(),
            Backend::External(_) => 0,
        };
        self.drained.notify_waiters();
        self.work.notify_waiters();
        dropped
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Future resolved when a submission lands (one waiter per submission).
    pub(crate) fn notified(&self) -> Notified<'_> {
        self.work.notified()
    }

    /// Waits until nothing is pending, re-checking at least every `interval`.
    ///
    /// Returns `false` if `token` was cancelled first.
    pub(crate) async fn wait_until_drained(
        &self,
        interval: Duration,
        token: &CancellationToken,
    ) -> bool {
        loop {
            let notified = self.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if !self.has_pending() {
                return true;
            }
            tokio::select! {
                _ = &mut notified => {}
                _ = time::sleep(interval) => {}
                _ = token.cancelled() => return false,
            }
        }
    }
}
