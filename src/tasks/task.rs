//! # Crawl task value type.
//!
//! A [`Task`] is one unit of crawl work: a string key (its identity), a priority counter,
//! the instant it was created and an opaque payload the engine never looks into.
//!
//! ## Rules
//! - Two tasks are equal iff their keys are equal (priority/timestamp/payload are ignored).
//! - Keys are case-sensitive and never normalized.
//! - Priority only changes while the task is queued (resubmission of the same key adds to it).

use std::fmt;
use std::hash::{Hash, Hasher};
use std::time::Instant;

/// Priority given to a task submitted without an explicit one.
pub const DEFAULT_PRIORITY: i64 = 1;

/// Unit of crawl work carried through the queue and handed to hooks.
pub struct Task<P> {
    key: String,
    priority: i64,
    created_at: Instant,
    payload: P,
}

impl<P> Task<P> {
    /// Creates a task with [`DEFAULT_PRIORITY`].
    pub fn new(key: impl Into<String>, payload: P) -> Self {
        Self::with_priority(key, payload, DEFAULT_PRIORITY)
    }

    /// Creates a task with the given starting priority.
    pub fn with_priority(key: impl Into<String>, payload: P, priority: i64) -> Self {
        Self {
            key: key.into(),
            priority,
            created_at: Instant::now(),
            payload,
        }
    }

    /// Identity of the task (for URLs, the URL itself).
    #[inline]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Accumulated priority at the time the task was dequeued.
    #[inline]
    pub fn priority(&self) -> i64 {
        self.priority
    }

    /// Monotonic creation instant, used only to break priority ties.
    #[inline]
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    #[inline]
    pub fn payload(&self) -> &P {
        &self.payload
    }

    pub fn into_payload(self) -> P {
        self.payload
    }

    pub(crate) fn add_priority(&mut self, delta: i64) {
        self.priority = self.priority.saturating_add(delta);
    }
}

impl<P> PartialEq for Task<P> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl<P> Eq for Task<P> {}

impl<P> Hash for Task<P> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl<P> fmt::Debug for Task<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("key", &self.key)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

impl<P> fmt::Display for Task<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}
