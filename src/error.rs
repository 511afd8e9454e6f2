//! Error types used by the crawlvisor engine and its hooks.
//!
//! This module defines two main error enums:
//!
//! - [`EngineError`] errors raised synchronously to the caller of an engine operation
//!   (bad configuration, disallowed lifecycle transitions, submitting to a closed engine).
//! - [`CrawlError`] errors raised by individual hook invocations. These never leave the
//!   worker loop: they are logged and routed to the error hook.
//!
//! Both types provide `as_label` for logs/metrics.

use std::time::Duration;
use thiserror::Error;

use crate::core::SignalState;

/// # Errors produced by the engine itself.
///
/// Configuration errors are returned from [`EngineBuilder::build`](crate::EngineBuilder::build),
/// lifecycle violations from [`Engine::pause`](crate::Engine::pause) / [`Engine::resume`](crate::Engine::resume).
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Worker pool size must be at least one.
    #[error("invalid worker count {0}: at least one worker is required")]
    InvalidWorkerCount(usize),

    /// A mandatory hook was not supplied to the builder.
    #[error("missing mandatory hook: {0}")]
    MissingHook(&'static str),

    /// External-source mode was combined with internal-queue-only arguments.
    #[error("conflicting queue configuration: {0}")]
    ConflictingQueue(&'static str),

    /// The engine was built outside of a tokio runtime.
    #[error("no tokio runtime available to spawn workers")]
    NoRuntime,

    /// Lifecycle operation is not allowed in the current state.
    #[error("cannot {op} while engine is {state}")]
    InvalidTransition {
        /// Requested operation.
        op: &'static str,
        /// State observed when the operation was attempted.
        state: SignalState,
    },

    /// The engine no longer accepts submissions.
    #[error("engine has been closed")]
    Closed,

    /// Submissions are not allowed when tasks come from an external source.
    #[error("tasks cannot be submitted to an externally sourced queue")]
    ExternalQueue,
}

impl EngineError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use crawlvisor::EngineError;
    ///
    /// assert_eq!(EngineError::Closed.as_label(), "engine_closed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            EngineError::InvalidWorkerCount(_) => "config_invalid_worker_count",
            EngineError::MissingHook(_) => "config_missing_hook",
            EngineError::ConflictingQueue(_) => "config_conflicting_queue",
            EngineError::NoRuntime => "config_no_runtime",
            EngineError::InvalidTransition { .. } => "lifecycle_invalid_transition",
            EngineError::Closed => "engine_closed",
            EngineError::ExternalQueue => "queue_external",
        }
    }

    /// Returns true for errors raised while building the engine.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidWorkerCount(_)
                | EngineError::MissingHook(_)
                | EngineError::ConflictingQueue(_)
                | EngineError::NoRuntime
        )
    }
}

/// # Errors produced by hook invocations.
///
/// Returned by user hooks ([`BeforeCrawl`](crate::BeforeCrawl), [`Crawl`](crate::Crawl),
/// [`AfterCrawl`](crate::AfterCrawl), [`MessageConverter`](crate::MessageConverter)) or
/// synthesized by the worker (timeouts, panics).
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CrawlError {
    /// Hook reported a failure.
    #[error("crawl failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// Execute hook exceeded the configured timeout.
    #[error("timed out after {timeout:?}")]
    Timeout {
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    /// Hook observed cancellation (forced shutdown) and gave up.
    #[error("crawl cancelled")]
    Canceled,

    /// Hook panicked; the panic was caught by the worker.
    #[error("hook panicked: {info}")]
    Panicked {
        /// Panic payload rendered as text.
        info: String,
    },

    /// External message could not be converted into a task.
    #[error("message conversion failed: {error}")]
    Conversion {
        /// The underlying error message.
        error: String,
    },
}

impl CrawlError {
    /// Shorthand for [`CrawlError::Fail`].
    pub fn fail(error: impl Into<String>) -> Self {
        CrawlError::Fail {
            error: error.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use crawlvisor::CrawlError;
    ///
    /// assert_eq!(CrawlError::fail("404").as_label(), "crawl_failed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            CrawlError::Fail { .. } => "crawl_failed",
            CrawlError::Timeout { .. } => "crawl_timeout",
            CrawlError::Canceled => "crawl_canceled",
            CrawlError::Panicked { .. } => "hook_panicked",
            CrawlError::Conversion { .. } => "conversion_failed",
        }
    }

    /// Indicates whether the error came from cooperative cancellation.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, CrawlError::Canceled)
    }
}
