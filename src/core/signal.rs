//! # Lifecycle signal: the engine-wide Running/Paused/Stopped state machine.
//!
//! Every worker and the queue read the signal on each iteration; the engine is the only writer.
//!
//! ## Transitions
//! ```text
//! Uninitialized ──initialize_start──► Initializing ──initialize_done──► Running
//!                                                                      │    ▲
//!                                                                pause │    │ resume
//!                                                                      ▼    │
//!                                                                      Paused
//! Running | Paused ──stop──► Stopped (terminal, stop is idempotent from any state)
//! ```
//!
//! ## Rules
//! - Transitions are serialized by one mutex; the guard covers check + store + notify.
//! - Reads (`state`, `is_paused`, `is_stopping`, ...) are lock-free atomic loads.
//! - `pause` on Paused and `resume` on Running are no-ops, not errors.
//! - Nothing leaves `Stopped`.
//! - Every effective transition is broadcast on a `watch` channel so waiters wake
//!   without polling.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::error::EngineError;

/// Engine lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SignalState {
    /// Created, workers not spawned yet.
    Uninitialized = 0,
    /// Workers are being spawned.
    Initializing = 1,
    /// Workers take and execute tasks.
    Running = 2,
    /// Workers hold at their next checkpoint until resumed.
    Paused = 3,
    /// Terminal: workers exit at their next checkpoint.
    Stopped = 4,
}

impl SignalState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => SignalState::Uninitialized,
            1 => SignalState::Initializing,
            2 => SignalState::Running,
            3 => SignalState::Paused,
            _ => SignalState::Stopped,
        }
    }

    /// Returns the lowercase state name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalState::Uninitialized => "uninitialized",
            SignalState::Initializing => "initializing",
            SignalState::Running => "running",
            SignalState::Paused => "paused",
            SignalState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for SignalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Engine-wide lifecycle state machine.
pub struct LifecycleSignal {
    state: AtomicU8,
    transition: Mutex<()>,
    tx: watch::Sender<SignalState>,
}

impl Default for LifecycleSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleSignal {
    /// Creates a signal in [`SignalState::Uninitialized`].
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SignalState::Uninitialized);
        Self {
            state: AtomicU8::new(SignalState::Uninitialized as u8),
            transition: Mutex::new(()),
            tx,
        }
    }

    /// Current state snapshot.
    #[inline]
    pub fn state(&self) -> SignalState {
        SignalState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Uninitialized → Initializing.
    pub fn initialize_start(&self) -> Result<(), EngineError> {
        let _guard = self.transition.lock();
        match self.state() {
            SignalState::Uninitialized => {
                self.store(SignalState::Initializing);
                Ok(())
            }
            state => Err(EngineError::InvalidTransition {
                op: "initialize",
                state,
            }),
        }
    }

    /// Initializing → Running.
    pub fn initialize_done(&self) -> Result<(), EngineError> {
        let _guard = self.transition.lock();
        match self.state() {
            SignalState::Initializing => {
                self.store(SignalState::Running);
                Ok(())
            }
            state => Err(EngineError::InvalidTransition {
                op: "finish initialization",
                state,
            }),
        }
    }

    /// Running → Paused. Returns `true` if the state changed.
    pub fn pause(&self) -> Result<bool, EngineError> {
        let _guard = self.transition.lock();
        match self.state() {
            SignalState::Running => {
                self.store(SignalState::Paused);
                Ok(true)
            }
            SignalState::Paused => Ok(false),
            state => Err(EngineError::InvalidTransition { op: "pause", state }),
        }
    }

    /// Paused → Running. Returns `true` if the state changed.
    pub fn resume(&self) -> Result<bool, EngineError> {
        let _guard = self.transition.lock();
        match self.state() {
            SignalState::Paused => {
                self.store(SignalState::Running);
                Ok(true)
            }
            SignalState::Running => Ok(false),
            state => Err(EngineError::InvalidTransition {
                op: "resume",
                state,
            }),
        }
    }

    /// Any → Stopped. Returns `true` if the state changed.
    pub fn stop(&self) -> bool {
        let _guard = self.transition.lock();
        if self.state() == SignalState::Stopped {
            return false;
        }
        self.store(SignalState::Stopped);
        true
    }

    #[inline]
    pub fn is_paused(&self) -> bool {
        self.state() == SignalState::Paused
    }

    #[inline]
    pub fn is_stopping(&self) -> bool {
        self.state() == SignalState::Stopped
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.state() == SignalState::Running
    }

    /// True once initialization has completed (Running, Paused or Stopped).
    #[inline]
    pub fn is_initialized(&self) -> bool {
        !matches!(
            self.state(),
            SignalState::Uninitialized | SignalState::Initializing
        )
    }

    /// Receiver notified on every effective transition.
    pub fn subscribe(&self) -> watch::Receiver<SignalState> {
        self.tx.subscribe()
    }

    /// Must be called with the transition guard held.
    fn store(&self, next: SignalState) {
        self.state.store(next as u8, Ordering::Release);
        self.tx.send_replace(next);
    }
}
