//! Connection lifecycle
//!
//! ```text
//! Idle -> Connecting -> Connected -> Closing -> Closed
//!            |              |          ^
//!            +----> Failed -+----------+
//! ```
//!
//! Every state except `Closed` can begin teardown. The state and the last
//! error live behind one lock shared with the receive thread.

use std::fmt;

use parking_lot::Mutex;
use tracing::debug;

use posesync_core::PoseError;

/// Session connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    Idle,
    Connecting,
    Connected,
    Closing,
    Closed,
    Failed,
}

impl LifecycleState {
    /// Is `self -> next` a legal transition?
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Idle, Connecting)
                | (Idle, Closing)
                | (Connecting, Connected)
                | (Connecting, Failed)
                | (Connecting, Closing)
                | (Connected, Failed)
                | (Connected, Closing)
                | (Failed, Closing)
                | (Closing, Closed)
        )
    }

    /// Teardown has started or finished
    pub fn is_closing_or_closed(self) -> bool {
        matches!(self, LifecycleState::Closing | LifecycleState::Closed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleState::Idle => "idle",
            LifecycleState::Connecting => "connecting",
            LifecycleState::Connected => "connected",
            LifecycleState::Closing => "closing",
            LifecycleState::Closed => "closed",
            LifecycleState::Failed => "failed",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
struct Inner {
    state: LifecycleState,
    last_error: Option<PoseError>,
}

/// Shared lifecycle state machine
#[derive(Debug)]
pub struct Lifecycle {
    inner: Mutex<Inner>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: LifecycleState::Idle,
                last_error: None,
            }),
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.inner.lock().state
    }

    pub fn last_error(&self) -> Option<PoseError> {
        self.inner.lock().last_error.clone()
    }

    /// Move to `next` if legal. Returns whether the transition happened.
    pub fn transition(&self, next: LifecycleState) -> bool {
        let mut inner = self.inner.lock();
        Self::apply(&mut inner, next)
    }

    /// Record `err` and move to `Failed` if the connection was live.
    ///
    /// The error is kept even when teardown has already started.
    pub fn fail(&self, err: PoseError) -> bool {
        let mut inner = self.inner.lock();
        inner.last_error = Some(err);
        Self::apply(&mut inner, LifecycleState::Failed)
    }

    /// Enter `Closing`. Returns false if teardown already began.
    pub fn begin_close(&self) -> bool {
        let mut inner = self.inner.lock();
        Self::apply(&mut inner, LifecycleState::Closing)
    }

    /// Finish teardown
    pub fn finish_close(&self) -> bool {
        self.transition(LifecycleState::Closed)
    }

    fn apply(inner: &mut Inner, next: LifecycleState) -> bool {
        let from = inner.state;
        if !from.can_transition_to(next) {
            return false;
        }
        inner.state = next;
        debug!(from = %from, to = %next, "lifecycle transition");
        true
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
