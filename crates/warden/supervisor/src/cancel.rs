//! Cooperative cancellation
//!
//! Long operations receive a [`CancelToken`] and poll it at safe points,
//! typically between records. Nothing is ever interrupted forcibly.

use crate::error::TaskError;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Why a token was cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelCause {
    /// Explicit request from an operator
    User,
    /// The supervisor is shutting down
    Shutdown,
}

impl fmt::Display for CancelCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelCause::User => write!(f, "user"),
            CancelCause::Shutdown => write!(f, "shutdown"),
        }
    }
}

const LIVE: u8 = 0;
const USER: u8 = 1;
const SHUTDOWN: u8 = 2;

#[derive(Debug, Default)]
struct Shared {
    state: AtomicU8,
    notify: Notify,
}

/// Shared cancellation flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    shared: Arc<Shared>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. The first cause wins; later calls are no-ops.
    pub fn cancel(&self, cause: CancelCause) -> bool {
        let code = match cause {
            CancelCause::User => USER,
            CancelCause::Shutdown => SHUTDOWN,
        };
        let first = self
            .shared
            .state
            .compare_exchange(LIVE, code, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if first {
            self.shared.notify.notify_waiters();
        }
        first
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.state.load(Ordering::SeqCst) != LIVE
    }

    pub fn cause(&self) -> Option<CancelCause> {
        match self.shared.state.load(Ordering::SeqCst) {
            USER => Some(CancelCause::User),
            SHUTDOWN => Some(CancelCause::Shutdown),
            _ => None,
        }
    }

    /// Checkpoint for operations returning `TaskError`.
    pub fn check(&self) -> Result<(), TaskError> {
        if self.is_cancelled() {
            Err(TaskError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolves once the token is cancelled.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.shared.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}
