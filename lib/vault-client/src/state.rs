use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;

use crate::auth::RenewalHandle;
use crate::watcher::WatcherHandle;

/// Where the renewal supervisor currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorPhase {
    LoggingIn,
    Renewing,
    RenewalExpired,
    RenewalError,
    Stopped,
}

/// State shared by the supervisor, the watcher and the connection owner.
///
/// Critical sections only flip fields; nothing awaits while holding the lock.
pub(crate) struct ConnectionState {
    pub closed: bool,
    pub renewal: Option<RenewalHandle>,
    pub watcher: Option<WatcherHandle>,
    pub phase: SupervisorPhase,
}

pub(crate) struct Shared {
    state: Mutex<ConnectionState>,
    // wakes sleeping tasks once `closed` is set
    shutdown: CancellationToken,
}

impl Shared {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ConnectionState {
                closed: false,
                renewal: None,
                watcher: None,
                phase: SupervisorPhase::LoggingIn,
            }),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn lock(&self) -> MutexGuard<'_, ConnectionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn phase(&self) -> SupervisorPhase {
        self.lock().phase
    }

    pub fn set_phase(&self, phase: SupervisorPhase) {
        self.lock().phase = phase;
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Returns false if the connection was already closed
    pub fn close(&self) -> bool {
        {
            let mut state = self.lock();
            if state.closed {
                return false;
            }
            state.closed = true;
            if let Some(renewal) = state.renewal.take() {
                renewal.stop();
            }
            if let Some(watcher) = state.watcher.take() {
                watcher.stop();
            }
        }
        self.shutdown.cancel();
        true
    }
}
