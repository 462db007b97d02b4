//! Server state machine and in-flight call accounting.
//!
//! The gateway moves through `Created -> Listening -> Draining -> Stopped`,
//! never backwards. Calls are admitted only while `Listening`; each admitted
//! call holds an [`InflightGuard`] so shutdown can wait for the count to reach
//! zero before it cancels whatever is left through the shutdown token.

use core::{fmt, time::Duration};
use parhash_core::{Error, Result};
use portable_atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

/// How often [`Lifecycle::drain`] re-checks the in-flight count.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ServerState {
    Created = 0,
    Listening = 1,
    Draining = 2,
    Stopped = 3,
}

impl ServerState {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Created,
            1 => Self::Listening,
            2 => Self::Draining,
            _ => Self::Stopped,
        }
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Listening => "listening",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
struct Shared {
    state: AtomicU8,
    inflight: AtomicUsize,
    shutdown: CancellationToken,
}

/// Shared handle on the server state. Clones observe the same state.
#[derive(Clone, Debug)]
pub struct Lifecycle {
    shared: Arc<Shared>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: AtomicU8::new(ServerState::Created as u8),
                inflight: AtomicUsize::new(0),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn state(&self) -> ServerState {
        ServerState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    /// Moves to `next` if it is ahead of the current state. Returns `false`
    /// if the state was already at or past `next`.
    pub fn advance(&self, next: ServerState) -> bool {
        let next = next as u8;
        self.shared
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < next).then_some(next)
            })
            .is_ok()
    }

    /// Number of calls admitted and not yet finished.
    pub fn inflight(&self) -> usize {
        self.shared.inflight.load(Ordering::Acquire)
    }

    /// Cancelled once the drain period is over; every call's token descends
    /// from it.
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shared.shutdown
    }

    /// Admits one call.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ServiceShutdown`] unless the server is `Listening`.
    pub fn enter(&self) -> Result<InflightGuard> {
        self.shared.inflight.fetch_add(1, Ordering::AcqRel);
        let guard = InflightGuard {
            shared: Arc::clone(&self.shared),
        };
        // Counted before the check so a concurrent drain cannot miss a call
        // that is about to be admitted.
        if self.state() != ServerState::Listening {
            return Err(Error::ServiceShutdown);
        }
        Ok(guard)
    }

    /// Enters `Draining`, waits up to `grace` for admitted calls to finish,
    /// then cancels the shutdown token.
    ///
    /// Returns `true` if every call finished within `grace`.
    pub async fn drain(&self, grace: Duration) -> bool {
        self.advance(ServerState::Draining);

        #[cfg(feature = "tracing")]
        tracing::info!("Draining in-flight calls ({} active)", self.inflight());

        let drained = timeout(grace, async {
            while self.inflight() > 0 {
                sleep(DRAIN_POLL_INTERVAL).await;
            }
        })
        .await
        .is_ok();

        if drained {
            #[cfg(feature = "tracing")]
            tracing::debug!("All in-flight calls drained");
        } else {
            #[cfg(feature = "tracing")]
            tracing::warn!(
                "Graceful drain timed out ({} calls still active)",
                self.inflight()
            );
        }

        self.shared.shutdown.cancel();
        drained
    }
}

/// Marks one admitted call; dropping it ends the call.
#[derive(Debug)]
pub struct InflightGuard {
    shared: Arc<Shared>,
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.shared.inflight.fetch_sub(1, Ordering::AcqRel);
    }
}
