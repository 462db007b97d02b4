//! Process-wide cap on in-flight backend calls.

use parhash_core::{Error, Result};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

/// A counting gate shared by every `ParallelHash` call in the process.
///
/// Cloning is cheap and every clone draws from the same pool of `capacity`
/// slots, so the number of backend calls in flight, summed over all
/// concurrent client requests, never exceeds the configured capacity. A slot
/// is held by an [`OwnedSemaphorePermit`] and returned when the permit drops,
/// which covers every exit path of the task holding it.
#[derive(Clone, Debug)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
}

impl ConcurrencyLimiter {
    /// Creates a limiter with `capacity` slots.
    ///
    /// `capacity` must be in `1..=Semaphore::MAX_PERMITS`; the server
    /// configuration enforces this.
    pub fn new(capacity: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
        }
    }

    /// Waits for a free slot.
    ///
    /// # Errors
    ///
    /// - [`Error::RequestCancelled`] if `token` is cancelled first. A waiter
    ///   that loses to cancellation never takes a slot.
    /// - [`Error::ServiceShutdown`] if the limiter was closed.
    pub async fn acquire(&self, token: &CancellationToken) -> Result<OwnedSemaphorePermit> {
        tokio::select! {
            biased;
            () = token.cancelled() => Err(Error::RequestCancelled),
            permit = Arc::clone(&self.semaphore).acquire_owned() => {
                permit.map_err(|_| Error::ServiceShutdown)
            }
        }
    }

    /// Stops handing out slots. Pending and future waiters fail with
    /// [`Error::ServiceShutdown`]; slots already held stay valid.
    pub fn close(&self) {
        self.semaphore.close();
    }

    /// Slots not currently held.
    #[cfg(test)]
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn slots_are_returned_on_drop() -> Result<()> {
        let limiter = ConcurrencyLimiter::new(2);
        let token = CancellationToken::new();

        let first = limiter.acquire(&token).await?;
        let second = limiter.clone().acquire(&token).await?;
        assert_eq!(limiter.available(), 0);

        // A third waiter blocks until a slot is released.
        let blocked = timeout(Duration::from_millis(50), limiter.acquire(&token)).await;
        assert!(blocked.is_err());

        drop(first);
        let third = timeout(Duration::from_secs(1), limiter.acquire(&token))
            .await
            .expect("slot was not released")?;
        drop((second, third));
        assert_eq!(limiter.available(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn cancelled_waiter_exits_without_a_slot() -> Result<()> {
        let limiter = ConcurrencyLimiter::new(1);
        let token = CancellationToken::new();
        let _held = limiter.acquire(&token).await?;

        let waiter = {
            let limiter = limiter.clone();
            let token = token.clone();
            tokio::spawn(async move { limiter.acquire(&token).await.map(drop) })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();

        let outcome = waiter.await.expect("waiter panicked");
        assert!(matches!(outcome, Err(Error::RequestCancelled)));
        assert_eq!(limiter.available(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn closed_limiter_refuses_waiters() {
        let limiter = ConcurrencyLimiter::new(1);
        limiter.close();
        let outcome = limiter.acquire(&CancellationToken::new()).await;
        assert!(matches!(outcome, Err(Error::ServiceShutdown)));
    }
}
