//! Structured fan-out / join with first-error cancellation.
//!
//! A [`TaskGroup`] spawns one Tokio task per unit of work, gates each task on
//! the shared [`ConcurrencyLimiter`], and joins all of them. The first failure
//! (including an elapsed deadline) cancels the group's token: tasks still
//! waiting for a slot give up without taking one and tasks already talking to
//! a backend drop their request. A failing task cancels the token before it
//! gives its slot back, so no waiter of the same group can slip in between.
//! [`TaskGroup::wait`] returns only after every task has terminated, so no
//! work outlives the call that spawned it.

use super::limiter::ConcurrencyLimiter;
use core::future::Future;
use parhash_core::{Error, Result};
use tokio::{task::JoinSet, time::Instant};
use tokio_util::sync::CancellationToken;

/// A set of spawned tasks that share one limiter, one cancellation token and
/// an optional deadline, and are always joined together.
pub struct TaskGroup<T> {
    tasks: JoinSet<Result<T>>,
    limiter: ConcurrencyLimiter,
    parent: CancellationToken,
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl<T> TaskGroup<T>
where
    T: Send + 'static,
{
    /// Creates an empty group whose token is a child of `parent`: cancelling
    /// the caller cancels the group, while a failure inside the group does not
    /// propagate upward.
    pub fn new(limiter: ConcurrencyLimiter, parent: &CancellationToken) -> Self {
        Self {
            tasks: JoinSet::new(),
            limiter,
            parent: parent.clone(),
            token: parent.child_token(),
            deadline: None,
        }
    }

    /// Fails the group with [`Error::DeadlineExceeded`] if it has not finished
    /// by `deadline`.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Spawns `task` behind a limiter slot.
    ///
    /// The task receives the group token. It is raced against that token, so
    /// it does not need to poll it itself; the token is handed over for work
    /// that wants to stop cooperatively. The slot is released when the task
    /// finishes, fails or is cancelled.
    pub fn spawn<F, Fut>(&mut self, task: F)
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let limiter = self.limiter.clone();
        let token = self.token.clone();
        self.tasks.spawn(async move {
            let _permit = limiter.acquire(&token).await?;
            let work = task(token.clone());
            let outcome = tokio::select! {
                biased;
                () = token.cancelled() => Err(Error::RequestCancelled),
                outcome = work => outcome,
            };
            if outcome.is_err() {
                token.cancel();
            }
            outcome
        });
    }

    /// Joins every task, handing each success to `on_success` as it arrives.
    ///
    /// The first error, whether returned by a task, by `on_success`, or caused
    /// by the deadline, cancels the remaining tasks and becomes the result of
    /// the group. Later errors, typically the [`Error::RequestCancelled`] of
    /// the siblings, are discarded, as are successes that arrive after the
    /// group failed. The exception is a sibling's [`Error::RequestCancelled`]
    /// joined before the failure that caused it: the failure replaces it,
    /// unless the caller's own token was cancelled.
    ///
    /// # Errors
    ///
    /// Returns the first error observed; [`Error::Internal`] if a task
    /// panicked.
    pub async fn wait<S>(mut self, mut on_success: S) -> Result<()>
    where
        S: FnMut(T) -> Result<()>,
    {
        let mut first_error: Option<Error> = None;
        let deadline = self.deadline;
        let expiry = async move {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => core::future::pending::<()>().await,
            }
        };
        tokio::pin!(expiry);
        let mut expired = false;

        loop {
            tokio::select! {
                () = &mut expiry, if !expired => {
                    expired = true;
                    if first_error.is_none() {
                        #[cfg(feature = "tracing")]
                        tracing::debug!(pending = self.tasks.len(), "Fan-out deadline elapsed");
                        self.token.cancel();
                        first_error = Some(Error::DeadlineExceeded);
                    }
                }
                joined = self.tasks.join_next() => {
                    let Some(joined) = joined else { break };
                    let outcome = joined
                        .map_err(|e| Error::Internal {
                            context: format!("fan-out task failed: {e}"),
                        })
                        .and_then(|outcome| outcome);

                    if let Some(current) = &first_error {
                        if let Err(e) = outcome {
                            if self.supersedes(current, &e) {
                                first_error = Some(e);
                            }
                        }
                        continue;
                    }
                    if let Err(e) = outcome.and_then(&mut on_success) {
                        #[cfg(feature = "tracing")]
                        tracing::debug!(pending = self.tasks.len(), "Cancelling fan-out: {e}");
                        self.token.cancel();
                        first_error = Some(e);
                    }
                }
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    /// Whether `later` is the real cause of a failure first reported as
    /// `current`.
    fn supersedes(&self, current: &Error, later: &Error) -> bool {
        matches!(current, Error::RequestCancelled)
            && !later.is_cancellation()
            && !self.parent.is_cancelled()
    }
}
