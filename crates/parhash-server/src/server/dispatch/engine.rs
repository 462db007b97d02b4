//! Fan-out of one `ParallelHash` batch over the backend set.

use super::{
    caller::Subquery, dispatcher::Dispatcher, group::TaskGroup, limiter::ConcurrencyLimiter,
    slots::ResultSlots,
};
use crate::server::{backend::set::BackendSet, metrics::MetricsRecorder};
use bytes::Bytes;
use core::time::Duration;
use parhash_core::Result;
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Fans a batch of buffers out to the backend set and collects the hashes.
///
/// Cloning is cheap: every clone shares the same [`Dispatcher`] cursor and the
/// same [`ConcurrencyLimiter`], which are the only state shared between
/// concurrent calls. Everything else a call needs (its subqueries, task group
/// and result slots) is created by [`DispatchEngine::parallel_hash`] and
/// dropped when it returns.
#[derive(Clone)]
pub struct DispatchEngine {
    backends: BackendSet,
    dispatcher: Arc<Dispatcher>,
    limiter: ConcurrencyLimiter,
    recorder: Arc<dyn MetricsRecorder>,
    request_timeout: Option<Duration>,
}

impl DispatchEngine {
    /// Builds an engine over `backends` with a fresh round-robin cursor. The
    /// `limiter` may be shared with other engines to cap them together.
    pub fn new(
        backends: BackendSet,
        limiter: ConcurrencyLimiter,
        recorder: Arc<dyn MetricsRecorder>,
    ) -> Self {
        let dispatcher = Arc::new(Dispatcher::new(backends.len()));
        Self {
            backends,
            dispatcher,
            limiter,
            recorder,
            request_timeout: None,
        }
    }

    /// Fails calls that take longer than `timeout` with
    /// `Error::DeadlineExceeded`.
    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn recorder(&self) -> &Arc<dyn MetricsRecorder> {
        &self.recorder
    }

    pub fn limiter(&self) -> &ConcurrencyLimiter {
        &self.limiter
    }

    /// Hashes every buffer on some backend and returns the hashes in input
    /// order.
    ///
    /// Backends are assigned while the subqueries are created, one dispatcher
    /// step per buffer in index order, so a call that does not overlap any
    /// other sends buffer `i` to backend `(i + cursor) mod N`. Each subquery
    /// then waits for a limiter slot and calls its backend. The first failure,
    /// the cancellation of `cancel`, or the request deadline abandons the
    /// whole batch; the error is returned once every subquery has terminated
    /// and no partial result is produced.
    ///
    /// # Errors
    ///
    /// - `Error::Backend` for the first backend failure.
    /// - `Error::RequestCancelled` if `cancel` fires.
    /// - `Error::DeadlineExceeded` if the request timeout elapses.
    /// - `Error::ServiceShutdown` if the limiter was closed.
    pub async fn parallel_hash(
        &self,
        buffers: Vec<Bytes>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Bytes>> {
        if buffers.is_empty() {
            return Ok(Vec::new());
        }

        let mut slots = ResultSlots::new(buffers.len());
        let mut group = TaskGroup::new(self.limiter.clone(), cancel);
        if let Some(timeout) = self.request_timeout {
            group = group.with_deadline(Instant::now() + timeout);
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            buffers = buffers.len(),
            cursor = self.dispatcher.cursor(),
            "Fanning out batch"
        );

        for (index, data) in buffers.into_iter().enumerate() {
            let backend = Arc::clone(self.backends.get(self.dispatcher.next()));
            let subquery = Subquery {
                index,
                backend,
                data,
            };
            let recorder = Arc::clone(&self.recorder);
            group.spawn(move |_| subquery.run(recorder));
        }

        group.wait(|(index, hash)| slots.fill(index, hash)).await?;
        slots.into_hashes()
    }
}
