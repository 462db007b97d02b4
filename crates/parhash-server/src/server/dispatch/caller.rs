//! Per-buffer unit of work.

use crate::server::{backend::client::HashBackend, metrics::MetricsRecorder};
use bytes::Bytes;
use parhash_core::{Error, Result};
use std::{sync::Arc, time::Instant};

/// One buffer of a batch, bound to the backend the dispatcher picked for it.
///
/// A subquery is owned by the call that created it and never outlives it.
pub struct Subquery {
    /// Position of the buffer in the request and of its hash in the response.
    pub index: usize,
    pub backend: Arc<dyn HashBackend>,
    pub data: Bytes,
}

impl Subquery {
    /// Sends the buffer to its backend and returns `(index, hash)`.
    ///
    /// Runs after the caller already holds a limiter slot, so the latency
    /// sample covers the backend round trip only. Failed or abandoned calls
    /// record nothing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Backend`] carrying the backend address and the buffer
    /// index if the backend call fails.
    pub async fn run(self, recorder: Arc<dyn MetricsRecorder>) -> Result<(usize, Bytes)> {
        let Self {
            index,
            backend,
            data,
        } = self;

        let start = Instant::now();
        let hash = backend
            .hash(data)
            .await
            .map_err(|status| Error::backend(backend.address(), index, &status))?;
        let elapsed = start.elapsed();

        recorder.record_subquery(backend.address(), elapsed);

        #[cfg(feature = "tracing")]
        tracing::trace!(
            index,
            backend = backend.address(),
            elapsed_us = elapsed.as_micros() as u64,
            "Buffer hashed"
        );

        Ok((index, hash))
    }
}
