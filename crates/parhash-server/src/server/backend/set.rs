use super::client::{GrpcBackend, HashBackend};
use crate::server::config::ServerConfig;
use core::num::NonZeroUsize;
use futures::future::try_join_all;
use parhash_core::{Error, Result};
use std::sync::Arc;

/// The ordered, fixed-at-startup list of backends.
///
/// Position in the set is the backend index handed out by the
/// [`Dispatcher`](crate::server::dispatch::dispatcher::Dispatcher); the order
/// never changes for the lifetime of the server.
#[derive(Clone)]
pub struct BackendSet {
    backends: Arc<[Arc<dyn HashBackend>]>,
}

impl BackendSet {
    /// Wraps already-constructed backends, keeping their order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoBackends`] if `backends` is empty.
    pub fn new(backends: Vec<Arc<dyn HashBackend>>) -> Result<Self> {
        if backends.is_empty() {
            return Err(Error::NoBackends);
        }
        Ok(Self {
            backends: backends.into(),
        })
    }

    /// Opens one long-lived channel per configured backend address.
    ///
    /// Eager connections are established concurrently; the resulting set still
    /// follows the configured order. With `lazy_connect` the channels are
    /// created without dialling and connect on first use.
    ///
    /// # Errors
    ///
    /// Returns the first [`Error::Connect`] encountered, naming the backend.
    pub async fn connect(config: &ServerConfig) -> Result<Self> {
        let backends: Vec<GrpcBackend> = if config.lazy_connect {
            config
                .backend_addrs
                .iter()
                .map(|address| GrpcBackend::connect_lazy(address, config.connect_timeout))
                .collect::<Result<_>>()?
        } else {
            try_join_all(
                config
                    .backend_addrs
                    .iter()
                    .map(|address| GrpcBackend::connect(address, config.connect_timeout)),
            )
            .await?
        };

        #[cfg(feature = "tracing")]
        tracing::info!(
            "Prepared {} backend channel(s) ({})",
            backends.len(),
            if config.lazy_connect { "lazy" } else { "connected" }
        );

        Self::new(
            backends
                .into_iter()
                .map(|backend| Arc::new(backend) as Arc<dyn HashBackend>)
                .collect(),
        )
    }

    /// Number of backends, never zero.
    pub fn len(&self) -> NonZeroUsize {
        // `new` rejects empty sets.
        NonZeroUsize::new(self.backends.len()).unwrap_or(NonZeroUsize::MIN)
    }

    /// Backend at round-robin position `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not below [`BackendSet::len`]; dispatcher indices
    /// always are.
    pub fn get(&self, index: usize) -> &Arc<dyn HashBackend> {
        &self.backends[index]
    }
}
