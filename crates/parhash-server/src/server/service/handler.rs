//! gRPC service implementation for batched hashing.
//!
//! [`ParHashService`] implements the [`ParallelHashService`] service from
//! `parhash.proto`. Each call is counted, admitted through the server
//! [`Lifecycle`], validated, and handed to the [`DispatchEngine`], which fans
//! the buffers out to the backends and returns the hashes in request order.

use super::lifecycle::Lifecycle;
use crate::server::dispatch::engine::DispatchEngine;
use parhash_core::{
    Error,
    proto::parhash::{ParHashReq, ParHashResp, parallel_hash_service_server::ParallelHashService},
};
use tonic::{Request, Response, Status};

/// `ParallelHash` endpoint: one admitted call per request, bounded by
/// `max_buffers` and executed by the shared [`DispatchEngine`].
#[derive(Clone)]
pub struct ParHashService {
    engine: DispatchEngine,
    lifecycle: Lifecycle,
    max_buffers: usize,
}

impl ParHashService {
    pub fn new(engine: DispatchEngine, lifecycle: Lifecycle, max_buffers: usize) -> Self {
        Self {
            engine,
            lifecycle,
            max_buffers,
        }
    }
}

#[tonic::async_trait]
impl ParallelHashService for ParHashService {
    /// Hashes every buffer of the request on the backends.
    ///
    /// The request counter is incremented before anything else, so rejected
    /// and failed calls are counted too. The call's cancellation token
    /// descends from the server shutdown token and is cancelled when this
    /// future is dropped, which is what tonic does when the client goes away.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(buffers = req.get_ref().data.len())))]
    async fn parallel_hash(
        &self,
        req: Request<ParHashReq>,
    ) -> Result<Response<ParHashResp>, Status> {
        self.engine.recorder().record_request();

        let _inflight = self.lifecycle.enter()?;

        let buffers = req.into_inner().data;
        if buffers.len() > self.max_buffers {
            return Err(Error::InvalidRequest {
                reason: format!(
                    "Batch of {} buffers exceeds maximum allowed ({})",
                    buffers.len(),
                    self.max_buffers
                ),
            }
            .into());
        }

        let token = self.lifecycle.shutdown_token().child_token();
        let _cancel_on_drop = token.clone().drop_guard();

        match self.engine.parallel_hash(buffers, &token).await {
            Ok(hashes) => Ok(Response::new(ParHashResp { hashes })),
            Err(e) => {
                #[cfg(feature = "tracing")]
                {
                    if e.is_cancellation() {
                        tracing::debug!("ParallelHash abandoned: {e}");
                    } else {
                        tracing::warn!("ParallelHash failed: {e}");
                    }
                }
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::{
        backend::{client::HashBackend, set::BackendSet},
        dispatch::{
            limiter::ConcurrencyLimiter,
            testing::{InflightGauge, MockBackend, RecordingMetrics, tagged},
        },
        service::lifecycle::ServerState,
    };
    use bytes::Bytes;
    use core::time::Duration;
    use std::sync::Arc;
    use tokio::time::{sleep, timeout};
    use tonic::Code;

    fn service(
        backends: Vec<MockBackend>,
        max_buffers: usize,
    ) -> (ParHashService, Arc<RecordingMetrics>) {
        let set = BackendSet::new(
            backends
                .into_iter()
                .map(|backend| Arc::new(backend) as Arc<dyn HashBackend>)
                .collect(),
        )
        .unwrap();
        let metrics = Arc::new(RecordingMetrics::default());
        let engine = DispatchEngine::new(set, ConcurrencyLimiter::new(4), metrics.clone());
        let lifecycle = Lifecycle::new();
        lifecycle.advance(ServerState::Listening);
        (ParHashService::new(engine, lifecycle, max_buffers), metrics)
    }

    fn request(data: &[&str]) -> Request<ParHashReq> {
        Request::new(ParHashReq {
            data: data.iter().map(|s| Bytes::from(s.to_string())).collect(),
        })
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn hashes_come_back_in_request_order() -> Result<(), Status> {
        let (service, metrics) =
            service(vec![MockBackend::new("b0"), MockBackend::new("b1")], 10);

        let resp = service.parallel_hash(request(&["x", "y", "z"])).await?;
        assert_eq!(
            resp.into_inner().hashes,
            vec![tagged("b0", b"x"), tagged("b1", b"y"), tagged("b0", b"z")]
        );
        assert_eq!(metrics.requests(), 1);
        assert_eq!(metrics.subqueries().len(), 3);
        assert_eq!(service.lifecycle.inflight(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn empty_batch_is_counted() -> Result<(), Status> {
        let (service, metrics) = service(vec![MockBackend::new("b0")], 10);
        let resp = service.parallel_hash(request(&[])).await?;
        assert!(resp.into_inner().hashes.is_empty());
        assert_eq!(metrics.requests(), 1);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn backend_failure_is_counted_and_reported() {
        let (service, metrics) =
            service(vec![MockBackend::new("b0").failing_on(b"bad")], 10);

        let status = service
            .parallel_hash(request(&["ok", "bad"]))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::Internal);
        assert!(status.message().contains("b0"));
        assert!(status.message().contains("buffer 1"));
        assert_eq!(metrics.requests(), 1);
    }

    #[tokio::test]
    async fn oversized_batch_is_rejected_but_counted() {
        let (service, metrics) = service(vec![MockBackend::new("b0")], 2);

        let status = service
            .parallel_hash(request(&["a", "b", "c"]))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::InvalidArgument);
        assert_eq!(metrics.requests(), 1);
        assert!(metrics.subqueries().is_empty());
    }

    #[tokio::test]
    async fn draining_server_refuses_calls() {
        let (service, metrics) = service(vec![MockBackend::new("b0")], 10);
        service.lifecycle.advance(ServerState::Draining);

        let status = service.parallel_hash(request(&["a"])).await.unwrap_err();
        assert_eq!(status.code(), Code::Unavailable);
        assert_eq!(metrics.requests(), 1);
        assert!(metrics.subqueries().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn dropped_call_releases_backends_and_slots() {
        let gauge = Arc::new(InflightGauge::default());
        let backend = MockBackend::new("b0")
            .with_delay(Duration::from_secs(30))
            .with_gauge(Arc::clone(&gauge));
        let (service, metrics) = service(vec![backend], 10);

        // tonic drops the handler future when the client goes away.
        let outcome = timeout(
            Duration::from_millis(50),
            service.parallel_hash(request(&["a", "b", "c", "d", "e", "f"])),
        )
        .await;
        assert!(outcome.is_err());

        let limiter = service.engine.limiter();
        for _ in 0..100 {
            if gauge.current() == 0 && limiter.available() == 4 {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(gauge.current(), 0, "backend calls outlived the request");
        assert_eq!(gauge.peak(), 4);
        assert_eq!(limiter.available(), 4);
        assert_eq!(service.lifecycle.inflight(), 0);
        assert!(!service.lifecycle.shutdown_token().is_cancelled());
        assert!(metrics.subqueries().is_empty());
    }
}
