//! Listener bootstrap and the running-server handle.
//!
//! [`start`] binds the gateway address, wires the `ParallelHashService`
//! together with the health and reflection services, and serves them on a
//! background task. The returned [`RunningServer`] reports the bound address and the
//! lifecycle state, and [`RunningServer::stop`] performs the drain sequence.

use super::{
    config::ServerConfig,
    dispatch::{engine::DispatchEngine, limiter::ConcurrencyLimiter},
    service::{
        handler::ParHashService,
        lifecycle::{Lifecycle, ServerState},
    },
};
use anyhow::Context;
use core::time::Duration;
use parhash_core::proto::{
    FILE_DESCRIPTOR_SET, parhash::parallel_hash_service_server::ParallelHashServiceServer,
};
use std::net::SocketAddr;
use tokio::{net::TcpListener, task::JoinHandle};
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::{codec::CompressionEncoding, transport::Server};
use tonic_health::server::HealthReporter;
use tonic_reflection::server::Builder;
use tonic_web::GrpcWebLayer;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};

/// Handle on a gateway serving in the background.
pub struct RunningServer {
    listen_addr: SocketAddr,
    lifecycle: Lifecycle,
    limiter: ConcurrencyLimiter,
    health_reporter: HealthReporter,
    stop: CancellationToken,
    shutdown_timeout: Duration,
    handle: JoinHandle<Result<(), tonic::transport::Error>>,
}

/// Binds `config.listen_addr` and starts serving `engine`.
///
/// # Errors
///
/// Fails if the address cannot be bound or the reflection service cannot be
/// built. Both happen before any call is accepted.
pub async fn start(
    config: &ServerConfig,
    engine: DispatchEngine,
) -> anyhow::Result<RunningServer> {
    let listener = TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    let listen_addr = listener
        .local_addr()
        .context("failed to read the bound address")?;

    let lifecycle = Lifecycle::new();
    let limiter = engine.limiter().clone();
    let service = ParHashService::new(engine, lifecycle.clone(), config.max_buffers);

    let (health_reporter, health_service) = tonic_health::server::health_reporter();
    health_reporter
        .set_serving::<ParallelHashServiceServer<ParHashService>>()
        .await;

    let reflection = Builder::configure()
        .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
        .build_v1()?;

    let stop = CancellationToken::new();
    let serve = Server::builder()
        .accept_http1(true)
        .http2_adaptive_window(Some(true))
        .layer(
            ServiceBuilder::new()
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                )
                .layer(GrpcWebLayer::new()),
        )
        .add_service(health_service)
        .add_service(reflection)
        .add_service(build_parhash_service(service))
        .serve_with_incoming_shutdown(
            TcpListenerStream::new(listener),
            stop.clone().cancelled_owned(),
        );
    let handle = tokio::spawn(serve);

    lifecycle.advance(ServerState::Listening);

    #[cfg(feature = "tracing")]
    tracing::info!("Listening on {listen_addr}");

    Ok(RunningServer {
        listen_addr,
        lifecycle,
        limiter,
        health_reporter,
        stop,
        shutdown_timeout: config.shutdown_timeout,
        handle,
    })
}

fn build_parhash_service(service: ParHashService) -> ParallelHashServiceServer<ParHashService> {
    ParallelHashServiceServer::new(service)
        .send_compressed(CompressionEncoding::Zstd)
        .send_compressed(CompressionEncoding::Gzip)
        .send_compressed(CompressionEncoding::Deflate)
        .accept_compressed(CompressionEncoding::Zstd)
        .accept_compressed(CompressionEncoding::Gzip)
        .accept_compressed(CompressionEncoding::Deflate)
}

impl RunningServer {
    /// Address actually bound, with the ephemeral port resolved.
    pub const fn listen_addr(&self) -> SocketAddr {
        self.listen_addr
    }

    pub fn state(&self) -> ServerState {
        self.lifecycle.state()
    }

    /// Drains and stops the server.
    ///
    /// 1. Health reports not-serving.
    /// 2. New calls are refused with `UNAVAILABLE`; in-flight calls get up to
    ///    the shutdown timeout to finish, then are cancelled.
    /// 3. The concurrency limiter is closed.
    /// 4. The transport stops accepting connections and closes the open ones.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the server task failed.
    pub async fn stop(self) -> anyhow::Result<()> {
        #[cfg(feature = "tracing")]
        tracing::info!("Refusing new requests");
        self.health_reporter
            .set_not_serving::<ParallelHashServiceServer<ParHashService>>()
            .await;

        self.lifecycle.drain(self.shutdown_timeout).await;
        self.limiter.close();

        #[cfg(feature = "tracing")]
        tracing::debug!("Closing the transport");
        self.stop.cancel();
        let outcome = match tokio::time::timeout(self.shutdown_timeout, self.handle).await {
            Ok(joined) => joined
                .context("server task panicked")?
                .context("transport error"),
            Err(_) => {
                #[cfg(feature = "tracing")]
                tracing::warn!("Transport did not close within the shutdown timeout");
                Ok(())
            }
        };

        self.lifecycle.advance(ServerState::Stopped);

        #[cfg(feature = "tracing")]
        tracing::info!("Service shut down");
        outcome
    }
}
