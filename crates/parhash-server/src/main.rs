#![doc = include_str!("../README.md")]

mod server;

use anyhow::Context;
use clap::Parser;
use server::backend::set::BackendSet;
use server::config::{CliArgs, ServerConfig};
use server::dispatch::{engine::DispatchEngine, limiter::ConcurrencyLimiter};
use server::metrics::OtelRecorder;
use server::run;
use server::telemetry::{init_telemetry, meter};
use std::sync::Arc;
use tokio::signal;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = ServerConfig::try_from(args)?;

    let providers = init_telemetry()?;
    log_startup_info(&config);

    let backends = BackendSet::connect(&config)
        .await
        .context("failed to open backend channels")?;
    let recorder = Arc::new(OtelRecorder::new(&meter()));
    let engine = DispatchEngine::new(
        backends,
        ConcurrencyLimiter::new(config.concurrency),
        recorder,
    )
    .with_request_timeout(config.request_timeout);

    let server = run::start(&config, engine).await?;

    shutdown_signal().await;

    let outcome = server.stop().await;
    if let Err(_e) = &outcome {
        #[cfg(feature = "tracing")]
        tracing::error!("Error during service shutdown: {:?}", _e);
    }

    providers.shutdown();
    outcome
}

fn log_startup_info(_config: &ServerConfig) {
    if cfg!(debug_assertions) {
        #[cfg(feature = "tracing")]
        tracing::info!(
            "Starting parhash gateway on {} with full config: {:#?}",
            _config.listen_addr,
            _config
        );
    } else {
        #[cfg(feature = "tracing")]
        tracing::info!(
            "Starting parhash gateway on {} with {} backend(s), concurrency {}",
            _config.listen_addr,
            _config.backend_addrs.len(),
            _config.concurrency
        );
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    tokio::select! {
        () = ctrl_c => {
            #[cfg(feature = "tracing")]
            tracing::info!("Received Ctrl+C signal");
        },
        () = terminate => {
            #[cfg(feature = "tracing")]
            tracing::info!("Received SIGTERM signal");
        },
    }

    #[cfg(feature = "tracing")]
    tracing::info!("Shutdown signal received, terminating gracefully...");
}
