use anyhow::bail;
use clap::Parser;
use core::time::Duration;
use std::collections::HashSet;
use tokio::sync::Semaphore;

/// Runtime configuration for the `parhash-server` binary.
///
/// These settings control where the gateway listens, which backends it fans
/// out to and how much work it keeps in flight. All values are parsed from CLI
/// arguments or environment variables (a `.env` file is honored), with
/// defaults suitable for a single-host deployment.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "parhash-server",
    version,
    about = "A gRPC gateway that hashes batches of buffers on a set of backends"
)]
pub struct CliArgs {
    /// Address the gateway listens on.
    ///
    /// Port 0 binds an ephemeral port; the bound address is logged at startup.
    ///
    /// Environment variable: `LISTEN_ADDR`
    #[arg(long, env = "LISTEN_ADDR", default_value_t = String::from("127.0.0.1:50051"))]
    pub listen_addr: String,

    /// Backend `HashService` addresses, in round-robin order.
    ///
    /// Repeat the flag or separate addresses with commas. Addresses without a
    /// scheme are dialled over plain HTTP/2.
    ///
    /// Environment variable: `BACKEND_ADDRS`
    #[arg(
        long = "backend",
        env = "BACKEND_ADDRS",
        value_delimiter = ',',
        required = true
    )]
    pub backend_addrs: Vec<String>,

    /// Maximum number of backend calls in flight, summed over every client
    /// request.
    ///
    /// Environment variable: `CONCURRENCY`
    #[arg(long, env = "CONCURRENCY", default_value_t = 64)]
    pub concurrency: usize,

    /// Maximum number of buffers accepted in a single `ParallelHash` call.
    ///
    /// Environment variable: `MAX_BUFFERS`
    #[arg(long, env = "MAX_BUFFERS", default_value_t = 1_000_000)]
    pub max_buffers: usize,

    /// Server-side deadline for one `ParallelHash` call, in milliseconds.
    ///
    /// Unset means calls are bounded only by the client's own deadline.
    ///
    /// Environment variable: `REQUEST_TIMEOUT_MS`
    #[arg(long, env = "REQUEST_TIMEOUT_MS")]
    pub request_timeout_ms: Option<u64>,

    /// Timeout for establishing each backend channel, in milliseconds.
    ///
    /// Environment variable: `CONNECT_TIMEOUT_MS`
    #[arg(long, env = "CONNECT_TIMEOUT_MS", default_value_t = 5_000)]
    pub connect_timeout_ms: u64,

    /// Create backend channels without dialling; each connects on first use.
    ///
    /// Environment variable: `LAZY_CONNECT`
    #[arg(long, env = "LAZY_CONNECT", default_value_t = false)]
    pub lazy_connect: bool,

    /// Seconds to wait for in-flight calls when shutting down.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT`
    #[arg(long, env = "SHUTDOWN_TIMEOUT", default_value_t = 5)]
    pub shutdown_timeout: u64,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub backend_addrs: Vec<String>,
    pub concurrency: usize,
    pub max_buffers: usize,
    pub request_timeout: Option<Duration>,
    pub connect_timeout: Duration,
    pub lazy_connect: bool,
    pub shutdown_timeout: Duration,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        let backend_addrs: Vec<String> = args
            .backend_addrs
            .iter()
            .map(|address| address.trim().to_string())
            .collect();

        if backend_addrs.is_empty() {
            bail!("BACKEND_ADDRS must name at least one backend");
        }
        if backend_addrs.iter().any(String::is_empty) {
            bail!("BACKEND_ADDRS contains an empty address");
        }
        let mut seen = HashSet::with_capacity(backend_addrs.len());
        for address in &backend_addrs {
            if !seen.insert(address.as_str()) {
                bail!("BACKEND_ADDRS lists {address} more than once");
            }
        }

        if args.concurrency == 0 {
            bail!("CONCURRENCY must be greater than 0");
        }
        if args.concurrency > Semaphore::MAX_PERMITS {
            bail!(
                "CONCURRENCY ({}) exceeds the limiter capacity (max = {})",
                args.concurrency,
                Semaphore::MAX_PERMITS
            );
        }

        if args.max_buffers == 0 {
            bail!("MAX_BUFFERS must be greater than 0");
        }
        if args.request_timeout_ms == Some(0) {
            bail!("REQUEST_TIMEOUT_MS must be greater than 0 when set");
        }
        if args.connect_timeout_ms == 0 {
            bail!("CONNECT_TIMEOUT_MS must be greater than 0");
        }
        if args.shutdown_timeout == 0 {
            bail!("SHUTDOWN_TIMEOUT must be greater than 0");
        }

        Ok(Self {
            listen_addr: args.listen_addr,
            backend_addrs,
            concurrency: args.concurrency,
            max_buffers: args.max_buffers,
            request_timeout: args.request_timeout_ms.map(Duration::from_millis),
            connect_timeout: Duration::from_millis(args.connect_timeout_ms),
            lazy_connect: args.lazy_connect,
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout),
        })
    }
}
