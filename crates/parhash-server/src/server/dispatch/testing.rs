//! In-process doubles for the backend and metrics seams.

use crate::server::{backend::client::HashBackend, metrics::MetricsRecorder};
use bytes::Bytes;
use core::time::Duration;
use parking_lot::Mutex;
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};
use tonic::Status;

/// The "hash" every mock backend returns: `"<address>:<data>"`, so tests can
/// tell both which buffer and which backend produced a result.
pub fn tagged(address: &str, data: &[u8]) -> Bytes {
    Bytes::from(format!("{address}:{}", String::from_utf8_lossy(data)))
}

/// Tracks how many backend calls run at once, across any number of backends.
#[derive(Debug, Default)]
pub struct InflightGauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl InflightGauge {
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn current(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }
}

struct InflightGuard(Arc<InflightGauge>);

impl InflightGuard {
    fn enter(gauge: &Arc<InflightGauge>) -> Self {
        let now = gauge.current.fetch_add(1, Ordering::SeqCst) + 1;
        gauge.peak.fetch_max(now, Ordering::SeqCst);
        Self(Arc::clone(gauge))
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.0.current.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct MockBackend {
    address: String,
    delay: Duration,
    fail_on: Option<Bytes>,
    calls: AtomicUsize,
    gauge: Arc<InflightGauge>,
}

impl MockBackend {
    pub fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
            delay: Duration::ZERO,
            fail_on: None,
            calls: AtomicUsize::new(0),
            gauge: Arc::default(),
        }
    }

    /// Every call sleeps for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Calls carrying exactly `data` fail with `INTERNAL` after the delay.
    pub fn failing_on(mut self, data: &'static [u8]) -> Self {
        self.fail_on = Some(Bytes::from_static(data));
        self
    }

    pub fn with_gauge(mut self, gauge: Arc<InflightGauge>) -> Self {
        self.gauge = gauge;
        self
    }

    /// Calls started so far, including ones later cancelled.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[tonic::async_trait]
impl HashBackend for MockBackend {
    fn address(&self) -> &str {
        &self.address
    }

    async fn hash(&self, data: Bytes) -> Result<Bytes, Status> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let _inflight = InflightGuard::enter(&self.gauge);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail_on.as_ref() == Some(&data) {
            return Err(Status::internal(format!("{} refused the buffer", self.address)));
        }
        Ok(tagged(&self.address, &data))
    }
}

/// Recorder that keeps every observation in memory.
#[derive(Debug, Default)]
pub struct RecordingMetrics {
    requests: AtomicUsize,
    subqueries: Mutex<Vec<(String, Duration)>>,
}

impl RecordingMetrics {
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn subqueries(&self) -> Vec<(String, Duration)> {
        self.subqueries.lock().clone()
    }
}

impl MetricsRecorder for RecordingMetrics {
    fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::SeqCst);
    }

    fn record_subquery(&self, backend: &str, elapsed: Duration) {
        self.subqueries.lock().push((backend.to_string(), elapsed));
    }
}
