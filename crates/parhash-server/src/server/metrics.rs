//! Request and backend-latency instrumentation.
//!
//! The dispatch engine reports through the [`MetricsRecorder`] trait. The
//! production recorder, [`OtelRecorder`], holds OpenTelemetry instruments
//! created from a [`Meter`]: without the `metrics` feature the global meter is
//! a no-op, with it the SDK meter provider installed by
//! [`init_telemetry`](crate::server::telemetry::init_telemetry) exports them.
//!
//! Instrument shape (see [`parhash_core::types`]):
//!
//! - `parhash_nr_requests`: `u64` counter, no attributes.
//! - `parhash_subquery_durations`: `f64` histogram in milliseconds with a
//!   `backend` attribute and 24 exponential buckets from 0.1 ms to 10 s.

use core::time::Duration;
use opentelemetry::{
    KeyValue,
    metrics::{Counter, Histogram, Meter},
};
use parhash_core::types::{
    BACKEND_LABEL, NR_REQUESTS, SUBQUERY_BUCKET_COUNT, SUBQUERY_BUCKET_MAX_MS,
    SUBQUERY_BUCKET_MIN_MS, SUBQUERY_DURATIONS,
};

/// Sink for the gateway's two instruments.
pub trait MetricsRecorder: Send + Sync + 'static {
    /// Counts one `ParallelHash` call, whatever its outcome.
    fn record_request(&self);

    /// Records the round trip of one successful backend call.
    fn record_subquery(&self, backend: &str, elapsed: Duration);
}

/// [`MetricsRecorder`] backed by OpenTelemetry instruments.
#[derive(Clone)]
pub struct OtelRecorder {
    requests: Counter<u64>,
    subquery_durations: Histogram<f64>,
}

impl OtelRecorder {
    /// Creates both instruments on `meter`.
    pub fn new(meter: &Meter) -> Self {
        let requests = meter
            .u64_counter(NR_REQUESTS)
            .with_description("Number of ParallelHash calls")
            .build();

        let subquery_durations = meter
            .f64_histogram(SUBQUERY_DURATIONS)
            .with_description("Duration of single-buffer backend Hash calls")
            .with_boundaries(subquery_buckets())
            .build();

        Self {
            requests,
            subquery_durations,
        }
    }
}

impl MetricsRecorder for OtelRecorder {
    fn record_request(&self) {
        self.requests.add(1, &[]);
    }

    fn record_subquery(&self, backend: &str, elapsed: Duration) {
        self.subquery_durations.record(
            duration_ms(elapsed),
            &[KeyValue::new(BACKEND_LABEL, backend.to_string())],
        );
    }
}

/// Bucket bounds of `parhash_subquery_durations`.
pub fn subquery_buckets() -> Vec<f64> {
    exponential_buckets_range(
        SUBQUERY_BUCKET_MIN_MS,
        SUBQUERY_BUCKET_MAX_MS,
        SUBQUERY_BUCKET_COUNT,
    )
}

/// Returns `count` bucket bounds starting at `min`, ending at `max`, each a
/// constant factor larger than the previous one.
///
/// `min` must be positive and `max` greater than `min`.
pub fn exponential_buckets_range(min: f64, max: f64, count: usize) -> Vec<f64> {
    match count {
        0 => Vec::new(),
        1 => vec![min],
        _ => {
            let factor = (max / min).powf(1.0 / (count - 1) as f64);
            let mut bound = min;
            let mut bounds = Vec::with_capacity(count);
            for _ in 0..count {
                bounds.push(bound);
                bound *= factor;
            }
            bounds
        }
    }
}

/// Duration in fractional milliseconds at microsecond resolution.
pub fn duration_ms(elapsed: Duration) -> f64 {
    elapsed.as_micros() as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::metrics::MeterProvider as _;
    use opentelemetry_sdk::metrics::{
        InMemoryMetricExporter, PeriodicReader, SdkMeterProvider,
        data::{AggregatedMetrics, Metric, MetricData},
    };

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() <= b.abs() * 1e-9
    }

    #[test]
    fn subquery_buckets_span_a_tenth_of_a_millisecond_to_ten_seconds() {
        let buckets = subquery_buckets();
        assert_eq!(buckets.len(), 24);
        assert!(close(buckets[0], 0.1));
        assert!(close(buckets[23], 10_000.0));

        let factor = buckets[1] / buckets[0];
        assert!(factor > 1.0);
        for pair in buckets.windows(2) {
            assert!(close(pair[1] / pair[0], factor));
        }
    }

    #[test]
    fn degenerate_bucket_counts() {
        assert!(exponential_buckets_range(1.0, 100.0, 0).is_empty());
        assert_eq!(exponential_buckets_range(1.0, 100.0, 1), vec![1.0]);
        let two = exponential_buckets_range(1.0, 100.0, 2);
        assert!(close(two[0], 1.0) && close(two[1], 100.0));
    }

    #[test]
    fn durations_are_reported_in_milliseconds() {
        assert!(close(duration_ms(Duration::from_micros(1_500)), 1.5));
        assert!(close(duration_ms(Duration::from_secs(2)), 2_000.0));
        assert_eq!(duration_ms(Duration::ZERO), 0.0);
    }

    #[test]
    fn otel_recorder_exports_both_instruments() {
        let exporter = InMemoryMetricExporter::default();
        let provider = SdkMeterProvider::builder()
            .with_reader(PeriodicReader::builder(exporter.clone()).build())
            .build();
        let recorder = OtelRecorder::new(&provider.meter("parhash"));

        recorder.record_request();
        recorder.record_subquery("127.0.0.1:50052", Duration::from_micros(1_500));
        provider.force_flush().expect("flush failed");

        let exported = exporter.get_finished_metrics().expect("no export");
        let metrics: Vec<&Metric> = exported
            .iter()
            .flat_map(|resource| resource.scope_metrics())
            .flat_map(|scope| scope.metrics())
            .collect();
        let find = |name: &str| {
            metrics
                .iter()
                .rev()
                .find(|metric| metric.name() == name)
                .unwrap_or_else(|| panic!("{name} was not exported"))
        };

        // Exporters derive suffixes from the unit; the names must stay bare.
        let requests = find(NR_REQUESTS);
        assert_eq!(requests.unit(), "");
        let AggregatedMetrics::U64(MetricData::Sum(sum)) = requests.data() else {
            panic!("unexpected request counter shape");
        };
        let values: Vec<u64> = sum.data_points().map(|point| point.value()).collect();
        assert_eq!(values, vec![1]);

        let durations = find(SUBQUERY_DURATIONS);
        assert_eq!(durations.unit(), "");
        let AggregatedMetrics::F64(MetricData::Histogram(histogram)) = durations.data() else {
            panic!("unexpected latency histogram shape");
        };
        let points: Vec<_> = histogram.data_points().collect();
        assert_eq!(points.len(), 1);
        let point = points[0];

        let attributes: Vec<(String, String)> = point
            .attributes()
            .map(|kv| (kv.key.as_str().to_string(), kv.value.to_string()))
            .collect();
        assert_eq!(
            attributes,
            vec![(BACKEND_LABEL.to_string(), "127.0.0.1:50052".to_string())]
        );

        let bounds: Vec<f64> = point.bounds().collect();
        assert_eq!(bounds.len(), SUBQUERY_BUCKET_COUNT);
        assert!(close(bounds[0], 0.1));
        assert!(close(bounds[SUBQUERY_BUCKET_COUNT - 1], 10_000.0));
        assert_eq!(point.count(), 1);
        assert!(close(point.sum(), 1.5));

        provider.shutdown().expect("shutdown failed");
    }
}
