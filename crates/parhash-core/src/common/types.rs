//! # Metric contract
//!
//! Names and bucket layout of the instruments recorded by the gateway. The
//! exposition transport is chosen by the deployment, but whatever scrapes or
//! receives these instruments relies on the exact names and labels below.
//!
//! - [`NR_REQUESTS`]: counter, no labels, one increment per `ParallelHash`
//!   call whatever its outcome.
//! - [`SUBQUERY_DURATIONS`]: histogram in milliseconds, labeled with
//!   [`BACKEND_LABEL`], one observation per successful backend call.
//!
//! Instruments carry no unit: OpenTelemetry exporters turn a unit into a name
//! suffix (`_milliseconds`), which would rename the series.

/// Namespace shared by every instrument.
pub const METRICS_NAMESPACE: &str = "parhash";

/// Counter of `ParallelHash` invocations.
pub const NR_REQUESTS: &str = "parhash_nr_requests";

/// Histogram of single backend round trips, in milliseconds.
pub const SUBQUERY_DURATIONS: &str = "parhash_subquery_durations";

/// Label carrying the backend address on [`SUBQUERY_DURATIONS`].
pub const BACKEND_LABEL: &str = "backend";

/// Upper bound of the first histogram bucket (0.1 ms).
pub const SUBQUERY_BUCKET_MIN_MS: f64 = 0.1;

/// Upper bound of the last histogram bucket (10 s).
pub const SUBQUERY_BUCKET_MAX_MS: f64 = 10_000.0;

/// Number of exponentially spaced histogram buckets.
pub const SUBQUERY_BUCKET_COUNT: usize = 24;
