//! Error types for the parallel hashing gateway.
//!
//! This module defines the central `Error` enum, which captures every failure a
//! `ParallelHash` call or the gateway startup can run into. It implements
//! `From<Error>` for `tonic::Status` so handlers can return it with `?`.
//!
//! ## Error Cases
//! - `Backend`: A single backend `Hash` call failed. Aborts the whole batch.
//! - `Connect`: A channel to a configured backend could not be established.
//! - `NoBackends`: The backend set is empty.
//! - `Internal`: A fan-out task panicked or broke a bookkeeping invariant.
//! - `RequestCancelled`: The caller went away or the batch was abandoned.
//! - `DeadlineExceeded`: The server-side request deadline elapsed.
//! - `InvalidRequest`: The client request was malformed or exceeded bounds.
//! - `ServiceShutdown`: A request arrived while the service was draining.

use tonic::{Code, Status};

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the parallel hashing gateway.
#[derive(Clone, thiserror::Error, Debug)]
pub enum Error {
    /// A backend failed to hash one buffer of the batch.
    #[error("Backend {backend} failed on buffer {index}: {message}")]
    Backend {
        backend: String,
        index: usize,
        code: Code,
        message: String,
    },

    /// No channel could be established to a configured backend.
    #[error("Failed to connect to backend {backend}: {reason}")]
    Connect { backend: String, reason: String },

    /// The gateway was configured without any backend.
    #[error("At least one backend must be configured")]
    NoBackends,

    /// A fan-out task terminated abnormally.
    #[error("Internal error: {context}")]
    Internal { context: String },

    /// The caller cancelled the request, or a sibling failure abandoned it.
    #[error("Request cancelled")]
    RequestCancelled,

    /// The per-request deadline elapsed before every buffer was hashed.
    #[error("Request deadline exceeded")]
    DeadlineExceeded,

    /// The client request was invalid or exceeded constraints.
    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// The service is in the process of shutting down.
    #[error("Service is shutting down")]
    ServiceShutdown,
}

impl Error {
    /// Wraps the status returned by `backend` while hashing buffer `index`.
    pub fn backend(backend: impl Into<String>, index: usize, status: &Status) -> Self {
        Self::Backend {
            backend: backend.into(),
            index,
            code: status.code(),
            message: status.message().to_string(),
        }
    }

    /// Returns `true` for the errors a caller sees when the batch was
    /// abandoned rather than failed by a backend.
    pub const fn is_cancellation(&self) -> bool {
        matches!(self, Self::RequestCancelled | Self::DeadlineExceeded)
    }
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        let message = err.to_string();
        match err {
            Error::Backend {
                code: Code::Unavailable,
                ..
            } => Status::unavailable(message),
            Error::Backend { .. } => Status::internal(message),
            Error::Connect { .. } => Status::unavailable(message),
            Error::NoBackends => Status::internal(message),
            Error::Internal { .. } => Status::internal(message),
            Error::RequestCancelled => Status::cancelled("Request was cancelled"),
            Error::DeadlineExceeded => Status::deadline_exceeded(message),
            Error::InvalidRequest { reason } => Status::invalid_argument(reason),
            Error::ServiceShutdown => Status::unavailable("Service is shutting down"),
        }
    }
}
