//! Definitions shared by the gateway and anything that talks to it.
//!
//! ## Submodules
//!
//! - [`error`] - Service error type and its mapping onto `tonic::Status`.
//! - [`types`] - Metric names and histogram bucket parameters.
//! - [`proto`] - Generated messages, clients and servers for both the inbound
//!   `parhash.ParallelHashService` and the outbound `hashsvc.HashService`.

pub mod error;
pub mod types;

pub use error::{Error, Result};

/// gRPC service and message definitions generated from `proto/`.
///
/// ## Services
///
/// - [`parhash::parallel_hash_service_server::ParallelHashService`] - inbound
///   `ParallelHash(ParHashReq) -> ParHashResp`, implemented by the gateway.
/// - [`hashsvc::hash_service_client::HashServiceClient`] - outbound
///   `Hash(HashReq) -> HashResp`, one call per buffer.
///
/// All `bytes` fields are generated as [`prost::bytes::Bytes`].
pub mod proto {
    pub mod parhash {
        tonic::include_proto!("parhash");
    }

    pub mod hashsvc {
        tonic::include_proto!("hashsvc");
    }

    /// Encoded descriptor set covering both services, for gRPC reflection.
    pub const FILE_DESCRIPTOR_SET: &[u8] =
        tonic::include_file_descriptor_set!("parhash_descriptor");
}
