//! Downstream hashing backends.
//!
//! ## Structure
//!
//! - [`client`] - The [`HashBackend`](client::HashBackend) seam and its gRPC
//!   implementation.
//! - [`set`] - The ordered [`BackendSet`](set::BackendSet) built at startup.

pub mod client;
pub mod set;
