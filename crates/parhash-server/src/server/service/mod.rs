//! Client-facing gRPC service.
//!
//! ## Structure
//!
//! - [`handler`] - gRPC service entry point (`ParHashService`).
//! - [`lifecycle`] - server state machine and in-flight call accounting.

pub mod handler;
pub mod lifecycle;
