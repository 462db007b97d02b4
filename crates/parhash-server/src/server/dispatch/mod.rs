//! Fan-out of one `ParallelHash` batch across the backend set.
//!
//! [`engine::DispatchEngine`] ties the pieces together: the
//! [`dispatcher::Dispatcher`] picks a backend per buffer, the
//! [`limiter::ConcurrencyLimiter`] caps in-flight backend calls process-wide,
//! the [`group::TaskGroup`] runs and joins the per-buffer
//! [`caller::Subquery`] tasks, and [`slots::ResultSlots`] puts the hashes
//! back in request order.

pub mod caller;
pub mod dispatcher;
pub mod engine;
pub mod group;
pub mod limiter;
pub mod slots;

#[cfg(test)]
pub(crate) mod testing;
