//! Shared partition dispatch domain primitives.
//!
//! This crate owns deterministic behavior (request contracts, batching, retry
//! policy and outcome aggregation). It intentionally excludes AWS SDK, async
//! runtime and logging concerns.

pub mod aggregate;
pub mod batching;
pub mod contract;
pub mod keys;
pub mod retry;
