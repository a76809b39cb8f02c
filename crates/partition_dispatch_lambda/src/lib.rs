//! AWS-oriented adapters and handlers for partition dispatch.
//!
//! This crate owns the async engine (partition scan, batch dispatch with
//! retry) and its runtime integration (Lambda handlers, store and invoke
//! adapters). Deterministic primitives live in `partition_dispatch_core` and
//! are reachable through the single `runtime` module boundary.

pub mod adapters;
pub mod config;
pub mod engine;
pub mod handlers;
pub mod runtime;
pub mod telemetry;
