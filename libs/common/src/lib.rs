//! Common utilities for Axon
//!
//! Provides shared telemetry initialization for binaries.

pub mod telemetry;

pub use telemetry::init_tracing;
