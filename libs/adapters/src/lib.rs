//! Adapter runtime for Axon
//!
//! Provides the adapter trait and execution types, the statically-registered
//! adapter factory, the in-memory registry, and the process-wide
//! `AdapterManager` lifecycle controller.

pub mod adapter;
pub mod builtin;
pub mod factory;
pub mod manager;
pub mod registry;

pub use adapter::*;
pub use builtin::*;
pub use factory::*;
pub use manager::*;
pub use registry::*;
