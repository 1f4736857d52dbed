//! Workflow engine for Axon
//!
//! Provides graph parsing and validation, placeholder interpolation, node
//! executors, the DAG execution engine, the workflow service, and the
//! workflow-bound adapter.

pub mod adapter;
pub mod context;
pub mod engine;
pub mod executor;
pub mod interpolate;
pub mod parser;
pub mod service;

pub use adapter::*;
pub use context::*;
pub use engine::*;
pub use executor::*;
pub use interpolate::*;
pub use parser::*;
pub use service::*;
