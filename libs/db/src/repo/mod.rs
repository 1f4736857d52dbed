//! Repository traits and implementations
//!
//! Traits define the data access interface; PostgreSQL implementations live
//! in the `pg_*` modules and in-memory implementations in `memory`.

pub mod errors;
pub mod memory;
pub mod pg_adapter_config;
pub mod pg_execution;
pub mod pg_installation;
pub mod pg_workflow;
pub mod traits;

pub use errors::*;
pub use memory::*;
pub use pg_adapter_config::PgAdapterConfigRepository;
pub use pg_execution::PgExecutionRepository;
pub use pg_installation::PgInstallationRepository;
pub use pg_workflow::PgWorkflowRepository;
pub use traits::*;
