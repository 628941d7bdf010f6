//! # farm-runtime
//!
//! Master-side runtime of the farm.
//!
//! This crate provides:
//! - A bounded task pool with graceful and forced shutdown
//! - Worker threads holding one reporting connection each
//! - Signal handling for cooperative stop and snapshot printing
//! - Configuration with environment overrides

pub mod config;
pub mod pool;
pub mod reporter;
pub mod signal;
mod worker;

// Re-exports
pub use config::FarmConfig;
pub use pool::{ShutdownLevel, ShutdownSummary, SubmitStatus, Task, TaskPool};
pub use reporter::{connect_with_retry, Connector, Reporter, UnixConnector, UnixReporter};
