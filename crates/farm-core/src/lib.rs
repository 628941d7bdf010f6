//! # farm-core
//!
//! Platform-agnostic building blocks of the farm pipeline.
//!
//! This crate has no OS-specific code: threads, sockets and signals live in
//! `farm-runtime` and `farm-collector`.
//!
//! ## Modules
//!
//! - `error` - Error taxonomy shared by every process
//! - `kprint` - Kernel-style leveled logging macros
//! - `env` - Environment variable utilities
//! - `io` - Full-transfer read/write over byte streams
//! - `protocol` - Opcodes and message framing
//! - `ring` - Fixed-capacity FIFO used by the task pool
//! - `store` - Ordered result store of the collector
//! - `compute` - Per-file weighted sum

pub mod error;
pub mod kprint;
pub mod env;
pub mod io;
pub mod protocol;
pub mod ring;
pub mod store;
pub mod compute;

// Re-exports for convenience
pub use error::{FarmError, FarmResult};
pub use protocol::{Message, Opcode};
pub use ring::Ring;
pub use store::{OrderedResultStore, ResultRecord};
pub use env::{env_get, env_get_bool, env_get_duration_ms, env_get_opt, env_get_path};

/// Well-known constants
pub mod constants {
    /// Default rendezvous endpoint
    pub const DEFAULT_SOCKET_PATH: &str = "./farm.sck";

    /// Longest `sun_path` accepted by the kernel (`man 7 unix`)
    pub const UNIX_PATH_MAX: usize = 108;
}
