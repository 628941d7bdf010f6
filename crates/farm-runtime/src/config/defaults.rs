//! Compile-time defaults, overridable through `FARM_*` variables and the CLI.

/// Worker threads in the pool
pub const NUM_WORKERS: usize = 4;

/// Pending queue length; 0 selects direct handoff
pub const QUEUE_LEN: usize = 8;

/// Pause before each submission
pub const SUBMIT_DELAY_MS: u64 = 0;

/// Rendezvous endpoint of the collector
pub const SOCKET_PATH: &str = farm_core::constants::DEFAULT_SOCKET_PATH;

/// Worker retry interval while the collector endpoint does not exist yet
pub const WORKER_CONNECT_BACKOFF_MS: u64 = 100;

/// Master retry interval for its own control connections
pub const MASTER_CONNECT_BACKOFF_MS: u64 = 50;

/// Producer retry interval when a direct-handoff pool reports every worker busy
pub const HANDOFF_RETRY_MS: u64 = 1;
