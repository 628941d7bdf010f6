//! Farm configuration
//!
//! Compile-time defaults with runtime environment overrides.
//!
//! # Configuration Priority (highest wins)
//!
//! 1. Command-line flags (applied by the master through the builder)
//! 2. Environment variables
//! 3. Library defaults
//!
//! # Example
//!
//! ```rust,ignore
//! use farm_runtime::config::FarmConfig;
//!
//! let config = FarmConfig::from_env()
//!     .num_workers(8)
//!     .pending_capacity(None);
//! config.validate()?;
//! ```

pub mod defaults;

use std::path::PathBuf;
use std::time::Duration;

use farm_core::constants::UNIX_PATH_MAX;
use farm_core::env::{env_get, env_get_duration_ms, env_get_opt, env_get_path};
use farm_core::{FarmError, FarmResult};

/// Configuration for the master, its pool and the collector endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FarmConfig {
    /// Number of worker threads
    pub num_workers: usize,
    /// Pending queue length, `None` for direct handoff
    pub pending_capacity: Option<usize>,
    /// Pause before every submission
    pub submit_delay: Duration,
    /// Rendezvous endpoint
    pub socket_path: PathBuf,
    /// Worker connect retry interval
    pub worker_backoff: Duration,
    /// Master connect retry interval
    pub master_backoff: Duration,
    /// Explicit collector executable; default is the sibling of the master
    pub collector_bin: Option<PathBuf>,
}

impl Default for FarmConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Map a queue length onto the pool's pending capacity (0 = direct handoff)
pub fn pending_from_len(len: usize) -> Option<usize> {
    if len == 0 {
        None
    } else {
        Some(len)
    }
}

impl FarmConfig {
    /// Create config from compile-time defaults with environment overrides.
    ///
    /// Environment variables (all optional):
    /// - `FARM_WORKERS` - Number of worker threads
    /// - `FARM_QUEUE_LEN` - Pending queue length (0 = direct handoff)
    /// - `FARM_DELAY_MS` - Pause before each submission
    /// - `FARM_SOCKET` - Rendezvous endpoint path
    /// - `FARM_CONNECT_BACKOFF_MS` - Worker connect retry interval
    /// - `FARM_COLLECTOR_BIN` - Collector executable
    pub fn from_env() -> Self {
        Self {
            num_workers: env_get("FARM_WORKERS", defaults::NUM_WORKERS),
            pending_capacity: pending_from_len(env_get("FARM_QUEUE_LEN", defaults::QUEUE_LEN)),
            submit_delay: env_get_duration_ms("FARM_DELAY_MS", defaults::SUBMIT_DELAY_MS),
            socket_path: env_get_path("FARM_SOCKET", defaults::SOCKET_PATH),
            worker_backoff: env_get_duration_ms(
                "FARM_CONNECT_BACKOFF_MS",
                defaults::WORKER_CONNECT_BACKOFF_MS,
            ),
            master_backoff: Duration::from_millis(defaults::MASTER_CONNECT_BACKOFF_MS),
            collector_bin: env_get_opt::<String>("FARM_COLLECTOR_BIN")
                .filter(|s| !s.is_empty())
                .map(PathBuf::from),
        }
    }

    /// Create config with library defaults only (no env override).
    pub fn new() -> Self {
        Self {
            num_workers: defaults::NUM_WORKERS,
            pending_capacity: pending_from_len(defaults::QUEUE_LEN),
            submit_delay: Duration::from_millis(defaults::SUBMIT_DELAY_MS),
            socket_path: PathBuf::from(defaults::SOCKET_PATH),
            worker_backoff: Duration::from_millis(defaults::WORKER_CONNECT_BACKOFF_MS),
            master_backoff: Duration::from_millis(defaults::MASTER_CONNECT_BACKOFF_MS),
            collector_bin: None,
        }
    }

    pub fn num_workers(mut self, n: usize) -> Self {
        self.num_workers = n;
        self
    }

    pub fn pending_capacity(mut self, q: Option<usize>) -> Self {
        self.pending_capacity = q;
        self
    }

    pub fn submit_delay(mut self, d: Duration) -> Self {
        self.submit_delay = d;
        self
    }

    pub fn socket_path(mut self, p: impl Into<PathBuf>) -> Self {
        self.socket_path = p.into();
        self
    }

    pub fn worker_backoff(mut self, d: Duration) -> Self {
        self.worker_backoff = d;
        self
    }

    pub fn collector_bin(mut self, p: impl Into<PathBuf>) -> Self {
        self.collector_bin = Some(p.into());
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> FarmResult<()> {
        if self.num_workers == 0 {
            return Err(FarmError::InvalidArgument(
                "num_workers must be at least 1".into(),
            ));
        }
        if self.pending_capacity == Some(0) {
            return Err(FarmError::InvalidArgument(
                "pending capacity must be at least 1, use None for direct handoff".into(),
            ));
        }
        let len = self.socket_path.as_os_str().len();
        if len == 0 || len >= UNIX_PATH_MAX {
            return Err(FarmError::InvalidArgument(format!(
                "socket path must be 1..{} bytes, got {}",
                UNIX_PATH_MAX - 1,
                len
            )));
        }
        Ok(())
    }
}
