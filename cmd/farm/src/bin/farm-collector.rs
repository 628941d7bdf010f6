//! Farm collector process
//!
//! Started by `farm` with the socket path as its only argument. Results are
//! printed to stdout as `<value> <source_id>` lines, sorted by value.
//!
//! # Environment Variables
//!
//! - `FARM_SOCKET` - Endpoint used when no argument is given
//! - `FARM_LOG_LEVEL=debug` - Set log level (off, error, warn, info, debug, trace)
//! - `FARM_FLUSH_EPRINT=1` - Flush diagnostics immediately

use std::path::PathBuf;
use std::process::ExitCode;

use farm_collector::Collector;
use farm_core::{env_get_path, kerror, kinfo, kprint, FarmResult};
use farm_runtime::config::defaults;
use farm_runtime::signal;

fn run(path: PathBuf) -> FarmResult<()> {
    // Shutdown arrives through the protocol, never through signals
    signal::block_collector_signals()?;
    signal::ignore_sigpipe()?;

    let collector = Collector::bind(&path)?;
    let (summary, _) = collector.run()?;
    kinfo!("{:?}", summary);
    Ok(())
}

fn main() -> ExitCode {
    kprint::set_tag("collector");
    kprint::init();

    let path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| env_get_path("FARM_SOCKET", defaults::SOCKET_PATH));

    match run(path) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            kerror!("{}", e);
            ExitCode::FAILURE
        }
    }
}
