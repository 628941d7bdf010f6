//! Farm master
//!
//! Starts the collector, computes every input on a bounded worker pool and
//! lets the workers report to the collector, which prints the results sorted.
//!
//! ```text
//! farm -n 4 -q 8 -t 0 -d data/ extra.bin
//! ```
//!
//! # Environment Variables
//!
//! - `FARM_WORKERS`, `FARM_QUEUE_LEN`, `FARM_DELAY_MS` - Defaults for `-n`, `-q`, `-t`
//! - `FARM_SOCKET` - Rendezvous endpoint (default `./farm.sck`)
//! - `FARM_CONNECT_BACKOFF_MS` - Worker connect retry interval
//! - `FARM_COLLECTOR_BIN` - Collector executable (default: `farm-collector` next to `farm`)
//! - `FARM_LOG_LEVEL=debug` - Set log level (off, error, warn, info, debug, trace)
//! - `FARM_FLUSH_EPRINT=1` - Flush diagnostics immediately

mod cli;
mod producer;

use std::cell::RefCell;
use std::env;
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::PathBuf;
use std::process::{Child, Command, ExitCode, Stdio};
use std::sync::Arc;
use std::time::Duration;

use farm_core::{kerror, kinfo, kprint, kwarn, FarmError, FarmResult, Message};
use farm_runtime::config::defaults;
use farm_runtime::signal::{self, ShutdownContext};
use farm_runtime::{connect_with_retry, FarmConfig, Task, TaskPool, UnixConnector};

use cli::Cli;
use producer::{Producer, ProducerReport};

fn collector_binary(config: &FarmConfig) -> FarmResult<PathBuf> {
    if let Some(bin) = &config.collector_bin {
        return Ok(bin.clone());
    }
    let exe = env::current_exe().map_err(|e| FarmError::transport("current_exe", e))?;
    Ok(exe.with_file_name(format!("farm-collector{}", env::consts::EXE_SUFFIX)))
}

fn spawn_collector(config: &FarmConfig) -> FarmResult<Child> {
    // A leftover endpoint would refuse our connects until the collector rebinds
    match std::fs::remove_file(&config.socket_path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(FarmError::transport("unlink", e)),
    }
    let bin = collector_binary(config)?;
    kinfo!("starting collector {}", bin.display());
    Command::new(&bin)
        .arg(&config.socket_path)
        .stdin(Stdio::null())
        .spawn()
        .map_err(|e| FarmError::transport("spawn collector", e))
}

/// Create the pool, feed it and drain it
fn farm(config: &FarmConfig, cli: &Cli, ctx: &ShutdownContext) -> FarmResult<ProducerReport> {
    let connector = Arc::new(UnixConnector::new(&config.socket_path, config.worker_backoff));
    let pool = TaskPool::create(config.num_workers, config.pending_capacity, connector)?;

    let mut submit = |task: Task| pool.submit(task);
    let stop = || ctx.stop_requested();
    let mut producer = Producer::new(&mut submit, &stop, config.submit_delay);
    if pool.is_direct_handoff() {
        producer = producer.retry_busy(Duration::from_millis(defaults::HANDOFF_RETRY_MS));
    }
    let produced = producer.run(&cli.files, cli.dir.as_deref());

    let summary = pool.shutdown(false);
    kinfo!(
        "pool done: {} executed, {} failed, {} dropped",
        summary.executed,
        summary.failed,
        summary.dropped
    );
    if summary.panicked > 0 {
        kwarn!("{} workers panicked", summary.panicked);
    }
    let report = produced?;
    if report.stopped {
        kinfo!("submission stopped after {} inputs", report.submitted);
    }
    Ok(report)
}

fn send_terminate(config: &FarmConfig) -> FarmResult<()> {
    let mut stream = connect_with_retry(&config.socket_path, config.master_backoff, &|| false)?;
    Message::Terminate.write_to(&mut stream)
}

fn run(cli: Cli) -> FarmResult<bool> {
    let config = cli.config.clone();
    config.validate()?;

    let ctx = ShutdownContext::new();
    let old_mask = signal::block_master_signals()?;
    let child = RefCell::new(spawn_collector(&config)?);

    // Give up waiting for the endpoint if the collector died on startup
    let collector_gone = || !matches!(child.borrow_mut().try_wait(), Ok(None));
    let control = connect_with_retry(&config.socket_path, config.master_backoff, &collector_gone);
    let control = match control {
        Ok(stream) => stream,
        Err(e) => {
            let mut child = child.borrow_mut();
            if let Ok(Some(status)) = child.try_wait() {
                kerror!("collector exited early with {}", status);
                return Err(e);
            }
            if let Err(kill_err) = child.kill() {
                kwarn!("killing collector: {}", kill_err);
            }
            if let Err(wait_err) = child.wait() {
                kwarn!("reaping collector: {}", wait_err);
            }
            return Err(e);
        }
    };

    let setup = || -> FarmResult<()> {
        control
            .set_nonblocking(true)
            .map_err(|e| FarmError::transport("set_nonblocking", e))?;
        ctx.set_control_fd(control.as_raw_fd());
        signal::install_master_handlers(&ctx)?;
        signal::restore_mask(&old_mask)
    };

    // The collector is told to terminate whatever happens from here on
    let mut ok = match setup().and_then(|()| farm(&config, &cli, &ctx)) {
        Ok(report) => report.failures == 0,
        Err(e) => {
            kerror!("{}", e);
            false
        }
    };

    if let Err(e) = send_terminate(&config) {
        kerror!("cannot terminate collector: {}", e);
        ok = false;
    }
    ctx.clear_control_fd();
    drop(control);

    let status = child
        .borrow_mut()
        .wait()
        .map_err(|e| FarmError::transport("waitpid", e))?;
    if !status.success() {
        kerror!("collector exited with {}", status);
        ok = false;
    }
    Ok(ok)
}

fn main() -> ExitCode {
    kprint::set_tag("farm");
    kprint::init();

    let mut args = env::args_os();
    let prog = args
        .next()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|| "farm".to_string());
    let cli = cli::parse(args, FarmConfig::from_env());
    for warning in &cli.warnings {
        kwarn!("{}", warning);
    }
    if cli.help {
        println!("{}", cli::usage(&prog));
        return ExitCode::SUCCESS;
    }

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            kerror!("{}", e);
            ExitCode::FAILURE
        }
    }
}
