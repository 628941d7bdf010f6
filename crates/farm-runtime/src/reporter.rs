//! Worker-side reporting connections.
//!
//! Every worker owns exactly one [`Reporter`] for its whole life. The pool
//! never sees sockets: it asks a [`Connector`] for a reporter when a worker
//! starts, so tests can swap the Unix socket for an in-memory sink.

use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use farm_core::protocol::encode_submit;
use farm_core::{io::write_all, kdebug, FarmError, FarmResult};

/// Sends computed results to the collector
pub trait Reporter: Send {
    /// Transmit one `(value, source_id)` result. Sent as a single write.
    fn report(&mut self, value: i64, source_id: &str) -> FarmResult<()>;
}

/// Opens one reporter per worker.
///
/// `cancelled` is polled between connection attempts; once it returns true
/// the connector must give up with its last error.
pub trait Connector: Send + Sync {
    fn connect(&self, worker_id: usize, cancelled: &dyn Fn() -> bool)
        -> FarmResult<Box<dyn Reporter>>;
}

/// Connect to the collector endpoint, sleeping `backoff` between attempts
/// while it does not exist yet. Any other error is returned at once.
pub fn connect_with_retry(
    path: &Path,
    backoff: Duration,
    cancelled: &dyn Fn() -> bool,
) -> FarmResult<UnixStream> {
    loop {
        let err = match UnixStream::connect(path) {
            Ok(stream) => return Ok(stream),
            Err(e) => FarmError::transport("connect", e),
        };
        if !err.is_endpoint_missing() || cancelled() {
            return Err(err);
        }
        thread::sleep(backoff);
    }
}

/// Reporter over a connected Unix stream socket
pub struct UnixReporter {
    stream: UnixStream,
}

impl UnixReporter {
    pub fn new(stream: UnixStream) -> Self {
        Self { stream }
    }
}

impl Reporter for UnixReporter {
    fn report(&mut self, value: i64, source_id: &str) -> FarmResult<()> {
        write_all(&mut self.stream, &encode_submit(value, source_id))
    }
}

/// Connector that dials the collector's Unix socket
#[derive(Debug, Clone)]
pub struct UnixConnector {
    path: PathBuf,
    backoff: Duration,
}

impl UnixConnector {
    pub fn new(path: impl Into<PathBuf>, backoff: Duration) -> Self {
        Self {
            path: path.into(),
            backoff,
        }
    }
}

impl Connector for UnixConnector {
    fn connect(
        &self,
        worker_id: usize,
        cancelled: &dyn Fn() -> bool,
    ) -> FarmResult<Box<dyn Reporter>> {
        let stream = connect_with_retry(&self.path, self.backoff, cancelled)?;
        kdebug!("worker {} connected to {}", worker_id, self.path.display());
        Ok(Box::new(UnixReporter::new(stream)))
    }
}
