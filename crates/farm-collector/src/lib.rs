//! # farm-collector
//!
//! The collector owns the rendezvous endpoint. It runs one thread that
//! waits for readiness on the listener and every accepted connection:
//!
//! ```text
//! loop {
//!     1. poll(listener + connections), no timeout
//!     2. listener ready -> accept, add to the set
//!     3. connection ready -> decode one message
//!          submit    -> insert into the ordered store
//!          print     -> write the store to the output
//!          terminate -> stop once every connection is closed
//!        end of stream or bad message -> close that connection
//!     4. terminate seen and no connections left -> leave
//! }
//! print the store, remove the endpoint
//! ```

use std::io::{self, Write};
use std::os::fd::AsFd;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};

use farm_core::{kdebug, kerror, kinfo, kwarn, FarmError, FarmResult, Message, OrderedResultStore};

/// Where the collector is in its two-phase termination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorState {
    Running,
    /// Terminate received, waiting for the remaining connections to close
    Draining,
    Stopped,
}

/// Counters reported when the event loop exits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectorSummary {
    /// Readiness waits performed
    pub iterations: u64,
    pub accepted: u64,
    /// Results held in the store at exit
    pub results: usize,
    /// Connections closed because of a malformed or truncated message
    pub rejected: u64,
}

struct Connection {
    id: u64,
    stream: UnixStream,
}

/// What a single readiness event on a connection led to
enum Outcome {
    Keep,
    Close,
}

pub struct Collector<W: Write> {
    listener: UnixListener,
    conns: Vec<Connection>,
    store: OrderedResultStore,
    state: CollectorState,
    path: PathBuf,
    out: W,
    summary: CollectorSummary,
}

impl Collector<io::Stdout> {
    /// Bind the endpoint, printing snapshots to stdout
    pub fn bind(path: impl AsRef<Path>) -> FarmResult<Self> {
        Self::bind_with_output(path, io::stdout())
    }
}

impl<W: Write> Collector<W> {
    /// Remove any stale endpoint at `path` and listen on it
    pub fn bind_with_output(path: impl AsRef<Path>, out: W) -> FarmResult<Self> {
        let path = path.as_ref().to_path_buf();
        remove_endpoint(&path)?;
        let listener =
            UnixListener::bind(&path).map_err(|e| FarmError::transport("bind", e))?;
        kinfo!("listening on {}", path.display());
        Ok(Self {
            listener,
            conns: Vec::new(),
            store: OrderedResultStore::new(),
            state: CollectorState::Running,
            path,
            out,
            summary: CollectorSummary::default(),
        })
    }

    pub fn state(&self) -> CollectorState {
        self.state
    }

    pub fn store(&self) -> &OrderedResultStore {
        &self.store
    }

    pub fn open_connections(&self) -> usize {
        self.conns.len()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serve until terminate has been received and every connection closed.
    ///
    /// On exit the store is printed one last time and the endpoint removed.
    /// Returns the output sink along with the counters.
    pub fn run(mut self) -> FarmResult<(CollectorSummary, W)> {
        while !(self.state == CollectorState::Draining && self.conns.is_empty()) {
            self.step()?;
        }
        self.state = CollectorState::Stopped;
        self.print();
        remove_endpoint(&self.path)?;

        self.summary.results = self.store.len();
        kinfo!(
            "collector done: {} results, {} connections, {} iterations",
            self.summary.results,
            self.summary.accepted,
            self.summary.iterations
        );
        Ok((self.summary, self.out))
    }

    /// One readiness wait and the handling of every ready descriptor.
    ///
    /// A ready connection is read with blocking I/O until one whole frame
    /// arrives, so a peer that stops mid-frame stalls the collector.
    pub fn step(&mut self) -> FarmResult<()> {
        let (listener_ready, ready) = self.wait_ready()?;
        self.summary.iterations += 1;

        // Walk backwards so swap_remove keeps unvisited indices valid
        for idx in (0..ready.len()).rev() {
            if !ready[idx] {
                continue;
            }
            if let Outcome::Close = self.service(idx) {
                let conn = self.conns.swap_remove(idx);
                kdebug!("connection {} closed", conn.id);
            }
        }

        if listener_ready {
            self.accept()?;
        }
        Ok(())
    }

    fn wait_ready(&self) -> FarmResult<(bool, Vec<bool>)> {
        let mut fds = Vec::with_capacity(1 + self.conns.len());
        fds.push(PollFd::new(self.listener.as_fd(), PollFlags::POLLIN));
        for conn in &self.conns {
            fds.push(PollFd::new(conn.stream.as_fd(), PollFlags::POLLIN));
        }

        loop {
            match poll(&mut fds, PollTimeout::NONE) {
                Ok(_) => break,
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(FarmError::transport("poll", io::Error::from(e))),
            }
        }

        let wake = PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR | PollFlags::POLLNVAL;
        let mut ready = fds
            .iter()
            .map(|fd| fd.revents().map_or(false, |r| r.intersects(wake)));
        let listener_ready = ready.next().unwrap_or(false);
        Ok((listener_ready, ready.collect()))
    }

    fn accept(&mut self) -> FarmResult<()> {
        match self.listener.accept() {
            Ok((stream, _)) => {
                let id = self.summary.accepted;
                self.summary.accepted += 1;
                kdebug!("connection {} accepted", id);
                self.conns.push(Connection { id, stream });
                Ok(())
            }
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::Interrupted
                        | io::ErrorKind::WouldBlock
                        | io::ErrorKind::ConnectionAborted
                ) =>
            {
                Ok(())
            }
            Err(e) => Err(FarmError::transport("accept", e)),
        }
    }

    fn service(&mut self, idx: usize) -> Outcome {
        let conn = &mut self.conns[idx];
        let id = conn.id;
        match Message::read_from(&mut conn.stream) {
            Ok(Some(Message::Submit { result, name })) => {
                self.store.insert(result, name);
                Outcome::Keep
            }
            Ok(Some(Message::Print)) => {
                self.print();
                Outcome::Keep
            }
            Ok(Some(Message::Terminate)) => {
                if self.state == CollectorState::Running {
                    kinfo!("terminate received, {} connections open", self.conns.len());
                    self.state = CollectorState::Draining;
                }
                Outcome::Keep
            }
            Ok(None) => Outcome::Close,
            Err(e) if e.is_local() => {
                kwarn!("connection {}: {}, closing", id, e);
                self.summary.rejected += 1;
                Outcome::Close
            }
            Err(e) => {
                kerror!("connection {}: {}, closing", id, e);
                self.summary.rejected += 1;
                Outcome::Close
            }
        }
    }

    fn print(&mut self) {
        if let Err(e) = self.store.print(&mut self.out) {
            kwarn!("printing results: {}", e);
        }
    }
}

fn remove_endpoint(path: &Path) -> FarmResult<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(FarmError::transport("unlink", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use farm_core::protocol::{encode_submit, FIELD_BYTES};

    fn send(stream: &mut UnixStream, msg: &Message) {
        msg.write_to(stream).unwrap();
    }

    fn collector(dir: &tempfile::TempDir) -> Collector<Vec<u8>> {
        Collector::bind_with_output(dir.path().join("c.sck"), Vec::new()).unwrap()
    }

    /// Step until `cond` holds, bounded
    fn step_until(c: &mut Collector<Vec<u8>>, mut cond: impl FnMut(&Collector<Vec<u8>>) -> bool) {
        for _ in 0..64 {
            if cond(c) {
                return;
            }
            c.step().unwrap();
        }
        panic!("collector never reached the expected state");
    }

    #[test]
    fn test_bind_replaces_stale_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.sck");
        std::fs::write(&path, b"stale").unwrap();
        let c = Collector::bind_with_output(&path, Vec::new()).unwrap();
        assert_eq!(c.state(), CollectorState::Running);
        assert!(UnixStream::connect(&path).is_ok());
    }

    #[test]
    fn test_submits_are_ordered() {
        let dir = tempfile::tempdir().unwrap();
        let mut c = collector(&dir);
        let mut peer = UnixStream::connect(c.path()).unwrap();
        for (v, n) in [(5, "a"), (1, "b"), (3, "c"), (1, "d")] {
            send(&mut peer, &Message::Submit { result: v, name: n.into() });
        }
        step_until(&mut c, |c| c.store().len() == 4);

        let got: Vec<(i64, &str)> =
            c.store().iter().map(|r| (r.value, r.source_id.as_str())).collect();
        assert_eq!(got, vec![(1, "b"), (1, "d"), (3, "c"), (5, "a")]);
    }

    #[test]
    fn test_terminate_waits_for_open_connections() {
        let dir = tempfile::tempdir().unwrap();
        let mut c = collector(&dir);
        let worker = UnixStream::connect(c.path()).unwrap();
        let mut control = UnixStream::connect(c.path()).unwrap();
        send(&mut control, &Message::Terminate);
        drop(control);

        step_until(&mut c, |c| c.state() == CollectorState::Draining && c.open_connections() == 1);

        let mut worker = worker;
        send(&mut worker, &Message::Submit { result: 9, name: "late".into() });
        drop(worker);
        step_until(&mut c, |c| c.open_connections() == 0);

        let path = c.path().to_path_buf();
        let (summary, out) = c.run().unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "9 late\n");
        assert_eq!(summary.accepted, 2);
        assert_eq!(summary.results, 1);
        assert!(!path.exists());
    }

    #[test]
    fn test_truncated_message_closes_only_that_connection() {
        let dir = tempfile::tempdir().unwrap();
        let mut c = collector(&dir);
        let mut good = UnixStream::connect(c.path()).unwrap();
        let mut bad = UnixStream::connect(c.path()).unwrap();

        let wire = encode_submit(4, "half");
        bad.write_all(&wire[..2 * FIELD_BYTES + 1]).unwrap();
        drop(bad);
        send(&mut good, &Message::Submit { result: 2, name: "whole".into() });

        step_until(&mut c, |c| c.store().len() == 1 && c.open_connections() == 1);
        assert_eq!(c.store().iter().next().unwrap().source_id, "whole");
        assert_eq!(c.summary.rejected, 1);
    }

    #[test]
    fn test_unknown_opcode_closes_connection() {
        let dir = tempfile::tempdir().unwrap();
        let mut c = collector(&dir);
        let mut peer = UnixStream::connect(c.path()).unwrap();
        peer.write_all(&42i64.to_ne_bytes()).unwrap();

        step_until(&mut c, |c| c.summary.accepted == 1 && c.open_connections() == 0);
        assert_eq!(c.state(), CollectorState::Running);
    }

    #[test]
    fn test_print_snapshots_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut c = collector(&dir);
        let mut peer = UnixStream::connect(c.path()).unwrap();
        send(&mut peer, &Message::Submit { result: 3, name: "x".into() });
        send(&mut peer, &Message::Print);
        send(&mut peer, &Message::Terminate);
        drop(peer);

        let (_, out) = c.run().unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "3 x\n3 x\n");
    }
}
