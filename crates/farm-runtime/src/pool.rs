//! `TaskPool`: bounded pool of long-lived worker threads.
//!
//! One mutex guards every counter and the pending ring; producers wait on
//! `space_available`, idle workers wait on `work_available`. Both waits are
//! re-checked in a loop.
//!
//! Two admission modes:
//! - `Some(q)`: up to `q` tasks wait in a FIFO ring, `submit` blocks when
//!   the ring is full.
//! - `None` (direct handoff): the ring holds a single task and `submit`
//!   answers [`SubmitStatus::Busy`] at once when no worker is free.

use std::fmt;
use std::path::Path;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;

use farm_core::compute;
use farm_core::{kdebug, kinfo, FarmError, FarmResult, Ring};

use crate::reporter::Connector;
use crate::worker::worker_loop;

/// Signature of the opaque per-input computation
pub type ComputeFn = dyn FnOnce(&str) -> FarmResult<i64> + Send;

/// One unit of work: an owned input identifier and the computation to run on it
pub struct Task {
    input: String,
    run: Box<ComputeFn>,
}

impl Task {
    pub fn new<F>(input: impl Into<String>, run: F) -> Self
    where
        F: FnOnce(&str) -> FarmResult<i64> + Send + 'static,
    {
        Self {
            input: input.into(),
            run: Box::new(run),
        }
    }

    /// Task computing the weighted sum of the i64 records in the file named by `input`
    pub fn weighted_sum(input: impl Into<String>) -> Self {
        Self::new(input, |path| compute::weighted_sum(Path::new(path)))
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub(crate) fn into_parts(self) -> (String, Box<ComputeFn>) {
        (self.input, self.run)
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task").field("input", &self.input).finish()
    }
}

/// Outcome of a successful `submit` call
#[derive(Debug)]
pub enum SubmitStatus {
    Accepted,
    /// Shutdown has begun; the pool admits nothing more. Do not resubmit.
    Full(Task),
    /// Direct handoff with every live worker busy; submit again later.
    Busy(Task),
}

impl SubmitStatus {
    pub fn is_accepted(&self) -> bool {
        matches!(self, SubmitStatus::Accepted)
    }
}

/// Shutdown level; only ever raised
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ShutdownLevel {
    None,
    /// Drain the ring, accept nothing new
    Graceful,
    /// Drop what is still queued, finish what is running
    Forced,
}

/// What happened to the work of a pool, returned by [`TaskPool::shutdown`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownSummary {
    /// Tasks computed and reported
    pub executed: usize,
    /// Tasks whose computation or report failed
    pub failed: usize,
    /// Tasks still queued when the last worker exited
    pub dropped: usize,
    /// Worker threads that died by panic
    pub panicked: usize,
}

pub(crate) struct PoolState {
    pub(crate) queue: Ring<Task>,
    pub(crate) in_flight: usize,
    pub(crate) live_workers: usize,
    pub(crate) shutdown: ShutdownLevel,
    pub(crate) executed: usize,
    pub(crate) failed: usize,
}

impl PoolState {
    /// Whether an idle worker must leave instead of waiting
    pub(crate) fn should_exit(&self) -> bool {
        match self.shutdown {
            ShutdownLevel::None => false,
            ShutdownLevel::Graceful => self.queue.is_empty(),
            ShutdownLevel::Forced => true,
        }
    }
}

pub(crate) struct PoolShared {
    state: Mutex<PoolState>,
    pub(crate) space_available: Condvar,
    pub(crate) work_available: Condvar,
    direct_handoff: bool,
}

impl PoolShared {
    /// A panicking task never holds this lock, so poison only means a
    /// counter update was cut short; the state itself stays usable.
    pub(crate) fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn wait<'a>(
        &self,
        cv: &Condvar,
        guard: MutexGuard<'a, PoolState>,
    ) -> MutexGuard<'a, PoolState> {
        cv.wait(guard).unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn is_stopping(&self) -> bool {
        self.lock().should_exit()
    }

    fn raise(&self, level: ShutdownLevel) {
        let mut st = self.lock();
        if level > st.shutdown {
            st.shutdown = level;
        }
        drop(st);
        self.work_available.notify_all();
        self.space_available.notify_all();
    }
}

/// Bounded pool of workers, each holding its own reporting connection.
pub struct TaskPool {
    shared: Arc<PoolShared>,
    handles: Vec<thread::JoinHandle<()>>,
    capacity: usize,
}

impl TaskPool {
    /// Spawn `num_workers` workers before returning.
    ///
    /// `pending_capacity = None` selects direct handoff.
    pub fn create(
        num_workers: usize,
        pending_capacity: Option<usize>,
        connector: Arc<dyn Connector>,
    ) -> FarmResult<Self> {
        if num_workers == 0 {
            return Err(FarmError::InvalidArgument(
                "pool needs at least one worker".into(),
            ));
        }
        let (ring_len, direct_handoff) = match pending_capacity {
            Some(0) => {
                return Err(FarmError::InvalidArgument(
                    "pending capacity must be at least 1".into(),
                ))
            }
            Some(q) => (q, false),
            None => (1, true),
        };

        let shared = Arc::new(PoolShared {
            state: Mutex::new(PoolState {
                queue: Ring::with_capacity(ring_len),
                in_flight: 0,
                live_workers: 0,
                shutdown: ShutdownLevel::None,
                executed: 0,
                failed: 0,
            }),
            space_available: Condvar::new(),
            work_available: Condvar::new(),
            direct_handoff,
        });

        let mut pool = TaskPool {
            shared,
            handles: Vec::with_capacity(num_workers),
            capacity: num_workers,
        };

        for worker_id in 0..num_workers {
            pool.shared.lock().live_workers += 1;
            let shared = Arc::clone(&pool.shared);
            let connector = Arc::clone(&connector);
            let spawned = thread::Builder::new()
                .name(format!("farm-worker-{}", worker_id))
                .spawn(move || worker_loop(shared, worker_id, connector));
            match spawned {
                Ok(handle) => pool.handles.push(handle),
                Err(e) => {
                    pool.shared.lock().live_workers -= 1;
                    // Drop joins the workers that did start
                    return Err(FarmError::ResourceExhaustion(format!(
                        "spawning worker {}: {}",
                        worker_id, e
                    )));
                }
            }
        }

        kinfo!(
            "pool started: {} workers, {}",
            num_workers,
            match pending_capacity {
                Some(q) => format!("queue {}", q),
                None => "direct handoff".to_string(),
            }
        );
        Ok(pool)
    }

    /// Hand a task to the pool.
    ///
    /// Blocks while the ring is full. Returns `Full` with the task once
    /// shutdown has begun, and `Busy` in direct-handoff mode when every live
    /// worker is busy. Fails with `NoLiveWorkers` when no worker is left to
    /// run it.
    pub fn submit(&self, task: Task) -> FarmResult<SubmitStatus> {
        let shared = &*self.shared;
        let mut st = shared.lock();
        loop {
            if st.shutdown != ShutdownLevel::None {
                return Ok(SubmitStatus::Full(task));
            }
            if st.live_workers == 0 {
                return Err(FarmError::NoLiveWorkers);
            }
            if shared.direct_handoff && st.in_flight + st.queue.len() >= st.live_workers {
                return Ok(SubmitStatus::Busy(task));
            }
            if !st.queue.is_full() {
                break;
            }
            st = shared.wait(&shared.space_available, st);
        }

        if let Err(task) = st.queue.push(task) {
            // Unreachable while the lock is held since the last check
            return Ok(SubmitStatus::Busy(task));
        }
        drop(st);
        shared.work_available.notify_one();
        Ok(SubmitStatus::Accepted)
    }

    /// Raise the shutdown level and wake everybody, without waiting.
    pub fn stop(&self, force: bool) {
        self.shared.raise(if force {
            ShutdownLevel::Forced
        } else {
            ShutdownLevel::Graceful
        });
    }

    /// Stop the pool and wait for every worker to exit.
    ///
    /// A level raised earlier through [`stop`](Self::stop) is never lowered.
    pub fn shutdown(mut self, force: bool) -> ShutdownSummary {
        self.stop(force);
        self.finish()
    }

    fn finish(&mut self) -> ShutdownSummary {
        let mut panicked = 0;
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                panicked += 1;
            }
        }
        let mut st = self.shared.lock();
        let summary = ShutdownSummary {
            executed: st.executed,
            failed: st.failed,
            dropped: st.queue.clear(),
            panicked,
        };
        kdebug!("pool shut down: {:?}", summary);
        summary
    }

    /// Worker count the pool was created with
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_direct_handoff(&self) -> bool {
        self.shared.direct_handoff
    }

    /// Tasks waiting in the ring
    pub fn pending(&self) -> usize {
        self.shared.lock().queue.len()
    }

    /// Tasks currently executing
    pub fn in_flight(&self) -> usize {
        self.shared.lock().in_flight
    }

    /// Workers that have not retired
    pub fn live_workers(&self) -> usize {
        self.shared.lock().live_workers
    }

    pub fn shutdown_level(&self) -> ShutdownLevel {
        self.shared.lock().shutdown
    }
}

impl Drop for TaskPool {
    fn drop(&mut self) {
        if !self.handles.is_empty() {
            self.shared.raise(ShutdownLevel::Forced);
            self.finish();
        }
    }
}
