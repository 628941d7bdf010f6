//! Worker thread main loop.

use std::sync::Arc;

use farm_core::{kdebug, kerror, kwarn, FarmError};

use crate::pool::{PoolShared, Task};
use crate::reporter::Connector;

/// Bookkeeping for one worker. Dropping it retires the worker, so a
/// panic inside a task still releases its in-flight slot.
struct WorkerSlot<'a> {
    shared: &'a PoolShared,
    busy: bool,
}

impl<'a> WorkerSlot<'a> {
    fn new(shared: &'a PoolShared) -> Self {
        Self { shared, busy: false }
    }

    /// Wait for the next task. `None` means the worker must exit.
    fn next_task(&mut self) -> Option<Task> {
        let shared = self.shared;
        let mut st = shared.lock();
        loop {
            if st.should_exit() {
                return None;
            }
            if let Some(task) = st.queue.pop() {
                st.in_flight += 1;
                self.busy = true;
                drop(st);
                shared.space_available.notify_one();
                return Some(task);
            }
            st = shared.wait(&shared.work_available, st);
        }
    }

    fn finish(&mut self) {
        let mut st = self.shared.lock();
        st.in_flight -= 1;
        st.executed += 1;
        self.busy = false;
        drop(st);
        // Direct handoff admits on in-flight drops, not only on ring pops
        self.shared.space_available.notify_one();
    }
}

impl Drop for WorkerSlot<'_> {
    fn drop(&mut self) {
        let mut st = self.shared.lock();
        if self.busy {
            st.in_flight -= 1;
            st.failed += 1;
        }
        st.live_workers -= 1;
        drop(st);
        self.shared.work_available.notify_all();
        self.shared.space_available.notify_all();
    }
}

/// Local failures cost this worker only; anything else threatens the run
fn retire(worker_id: usize, e: &FarmError) {
    if e.is_local() {
        kwarn!("worker {}: {}, retiring", worker_id, e);
    } else {
        kerror!("worker {}: {}, retiring", worker_id, e);
    }
}

pub(crate) fn worker_loop(shared: Arc<PoolShared>, worker_id: usize, connector: Arc<dyn Connector>) {
    let mut slot = WorkerSlot::new(&shared);

    let mut reporter = match connector.connect(worker_id, &|| shared.is_stopping()) {
        Ok(r) => r,
        Err(e) => {
            kerror!("worker {}: cannot reach collector: {}", worker_id, e);
            return;
        }
    };

    while let Some(task) = slot.next_task() {
        let (input, run) = task.into_parts();
        let value = match run(&input) {
            Ok(v) => v,
            Err(e) => {
                retire(worker_id, &e);
                return;
            }
        };
        if let Err(e) = reporter.report(value, &input) {
            kwarn!("worker {}: report for {} lost", worker_id, input);
            retire(worker_id, &e);
            return;
        }
        slot.finish();
    }

    kdebug!("worker {} exiting", worker_id);
}
