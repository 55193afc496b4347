//! A 1-master / N-worker task queue with a cooperative stop protocol.
//!
//! The master enumerates tasks and feeds them to idle workers over a typed
//! channel pair; responses are folded on the master as they arrive, in
//! whatever order the workers finish. The fold callback may push new tasks
//! mid-run or ask the queue to stop dispatching. On stop, pending tasks are
//! drained without dispatch while in-flight work runs to completion and its
//! responses are still folded.

use std::collections::VecDeque;
use std::thread;

use crate::options::Options;
use crate::stop::StopToken;

/// Handle given to the master-side fold.
pub struct TaskManager<T> {
    pending: VecDeque<T>,
    stop: StopToken,
}

impl<T> TaskManager<T> {
    /// Enqueue a task discovered mid-run.
    pub fn push(&mut self, task: T) {
        self.pending.push_back(task);
    }

    /// Stop dispatching; pending tasks are dropped, in-flight work finishes.
    pub fn request_stop(&self) {
        self.stop.request_stop();
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.stop_requested()
    }
}

/// Handle given to the worker-side callback.
#[derive(Clone)]
pub struct WorkerHandle {
    stop: StopToken,
    group_size: usize,
}

impl WorkerHandle {
    /// Observe a cancellation request originating from either side.
    pub fn stop_requested(&self) -> bool {
        self.stop.stop_requested()
    }

    /// The queue-side stop token, for handing to an inner strategy.
    pub fn token(&self) -> &StopToken {
        &self.stop
    }

    /// Size of the rank group backing this worker; an inner strategy may run
    /// its own queue over a group of this size.
    pub fn group_size(&self) -> usize {
        self.group_size
    }
}

/// Splits a flat rank group into one master and N workers.
///
/// A group of size 1 degenerates to the master executing tasks in place,
/// which keeps single-process runs deterministic.
#[derive(Clone, Debug)]
pub struct DistributedManager {
    max_ranks_per_worker: u32,
    max_masters: u32,
    size: usize,
}

impl DistributedManager {
    pub fn new(max_ranks_per_worker: u32, max_masters: u32) -> Self {
        Self {
            max_ranks_per_worker: max_ranks_per_worker.max(1),
            max_masters: max_masters.max(1),
            size: 1,
        }
    }

    pub fn get_options(&self) -> Options {
        let mut opts = Options::new();
        opts.set("distributed:comm", self.size as u32);
        opts
    }

    /// `distributed:comm` names the rank-group handle; for the in-process
    /// transport it carries the group size.
    pub fn set_options(&mut self, opts: &Options) {
        if let Some(size) = opts.get_u32("distributed:comm") {
            self.size = size.max(1) as usize;
        }
    }

    pub fn num_workers(&self) -> usize {
        self.size.saturating_sub(self.max_masters as usize) / self.max_ranks_per_worker as usize
    }

    /// Result agreement across ranks. The in-process transport already
    /// shares the master's fold, so this is an identity, kept so call sites
    /// keep the master/worker structure explicit.
    pub fn bcast<T>(&self, _value: &mut T) {}

    /// Run the master/worker session over `tasks`.
    ///
    /// `worker_fn` runs on worker ranks and must be commutative-and-
    /// associative-safe for the fold: response arrival is unordered.
    pub fn work_queue<T, R, W, M>(&self, tasks: Vec<T>, worker_fn: W, mut master_fn: M)
    where
        T: Send,
        R: Send,
        W: Fn(T, &WorkerHandle) -> R + Sync,
        M: FnMut(R, &mut TaskManager<T>),
    {
        let stop = StopToken::new();
        let handle = WorkerHandle {
            stop: stop.clone(),
            group_size: self.max_ranks_per_worker as usize,
        };
        let mut manager = TaskManager {
            pending: tasks.into(),
            stop,
        };

        let nworkers = self.num_workers();
        if nworkers == 0 {
            // single-rank group: the master evaluates in place
            while !manager.stop.stop_requested() {
                let Some(task) = manager.pending.pop_front() else {
                    break;
                };
                let response = worker_fn(task, &handle);
                master_fn(response, &mut manager);
            }
            return;
        }

        let (task_tx, task_rx) = crossbeam_channel::unbounded::<T>();
        let (response_tx, response_rx) = crossbeam_channel::unbounded::<R>();

        thread::scope(|scope| {
            for _ in 0..nworkers {
                let task_rx = task_rx.clone();
                let response_tx = response_tx.clone();
                let handle = handle.clone();
                let worker_fn = &worker_fn;
                scope.spawn(move || {
                    for task in task_rx.iter() {
                        if response_tx.send(worker_fn(task, &handle)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(response_tx);

            // prime each idle worker, then keep one task in flight per
            // response folded until the queue drains or stops
            let mut in_flight = 0usize;
            while in_flight < nworkers && !manager.stop.stop_requested() {
                let Some(task) = manager.pending.pop_front() else {
                    break;
                };
                task_tx.send(task).expect("worker channel closed");
                in_flight += 1;
            }

            while in_flight > 0 {
                let response = response_rx.recv().expect("all workers exited");
                in_flight -= 1;
                master_fn(response, &mut manager);
                if !manager.stop.stop_requested() {
                    if let Some(task) = manager.pending.pop_front() {
                        task_tx.send(task).expect("worker channel closed");
                        in_flight += 1;
                    }
                }
            }
            drop(task_tx);
        });
    }
}

impl Default for DistributedManager {
    fn default() -> Self {
        Self::new(1, 1)
    }
}
