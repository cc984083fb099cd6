//! Fixed-size worker pool backing the asynchronous engine operations.
//!
//! Tasks are consumed from a single FIFO queue guarded by a mutex and a
//! condition variable. A separate outstanding-task counter with its own
//! condvar lets callers drain the pool with [`WorkerPool::wait_all`].

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};

type Task = Box<dyn FnOnce() + Send + 'static>;

struct QueueState {
    tasks: VecDeque<Task>,
    stop: bool,
}

struct PoolShared {
    queue: Mutex<QueueState>,
    task_ready: Condvar,
    outstanding: Mutex<usize>,
    drained: Condvar,
}

impl PoolShared {
    fn start_one(&self) {
        *self.outstanding.lock() += 1;
    }

    fn finish_one(&self) {
        let mut outstanding = self.outstanding.lock();
        *outstanding -= 1;
        if *outstanding == 0 {
            self.drained.notify_all();
        }
    }
}

/// Fixed-size pool of worker threads consuming a FIFO task queue.
///
/// Submission never blocks on queue length. Shutdown discards tasks that
/// have not started; tasks already dequeued run to completion. The pool
/// shuts itself down on drop.
pub struct WorkerPool {
    shared: Arc<PoolShared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Spawn a pool with `thread_count` workers (at least one).
    pub fn new(thread_count: usize) -> Self {
        let shared = Arc::new(PoolShared {
            queue: Mutex::new(QueueState {
                tasks: VecDeque::new(),
                stop: false,
            }),
            task_ready: Condvar::new(),
            outstanding: Mutex::new(0),
            drained: Condvar::new(),
        });

        let workers = (0..thread_count.max(1))
            .map(|_| {
                let shared = Arc::clone(&shared);
                thread::spawn(move || worker_loop(shared))
            })
            .collect();

        Self {
            shared,
            workers: Mutex::new(workers),
        }
    }

    /// Enqueue a task and wake one worker. Returns `false` if the pool has
    /// already been shut down, in which case the task is dropped unrun.
    pub fn submit(&self, task: impl FnOnce() + Send + 'static) -> bool {
        // Count the task before it becomes visible to workers so that a
        // fast completion cannot underflow the outstanding counter.
        self.shared.start_one();

        let mut queue = self.shared.queue.lock();
        if queue.stop {
            drop(queue);
            self.shared.finish_one();
            return false;
        }
        queue.tasks.push_back(Box::new(task));
        self.shared.task_ready.notify_one();
        true
    }

    /// Block until every submitted task has finished or been discarded.
    pub fn wait_all(&self) {
        let mut outstanding = self.shared.outstanding.lock();
        while *outstanding != 0 {
            self.shared.drained.wait(&mut outstanding);
        }
    }

    /// Stop the pool: queued-but-unstarted tasks are discarded, in-flight
    /// tasks run to completion, and all workers are joined.
    pub fn shutdown(&self) {
        let discarded = {
            let mut queue = self.shared.queue.lock();
            if queue.stop {
                0
            } else {
                queue.stop = true;
                let discarded = queue.tasks.len();
                queue.tasks.clear();
                self.shared.task_ready.notify_all();
                discarded
            }
        };

        // Discarded tasks still count as drained, or wait_all would hang.
        for _ in 0..discarded {
            self.shared.finish_one();
        }

        let mut workers = self.workers.lock();
        for handle in workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(shared: Arc<PoolShared>) {
    loop {
        let task = {
            let mut queue = shared.queue.lock();
            loop {
                if queue.stop {
                    return;
                }
                if let Some(task) = queue.tasks.pop_front() {
                    break task;
                }
                shared.task_ready.wait(&mut queue);
            }
        };
        // The queue lock is released here, so a task may submit more work.
        task();
        shared.finish_one();
    }
}
