//! A worker-thread pool that consumes [`MpmcQueue`] as its task queue.
//!
//! The distilled specification describes this only as an external
//! collaborator, interface-only: push tasks in, workers pop them in a loop,
//! a coordinator signals shutdown. This module is that collaborator,
//! built the way the reference thread pool this crate descends from builds
//! it — a condition variable for idle backoff (the queue itself never
//! blocks), an atomic running flag, and a `Vec` of joinable worker handles
//! — generalized from `std::function<void()>` tasks to boxed Rust closures.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::config::ThreadPoolConfig;
use crate::error::PoolError;
use crate::queue::MpmcQueue;

/// A boxed, type-erased unit of work submitted to a [`ThreadPool`].
type Task = Box<dyn FnOnce() + Send + 'static>;

/// How long a worker waits on the idle condition variable before re-polling
/// the queue. The queue itself never blocks (`SPEC_FULL.md` §4.3), so this
/// is purely a backoff tick, not a correctness-bearing timeout.
const IDLE_POLL: Duration = Duration::from_millis(5);

struct Shared {
    queue: MpmcQueue<Task>,
    running: AtomicBool,
    idle_lock: Mutex<()>,
    idle_signal: Condvar,
    workers_busy: std::sync::atomic::AtomicUsize,
}

/// A fixed-size pool of worker threads that execute tasks pulled off a
/// lock-free [`MpmcQueue`].
///
/// # Examples
///
/// ```
/// use hazmpmc::pool::ThreadPool;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// let pool = ThreadPool::new(4, 16);
/// let done = Arc::new(AtomicUsize::new(0));
/// for _ in 0..10 {
///     let done = Arc::clone(&done);
///     pool.execute(move || {
///         done.fetch_add(1, Ordering::SeqCst);
///     });
/// }
/// pool.shutdown();
/// assert_eq!(done.load(Ordering::SeqCst), 10);
/// ```
pub struct ThreadPool {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl ThreadPool {
    /// Spawn `num_workers` worker threads backed by a queue sized for
    /// `hazard_capacity` concurrent participants (workers plus, typically,
    /// one submitting thread — see `SPEC_FULL.md` §4.3).
    pub fn new(num_workers: usize, hazard_capacity: usize) -> Self {
        Self::with_config(ThreadPoolConfig {
            num_workers,
            queue: crate::config::QueueConfig::with_hazard_capacity(hazard_capacity),
        })
    }

    /// Spawn a pool from a fully specified [`ThreadPoolConfig`].
    pub fn with_config(config: ThreadPoolConfig) -> Self {
        let shared = Arc::new(Shared {
            queue: MpmcQueue::with_config(config.queue),
            running: AtomicBool::new(true),
            idle_lock: Mutex::new(()),
            idle_signal: Condvar::new(),
            workers_busy: std::sync::atomic::AtomicUsize::new(0),
        });

        let workers = (0..config.num_workers.max(1))
            .map(|id| {
                let shared = Arc::clone(&shared);
                thread::Builder::new()
                    .name(format!("hazmpmc-worker-{id}"))
                    .spawn(move || worker_loop(shared))
                    .expect("failed to spawn thread-pool worker")
            })
            .collect();

        tracing::info!(workers = config.num_workers, "thread pool started");
        Self { shared, workers }
    }

    /// Queue `f` for execution by some worker thread. Never blocks the
    /// caller. If the pool has already been shut down, the task is dropped
    /// and a warning is logged — see [`ThreadPool::try_execute`] for a
    /// fallible variant that surfaces this instead.
    pub fn execute<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.try_execute(f).is_err() {
            tracing::warn!("execute called after shutdown; task dropped");
        }
    }

    /// Like [`ThreadPool::execute`], but returns [`PoolError::ShutDown`]
    /// instead of silently dropping the task when the pool is no longer
    /// accepting work.
    pub fn try_execute<F>(&self, f: F) -> Result<(), PoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        if !self.shared.running.load(Ordering::Acquire) {
            return Err(PoolError::ShutDown);
        }
        self.shared.queue.push(Box::new(f));
        self.shared.idle_signal.notify_one();
        Ok(())
    }

    /// True iff the task queue is (advisedly) empty and no worker is
    /// currently executing a task. Mirrors the reference thread pool's
    /// `bIsThreadAllDone` — advisory only, never linearizable with
    /// concurrent submissions (`SPEC_FULL.md` §4.2.6, §6).
    pub fn is_idle(&self) -> bool {
        self.shared.queue.is_empty()
            && self.shared.workers_busy.load(Ordering::Acquire) == 0
    }

    /// Block until the queue is drained and no worker is mid-task. Mirrors
    /// the reference `vWaitAllThreadFinish`: a condvar wait looped against
    /// the advisory idle check, not a hard barrier.
    pub fn wait_idle(&self) {
        let mut guard = self.shared.idle_lock.lock().unwrap();
        while !self.is_idle() && self.shared.running.load(Ordering::Acquire) {
            let (next_guard, _) = self
                .shared
                .idle_signal
                .wait_timeout(guard, IDLE_POLL)
                .unwrap();
            guard = next_guard;
        }
    }

    /// Signal every worker to stop once its current task (if any) finishes
    /// and its queue is empty, then join all of them. Idempotent: calling
    /// this more than once (including via `Drop`) is a no-op after the
    /// first call.
    pub fn shutdown(&mut self) {
        if self.shared.running.swap(false, Ordering::AcqRel) {
            self.shared.idle_signal.notify_all();
        }
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
        tracing::info!("thread pool shut down");
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(shared: Arc<Shared>) {
    loop {
        match shared.queue.pop() {
            Some(task) => {
                shared.workers_busy.fetch_add(1, Ordering::AcqRel);
                if let Err(payload) = catch_unwind(AssertUnwindSafe(task)) {
                    tracing::warn!(payload_type = ?payload.type_id(), "task panicked in worker thread");
                }
                shared.workers_busy.fetch_sub(1, Ordering::AcqRel);
                shared.idle_signal.notify_all();
            }
            None => {
                if !shared.running.load(Ordering::Acquire) {
                    break;
                }
                let guard = shared.idle_lock.lock().unwrap();
                let _ = shared.idle_signal.wait_timeout(guard, IDLE_POLL);
            }
        }
    }
    shared.queue.release_hazard_slot_for_current_thread();
}
