//! Ad hoc runtime diagnostics, runnable with `cargo run -- --diagnose`.
//!
//! This is the equivalent of the reference demo's `test_lockfree` module,
//! ported from a stack to this crate's queue and thread pool.

use std::sync::Arc;
use std::thread;

use crate::pool::ThreadPool;
use crate::queue::MpmcQueue;

/// Exercise the basics of [`MpmcQueue`] and [`ThreadPool`] with tracing
/// output at every step, for interactive sanity checking outside of the
/// test suite.
pub fn diagnose() {
    tracing::info!("starting MpmcQueue diagnostics");

    let queue = MpmcQueue::new(4);
    queue.push(42);
    match queue.pop() {
        Some(value) => tracing::info!(value, "popped from single-threaded queue"),
        None => tracing::warn!("pop failed - queue was empty"),
    }

    tracing::info!("testing concurrent pop under hazard-pointer protection");
    let queue = Arc::new(MpmcQueue::new(4));
    queue.push(42);

    let queue_clone = Arc::clone(&queue);
    let handle = thread::spawn(move || {
        tracing::info!("worker thread popping from shared queue");
        queue_clone.pop()
    });
    let result = handle.join().expect("diagnostic worker thread panicked");
    tracing::info!(?result, "worker thread pop result");

    tracing::info!("starting thread-pool diagnostics");
    let pool = ThreadPool::new(4, 16);
    let counter = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    for _ in 0..20 {
        let counter = Arc::clone(&counter);
        pool.execute(move || {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        });
    }
    pool.wait_idle();
    tracing::info!(
        completed = counter.load(std::sync::atomic::Ordering::SeqCst),
        "thread pool ran all submitted tasks"
    );

    tracing::info!("diagnostics complete");
}
