//! Error types surfaced by the queue and the thread pool built on top of it.
//!
//! Most failure modes in a hazard-pointer queue are transient contention and
//! are retried internally rather than surfaced; the types here only cover
//! the handful of conditions a caller can actually observe.

use thiserror::Error;

/// Failure modes a caller of [`crate::queue::MpmcQueue`] can observe.
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum QueueError {
    /// The hazard-pointer table has no free slot for the calling thread.
    ///
    /// This is not a correctness failure: the caller can simply treat the
    /// queue as transiently empty and retry, which is exactly what
    /// [`crate::queue::MpmcQueue::pop`] does. It is exposed as a distinct
    /// variant so diagnostics and [`crate::queue::MpmcQueue::try_pop_raw`]
    /// callers can tell "exhausted" apart from "genuinely empty".
    #[error("hazard-pointer table exhausted: no free slot for this thread")]
    HazardTableExhausted,
}

/// Failure modes a caller of [`crate::pool::ThreadPool`] can observe.
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum PoolError {
    /// A task was submitted through [`crate::pool::ThreadPool::try_execute`]
    /// after [`crate::pool::ThreadPool::shutdown`] had already been observed.
    #[error("thread pool is shut down, task was not queued")]
    ShutDown,
}
