//! A lock-free multi-producer/multi-consumer queue reclaimed with hazard
//! pointers, and a thread pool built on top of it.
//!
//! The interesting part of this crate is the pairing of [`hazard`] (the
//! hazard-pointer registry, private) and [`queue`] (the Michael–Scott
//! queue that uses it for safe reclamation); [`pool`] is the
//! straightforward consumer that makes the queue useful as a task-dispatch
//! mechanism. See `SPEC_FULL.md` for the full design rationale,
//! invariants, and the memory-ordering argument behind every atomic
//! operation.
//!
//! # Examples
//!
//! ```
//! use hazmpmc::queue::MpmcQueue;
//!
//! let queue = MpmcQueue::new(8);
//! queue.push("first");
//! queue.push("second");
//! assert_eq!(queue.pop(), Some("first"));
//! ```

pub mod config;
pub mod diagnostics;
pub mod error;
mod hazard;
pub mod pool;
pub mod queue;

pub use config::{QueueConfig, ThreadPoolConfig};
pub use error::{PoolError, QueueError};
pub use pool::ThreadPool;
pub use queue::MpmcQueue;
