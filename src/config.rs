//! Construction-time tuning knobs for the queue and thread pool.
//!
//! None of these affect soundness: every default is a "works for modest
//! concurrency" starting point, and every knob can be mistuned without
//! risking a use-after-free or a lost element (see `SPEC_FULL.md` §4.2.4,
//! §6).

/// Default number of concurrent threads the hazard table is sized for.
///
/// Doubled internally because [`crate::queue::MpmcQueue::pop`] occupies two
/// hazard slots (`protect[0]` and `protect[1]`) per in-flight dequeue.
pub const DEFAULT_HAZARD_CAPACITY: usize = 16;

/// Default number of successful dequeues between opportunistic sweeps of
/// the retirement chain.
pub const DEFAULT_RETIRE_THRESHOLD: u32 = 32;

/// Tuning knobs for [`crate::queue::MpmcQueue`].
#[derive(Debug, Clone, Copy)]
pub struct QueueConfig {
    /// Maximum number of distinct threads expected to operate on the queue
    /// concurrently. The hazard table is allocated with `2 * hazard_capacity`
    /// slots. Exceeding this causes transient empty returns from `pop`, never
    /// unsoundness.
    pub hazard_capacity: usize,
    /// Number of successful dequeues between sweeps of the retirement chain.
    /// Purely a throughput/memory-footprint tradeoff.
    pub retire_threshold: u32,
    /// Enable verbose `tracing::trace!` events on the CAS retry paths. Off by
    /// default; the retry loops are hot and even a disabled `tracing` event
    /// has a measurable cost under heavy contention.
    pub verbose: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            hazard_capacity: DEFAULT_HAZARD_CAPACITY,
            retire_threshold: DEFAULT_RETIRE_THRESHOLD,
            verbose: false,
        }
    }
}

impl QueueConfig {
    /// Start from the defaults with a specific hazard capacity, mirroring
    /// the single-argument constructor most callers reach for.
    pub fn with_hazard_capacity(hazard_capacity: usize) -> Self {
        Self {
            hazard_capacity,
            ..Self::default()
        }
    }
}

/// Tuning knobs for [`crate::pool::ThreadPool`].
#[derive(Debug, Clone, Copy)]
pub struct ThreadPoolConfig {
    /// Number of worker threads to spawn.
    pub num_workers: usize,
    /// Configuration forwarded to the pool's internal task queue.
    pub queue: QueueConfig,
}

impl Default for ThreadPoolConfig {
    fn default() -> Self {
        Self {
            num_workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            queue: QueueConfig::default(),
        }
    }
}
