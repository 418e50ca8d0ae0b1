//! The Michael–Scott style multi-producer/multi-consumer queue (MPMCQ).
//!
//! Producers link new nodes at the tail with a CAS, helping along any
//! concurrent producer that linked a node but hasn't advanced `tail` yet.
//! Consumers protect the head and its successor with hazard pointers
//! before reading them, CAS the head forward, and hand the old head to the
//! retirement chain if some other thread might still be looking at it.
//!
//! See `SPEC_FULL.md` §4.2 for the full algorithm and the ordering
//! rationale behind every atomic operation below; this module follows it
//! step for step rather than improvising.

use std::cell::UnsafeCell;
use std::fmt;
use std::ptr;
use std::sync::atomic::{AtomicIsize, AtomicPtr, AtomicU32, Ordering};

use crate::config::QueueConfig;
use crate::error::QueueError;
use crate::hazard::HazardRegistry;

struct Node<T> {
    data: UnsafeCell<Option<T>>,
    next: AtomicPtr<Node<T>>,
}

impl<T> Node<T> {
    fn new(data: Option<T>) -> Self {
        Node {
            data: UnsafeCell::new(data),
            next: AtomicPtr::new(ptr::null_mut()),
        }
    }

    fn boxed(data: Option<T>) -> *mut Node<T> {
        Box::into_raw(Box::new(Node::new(data)))
    }
}

impl<T: fmt::Debug> fmt::Debug for Node<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // SAFETY: formatting only ever happens from tests/diagnostics on a
        // node the caller already has exclusive or hazard-protected access
        // to; we never do this on a live, concurrently-mutated node.
        let data = unsafe { &*self.data.get() };
        f.debug_struct("Node")
            .field("data", data)
            .field("next", &self.next.load(Ordering::Relaxed))
            .finish()
    }
}

/// An unbounded, lock-free multi-producer/multi-consumer FIFO queue.
///
/// Reclamation is handled internally by a private [`HazardRegistry`]; there
/// is nothing for a caller to set up beyond picking a `hazard_capacity`
/// that comfortably covers the number of threads that will call
/// [`MpmcQueue::pop`] concurrently (see `SPEC_FULL.md` §6).
///
/// # Examples
///
/// ```
/// use hazmpmc::queue::MpmcQueue;
///
/// let queue = MpmcQueue::new(8);
/// queue.push(1);
/// queue.push(2);
/// assert_eq!(queue.pop(), Some(1));
/// assert_eq!(queue.pop(), Some(2));
/// assert_eq!(queue.pop(), None);
/// ```
pub struct MpmcQueue<T> {
    head: AtomicPtr<Node<T>>,
    tail: AtomicPtr<Node<T>>,
    retired: AtomicPtr<Node<T>>,
    size: AtomicIsize,
    reclaim_ticks: AtomicU32,
    retire_threshold: u32,
    verbose: bool,
    hazards: HazardRegistry,
}

impl<T> MpmcQueue<T> {
    /// Construct a queue whose hazard table covers `hazard_capacity`
    /// concurrent threads (doubled internally, see `SPEC_FULL.md` §6).
    pub fn new(hazard_capacity: usize) -> Self {
        Self::with_config(QueueConfig::with_hazard_capacity(hazard_capacity))
    }

    /// Construct a queue from a fully specified [`QueueConfig`].
    pub fn with_config(config: QueueConfig) -> Self {
        let dummy = Node::boxed(None);
        Self {
            head: AtomicPtr::new(dummy),
            tail: AtomicPtr::new(dummy),
            retired: AtomicPtr::new(ptr::null_mut()),
            size: AtomicIsize::new(0),
            reclaim_ticks: AtomicU32::new(0),
            retire_threshold: config.retire_threshold.max(1),
            verbose: config.verbose,
            hazards: HazardRegistry::new(config.hazard_capacity.max(1) * 2),
        }
    }

    /// Push `value` onto the tail of the queue. Never blocks and never
    /// fails: allocation failure aborts the process, matching Rust's
    /// standard allocator-failure handling rather than a recoverable error
    /// (`SPEC_FULL.md` §7).
    pub fn push(&self, value: T) {
        let new_node = Node::boxed(Some(value));
        loop {
            let tail = self.tail.load(Ordering::Acquire);
            // SAFETY: `tail` is always a live node: either the dummy (never
            // freed while the queue exists) or a node reachable from `head`,
            // and reachable nodes are only retired after `head` has already
            // advanced past them (see the module doc and SPEC_FULL.md §9).
            let tail_next = unsafe { (*tail).next.load(Ordering::Acquire) };

            if !tail_next.is_null() {
                // Another producer linked a node but hasn't advanced `tail`
                // yet; help it along and retry from our own fresh read.
                if self.verbose {
                    tracing::trace!("push: helping advance a stalled tail");
                }
                let _ =
                    self.tail
                        .compare_exchange(tail, tail_next, Ordering::AcqRel, Ordering::Relaxed);
                continue;
            }

            let cas = unsafe {
                (*tail).next.compare_exchange(
                    ptr::null_mut(),
                    new_node,
                    Ordering::AcqRel,
                    Ordering::Relaxed,
                )
            };
            if cas.is_ok() {
                // Best-effort: if this loses the race, the next push (or
                // the next dequeue reaching this node) will help it along.
                let _ =
                    self.tail
                        .compare_exchange(tail, new_node, Ordering::AcqRel, Ordering::Relaxed);
                break;
            }
        }
        self.size.fetch_add(1, Ordering::Relaxed);
    }

    /// Pop the value at the front of the queue, or `None` if the queue is
    /// empty or the hazard table is momentarily exhausted for this thread.
    /// Both cases are advisory and retryable — see
    /// [`MpmcQueue::try_pop_raw`] to tell them apart.
    pub fn pop(&self) -> Option<T> {
        self.try_pop_raw().unwrap_or(None)
    }

    /// Like [`MpmcQueue::pop`], but surfaces hazard-table exhaustion as an
    /// explicit error instead of silently folding it into "empty". Most
    /// callers want [`MpmcQueue::pop`]; this exists for diagnostics and for
    /// callers that want to distinguish "nothing to do" from "couldn't even
    /// try".
    pub fn try_pop_raw(&self) -> Result<Option<T>, QueueError> {
        let guard = self.hazards.guard()?;

        loop {
            // Stabilize (old_head, next) under hazard protection before
            // touching either (SPEC_FULL.md §4.2.3 step 2).
            let h = self.head.load(Ordering::Acquire);
            guard.publish(0, h.cast());
            if self.head.load(Ordering::Acquire) != h {
                continue;
            }

            // SAFETY: `h` was just re-confirmed as the live head while
            // protected, so it cannot have been freed.
            let nx = unsafe { (*h).next.load(Ordering::Acquire) };
            guard.publish(1, nx.cast());
            if self.head.load(Ordering::Acquire) != h {
                continue;
            }

            if nx.is_null() {
                guard.clear();
                return Ok(None);
            }

            if self
                .head
                .compare_exchange(h, nx, Ordering::AcqRel, Ordering::Relaxed)
                .is_err()
            {
                continue;
            }

            // SAFETY: we just won the CAS that made `nx` the new dummy; no
            // other thread can be extracting from it concurrently.
            let value = unsafe { (*(*nx).data.get()).take() };
            guard.clear();

            self.retire(h);
            self.size.fetch_sub(1, Ordering::Relaxed);
            self.maybe_sweep();

            return Ok(Some(value.expect(
                "a node reachable as head.next must carry a value (invariant I4)",
            )));
        }
    }

    /// Best-effort, non-linearizable element count. Treat as a hint only —
    /// never gate correctness on it (`SPEC_FULL.md` §5, §9).
    pub fn size(&self) -> isize {
        self.size.load(Ordering::Relaxed)
    }

    /// Cheaper structural alternative to `size() == 0`: true iff the
    /// current head's successor is null.
    pub fn is_empty(&self) -> bool {
        let h = self.head.load(Ordering::Acquire);
        // SAFETY: `head` always points at a live dummy node.
        unsafe { (*h).next.load(Ordering::Acquire).is_null() }
    }

    /// Drain the queue by repeated `pop`, then sweep whatever remains in
    /// the retirement chain.
    pub fn clear(&self) {
        while self.pop().is_some() {}
        self.sweep_retired();
    }

    /// Give back the calling thread's hazard slot so another thread can
    /// claim it, without waiting for the whole registry to be dropped.
    /// Meant for long-lived threads (thread-pool workers) that are about to
    /// exit and know they will never call `pop` again.
    pub fn release_hazard_slot_for_current_thread(&self) {
        self.hazards.release_current_thread();
    }

    fn retire(&self, node: *mut Node<T>) {
        if self.hazards.is_protected(node.cast()) {
            // Loop *until* the CAS succeeds — a historical variant of this
            // algorithm inverted this condition and corrupted the chain
            // under contention (SPEC_FULL.md §9).
            loop {
                let old_head = self.retired.load(Ordering::Acquire);
                // SAFETY: `node` was just unlinked from the live queue by
                // the CAS in `try_pop_raw` and is not reachable from
                // `head`/`tail`, so reusing its `next` field is sound
                // (invariant I3).
                unsafe { (*node).next.store(old_head, Ordering::Release) };
                if self
                    .retired
                    .compare_exchange(old_head, node, Ordering::AcqRel, Ordering::Relaxed)
                    .is_ok()
                {
                    return;
                }
            }
        } else {
            // SAFETY: no hazard slot publishes this node, so no reader can
            // be holding a reference to it (invariant I2).
            unsafe {
                drop(Box::from_raw(node));
            }
        }
    }

    fn maybe_sweep(&self) {
        let ticks = self.reclaim_ticks.fetch_add(1, Ordering::Relaxed) + 1;
        if ticks % self.retire_threshold == 0 {
            self.sweep_retired();
        }
    }

    /// Detach the whole retirement chain and free whatever is no longer
    /// hazard-protected, re-chaining the rest. Wait-free with respect to
    /// producers and consumers of the main queue (`SPEC_FULL.md` §4.2.4).
    fn sweep_retired(&self) {
        let mut current = self.retired.swap(ptr::null_mut(), Ordering::AcqRel);
        while !current.is_null() {
            // SAFETY: nodes on the retirement chain are exclusively owned
            // by the sweep; no other thread mutates their `next` field.
            let next = unsafe { (*current).next.load(Ordering::Acquire) };

            if self.hazards.is_protected(current.cast()) {
                loop {
                    let old_head = self.retired.load(Ordering::Acquire);
                    unsafe { (*current).next.store(old_head, Ordering::Release) };
                    if self
                        .retired
                        .compare_exchange(old_head, current, Ordering::AcqRel, Ordering::Relaxed)
                        .is_ok()
                    {
                        break;
                    }
                }
            } else {
                unsafe {
                    drop(Box::from_raw(current));
                }
            }

            current = next;
        }
    }
}

impl<T> Drop for MpmcQueue<T> {
    fn drop(&mut self) {
        // Draining through `pop` (rather than a naive pointer walk) keeps
        // the hazard-protected extraction path; this still requires the
        // caller to have already quiesced every other thread that might
        // touch the queue (`SPEC_FULL.md` §4.2.5, §5).
        while self.pop().is_some() {}

        let head = self.head.load(Ordering::Relaxed);
        if !head.is_null() {
            unsafe {
                drop(Box::from_raw(head));
            }
        }

        let mut current = self.retired.swap(ptr::null_mut(), Ordering::Relaxed);
        while !current.is_null() {
            // SAFETY: destruction is externally synchronized (no other
            // thread may be operating on the queue), so every retired node
            // can be freed unconditionally regardless of past hazard
            // publication.
            let next = unsafe { (*current).next.load(Ordering::Relaxed) };
            unsafe {
                drop(Box::from_raw(current));
            }
            current = next;
        }
    }
}

// SAFETY: `T: Send` is sufficient (not `Sync`) because at any instant a
// given element is owned either by the producer that hasn't pushed it yet,
// or by the consumer that's about to extract it — never by two threads at
// once.
unsafe impl<T: Send> Send for MpmcQueue<T> {}
unsafe impl<T: Send> Sync for MpmcQueue<T> {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn single_thread_fifo_order() {
        let q = MpmcQueue::new(4);
        for v in 1..=5 {
            q.push(v);
        }
        for v in 1..=5 {
            assert_eq!(q.pop(), Some(v));
        }
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn size_tracks_pushes_and_pops() {
        let q = MpmcQueue::new(4);
        assert_eq!(q.size(), 0);
        q.push(1);
        q.push(2);
        assert_eq!(q.size(), 2);
        q.pop();
        assert_eq!(q.size(), 1);
    }

    #[test]
    fn is_empty_matches_structural_state() {
        let q = MpmcQueue::new(4);
        assert!(q.is_empty());
        q.push(42);
        assert!(!q.is_empty());
        q.pop();
        assert!(q.is_empty());
    }

    #[test]
    fn clear_drains_and_sweeps() {
        let q = MpmcQueue::new(4);
        for v in 0..50 {
            q.push(v);
        }
        q.clear();
        assert_eq!(q.size(), 0);
        assert!(q.is_empty());
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn multi_producer_multi_consumer_preserves_multiset() {
        let q = Arc::new(MpmcQueue::new(8));
        let producers = 4;
        let per_producer = 1000;

        let handles: Vec<_> = (0..producers)
            .map(|p| {
                let q = Arc::clone(&q);
                thread::spawn(move || {
                    for i in 0..per_producer {
                        q.push(p * per_producer + i);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let mut received = Vec::new();
        while let Some(v) = q.pop() {
            received.push(v);
        }
        received.sort_unstable();
        let expected: Vec<_> = (0..producers * per_producer).collect();
        assert_eq!(received, expected);
    }

    #[test]
    fn concurrent_producers_and_consumers_drain_exactly() {
        let q = Arc::new(MpmcQueue::new(16));
        let total_values = 4000usize;
        let produced = Arc::new(AtomicUsize::new(0));

        let producer_threads = 4;
        let per_producer = total_values / producer_threads;

        let mut handles = Vec::new();
        for p in 0..producer_threads {
            let q = Arc::clone(&q);
            let produced = Arc::clone(&produced);
            handles.push(thread::spawn(move || {
                for i in 0..per_producer {
                    q.push(p * per_producer + i);
                    produced.fetch_add(1, Ordering::Relaxed);
                }
            }));
        }

        let collected: Arc<std::sync::Mutex<Vec<usize>>> =
            Arc::new(std::sync::Mutex::new(Vec::new()));
        let consumer_threads = 4;
        for _ in 0..consumer_threads {
            let q = Arc::clone(&q);
            let collected = Arc::clone(&collected);
            let produced = Arc::clone(&produced);
            handles.push(thread::spawn(move || loop {
                match q.pop() {
                    Some(v) => collected.lock().unwrap().push(v),
                    None => {
                        if produced.load(Ordering::Relaxed) >= total_values
                            && q.is_empty()
                        {
                            break;
                        }
                        thread::yield_now();
                    }
                }
            }));
        }

        for h in handles {
            h.join().unwrap();
        }

        let mut received = collected.lock().unwrap().clone();
        received.sort_unstable();
        let expected: Vec<_> = (0..total_values).collect();
        assert_eq!(received, expected);
    }

    #[test]
    fn hazard_table_exhaustion_degrades_to_empty_not_a_crash() {
        let q = Arc::new(MpmcQueue::new(1));
        q.push(1);

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let q = Arc::clone(&q);
                thread::spawn(move || {
                    let mut seen = HashSet::new();
                    for _ in 0..1000 {
                        if let Some(v) = q.pop() {
                            seen.insert(v);
                        }
                    }
                    seen
                })
            })
            .collect();

        let mut all = HashSet::new();
        for h in threads {
            all.extend(h.join().unwrap());
        }
        assert_eq!(all, HashSet::from([1]));
    }

    #[test]
    fn destructor_frees_undelivered_values() {
        let q = MpmcQueue::new(4);
        for v in 0..1000 {
            q.push(v);
        }
        for _ in 0..500 {
            q.pop();
        }
        drop(q);
    }
}
