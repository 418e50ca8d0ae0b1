//! Hazard-pointer registry (HPR).
//!
//! A thread that wants to dereference a node it only reached through a
//! racy atomic load publishes the node's address into a slot here first,
//! then re-checks the source it loaded it from. If the source still agrees,
//! no concurrent reclaimer can have freed the node out from under it,
//! because reclamation always checks this table before freeing (see
//! `SPEC_FULL.md` §9, "Cyclic ownership via hazard publication").
//!
//! This mirrors the original `HazardPoint`/`HazardPointManager` pair this
//! crate's queue is descended from, ported from per-thread mutex-guarded
//! bookkeeping to a lock-free table of atomics: a slot's `owner` is a CAS
//! target instead of a `Mutex<Vec<_>>` entry, and `protect`/`is_protected`
//! never block.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicU64, Ordering};
use std::thread;

use crossbeam_utils::CachePadded;

use crate::error::QueueError;

/// Sentinel meaning "no thread owns this slot".
const UNOWNED: u64 = 0;

fn thread_identity() -> u64 {
    // `ThreadId` has no stable numeric accessor, so each thread mints its
    // own non-zero identity once and reuses it for the rest of its life.
    thread_local! {
        static IDENTITY: u64 = {
            static NEXT: AtomicU64 = AtomicU64::new(1);
            NEXT.fetch_add(1, Ordering::Relaxed)
        };
    }
    IDENTITY.with(|id| *id)
}

/// One per-thread hazard slot: an owner tag plus the two pointers a `pop`
/// in flight needs to protect simultaneously (the observed head and its
/// successor — see `SPEC_FULL.md` §4.1, "Two hazard slots per thread").
///
/// Cache-line aligned so that two threads spinning on neighboring slots
/// don't thrash each other's cache lines with false sharing.
struct HazardSlot {
    owner: AtomicU64,
    protect: [AtomicPtr<()>; 2],
}

impl HazardSlot {
    fn new() -> Self {
        Self {
            owner: AtomicU64::new(UNOWNED),
            protect: [
                AtomicPtr::new(std::ptr::null_mut()),
                AtomicPtr::new(std::ptr::null_mut()),
            ],
        }
    }
}

/// Fixed-size table of hazard slots shared by every thread operating on a
/// queue. Lifetime is tied to the owning queue.
pub(crate) struct HazardRegistry {
    slots: Box<[CachePadded<HazardSlot>]>,
    exhausted_warned: AtomicBool,
}

impl HazardRegistry {
    /// `capacity` is the final slot count (already doubled by the caller).
    pub(crate) fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || CachePadded::new(HazardSlot::new()));
        Self {
            slots: slots.into_boxed_slice(),
            exhausted_warned: AtomicBool::new(false),
        }
    }

    /// Acquire this thread's slot, allocating one on first use.
    ///
    /// Returns `Err(QueueError::HazardTableExhausted)` if every slot is
    /// already owned by some other thread. Callers almost always want the
    /// RAII wrapper, [`HazardRegistry::guard`], instead of this directly.
    fn acquire(&self) -> Result<usize, QueueError> {
        let me = thread_identity();

        if let Some(idx) = self
            .slots
            .iter()
            .position(|slot| slot.owner.load(Ordering::Acquire) == me)
        {
            return Ok(idx);
        }

        for (idx, slot) in self.slots.iter().enumerate() {
            if slot
                .owner
                .compare_exchange(UNOWNED, me, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                slot.protect[0].store(std::ptr::null_mut(), Ordering::Release);
                slot.protect[1].store(std::ptr::null_mut(), Ordering::Release);
                return Ok(idx);
            }
        }

        if !self.exhausted_warned.swap(true, Ordering::Relaxed) {
            tracing::debug!(capacity = self.slots.len(), "hazard table exhausted");
        }
        Err(QueueError::HazardTableExhausted)
    }

    /// Publish `ptr` into this thread's `protect[which]` cell (release).
    pub(crate) fn publish(&self, slot: usize, which: usize, ptr: *mut ()) {
        self.slots[slot].protect[which].store(ptr, Ordering::Release);
    }

    /// Clear both of this thread's protect cells.
    pub(crate) fn clear(&self, slot: usize) {
        self.slots[slot].protect[0].store(std::ptr::null_mut(), Ordering::Release);
        self.slots[slot].protect[1].store(std::ptr::null_mut(), Ordering::Release);
    }

    /// Release this thread's slot back to the free pool.
    fn release(&self, slot: usize) {
        self.slots[slot].protect[0].store(std::ptr::null_mut(), Ordering::Release);
        self.slots[slot].protect[1].store(std::ptr::null_mut(), Ordering::Release);
        self.slots[slot].owner.store(UNOWNED, Ordering::Release);
    }

    /// True iff any slot currently publishes `ptr`, under acquire loads so
    /// a publish from any thread happens-before this check returns.
    pub(crate) fn is_protected(&self, ptr: *mut ()) -> bool {
        self.slots.iter().any(|slot| {
            slot.protect[0].load(Ordering::Acquire) == ptr
                || slot.protect[1].load(Ordering::Acquire) == ptr
        })
    }

    /// Acquire a slot for the calling thread and wrap it in an RAII guard
    /// that releases it on drop, so a panicking or early-returning caller
    /// can never leak a slot (ties §4.1's RAII guard note to I5).
    pub(crate) fn guard(&self) -> Result<HazardGuard<'_>, QueueError> {
        let slot = self.acquire()?;
        Ok(HazardGuard {
            registry: self,
            slot,
            _not_send_across_acquire: PhantomData,
        })
    }
}

/// RAII handle to an owned hazard slot. Dropping it clears and releases the
/// slot; it does not detach the slot from the thread early, so re-entrant
/// calls on the same thread observe the same slot (see `acquire` step 1).
pub(crate) struct HazardGuard<'a> {
    registry: &'a HazardRegistry,
    slot: usize,
    _not_send_across_acquire: PhantomData<*const ()>,
}

impl<'a> HazardGuard<'a> {
    pub(crate) fn publish(&self, which: usize, ptr: *mut ()) {
        self.registry.publish(self.slot, which, ptr);
    }

    pub(crate) fn clear(&self) {
        self.registry.clear(self.slot);
    }
}

impl<'a> Drop for HazardGuard<'a> {
    fn drop(&mut self) {
        self.registry.clear(self.slot);
        // Slots are retained per-thread (see `acquire`'s first scan) rather
        // than eagerly released on every guard drop: a thread that pops in
        // a tight loop would otherwise re-acquire the same slot on every
        // call, which is safe but wastes a full table scan each time. A
        // thread that truly wants to give its slot back calls
        // `HazardRegistry::release_current_thread` explicitly (e.g. a
        // thread-pool worker that is about to exit).
    }
}

impl HazardRegistry {
    /// Explicitly release the calling thread's slot, independent of any
    /// live [`HazardGuard`]. Used by long-lived threads (thread-pool
    /// workers) that know they are done touching the queue for good, so
    /// the slot becomes available to a freshly spawned thread instead of
    /// sitting idle until the table fills up (P5).
    pub(crate) fn release_current_thread(&self) {
        let me = thread_identity();
        if let Some(idx) = self
            .slots
            .iter()
            .position(|slot| slot.owner.load(Ordering::Acquire) == me)
        {
            self.release(idx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn acquire_then_reacquire_same_thread_returns_same_slot() {
        let reg = HazardRegistry::new(4);
        let g1 = reg.guard().unwrap();
        let slot1 = g1.slot;
        drop(g1);
        let g2 = reg.guard().unwrap();
        assert_eq!(slot1, g2.slot);
    }

    #[test]
    fn table_exhaustion_is_reported_and_recoverable() {
        let reg = Arc::new(HazardRegistry::new(1));
        let _g1 = reg.guard().unwrap();

        let reg2 = Arc::clone(&reg);
        let handle = thread::spawn(move || reg2.acquire().is_err());
        assert!(handle.join().unwrap());
    }

    #[test]
    fn publish_is_visible_via_is_protected() {
        let reg = HazardRegistry::new(2);
        let guard = reg.guard().unwrap();
        let marker = 0x1234usize as *mut ();
        guard.publish(0, marker);
        assert!(reg.is_protected(marker));
        guard.clear();
        assert!(!reg.is_protected(marker));
    }

    #[test]
    fn release_current_thread_frees_the_slot_for_others() {
        let reg = Arc::new(HazardRegistry::new(1));
        let guard = reg.guard().unwrap();
        drop(guard);
        reg.release_current_thread();

        let reg2 = Arc::clone(&reg);
        let handle = thread::spawn(move || reg2.guard().is_ok());
        assert!(handle.join().unwrap());
    }
}
