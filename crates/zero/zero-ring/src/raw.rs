//! Untyped, byte-addressed SPSC ring engine.
//!
//! A [`RawRingBuffer`] is a view over a ring region laid out as described in
//! [`crate::layout`]. The view itself holds nothing but the base pointer; all
//! state lives in the region, so several views (one per process, say) can be
//! bound to the same memory.
//!
//! # Protocol
//!
//! Every transfer is two-phase and copies nothing:
//!
//! **Writer:**
//! 1. `stage_write()` returns the next free slot, or `None` if the ring is full
//! 2. Fill the slot in place
//! 3. `commit_write()` publishes it by advancing `head`
//!
//! **Reader:**
//! 1. `stage_read()` returns the oldest unread slot, or `None` if empty
//! 2. Consume the slot in place
//! 3. `commit_read()` releases it by advancing `tail`
//!
//! # Concurrency
//!
//! Exactly one writer and one reader. The writer is the only one to store
//! `head`, the reader the only one to store `tail`; each only loads the
//! other's counter. Commits store with `Release` and the peer loads with
//! `Acquire`, so slot bytes written before `commit_write` are visible to a
//! reader that observes the new `head`, and a slot is not handed back to the
//! writer until the reader's `commit_read` has been observed.

use crate::index;
use crate::layout::{self, HEADER_SIZE, LayoutError, RingHeader};
use std::fmt;
use std::marker::PhantomData;
use std::ptr::NonNull;
use std::sync::atomic::Ordering::{Acquire, Relaxed, Release};
use tracing::{debug, error, trace};

/// A view bound to a ring region.
///
/// `'a` is the lifetime of the borrowed storage when the view comes from
/// [`create_in`](Self::create_in) / [`attach_in`](Self::attach_in). Views made
/// from raw pointers pick any lifetime; keeping the storage alive is then the
/// caller's job.
pub struct RawRingBuffer<'a> {
    base: NonNull<u8>,
    _storage: PhantomData<&'a mut [u8]>,
}

// SAFETY: every piece of shared state is an atomic in the region. Slot memory
// is only reachable through the raw pointers handed out by `stage_*`, and
// dereferencing those is already `unsafe` for the caller.
unsafe impl Send for RawRingBuffer<'_> {}
unsafe impl Sync for RawRingBuffer<'_> {}

impl<'a> RawRingBuffer<'a> {
    /// Creates a ring in `storage`, or joins the one already there.
    ///
    /// If the region is not yet initialized, the header is written with
    /// `head = 1, tail = 0` and the given geometry. If it is, and the stored
    /// geometry matches, the call just binds to it and leaves the counters
    /// alone.
    ///
    /// If the region is initialized with a *different* `slot_size` or
    /// `slot_count`, the process is aborted. Both sides disagree about the
    /// layout of memory they share, and no access to it can be trusted.
    ///
    /// # Safety
    /// - `storage` must be non-null, aligned to `usize`, and valid for reads
    ///   and writes of `storage_size(slot_size, slot_count)` initialized bytes
    ///   for as long as the returned view is used.
    /// - `slot_size` must be nonzero and `slot_count` at least 2.
    /// - If `slot_count` is not a power of two, the counters must never pass
    ///   `usize::MAX`: across that wrap two unread counters can address the
    ///   same slot and a write overwrites data the reader has not consumed.
    /// - No other view may be running `create` or `destroy` on the region at
    ///   the same time.
    pub unsafe fn create(storage: *mut u8, slot_size: usize, slot_count: usize) -> Self {
        // SAFETY: forwarded from the caller.
        let ring = unsafe { Self::attach(storage) };
        let h = ring.header();

        if h.initialized.load(Acquire) == 0 {
            h.head.store(1, Relaxed);
            h.tail.store(0, Relaxed);
            h.slot_size.store(slot_size, Relaxed);
            h.slot_count.store(slot_count, Relaxed);
            h.initialized.store(1, Release);
            debug!(slot_size, slot_count, "ring created");
        } else {
            let stored_size = h.slot_size.load(Relaxed);
            let stored_count = h.slot_count.load(Relaxed);
            if stored_size != slot_size || stored_count != slot_count {
                error!(
                    stored_size,
                    stored_count,
                    slot_size,
                    slot_count,
                    "ring layout mismatch, aborting"
                );
                std::process::abort();
            }
            trace!(slot_size, slot_count, "ring already created, joining");
        }

        ring
    }

    /// Binds a view to an existing region without reading or writing it.
    ///
    /// # Safety
    /// `storage` must be non-null, aligned to `usize`, and point at a region
    /// previously set up by [`create`](Self::create) that stays mapped for as
    /// long as the view is used. Nothing is validated.
    pub unsafe fn attach(storage: *mut u8) -> Self {
        Self {
            // SAFETY: non-null per the caller's contract.
            base: unsafe { NonNull::new_unchecked(storage) },
            _storage: PhantomData,
        }
    }

    /// Checked [`create`](Self::create) over a borrowed byte slice.
    ///
    /// Fails instead of corrupting memory when the parameters are invalid or
    /// the slice is misaligned or too short. A geometry mismatch with an
    /// already created region still aborts.
    pub fn create_in(
        storage: &'a mut [u8],
        slot_size: usize,
        slot_count: usize,
    ) -> Result<Self, LayoutError> {
        let needed = layout::checked_storage_size(slot_size, slot_count)?;
        layout::check_region(storage, needed)?;
        // SAFETY: the slice is aligned, large enough, initialized, and
        // exclusively borrowed for 'a.
        Ok(unsafe { Self::create(storage.as_mut_ptr(), slot_size, slot_count) })
    }

    /// Checked [`attach`](Self::attach) over a borrowed byte slice.
    ///
    /// Verifies that the header fits, that the region has been created, and
    /// that the slot array it declares fits in the slice.
    pub fn attach_in(storage: &'a mut [u8]) -> Result<Self, LayoutError> {
        layout::check_region(storage, HEADER_SIZE)?;
        // SAFETY: the header fits in the aligned slice, and every header field
        // is an atomic valid for any bit pattern.
        let ring = unsafe { Self::attach(storage.as_mut_ptr()) };
        if !ring.initialized() {
            return Err(LayoutError::Uninitialized);
        }
        let needed = layout::checked_storage_size(ring.slot_size(), ring.slot_count())?;
        layout::check_region(storage, needed)?;
        Ok(ring)
    }

    /// A second view of the same region, for handing one end to another thread.
    pub(crate) fn alias(&self) -> RawRingBuffer<'a> {
        RawRingBuffer {
            base: self.base,
            _storage: PhantomData,
        }
    }

    #[inline(always)]
    fn header(&self) -> &RingHeader {
        // SAFETY: base points at a word-aligned region that starts with a header.
        unsafe { self.base.cast::<RingHeader>().as_ref() }
    }

    /// Pointer to the slot addressed by `counter`.
    #[inline(always)]
    fn slot(&self, counter: usize) -> NonNull<u8> {
        let h = self.header();
        let slot_size = h.slot_size.load(Relaxed);
        let idx = index::slot_index(counter, h.slot_count.load(Relaxed));
        // SAFETY: idx < slot_count, so the offset stays inside the region.
        unsafe { self.base.add(HEADER_SIZE + idx * slot_size) }
    }

    /// Loads `(head, tail)`.
    ///
    /// `tail` is read first. `head` only grows and is always ahead of `tail`,
    /// so the snapshot never reports a negative occupancy.
    #[inline(always)]
    fn counters(&self) -> (usize, usize) {
        let h = self.header();
        let tail = h.tail.load(Acquire);
        let head = h.head.load(Acquire);
        (head, tail)
    }

    /// True once the region has been created and not destroyed since.
    #[inline]
    pub fn initialized(&self) -> bool {
        self.header().initialized.load(Acquire) != 0
    }

    #[inline]
    pub fn slot_size(&self) -> usize {
        self.header().slot_size.load(Relaxed)
    }

    #[inline]
    pub fn slot_count(&self) -> usize {
        self.header().slot_count.load(Relaxed)
    }

    /// Current value of the write-commit counter.
    #[inline]
    pub fn head(&self) -> usize {
        self.header().head.load(Acquire)
    }

    /// Current value of the read-commit counter.
    #[inline]
    pub fn tail(&self) -> usize {
        self.header().tail.load(Acquire)
    }

    /// Slot index addressed by a counter value.
    #[inline]
    pub fn slot_index(&self, counter: usize) -> usize {
        index::slot_index(counter, self.slot_count())
    }

    /// Slots holding committed data the reader has not consumed yet,
    /// `head - tail - 1`.
    #[inline]
    pub fn used(&self) -> usize {
        let (head, tail) = self.counters();
        index::used(head, tail)
    }

    /// `slot_count - used()`.
    ///
    /// This counts the reserved slot too, so on an empty ring it equals
    /// `slot_count`. Use [`writable`](Self::writable) for the number of slots
    /// the writer can still fill.
    #[inline]
    pub fn available(&self) -> usize {
        self.slot_count().saturating_sub(self.used())
    }

    /// Slots the writer can still fill before the ring is full.
    #[inline]
    pub fn writable(&self) -> usize {
        self.size().saturating_sub(self.used())
    }

    /// Usable capacity, `slot_count - 1`.
    #[inline]
    pub fn size(&self) -> usize {
        self.slot_count().saturating_sub(1)
    }

    #[inline]
    pub fn empty(&self) -> bool {
        let (head, tail) = self.counters();
        index::is_empty(head, tail)
    }

    #[inline]
    pub fn full(&self) -> bool {
        let (head, tail) = self.counters();
        index::is_full(head, tail, self.slot_count())
    }

    /// Locates the oldest unread slot without consuming it.
    ///
    /// Returns `None` when the ring is empty. The pointer is valid for
    /// `slot_size()` bytes until the matching [`commit_read`](Self::commit_read).
    #[inline]
    pub fn stage_read(&self) -> Option<NonNull<u8>> {
        let h = self.header();
        let tail = h.tail.load(Relaxed);
        let head = h.head.load(Acquire);
        if index::is_empty(head, tail) {
            return None;
        }
        Some(self.slot(tail.wrapping_add(1)))
    }

    /// Locates the next free slot without publishing it.
    ///
    /// Returns `None` when the ring is full. The pointer is valid for
    /// `slot_size()` bytes until the matching [`commit_write`](Self::commit_write).
    #[inline]
    pub fn stage_write(&self) -> Option<NonNull<u8>> {
        let h = self.header();
        let head = h.head.load(Relaxed);
        let tail = h.tail.load(Acquire);
        if index::is_full(head, tail, h.slot_count.load(Relaxed)) {
            return None;
        }
        Some(self.slot(head))
    }

    /// Releases the slot returned by the last `stage_read` back to the writer.
    ///
    /// Returns `false` if the ring is empty. Call only after the slot's
    /// contents are no longer needed.
    #[inline]
    pub fn commit_read(&self) -> bool {
        let h = self.header();
        let tail = h.tail.load(Relaxed);
        let head = h.head.load(Acquire);
        if index::is_empty(head, tail) {
            return false;
        }
        h.tail.store(tail.wrapping_add(1), Release);
        true
    }

    /// Publishes the slot returned by the last `stage_write` to the reader.
    ///
    /// Returns `false` if the ring is full. Call only after the slot has been
    /// completely written.
    #[inline]
    pub fn commit_write(&self) -> bool {
        let h = self.header();
        let head = h.head.load(Relaxed);
        let tail = h.tail.load(Acquire);
        if index::is_full(head, tail, h.slot_count.load(Relaxed)) {
            return false;
        }
        h.head.store(head.wrapping_add(1), Release);
        true
    }

    /// Tears the ring down and drops the view.
    ///
    /// Clears the initialized flag and resets the ring to empty
    /// (`head = tail + 1`). Does nothing to a region that is not initialized.
    /// The other side must not be staging or committing while this runs.
    pub fn destroy(self) {
        let h = self.header();
        if h.initialized.load(Acquire) != 0 {
            h.initialized.store(0, Release);
            let tail = h.tail.load(Relaxed);
            h.head.store(tail.wrapping_add(1), Release);
            debug!(tail, "ring destroyed");
        }
    }
}

impl fmt::Debug for RawRingBuffer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (head, tail) = self.counters();
        // A view that owns neither counter can load a stale tail; clamp for display.
        let used = index::used(head, tail).min(self.size());
        f.debug_struct("RawRingBuffer")
            .field("base", &self.base)
            .field("initialized", &self.initialized())
            .field("slot_size", &self.slot_size())
            .field("slot_count", &self.slot_count())
            .field("head", &head)
            .field("tail", &tail)
            .field("used", &used)
            .finish()
    }
}
