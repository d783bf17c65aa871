//! Element-typed view over the raw engine.
//!
//! [`RingBuffer<T>`] fixes the slot size to `size_of::<T>()` and hands out
//! `NonNull<T>` instead of byte pointers. It owns one [`RawRingBuffer`] and
//! forwards everything to it; there is no extra state.
//!
//! Dropping a `RingBuffer` destroys the ring it is bound to, the same as
//! calling [`destroy`](RingBuffer::destroy). A view that must leave the
//! shared region intact (the reader of a ring some other process owns, say)
//! gives up its handle with [`into_raw`](RingBuffer::into_raw) instead.

use crate::layout::{LayoutError, storage_size};
use crate::raw::RawRingBuffer;
use std::cell::Cell;
use std::marker::PhantomData;
use std::mem::{align_of, size_of};
use std::ptr::NonNull;

/// Types that can be copied in and out of shared slots bit for bit.
///
/// # Safety
/// Every bit pattern of `size_of::<Self>()` bytes must be a valid `Self`, and
/// the type must not own resources (pointers, handles) that mean nothing in
/// another address space. Plain integers, floats, and `#[repr(C)]` structs or
/// arrays made of them qualify.
pub unsafe trait Pod: Copy + 'static {}

macro_rules! impl_pod {
    ($($t:ty),* $(,)?) => {
        $(unsafe impl Pod for $t {})*
    };
}

impl_pod!(u8, u16, u32, u64, usize, i8, i16, i32, i64, isize, f32, f64);

unsafe impl<T: Pod, const N: usize> Pod for [T; N] {}

/// A ring whose slots hold one `T` each.
///
/// `Send` but not `Sync`. Staging and committing take `&mut self`, so one
/// value drives both ends; to run the writer and the reader on different
/// threads, [`split`](Self::split) it.
///
/// ```compile_fail
/// fn shared_across_threads<S: Sync>() {}
/// shared_across_threads::<zero_ring::RingBuffer<'static, u64>>();
/// ```
pub struct RingBuffer<'a, T> {
    raw: Option<RawRingBuffer<'a>>,
    _pd: PhantomData<(T, Cell<()>)>,
}

impl<'a, T> RingBuffer<'a, T> {
    /// Slot size for `T`, checked when the type is first used.
    ///
    /// Slots start at `HEADER_SIZE + i * size_of::<T>()` from a word-aligned
    /// base, which is aligned for `T` only if `T` needs no more than word
    /// alignment.
    const SLOT_SIZE: usize = {
        assert!(size_of::<T>() > 0, "zero-sized slot types are not supported");
        assert!(
            align_of::<T>() <= align_of::<usize>(),
            "slot type must not need more than word alignment"
        );
        size_of::<T>()
    };

    /// Bytes needed for a ring of `slot_count` slots of `T`.
    pub const fn storage_size(slot_count: usize) -> usize {
        storage_size(Self::SLOT_SIZE, slot_count)
    }

    /// Creates (or joins) a ring of `T` in raw storage.
    ///
    /// Aborts the process if the region already holds a ring with a different
    /// slot size or slot count.
    ///
    /// # Safety
    /// Same contract as [`RawRingBuffer::create`], with
    /// `slot_size = size_of::<T>()`.
    pub unsafe fn create(storage: *mut u8, slot_count: usize) -> Self {
        // SAFETY: forwarded from the caller.
        Self::from_raw(unsafe { RawRingBuffer::create(storage, Self::SLOT_SIZE, slot_count) })
    }

    /// Binds to a ring of `T` in raw storage.
    ///
    /// # Safety
    /// Same contract as [`RawRingBuffer::attach`]; the region must also have
    /// been created with `slot_size = size_of::<T>()`.
    pub unsafe fn attach(storage: *mut u8) -> Self {
        let _ = Self::SLOT_SIZE;
        // SAFETY: forwarded from the caller.
        Self::from_raw(unsafe { RawRingBuffer::attach(storage) })
    }

    /// Checked [`create`](Self::create) over a borrowed byte slice.
    pub fn create_in(storage: &'a mut [u8], slot_count: usize) -> Result<Self, LayoutError> {
        RawRingBuffer::create_in(storage, Self::SLOT_SIZE, slot_count).map(Self::from_raw)
    }

    /// Checked [`attach`](Self::attach) over a borrowed byte slice.
    ///
    /// Also rejects a region whose slot size is not `size_of::<T>()`.
    pub fn attach_in(storage: &'a mut [u8]) -> Result<Self, LayoutError> {
        let raw = RawRingBuffer::attach_in(storage)?;
        if raw.slot_size() != Self::SLOT_SIZE {
            return Err(LayoutError::SlotSizeMismatch {
                expected: Self::SLOT_SIZE,
                actual: raw.slot_size(),
            });
        }
        Ok(Self::from_raw(raw))
    }

    fn from_raw(raw: RawRingBuffer<'a>) -> Self {
        Self {
            raw: Some(raw),
            _pd: PhantomData,
        }
    }

    /// The engine view, unless this ring has been destroyed.
    pub fn raw(&self) -> Option<&RawRingBuffer<'a>> {
        self.raw.as_ref()
    }

    /// Gives up the engine view without destroying the ring.
    pub fn into_raw(mut self) -> Option<RawRingBuffer<'a>> {
        self.raw.take()
    }

    pub fn initialized(&self) -> bool {
        self.raw.as_ref().is_some_and(RawRingBuffer::initialized)
    }

    pub fn used(&self) -> usize {
        self.raw.as_ref().map_or(0, RawRingBuffer::used)
    }

    pub fn available(&self) -> usize {
        self.raw.as_ref().map_or(0, RawRingBuffer::available)
    }

    pub fn writable(&self) -> usize {
        self.raw.as_ref().map_or(0, RawRingBuffer::writable)
    }

    pub fn size(&self) -> usize {
        self.raw.as_ref().map_or(0, RawRingBuffer::size)
    }

    pub fn empty(&self) -> bool {
        self.raw.as_ref().is_none_or(RawRingBuffer::empty)
    }

    pub fn full(&self) -> bool {
        self.raw.as_ref().is_some_and(RawRingBuffer::full)
    }

    /// Oldest unread element, in place. `None` if empty.
    pub fn stage_read(&mut self) -> Option<NonNull<T>> {
        self.raw.as_ref()?.stage_read().map(NonNull::cast)
    }

    /// Next free element, in place. `None` if full.
    pub fn stage_write(&mut self) -> Option<NonNull<T>> {
        self.raw.as_ref()?.stage_write().map(NonNull::cast)
    }

    pub fn commit_read(&mut self) -> bool {
        self.raw.as_ref().is_some_and(RawRingBuffer::commit_read)
    }

    pub fn commit_write(&mut self) -> bool {
        self.raw.as_ref().is_some_and(RawRingBuffer::commit_write)
    }

    /// Splits the ring into a writer half and a reader half for two threads.
    ///
    /// Both halves borrow the ring, so it cannot be destroyed or dropped
    /// while either is alive. `None` once the ring has been destroyed.
    pub fn split(&mut self) -> Option<(Producer<'_, 'a, T>, Consumer<'_, 'a, T>)> {
        let raw = self.raw.as_ref()?;
        let producer = Producer {
            raw: raw.alias(),
            _ring: PhantomData,
        };
        let consumer = Consumer {
            raw: raw.alias(),
            _ring: PhantomData,
        };
        Some((producer, consumer))
    }

    /// Destroys the ring and releases the view. Safe to call repeatedly.
    pub fn destroy(&mut self) {
        if let Some(raw) = self.raw.take() {
            raw.destroy();
        }
    }
}

impl<T: Pod> RingBuffer<'_, T> {
    /// Copies `value` into the next free slot and publishes it.
    ///
    /// Hands `value` back if the ring is full.
    pub fn try_push(&mut self, value: T) -> Result<(), T> {
        match &self.raw {
            Some(raw) => push(raw, value),
            None => Err(value),
        }
    }

    /// Copies the oldest element out and releases its slot.
    pub fn try_pop(&mut self) -> Option<T> {
        pop(self.raw.as_ref()?)
    }
}

/// Stage, copy in, commit. The caller must be the only writer.
fn push<T: Pod>(raw: &RawRingBuffer<'_>, value: T) -> Result<(), T> {
    let Some(slot) = raw.stage_write() else {
        return Err(value);
    };
    // SAFETY: the staged slot is aligned for T, sized for T, and owned by the
    // writer until it is committed.
    unsafe { slot.cast::<T>().write(value) };
    let committed = raw.commit_write();
    // Only the reader moves tail, and that can only make room.
    debug_assert!(committed, "staged slot vanished before commit");
    Ok(())
}

/// Stage, copy out, commit. The caller must be the only reader.
fn pop<T: Pod>(raw: &RawRingBuffer<'_>) -> Option<T> {
    let slot = raw.stage_read()?;
    // SAFETY: the staged slot is aligned and sized for T, and any bit pattern
    // is a valid T.
    let value = unsafe { slot.cast::<T>().read() };
    let committed = raw.commit_read();
    // Only the writer moves head, and that can only add data.
    debug_assert!(committed, "staged slot vanished before commit");
    Some(value)
}

/// Writer half of a [`split`](RingBuffer::split) ring.
///
/// `Send` but not `Sync`: exactly one thread writes.
pub struct Producer<'r, 'a, T> {
    raw: RawRingBuffer<'a>,
    _ring: PhantomData<&'r mut RingBuffer<'a, T>>,
}

impl<T> Producer<'_, '_, T> {
    pub fn stage_write(&mut self) -> Option<NonNull<T>> {
        self.raw.stage_write().map(NonNull::cast)
    }

    pub fn commit_write(&mut self) -> bool {
        self.raw.commit_write()
    }

    pub fn writable(&self) -> usize {
        self.raw.writable()
    }

    pub fn full(&self) -> bool {
        self.raw.full()
    }
}

impl<T: Pod> Producer<'_, '_, T> {
    pub fn try_push(&mut self, value: T) -> Result<(), T> {
        push(&self.raw, value)
    }
}

/// Reader half of a [`split`](RingBuffer::split) ring.
///
/// `Send` but not `Sync`: exactly one thread reads.
pub struct Consumer<'r, 'a, T> {
    raw: RawRingBuffer<'a>,
    _ring: PhantomData<&'r mut RingBuffer<'a, T>>,
}

impl<T> Consumer<'_, '_, T> {
    pub fn stage_read(&mut self) -> Option<NonNull<T>> {
        self.raw.stage_read().map(NonNull::cast)
    }

    pub fn commit_read(&mut self) -> bool {
        self.raw.commit_read()
    }

    pub fn used(&self) -> usize {
        self.raw.used()
    }

    pub fn empty(&self) -> bool {
        self.raw.empty()
    }
}

impl<T: Pod> Consumer<'_, '_, T> {
    pub fn try_pop(&mut self) -> Option<T> {
        pop(&self.raw)
    }
}

impl<T> Drop for RingBuffer<'_, T> {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl<T> std::fmt::Debug for RingBuffer<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("elem", &std::any::type_name::<T>())
            .field("raw", &self.raw)
            .finish()
    }
}
