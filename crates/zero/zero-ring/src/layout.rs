//! Binary layout of a ring region.
//!
//! A ring lives entirely inside one caller-supplied block of memory: a fixed
//! header of five machine words followed directly by the slot array. Nothing
//! else is stored anywhere, so any process that maps the same block sees the
//! same ring.
//!
//! # Memory Layout
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          RingHeader (5W)                         │
//! │  ┌─────────────┬───────────┬────────────┬──────────┬──────────┐  │
//! │  │ initialized │ slot_size │ slot_count │   head   │   tail   │  │
//! │  │     (W)     │    (W)    │    (W)     │   (W)    │   (W)    │  │
//! │  └─────────────┴───────────┴────────────┴──────────┴──────────┘  │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  slot[0]              (slot_size bytes)                          │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  slot[1]                                                         │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ...                                                             │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  slot[slot_count-1]                                              │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `W` is `size_of::<usize>()`. Every header field is an `AtomicUsize`, which
//! has the size and alignment of `usize`, so `#[repr(C)]` places them back to
//! back with no padding and the slot array starts exactly at offset `5W`.

use std::mem::{align_of, size_of};
use std::sync::atomic::AtomicUsize;

/// Width in bytes of one header field.
pub const WORD: usize = size_of::<usize>();

/// Size of the header that precedes the slot array.
pub const HEADER_SIZE: usize = size_of::<RingHeader>();

const _: () = assert!(HEADER_SIZE == 5 * WORD);
const _: () = assert!(align_of::<RingHeader>() == align_of::<usize>());

/// Header at offset 0 of every ring region.
///
/// `head` is written only by the writer and `tail` only by the reader. The
/// remaining fields are written once by `create` and are read-only afterwards.
#[repr(C)]
pub struct RingHeader {
    /// Nonzero once the region has been created.
    pub initialized: AtomicUsize,

    /// Bytes per slot.
    pub slot_size: AtomicUsize,

    /// Declared number of slots. One of them is always kept free.
    pub slot_count: AtomicUsize,

    /// Number of write commits ever performed, plus the initial 1.
    pub head: AtomicUsize,

    /// Number of read commits ever performed.
    pub tail: AtomicUsize,
}

/// Total bytes a region must provide for a ring of `slot_count` slots of
/// `slot_size` bytes each.
///
/// Allocate or map at least this many bytes before creating or attaching.
/// Handing the raw-pointer constructors a smaller block corrupts whatever
/// memory follows it.
///
/// ```
/// use zero_ring::{HEADER_SIZE, storage_size};
/// assert_eq!(storage_size(4, 4), HEADER_SIZE + 16);
/// ```
pub const fn storage_size(slot_size: usize, slot_count: usize) -> usize {
    slot_size * slot_count + HEADER_SIZE
}

/// Reasons a block of memory cannot host a ring.
///
/// Only the checked, slice-based constructors report these. The raw-pointer
/// constructors trust their caller completely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LayoutError {
    #[error("slot size must be nonzero")]
    ZeroSlotSize,

    #[error("a ring needs at least 2 slots, got {slot_count}")]
    TooFewSlots { slot_count: usize },

    #[error("storage size overflows usize ({slot_size} x {slot_count} slots)")]
    SizeOverflow { slot_size: usize, slot_count: usize },

    #[error("storage at {addr:#x} is not aligned to {align} bytes")]
    Misaligned { addr: usize, align: usize },

    #[error("storage too small: need {needed} bytes, got {actual}")]
    TooSmall { needed: usize, actual: usize },

    #[error("region has not been created")]
    Uninitialized,

    #[error("slot size mismatch: expected {expected} bytes, region holds {actual}")]
    SlotSizeMismatch { expected: usize, actual: usize },
}

/// Validates ring parameters and returns the storage size they need.
pub(crate) fn checked_storage_size(
    slot_size: usize,
    slot_count: usize,
) -> Result<usize, LayoutError> {
    if slot_size == 0 {
        return Err(LayoutError::ZeroSlotSize);
    }
    if slot_count < 2 {
        return Err(LayoutError::TooFewSlots { slot_count });
    }
    slot_size
        .checked_mul(slot_count)
        .and_then(|slots| slots.checked_add(HEADER_SIZE))
        .ok_or(LayoutError::SizeOverflow {
            slot_size,
            slot_count,
        })
}

/// Checks that `storage` is word-aligned and holds at least `needed` bytes.
pub(crate) fn check_region(storage: &[u8], needed: usize) -> Result<(), LayoutError> {
    let addr = storage.as_ptr() as usize;
    if addr % align_of::<RingHeader>() != 0 {
        return Err(LayoutError::Misaligned {
            addr,
            align: align_of::<RingHeader>(),
        });
    }
    if storage.len() < needed {
        return Err(LayoutError::TooSmall {
            needed,
            actual: storage.len(),
        });
    }
    Ok(())
}
