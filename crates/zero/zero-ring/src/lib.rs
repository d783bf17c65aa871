mod index;
mod layout;
mod raw;
mod typed;

pub use index::slot_index;
pub use layout::{HEADER_SIZE, LayoutError, RingHeader, WORD, storage_size};
pub use raw::RawRingBuffer;
pub use typed::{Consumer, Pod, Producer, RingBuffer};
