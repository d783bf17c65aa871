//! Counter arithmetic shared by the writer and the reader.
//!
//! `head` and `tail` are never wrapped into `[0, slot_count)`; they simply
//! count commits. Only the slot index derived from them wraps. All arithmetic
//! on the counters themselves is modular (`wrapping_*`), so the distance
//! `head - tail` stays correct even after either counter overflows `usize`.
//!
//! A freshly created ring has `head = 1, tail = 0`. The extra 1 in `head` is
//! the slot that is always kept free so that full and empty can be told apart
//! without a separate flag:
//!
//! ```text
//! slot_count = 4
//!
//! head - tail = 1  → used 0  (empty)
//! head - tail = 2  → used 1
//! head - tail = 3  → used 2
//! head - tail = 4  → used 3  (full, capacity = slot_count - 1)
//! ```

/// Maps a commit counter to the slot it addresses.
///
/// The writer's next slot is `slot_index(head)`, the reader's next slot is
/// `slot_index(tail + 1)`.
///
/// When `slot_count` is a power of two the mapping stays continuous across a
/// `usize` overflow of the counter. For other counts it does not:
/// `usize::MAX % slot_count` and `0 % slot_count` can be the same slot, so
/// once the counters cross the wrap a write lands on a slot still holding
/// unread data. Rings with such counts must not run `2^W` commits.
#[inline(always)]
pub fn slot_index(counter: usize, slot_count: usize) -> usize {
    counter % slot_count
}

/// Distance between the counters, `head - tail`.
#[inline(always)]
pub fn in_flight(head: usize, tail: usize) -> usize {
    head.wrapping_sub(tail)
}

/// Slots holding committed, unconsumed data.
#[inline(always)]
pub fn used(head: usize, tail: usize) -> usize {
    in_flight(head, tail).wrapping_sub(1)
}

#[inline(always)]
pub fn is_empty(head: usize, tail: usize) -> bool {
    used(head, tail) == 0
}

/// True when no further write may proceed.
///
/// Under the ring invariant `head - tail` never exceeds `slot_count`; `>=`
/// also covers snapshots taken by a view that owns neither counter.
#[inline(always)]
pub fn is_full(head: usize, tail: usize, slot_count: usize) -> bool {
    in_flight(head, tail) >= slot_count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_counters_are_empty() {
        assert_eq!(used(1, 0), 0);
        assert!(is_empty(1, 0));
        assert!(!is_full(1, 0, 4));
    }

    #[test]
    fn full_at_slot_count_distance() {
        assert!(!is_full(3, 0, 4));
        assert!(is_full(4, 0, 4));
        assert_eq!(used(4, 0), 3);
    }

    #[test]
    fn index_wraps_counter_does_not() {
        assert_eq!(slot_index(0, 4), 0);
        assert_eq!(slot_index(5, 4), 1);
        assert_eq!(slot_index(8, 4), 0);
        assert_eq!(slot_index(1_000_003, 4), 3);
        assert_eq!(slot_index(7, 3), 1);
    }

    #[test]
    fn distance_survives_counter_overflow() {
        let tail = usize::MAX - 1;
        let head = tail.wrapping_add(3);
        assert_eq!(head, 1);
        assert_eq!(in_flight(head, tail), 3);
        assert_eq!(used(head, tail), 2);
        assert!(is_full(head, tail, 3));
        assert!(!is_full(head, tail, 4));
    }

    #[test]
    fn odd_slot_count_reuses_a_slot_across_overflow() {
        // The last counter before the wrap and the first after it address
        // the same slot of a 3-slot ring.
        assert_eq!(slot_index(usize::MAX, 3), slot_index(0, 3));
        assert_eq!(slot_index(usize::MAX, 4), 3);
        assert_eq!(slot_index(0, 4), 0);
    }

    #[test]
    fn power_of_two_index_is_continuous_across_overflow() {
        let before = usize::MAX;
        let after = before.wrapping_add(1);
        assert_eq!(slot_index(before, 8), 7);
        assert_eq!(slot_index(after, 8), 0);
    }
}
