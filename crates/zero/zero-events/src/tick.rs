use zero_ring::Pod;

// POD -> plain old data, fixed-size, same layout in every process
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Tick {
    pub seq: u64,     // position in the writer's stream, starts at 0
    pub ts_ns: u64,   // writer's monotonic clock at publish time
    pub value: i64,
}

// SAFETY: three plain 64-bit integers, no padding, any bit pattern is valid.
unsafe impl Pod for Tick {}

impl Tick {
    #[inline]
    pub fn new(seq: u64, ts_ns: u64) -> Self {
        Self {
            seq,
            ts_ns,
            value: Self::expected_value(seq),
        }
    }

    /// Deterministic payload for `seq`, so readers can check what they got.
    #[inline]
    pub fn expected_value(seq: u64) -> i64 {
        (seq as i64).wrapping_mul(31).wrapping_sub(7)
    }

    #[inline]
    pub fn is_intact(&self) -> bool {
        self.value == Self::expected_value(self.seq)
    }
}
