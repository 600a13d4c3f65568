pub const DEFAULT_SEED: u64 = 0x5EED_7EA9_2026;

/// Ranks before every priority a `PrioritySource` hands out, so a node
/// carrying it is rotated all the way to the root.
pub const SENTINEL_PRIORITY: i64 = i64::MIN;

/// Source of node priorities. Smaller priorities sit nearer the root.
pub trait PrioritySource {
    /// A non-negative priority for a freshly created node.
    fn next_priority(&mut self) -> i64;

    /// Independent source for a map split off this one.
    fn fork(&mut self) -> Self;
}

#[derive(Clone, Copy, Debug)]
pub struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    pub fn new(seed: u64) -> Self {
        // xorshift never leaves the all-zero state
        Self {
            state: if seed == 0 { DEFAULT_SEED } else { seed },
        }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }
}

impl Default for XorShift64 {
    fn default() -> Self {
        Self::new(DEFAULT_SEED)
    }
}

impl PrioritySource for XorShift64 {
    fn next_priority(&mut self) -> i64 {
        (self.next_u64() >> 1) as i64
    }

    fn fork(&mut self) -> Self {
        // scrambled so the child does not replay the parent's stream
        Self::new(self.next_u64().rotate_left(29) ^ 0x9E37_79B9_7F4A_7C15)
    }
}
