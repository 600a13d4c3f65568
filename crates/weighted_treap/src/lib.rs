//! Randomized treap multimaps augmented with subtree weight sums.
//!
//! [`TreapMap`] answers "sum of every weight with key before `k`" in
//! expected O(log n), alongside insert, remove, move, split and merge.
//! [`FragmentedTreapMap`] cuts the key space into fragments whose ratios
//! rescale everything recorded before them.

mod algorithms;
mod arena;
mod cursor;
mod error;
mod fragmented;
mod map;
mod node;
mod priority;
mod weight;

#[cfg(test)]
mod proptests;

pub use cursor::{Cursor, Iter};
pub use error::TreapError;
pub use fragmented::FragmentedTreapMap;
pub use map::TreapMap;
pub use priority::{DEFAULT_SEED, PrioritySource, SENTINEL_PRIORITY, XorShift64};
pub use weight::{Ratio, Weight};
