use std::fmt::Debug;
use std::ops::{Mul, Sub};

use num_traits::{One, Zero};

/// Aggregate carried by every entry and summed over subtrees.
///
/// Must form a commutative group: rotations and deletions subtract
/// aggregates as often as they add them.
pub trait Weight: Clone + PartialEq + Debug {
    fn zero() -> Self;
    fn add(&self, other: &Self) -> Self;
    fn sub(&self, other: &Self) -> Self;

    fn add_assign(&mut self, other: &Self) {
        *self = Weight::add(self, other);
    }

    fn sub_assign(&mut self, other: &Self) {
        *self = Weight::sub(self, other);
    }
}

impl<T> Weight for T
where
    T: Clone + PartialEq + Debug + Zero + Sub<Output = T>,
{
    fn zero() -> Self {
        <T as Zero>::zero()
    }

    fn add(&self, other: &Self) -> Self {
        self.clone() + other.clone()
    }

    fn sub(&self, other: &Self) -> Self {
        self.clone() - other.clone()
    }
}

/// Multiplicative adjustment applied to everything recorded before a
/// fragment boundary (e.g. a 2:1 stock split doubles prior share counts).
pub trait Ratio<W> {
    fn identity() -> Self;
    fn scale(&self, weight: &W) -> W;
}

impl<T> Ratio<T> for T
where
    T: Clone + One + Mul<Output = T>,
{
    fn identity() -> Self {
        T::one()
    }

    fn scale(&self, weight: &T) -> T {
        self.clone() * weight.clone()
    }
}
