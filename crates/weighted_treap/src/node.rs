use smallvec::SmallVec;

use crate::weight::Weight;

#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct Id(u32);

impl Id {
    pub(crate) const NIL: Self = Self(u32::MAX);

    #[inline(always)]
    pub(crate) fn is_nil(self) -> bool {
        self.0 == u32::MAX
    }

    #[inline(always)]
    pub(crate) fn idx(self) -> usize {
        self.0 as usize
    }

    #[inline(always)]
    pub(crate) fn from_idx(idx: usize) -> Self {
        debug_assert!(idx < u32::MAX as usize);
        Self(idx as u32)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Entry<V, W> {
    pub(crate) value: V,
    pub(crate) weight: W,
}

pub(crate) type Entries<V, W> = SmallVec<[Entry<V, W>; 2]>;

pub(crate) struct Node<K, V, W> {
    pub(crate) key: K,
    pub(crate) priority: i64,
    pub(crate) entries: Entries<V, W>,
    /// Own entries plus both subtrees.
    pub(crate) weight: W,
    pub(crate) count: usize,
    pub(crate) parent: Id,
    pub(crate) left: Id,
    pub(crate) right: Id,
}

impl<K, V, W: Weight> Node<K, V, W> {
    pub(crate) fn new(key: K, value: V, weight: W, priority: i64) -> Self {
        let mut entries = Entries::new();
        entries.push(Entry {
            value,
            weight: weight.clone(),
        });
        Self {
            key,
            priority,
            entries,
            weight,
            count: 1,
            parent: Id::NIL,
            left: Id::NIL,
            right: Id::NIL,
        }
    }

    /// Entry-less node used as a temporary merge root.
    pub(crate) fn synthetic(key: K, priority: i64) -> Self {
        Self {
            key,
            priority,
            entries: Entries::new(),
            weight: W::zero(),
            count: 0,
            parent: Id::NIL,
            left: Id::NIL,
            right: Id::NIL,
        }
    }

    pub(crate) fn own_weight(&self) -> W {
        self.entries
            .iter()
            .fold(W::zero(), |acc, e| acc.add(&e.weight))
    }

    pub(crate) fn position(&self, value: &V) -> Option<usize>
    where
        V: PartialEq,
    {
        self.entries.iter().position(|e| e.value == *value)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Side {
    Left,
    Right,
}

impl Side {
    pub(crate) fn flip(self) -> Self {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}
