use std::fmt;

use tracing::debug;

use crate::arena::NodeArena;
use crate::cursor::{Cursor, Iter, Pos, Stamp};
use crate::error::TreapError;
use crate::node::{Id, Node};
use crate::priority::{DEFAULT_SEED, PrioritySource, XorShift64};
use crate::weight::Weight;

/// Ordered multimap from `K` to `(V, W)` entries with O(log n) prefix and
/// suffix sums over the weights.
///
/// Several entries may share a key; they are kept in insertion order.
pub struct TreapMap<K, V, W, P = XorShift64> {
    arena: NodeArena<K, V, W>,
    root: Id,
    priorities: P,
    stamp: Stamp,
}

impl<K, V, W> TreapMap<K, V, W, XorShift64>
where
    K: Ord + Clone,
    V: PartialEq,
    W: Weight,
{
    pub fn new() -> Self {
        Self::with_seed(DEFAULT_SEED)
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::with_priorities(XorShift64::new(seed))
    }
}

impl<K, V, W, P> TreapMap<K, V, W, P>
where
    K: Ord + Clone,
    V: PartialEq,
    W: Weight,
    P: PrioritySource,
{
    pub fn with_priorities(priorities: P) -> Self {
        Self {
            arena: NodeArena::new(),
            root: Id::NIL,
            priorities,
            stamp: Stamp::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.arena.count(self.root)
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_nil()
    }

    pub fn total_weight(&self) -> W {
        self.arena.weight(self.root)
    }

    pub fn insert(&mut self, key: K, value: V, weight: W) {
        self.stamp.bump();
        let priority = self.priorities.next_priority();
        let u = self.arena.alloc(Node::new(key, value, weight, priority));
        self.arena.insert_node(u, &mut self.root);
    }

    /// Removes the entry `value` at `key`. Returns `false` if there is none.
    pub fn remove(&mut self, key: &K, value: &V) -> bool {
        let Some((x, idx)) = self.arena.find_entry(key, value, self.root) else {
            return false;
        };
        self.stamp.bump();
        self.arena.remove_entry(x, idx, &mut self.root);
        true
    }

    /// Removes every entry at `key`. Returns `false` if the key is absent.
    pub fn remove_all(&mut self, key: &K) -> bool {
        let x = self.arena.find_eq(key, self.root);
        if x.is_nil() {
            return false;
        }
        self.stamp.bump();
        self.arena.remove_node(x, &mut self.root);
        true
    }

    /// Moves the entry `value` from `key` to `new_key`, keeping its weight.
    pub fn move_entry(&mut self, key: &K, value: &V, new_key: K) -> bool {
        let Some((x, idx)) = self.arena.find_entry(key, value, self.root) else {
            return false;
        };
        self.stamp.bump();
        let entry = self.arena.remove_entry(x, idx, &mut self.root);
        let priority = self.priorities.next_priority();
        let u = self
            .arena
            .alloc(Node::new(new_key, entry.value, entry.weight, priority));
        self.arena.insert_node(u, &mut self.root);
        true
    }

    /// Replaces the weight of the entry `value` at `key`.
    pub fn set_weight(&mut self, key: &K, value: &V, weight: W) -> bool {
        let Some((x, idx)) = self.arena.find_entry(key, value, self.root) else {
            return false;
        };
        self.arena.set_entry_weight(x, idx, weight);
        true
    }

    /// Moves every entry with key `>= key` into a new map.
    ///
    /// The cut itself is expected O(log n), but each map owns its nodes, so
    /// the smaller side is then moved over: O(log n + min(kept, moved)).
    pub fn split(&mut self, key: &K) -> Self {
        self.stamp.bump();
        let priority = self.priorities.next_priority();
        let upper = self.arena.split(key, &mut self.root, priority);
        let mut other = Self::with_priorities(self.priorities.fork());
        if upper.is_nil() {
            return other;
        }

        let lower = self.root;
        if self.arena.count(upper) <= self.arena.count(lower) {
            other.root = self.arena.relocate(upper, &mut other.arena);
        } else {
            std::mem::swap(&mut self.arena, &mut other.arena);
            self.root = other.arena.relocate(lower, &mut self.arena);
            other.root = upper;
        }
        debug!(
            kept = self.len(),
            moved = other.len(),
            "split weighted treap"
        );
        other
    }

    /// Appends `other` if all of its keys are greater than all keys here.
    /// `other` is left empty on success and untouched on failure.
    ///
    /// Costs O(log(n + m) + min(n, m)): the smaller map's nodes are moved
    /// into the larger map's storage before the join.
    pub fn merge(&mut self, other: &mut Self) -> bool {
        if other.is_empty() {
            return true;
        }
        if !self.is_empty() {
            let last = self.arena.find_last(self.root);
            let first = other.arena.find_first(other.root);
            if self.arena.node(last).key >= other.arena.node(first).key {
                debug!(
                    len = self.len(),
                    other_len = other.len(),
                    "rejected merge of overlapping key ranges"
                );
                return false;
            }
        }

        self.stamp.bump();
        other.stamp.bump();
        let mut appended = if other.arena.live() <= self.arena.live() {
            other.arena.relocate(other.root, &mut self.arena)
        } else {
            std::mem::swap(&mut self.arena, &mut other.arena);
            self.root = other.arena.relocate(self.root, &mut self.arena);
            other.root
        };
        other.root = Id::NIL;
        other.arena.reset();

        let merged = self.arena.merge(&mut self.root, &mut appended);
        debug_assert!(merged, "merge precondition checked above");
        debug!(len = self.len(), "merged weighted treaps");
        true
    }

    pub fn clear(&mut self) {
        self.stamp.bump();
        self.arena.clear(&mut self.root);
        self.arena.reset();
    }

    pub fn first_key(&self) -> Result<&K, TreapError> {
        if self.root.is_nil() {
            return Err(TreapError::Underflow { op: "first_key" });
        }
        Ok(&self.arena.node(self.arena.find_first(self.root)).key)
    }

    pub fn last_key(&self) -> Result<&K, TreapError> {
        if self.root.is_nil() {
            return Err(TreapError::Underflow { op: "last_key" });
        }
        Ok(&self.arena.node(self.arena.find_last(self.root)).key)
    }

    /// Sum of weights with key `< key`.
    pub fn weight_before(&self, key: &K) -> W {
        self.arena.left_weight(key, false, self.root)
    }

    /// Sum of weights with key `<= key`.
    pub fn weight_to(&self, key: &K) -> W {
        self.arena.left_weight(key, true, self.root)
    }

    /// Sum of weights with key `>= key`.
    pub fn weight_from(&self, key: &K) -> W {
        self.arena.right_weight(key, true, self.root)
    }

    /// Sum of weights with key `> key`.
    pub fn weight_after(&self, key: &K) -> W {
        self.arena.right_weight(key, false, self.root)
    }

    /// Sum of weights with `from <= key <= to`.
    pub fn weight_between(&self, from: &K, to: &K) -> W {
        self.weight_to(to).sub(&self.weight_before(from))
    }

    pub fn contains(&self, key: &K, value: &V) -> bool {
        self.arena.find_entry(key, value, self.root).is_some()
    }

    pub fn begin(&self) -> Cursor {
        self.stamp.cursor(self.arena.first_pos(self.roots()))
    }

    pub fn end(&self) -> Cursor {
        self.stamp.cursor(None)
    }

    /// First entry at `key`.
    pub fn find(&self, key: &K) -> Cursor {
        let x = self.arena.find_eq(key, self.root);
        self.stamp.cursor(self.arena.node_pos(0, x))
    }

    pub fn find_entry(&self, key: &K, value: &V) -> Cursor {
        let pos = self
            .arena
            .find_entry(key, value, self.root)
            .map(|(node, entry)| Pos {
                fragment: 0,
                node,
                entry,
            });
        self.stamp.cursor(pos)
    }

    /// First entry with key `>= key`.
    pub fn lower_bound(&self, key: &K) -> Cursor {
        let x = self.arena.find_lower_bound(key, self.root);
        self.stamp.cursor(self.arena.node_pos(0, x))
    }

    /// First entry with key `> key`.
    pub fn upper_bound(&self, key: &K) -> Cursor {
        let x = self.arena.find_upper_bound(key, self.root);
        self.stamp.cursor(self.arena.node_pos(0, x))
    }

    /// Steps to the next entry. From `end()` this wraps to the first entry.
    pub fn advance(&self, cursor: &mut Cursor) -> Result<(), TreapError> {
        let next = match self.stamp.check(cursor) {
            Some(pos) => self.arena.next_pos(self.roots(), pos),
            None => Some(
                self.arena
                    .first_pos(self.roots())
                    .ok_or(TreapError::Underflow { op: "advance" })?,
            ),
        };
        *cursor = self.stamp.cursor(next);
        Ok(())
    }

    /// Steps to the previous entry. From `end()` this goes to the last entry.
    pub fn retreat(&self, cursor: &mut Cursor) -> Result<(), TreapError> {
        let prev = match self.stamp.check(cursor) {
            Some(pos) => self.arena.prev_pos(self.roots(), pos),
            None => Some(
                self.arena
                    .last_pos(self.roots())
                    .ok_or(TreapError::Underflow { op: "retreat" })?,
            ),
        };
        *cursor = self.stamp.cursor(prev);
        Ok(())
    }

    pub fn key_at(&self, cursor: &Cursor) -> Option<&K> {
        let pos = self.stamp.check(cursor)?;
        Some(&self.arena.node(pos.node).key)
    }

    pub fn value_at(&self, cursor: &Cursor) -> Option<&V> {
        let pos = self.stamp.check(cursor)?;
        Some(&self.arena.node(pos.node).entries[pos.entry].value)
    }

    pub fn weight_at(&self, cursor: &Cursor) -> Option<&W> {
        let pos = self.stamp.check(cursor)?;
        Some(&self.arena.node(pos.node).entries[pos.entry].weight)
    }

    /// Combined weight of every entry sharing the cursor's key.
    pub fn key_weight_at(&self, cursor: &Cursor) -> Option<W> {
        let pos = self.stamp.check(cursor)?;
        Some(self.arena.node(pos.node).own_weight())
    }

    /// Sum of the weights of all entries ordered before the cursor.
    /// At `end()` this is the total weight.
    pub fn weight_before_cursor(&self, cursor: &Cursor) -> W {
        match self.stamp.check(cursor) {
            Some(pos) => self
                .arena
                .left_weight_at(pos.node, pos.entry, false, self.root),
            None => self.total_weight(),
        }
    }

    /// Like [`weight_before_cursor`](Self::weight_before_cursor) but
    /// including the entry under the cursor.
    pub fn weight_to_cursor(&self, cursor: &Cursor) -> W {
        match self.stamp.check(cursor) {
            Some(pos) => self
                .arena
                .left_weight_at(pos.node, pos.entry, true, self.root),
            None => self.total_weight(),
        }
    }

    /// Removes the entry under `cursor`. Returns `false` at `end()`.
    pub fn remove_at(&mut self, cursor: Cursor) -> bool {
        let Some(pos) = self.stamp.check(&cursor) else {
            return false;
        };
        self.stamp.bump();
        self.arena.remove_entry(pos.node, pos.entry, &mut self.root);
        true
    }

    pub fn iter(&self) -> Iter<'_, K, V, W> {
        Iter::new(&self.arena, self.roots(), self.len())
    }

    /// Number of nodes on the longest root-to-leaf path.
    pub fn height(&self) -> usize {
        self.arena.height(self.root)
    }

    /// Panics if any ordering, linkage or aggregate invariant is broken.
    /// Weights are compared exactly, so inexact weight types may trip it.
    pub fn assert_invariants(&self) {
        let counted = self.arena.check(self.root);
        self.arena.check_heap_order(self.root);
        let nodes = self.arena.node_count(self.root);
        assert_eq!(counted, self.len());
        assert_eq!(nodes, self.arena.live(), "arena holds unreachable nodes");
    }

    fn roots(&self) -> &[Id] {
        std::slice::from_ref(&self.root)
    }
}

impl<K, V, W> Default for TreapMap<K, V, W, XorShift64>
where
    K: Ord + Clone,
    V: PartialEq,
    W: Weight,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, W, P> Extend<(K, V, W)> for TreapMap<K, V, W, P>
where
    K: Ord + Clone,
    V: PartialEq,
    W: Weight,
    P: PrioritySource,
{
    fn extend<I: IntoIterator<Item = (K, V, W)>>(&mut self, iter: I) {
        for (key, value, weight) in iter {
            self.insert(key, value, weight);
        }
    }
}

impl<K, V, W> FromIterator<(K, V, W)> for TreapMap<K, V, W, XorShift64>
where
    K: Ord + Clone,
    V: PartialEq,
    W: Weight,
{
    fn from_iter<I: IntoIterator<Item = (K, V, W)>>(iter: I) -> Self {
        let mut map = Self::new();
        map.extend(iter);
        map
    }
}

impl<'a, K, V, W, P> IntoIterator for &'a TreapMap<K, V, W, P>
where
    K: Ord + Clone,
    V: PartialEq,
    W: Weight,
    P: PrioritySource,
{
    type Item = (&'a K, &'a V, &'a W);
    type IntoIter = Iter<'a, K, V, W>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<K, V, W, P> fmt::Debug for TreapMap<K, V, W, P>
where
    K: Ord + Clone + fmt::Debug,
    V: PartialEq + fmt::Debug,
    W: Weight,
    P: PrioritySource,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::TreapMap;
    use crate::error::TreapError;
    use crate::priority::scripted::Scripted;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::BTreeMap;

    type Ledger = TreapMap<u32, &'static str, i64>;

    fn date(y: u32, m: u32, d: u32) -> u32 {
        y * 10_000 + m * 100 + d
    }

    fn snapshot<P: crate::PrioritySource>(
        map: &TreapMap<u32, &'static str, i64, P>,
    ) -> Vec<(u32, &'static str, i64)> {
        map.iter().map(|(k, v, w)| (*k, *v, *w)).collect()
    }

    #[test]
    fn balance_as_of_date() {
        let mut map = Ledger::new();
        map.insert(date(2020, 1, 10), "A", 100);
        map.insert(date(2020, 2, 15), "B", 50);
        map.insert(date(2020, 3, 1), "C", -30);
        map.assert_invariants();

        assert_eq!(map.weight_to(&date(2020, 2, 15)), 150);
        assert_eq!(map.weight_before(&date(2020, 2, 15)), 100);
        assert_eq!(
            map.weight_between(&date(2020, 1, 1), &date(2020, 2, 28)),
            150
        );
        assert_eq!(map.weight_from(&date(2020, 2, 15)), 20);
        assert_eq!(map.weight_after(&date(2020, 2, 15)), -30);
        assert_eq!(map.total_weight(), 120);
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn split_and_merge_keep_sums() {
        let mut map = TreapMap::<u32, u32, i64>::with_seed(7);
        for k in 1..=10 {
            map.insert(k, k, 1);
        }
        let mut right = map.split(&5);
        map.assert_invariants();
        right.assert_invariants();
        assert_eq!(map.total_weight(), 4);
        assert_eq!(right.total_weight(), 6);
        assert_eq!(map.last_key(), Ok(&4));
        assert_eq!(right.first_key(), Ok(&5));

        assert!(map.merge(&mut right));
        map.assert_invariants();
        assert!(right.is_empty());
        assert_eq!(map.total_weight(), 10);
        assert_eq!(map.len(), 10);
    }

    #[test]
    fn split_moves_larger_half_by_swapping_arenas() {
        let mut map = TreapMap::<u32, u32, i64>::with_seed(11);
        for k in 0..100 {
            map.insert(k, k, k as i64);
        }
        let right = map.split(&10);
        map.assert_invariants();
        right.assert_invariants();
        assert_eq!(map.len(), 10);
        assert_eq!(right.len(), 90);
        assert_eq!(map.total_weight(), 45);
        assert_eq!(right.total_weight(), (10..100).sum::<i64>());
    }

    #[test]
    fn split_edges() {
        let mut map = TreapMap::<u32, u32, i64>::new();
        let empty = map.split(&3);
        assert!(empty.is_empty());

        map.extend([(1, 1, 1), (2, 2, 2)]);
        let none = map.split(&3);
        assert!(none.is_empty());
        assert_eq!(map.len(), 2);

        let all = map.split(&0);
        assert!(map.is_empty());
        assert_eq!(all.len(), 2);
        all.assert_invariants();
    }

    #[test]
    fn shared_key_keeps_single_node() {
        let mut map = Ledger::new();
        let key = date(2020, 5, 1);
        map.insert(key, "X", 10);
        map.insert(key, "Y", 20);
        map.assert_invariants();

        assert_eq!(map.height(), 1);
        assert_eq!(map.len(), 2);
        assert_eq!(map.key_weight_at(&map.find(&key)), Some(30));
        assert_eq!(snapshot(&map), vec![(key, "X", 10), (key, "Y", 20)]);

        assert!(map.remove_all(&key));
        assert!(map.is_empty());
        assert_eq!(
            map.first_key(),
            Err(TreapError::Underflow { op: "first_key" })
        );
        assert!(map.last_key().is_err());
        assert!(!map.remove_all(&key));
    }

    #[test]
    fn move_entry_relocates_weight() {
        let mut map = Ledger::new();
        let (jan, jun) = (date(2020, 1, 1), date(2020, 6, 1));
        map.insert(jan, "A", 40);
        map.insert(date(2020, 3, 1), "B", 2);
        let before_jun = map.weight_before(&jun);

        assert!(map.move_entry(&jan, &"A", jun));
        map.assert_invariants();
        assert_eq!(map.weight_before(&jun), before_jun - 40);
        assert_eq!(map.weight_to(&jun), before_jun);
        assert_eq!(map.weight_to(&jan), 0);
        assert!(map.contains(&jun, &"A"));
        assert!(!map.contains(&jan, &"A"));
    }

    #[test]
    fn failed_move_changes_nothing() {
        let mut map = Ledger::new();
        map.insert(1, "A", 5);
        map.insert(2, "B", 6);
        let before = snapshot(&map);
        let cursor = map.begin();

        assert!(!map.move_entry(&1, &"B", 9));
        assert!(!map.move_entry(&3, &"A", 9));
        assert_eq!(snapshot(&map), before);
        // no structural change, so the cursor is still good
        assert_eq!(map.key_at(&cursor), Some(&1));
    }

    #[test]
    fn overlapping_merge_is_rejected() {
        let mut left = TreapMap::<u32, u32, i64>::with_seed(1);
        let mut right = TreapMap::<u32, u32, i64>::with_seed(2);
        for k in [1, 4, 7] {
            left.insert(k, k, k as i64);
        }
        for k in [5, 9] {
            right.insert(k, k, 10);
        }
        let left_before: Vec<_> = left.iter().map(|(k, v, w)| (*k, *v, *w)).collect();
        let right_before: Vec<_> = right.iter().map(|(k, v, w)| (*k, *v, *w)).collect();
        let cursor = right.begin();

        assert!(!left.merge(&mut right));
        let left_after: Vec<_> = left.iter().map(|(k, v, w)| (*k, *v, *w)).collect();
        let right_after: Vec<_> = right.iter().map(|(k, v, w)| (*k, *v, *w)).collect();
        assert_eq!(left_before, left_after);
        assert_eq!(right_before, right_after);
        assert_eq!(left.total_weight(), 12);
        assert_eq!(right.total_weight(), 20);
        assert_eq!(right.key_at(&cursor), Some(&5));
    }

    #[test]
    fn merge_into_empty_and_from_empty() {
        let mut a = TreapMap::<u32, u32, i64>::new();
        let mut b = TreapMap::<u32, u32, i64>::new();
        assert!(a.merge(&mut b));
        b.insert(3, 3, 3);
        assert!(a.merge(&mut b));
        assert_eq!(a.len(), 1);
        assert!(b.is_empty());
        assert!(a.merge(&mut b));
        a.assert_invariants();
    }

    #[test]
    fn set_weight_propagates() {
        let mut map = Ledger::new();
        for (k, v) in [(1, "a"), (2, "b"), (3, "c"), (3, "d")] {
            map.insert(k, v, 10);
        }
        assert!(map.set_weight(&3, &"d", -5));
        map.assert_invariants();
        assert_eq!(map.total_weight(), 25);
        assert_eq!(map.weight_from(&3), 5);
        assert!(!map.set_weight(&3, &"z", 1));
        assert!(!map.set_weight(&4, &"a", 1));
    }

    #[test]
    fn absent_removal_leaves_map_untouched() {
        let mut map = Ledger::new();
        map.insert(1, "a", 1);
        map.insert(2, "b", 2);
        let before = snapshot(&map);
        let total = map.total_weight();

        assert!(!map.remove(&1, &"b"));
        assert!(!map.remove(&5, &"a"));
        assert_eq!(snapshot(&map), before);
        assert_eq!(map.total_weight(), total);
        map.assert_invariants();
    }

    #[test]
    fn cursor_walks_both_ways() {
        let mut map = Ledger::new();
        map.insert(2, "b1", 1);
        map.insert(1, "a", 1);
        map.insert(2, "b2", 1);
        map.insert(3, "c", 1);

        let mut c = map.begin();
        let mut forward = Vec::new();
        while !c.is_end() {
            forward.push(*map.value_at(&c).unwrap());
            map.advance(&mut c).unwrap();
        }
        assert_eq!(forward, vec!["a", "b1", "b2", "c"]);

        let mut backward = Vec::new();
        let mut c = map.end();
        map.retreat(&mut c).unwrap();
        while !c.is_end() {
            backward.push(*map.value_at(&c).unwrap());
            map.retreat(&mut c).unwrap();
        }
        assert_eq!(backward, vec!["c", "b2", "b1", "a"]);

        // ++ from end wraps to the front
        let mut c = map.end();
        map.advance(&mut c).unwrap();
        assert_eq!(map.key_at(&c), Some(&1));
    }

    #[test]
    fn cursor_on_empty_map_underflows() {
        let map = Ledger::new();
        let mut c = map.end();
        assert_eq!(
            map.advance(&mut c),
            Err(TreapError::Underflow { op: "advance" })
        );
        assert_eq!(
            map.retreat(&mut c),
            Err(TreapError::Underflow { op: "retreat" })
        );
        assert!(map.begin().is_end());
        assert_eq!(map.key_at(&c), None);
    }

    #[test]
    fn bounds_and_lookups() {
        let mut map = Ledger::new();
        for k in [10, 20, 30] {
            map.insert(k, "x", k as i64);
        }
        assert_eq!(map.key_at(&map.lower_bound(&20)), Some(&20));
        assert_eq!(map.key_at(&map.lower_bound(&21)), Some(&30));
        assert_eq!(map.key_at(&map.upper_bound(&20)), Some(&30));
        assert!(map.upper_bound(&30).is_end());
        assert!(map.lower_bound(&31).is_end());
        assert!(map.find(&25).is_end());
        assert_eq!(map.key_at(&map.find(&10)), Some(&10));
        assert!(map.find_entry(&10, &"y").is_end());
        assert_eq!(map.weight_at(&map.find_entry(&30, &"x")), Some(&30));
    }

    #[test]
    fn prefix_sums_at_cursor() {
        let mut map = Ledger::new();
        map.insert(1, "a", 1);
        map.insert(2, "b", 10);
        map.insert(2, "c", 100);
        map.insert(3, "d", 1000);

        let c = map.find_entry(&2, &"c");
        assert_eq!(map.weight_before_cursor(&c), 11);
        assert_eq!(map.weight_to_cursor(&c), 111);
        assert_eq!(map.weight_before_cursor(&map.end()), 1111);
        assert_eq!(map.weight_before_cursor(&map.begin()), 0);
    }

    #[test]
    fn remove_at_cursor() {
        let mut map = Ledger::new();
        map.insert(1, "a", 1);
        map.insert(1, "b", 2);
        let c = map.find_entry(&1, &"a");
        assert!(map.remove_at(c));
        assert_eq!(snapshot(&map), vec![(1, "b", 2)]);
        let end = map.end();
        assert!(!map.remove_at(end));
    }

    #[test]
    #[should_panic(expected = "structurally modified")]
    fn stale_cursor_panics() {
        let mut map = Ledger::new();
        map.insert(1, "a", 1);
        let c = map.begin();
        map.insert(2, "b", 1);
        let _ = map.key_at(&c);
    }

    #[test]
    #[should_panic(expected = "different map")]
    fn foreign_cursor_panics() {
        let mut a = Ledger::new();
        let b = Ledger::new();
        a.insert(1, "a", 1);
        let c = b.end();
        let _ = a.key_at(&c);
    }

    #[test]
    #[should_panic(expected = "different map")]
    fn same_seed_maps_reject_each_others_cursors() {
        let mut a = Ledger::with_seed(1);
        let mut b = Ledger::with_seed(1);
        a.insert(1, "a", 1);
        b.insert(1, "a", 1);
        let c = b.find(&1);
        let _ = a.weight_before_cursor(&c);
    }

    #[test]
    fn scripted_priorities_force_shape() {
        // Increasing priorities on increasing keys produce a right spine.
        let mut map = TreapMap::<u32, u32, i64, _>::with_priorities(Scripted::new(&[
            0, 1, 2, 3, 4, 5,
        ]));
        for k in 0..6 {
            map.insert(k, k, 1);
        }
        assert_eq!(map.height(), 6);
        map.assert_invariants();

        // Reversed priorities bubble every new node to the root.
        let mut map = TreapMap::<u32, u32, i64, _>::with_priorities(Scripted::new(&[
            5, 4, 3, 2, 1, 0,
        ]));
        for k in 0..6 {
            map.insert(k, k, 1);
        }
        assert_eq!(map.height(), 6);
        assert_eq!(map.key_at(&map.begin()), Some(&0));
        map.assert_invariants();
        assert!(map.remove(&5, &5));
        assert_eq!(map.height(), 5);
        map.assert_invariants();
    }

    #[test]
    fn clear_large_tree_iteratively() {
        let mut map = TreapMap::<u32, u32, i64>::with_seed(5);
        for k in 0..50_000 {
            map.insert(k, k, 1);
        }
        map.clear();
        assert!(map.is_empty());
        assert_eq!(map.total_weight(), 0);
        map.insert(1, 1, 1);
        map.assert_invariants();
    }

    #[test]
    fn height_stays_logarithmic() {
        let n = 10_000_u32;
        let bound = 10 * (32 - n.leading_zeros()) as usize;
        for seed in 1..=5_u64 {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut map = TreapMap::<u32, u32, i64>::with_seed(seed * 0x9E37);
            for i in 0..n {
                map.insert(rng.random_range(0..1_000_000), i, 1);
            }
            assert!(
                map.height() < bound,
                "seed {seed}: height {} >= {bound}",
                map.height()
            );
        }
        // Sorted input is the classic worst case for an unbalanced BST.
        let mut map = TreapMap::<u32, u32, i64>::with_seed(3);
        for i in 0..n {
            map.insert(i, i, 1);
        }
        assert!(map.height() < bound);
    }

    #[test]
    fn random_operations_match_btreemap() {
        let mut rng = StdRng::seed_from_u64(0x5EED_2026);
        let mut map = TreapMap::<u32, u32, i64>::with_seed(99);
        let mut oracle: BTreeMap<u32, Vec<(u32, i64)>> = BTreeMap::new();
        let mut next_value = 0_u32;

        for step in 0..4000 {
            match rng.random_range(0..7) {
                0 | 1 => {
                    let key = rng.random_range(0..64);
                    let weight = rng.random_range(-100..=100);
                    next_value += 1;
                    map.insert(key, next_value, weight);
                    oracle.entry(key).or_default().push((next_value, weight));
                }
                2 => {
                    let key = rng.random_range(0..64);
                    let value = rng.random_range(0..=next_value);
                    let expected = match oracle.get_mut(&key) {
                        Some(list) => match list.iter().position(|&(v, _)| v == value) {
                            Some(i) => {
                                list.remove(i);
                                if list.is_empty() {
                                    oracle.remove(&key);
                                }
                                true
                            }
                            None => false,
                        },
                        None => false,
                    };
                    assert_eq!(map.remove(&key, &value), expected);
                }
                3 => {
                    let key = rng.random_range(0..64);
                    assert_eq!(map.remove_all(&key), oracle.remove(&key).is_some());
                }
                4 => {
                    let Some((&key, list)) = oracle.iter().nth(rng.random_range(0..oracle.len().max(1))) else {
                        continue;
                    };
                    let (value, weight) = list[0];
                    let new_key = rng.random_range(0..64);
                    assert!(map.move_entry(&key, &value, new_key));
                    let list = oracle.get_mut(&key).unwrap();
                    list.remove(0);
                    if list.is_empty() {
                        oracle.remove(&key);
                    }
                    oracle.entry(new_key).or_default().push((value, weight));
                }
                5 => {
                    let Some((&key, list)) = oracle.iter_mut().next() else {
                        continue;
                    };
                    let weight = rng.random_range(-50..=50);
                    let value = list[list.len() - 1].0;
                    list.last_mut().unwrap().1 = weight;
                    assert!(map.set_weight(&key, &value, weight));
                }
                _ => {
                    let key = rng.random_range(0..64);
                    let expected: i64 = oracle
                        .range(..key)
                        .flat_map(|(_, l)| l.iter().map(|&(_, w)| w))
                        .sum();
                    assert_eq!(map.weight_before(&key), expected);
                    let expected_from: i64 = oracle
                        .range(key..)
                        .flat_map(|(_, l)| l.iter().map(|&(_, w)| w))
                        .sum();
                    assert_eq!(map.weight_from(&key), expected_from);
                }
            }

            if step % 50 == 0 {
                map.assert_invariants();
                let flat: Vec<(u32, u32, i64)> = oracle
                    .iter()
                    .flat_map(|(&k, l)| l.iter().map(move |&(v, w)| (k, v, w)))
                    .collect();
                let got: Vec<(u32, u32, i64)> =
                    map.iter().map(|(k, v, w)| (*k, *v, *w)).collect();
                assert_eq!(got, flat);
            }
        }
    }
}
