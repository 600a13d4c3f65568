//! A weighted multimap whose key space is cut into fragments, each
//! carrying a ratio that rescales everything accumulated before it.
//!
//! Walking the fragments in key order, a sum is folded as
//! `acc = ratio.scale(acc) + part`, so a 2:1 stock split recorded as a
//! fragment with ratio 2 doubles every share count bought before it
//! without touching the stored entries.

use std::fmt;
use std::ops::Range;

use tracing::debug;

use crate::arena::NodeArena;
use crate::cursor::{Cursor, Iter, Pos, Stamp};
use crate::error::TreapError;
use crate::node::{Id, Node};
use crate::priority::{DEFAULT_SEED, PrioritySource, XorShift64};
use crate::weight::{Ratio, Weight};

struct Fragment<K, R> {
    /// `None` only for the first fragment, which starts below every key.
    start: Option<K>,
    ratio: R,
}

pub struct FragmentedTreapMap<K, V, W, R, P = XorShift64> {
    arena: NodeArena<K, V, W>,
    fragments: Vec<Fragment<K, R>>,
    /// Root of each fragment, parallel to `fragments`. All share `arena`.
    roots: Vec<Id>,
    priorities: P,
    stamp: Stamp,
}

impl<K, V, W, R> FragmentedTreapMap<K, V, W, R, XorShift64>
where
    K: Ord + Clone,
    V: PartialEq,
    W: Weight,
    R: Ratio<W>,
{
    pub fn new() -> Self {
        Self::with_seed(DEFAULT_SEED)
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::with_priorities(XorShift64::new(seed))
    }
}

impl<K, V, W, R, P> FragmentedTreapMap<K, V, W, R, P>
where
    K: Ord + Clone,
    V: PartialEq,
    W: Weight,
    R: Ratio<W>,
    P: PrioritySource,
{
    pub fn with_priorities(priorities: P) -> Self {
        Self {
            arena: NodeArena::new(),
            fragments: vec![Fragment {
                start: None,
                ratio: R::identity(),
            }],
            roots: vec![Id::NIL],
            priorities,
            stamp: Stamp::new(),
        }
    }

    /// Index of the fragment holding `key`.
    fn fragment_index(&self, key: &K) -> usize {
        self.fragments[1..].partition_point(|f| f.start.as_ref() <= Some(key))
    }

    /// Number of fragments starting strictly below `key`, i.e. one past the
    /// last fragment whose ratio applies to `weight_before(key)`.
    fn fragments_below(&self, key: &K) -> usize {
        1 + self.fragments[1..].partition_point(|f| f.start.as_ref() < Some(key))
    }

    fn fragment_starting_at(&self, key: &K) -> Option<usize> {
        let i = self.fragment_index(key);
        (i > 0 && self.fragments[i].start.as_ref() == Some(key)).then_some(i)
    }

    fn fold<F>(&self, range: Range<usize>, mut part: F) -> W
    where
        F: FnMut(usize, Id) -> W,
    {
        let mut acc = W::zero();
        for i in range {
            acc = self.fragments[i].ratio.scale(&acc);
            acc.add_assign(&part(i, self.roots[i]));
        }
        acc
    }

    pub fn len(&self) -> usize {
        self.roots.iter().map(|&root| self.arena.count(root)).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.iter().all(|root| root.is_nil())
    }

    pub fn fragment_count(&self) -> usize {
        self.fragments.len()
    }

    /// Ratio of the fragment starting exactly at `key`.
    pub fn fragment_ratio(&self, key: &K) -> Option<&R> {
        let i = self.fragment_starting_at(key)?;
        Some(&self.fragments[i].ratio)
    }

    pub fn insert(&mut self, key: K, value: V, weight: W) {
        self.stamp.bump();
        let i = self.fragment_index(&key);
        let priority = self.priorities.next_priority();
        let u = self.arena.alloc(Node::new(key, value, weight, priority));
        self.arena.insert_node(u, &mut self.roots[i]);
    }

    pub fn remove(&mut self, key: &K, value: &V) -> bool {
        let i = self.fragment_index(key);
        let Some((x, idx)) = self.arena.find_entry(key, value, self.roots[i]) else {
            return false;
        };
        self.stamp.bump();
        self.arena.remove_entry(x, idx, &mut self.roots[i]);
        true
    }

    pub fn remove_all(&mut self, key: &K) -> bool {
        let i = self.fragment_index(key);
        let x = self.arena.find_eq(key, self.roots[i]);
        if x.is_nil() {
            return false;
        }
        self.stamp.bump();
        self.arena.remove_node(x, &mut self.roots[i]);
        true
    }

    /// Moves an entry to `new_key`, which may lie in another fragment.
    pub fn move_entry(&mut self, key: &K, value: &V, new_key: K) -> bool {
        let from = self.fragment_index(key);
        let Some((x, idx)) = self.arena.find_entry(key, value, self.roots[from]) else {
            return false;
        };
        self.stamp.bump();
        let entry = self.arena.remove_entry(x, idx, &mut self.roots[from]);
        let to = self.fragment_index(&new_key);
        let priority = self.priorities.next_priority();
        let u = self
            .arena
            .alloc(Node::new(new_key, entry.value, entry.weight, priority));
        self.arena.insert_node(u, &mut self.roots[to]);
        true
    }

    pub fn set_weight(&mut self, key: &K, value: &V, weight: W) -> bool {
        let i = self.fragment_index(key);
        let Some((x, idx)) = self.arena.find_entry(key, value, self.roots[i]) else {
            return false;
        };
        self.arena.set_entry_weight(x, idx, weight);
        true
    }

    /// Starts a new fragment at `key` with `ratio`. Entries with keys
    /// `>= key` in the fragment being cut move into the new one.
    /// Returns `false` if a fragment already starts at `key`.
    pub fn split_fragment_at(&mut self, key: K, ratio: R) -> bool {
        let i = self.fragment_index(&key);
        if self.fragments[i].start.as_ref() == Some(&key) {
            return false;
        }
        self.stamp.bump();
        let priority = self.priorities.next_priority();
        let upper = self.arena.split(&key, &mut self.roots[i], priority);
        debug!(
            fragment = i + 1,
            moved = self.arena.count(upper),
            "split fragment"
        );
        self.fragments.insert(
            i + 1,
            Fragment {
                start: Some(key),
                ratio,
            },
        );
        self.roots.insert(i + 1, upper);
        true
    }

    /// Returns `false` if no fragment starts at `key`.
    pub fn set_fragment_ratio(&mut self, key: &K, ratio: R) -> bool {
        let Some(i) = self.fragment_starting_at(key) else {
            return false;
        };
        self.fragments[i].ratio = ratio;
        true
    }

    /// Folds the fragment starting at `key` into its predecessor, dropping
    /// its ratio. Returns `false` if no fragment starts at `key`.
    pub fn join_fragments_at(&mut self, key: &K) -> bool {
        let Some(i) = self.fragment_starting_at(key) else {
            return false;
        };
        self.stamp.bump();
        self.fragments.remove(i);
        let mut upper = self.roots.remove(i);
        let moved = self.arena.count(upper);
        let merged = self.arena.merge(&mut self.roots[i - 1], &mut upper);
        debug_assert!(merged, "adjacent fragments overlap");
        debug!(fragment = i, moved, "joined fragments");
        true
    }

    /// Removes every entry and every fragment but the first.
    pub fn clear(&mut self) {
        self.stamp.bump();
        for root in &mut self.roots {
            self.arena.clear(root);
        }
        self.arena.reset();
        self.fragments.truncate(1);
        self.roots.truncate(1);
        debug!("cleared fragmented treap");
    }

    pub fn first_key(&self) -> Result<&K, TreapError> {
        let pos = self
            .arena
            .first_pos(&self.roots)
            .ok_or(TreapError::Underflow { op: "first_key" })?;
        Ok(&self.arena.node(pos.node).key)
    }

    pub fn last_key(&self) -> Result<&K, TreapError> {
        let pos = self
            .arena
            .last_pos(&self.roots)
            .ok_or(TreapError::Underflow { op: "last_key" })?;
        Ok(&self.arena.node(pos.node).key)
    }

    /// Scaled sum of weights with key `< key`. Ratios of fragments starting
    /// at or after `key` are not applied.
    pub fn weight_before(&self, key: &K) -> W {
        let end = self.fragments_below(key);
        self.fold(0..end, |_, root| self.arena.left_weight(key, false, root))
    }

    /// Scaled sum of weights with key `<= key`, including the ratio of a
    /// fragment starting exactly at `key`.
    pub fn weight_to(&self, key: &K) -> W {
        let end = self.fragment_index(key) + 1;
        self.fold(0..end, |_, root| self.arena.left_weight(key, true, root))
    }

    /// Scaled sum of weights with key `>= key`; history before `key` is
    /// left out rather than rescaled.
    pub fn weight_from(&self, key: &K) -> W {
        let start = self.fragment_index(key);
        self.fold(start..self.roots.len(), |_, root| {
            self.arena.right_weight(key, true, root)
        })
    }

    /// Like [`weight_from`](Self::weight_from) for keys `> key`.
    pub fn weight_after(&self, key: &K) -> W {
        let start = self.fragment_index(key);
        self.fold(start..self.roots.len(), |_, root| {
            self.arena.right_weight(key, false, root)
        })
    }

    /// Scaled sum of weights with `from <= key <= to`, folding only the
    /// fragments that cover the range. Unlike [`TreapMap::weight_between`]
    /// this is not `weight_to(to) - weight_before(from)`: entries before
    /// `from` are left out instead of being scaled and subtracted.
    ///
    /// [`TreapMap::weight_between`]: crate::TreapMap::weight_between
    pub fn weight_between(&self, from: &K, to: &K) -> W {
        if from > to {
            return W::zero();
        }
        let range = self.fragment_index(from)..self.fragment_index(to) + 1;
        self.fold(range, |_, root| {
            self.arena
                .left_weight(to, true, root)
                .sub(&self.arena.left_weight(from, false, root))
        })
    }

    pub fn total_weight(&self) -> W {
        self.fold(0..self.roots.len(), |_, root| self.arena.weight(root))
    }

    /// Scaled sum of every entry ordered before the cursor. The cursor's own
    /// fragment ratio applies unless the cursor sits on the fragment's start
    /// key, so at the first entry of a key this equals `weight_before(key)`.
    pub fn weight_before_cursor(&self, cursor: &Cursor) -> W {
        self.cursor_weight(cursor, false)
    }

    pub fn weight_to_cursor(&self, cursor: &Cursor) -> W {
        self.cursor_weight(cursor, true)
    }

    fn cursor_weight(&self, cursor: &Cursor, inclusive: bool) -> W {
        let Some(pos) = self.stamp.check(cursor) else {
            return self.total_weight();
        };
        let root = self.roots[pos.fragment];
        let in_fragment = self
            .arena
            .left_weight_at(pos.node, pos.entry, inclusive, root);
        let before = self.fold(0..pos.fragment, |_, root| self.arena.weight(root));

        // On the fragment's start key the ratio is not yet in effect.
        let start = self.fragments[pos.fragment].start.as_ref();
        if start == Some(&self.arena.node(pos.node).key) {
            return before.add(&in_fragment);
        }
        self.fragments[pos.fragment]
            .ratio
            .scale(&before)
            .add(&in_fragment)
    }

    pub fn contains(&self, key: &K, value: &V) -> bool {
        let i = self.fragment_index(key);
        self.arena.find_entry(key, value, self.roots[i]).is_some()
    }

    pub fn begin(&self) -> Cursor {
        self.stamp.cursor(self.arena.first_pos(&self.roots))
    }

    pub fn end(&self) -> Cursor {
        self.stamp.cursor(None)
    }

    pub fn find(&self, key: &K) -> Cursor {
        let i = self.fragment_index(key);
        let x = self.arena.find_eq(key, self.roots[i]);
        self.stamp.cursor(self.arena.node_pos(i, x))
    }

    pub fn find_entry(&self, key: &K, value: &V) -> Cursor {
        let i = self.fragment_index(key);
        let pos = self
            .arena
            .find_entry(key, value, self.roots[i])
            .map(|(node, entry)| Pos {
                fragment: i,
                node,
                entry,
            });
        self.stamp.cursor(pos)
    }

    pub fn lower_bound(&self, key: &K) -> Cursor {
        let i = self.fragment_index(key);
        let x = self.arena.find_lower_bound(key, self.roots[i]);
        let pos = match self.arena.node_pos(i, x) {
            Some(pos) => Some(pos),
            None => self.arena.first_pos_from(&self.roots, i + 1),
        };
        self.stamp.cursor(pos)
    }

    pub fn upper_bound(&self, key: &K) -> Cursor {
        let i = self.fragment_index(key);
        let x = self.arena.find_upper_bound(key, self.roots[i]);
        let pos = match self.arena.node_pos(i, x) {
            Some(pos) => Some(pos),
            None => self.arena.first_pos_from(&self.roots, i + 1),
        };
        self.stamp.cursor(pos)
    }

    /// Steps to the next entry, crossing into the next non-empty fragment.
    /// From `end()` this wraps to the first entry.
    pub fn advance(&self, cursor: &mut Cursor) -> Result<(), TreapError> {
        let next = match self.stamp.check(cursor) {
            Some(pos) => self.arena.next_pos(&self.roots, pos),
            None => Some(
                self.arena
                    .first_pos(&self.roots)
                    .ok_or(TreapError::Underflow { op: "advance" })?,
            ),
        };
        *cursor = self.stamp.cursor(next);
        Ok(())
    }

    pub fn retreat(&self, cursor: &mut Cursor) -> Result<(), TreapError> {
        let prev = match self.stamp.check(cursor) {
            Some(pos) => self.arena.prev_pos(&self.roots, pos),
            None => Some(
                self.arena
                    .last_pos(&self.roots)
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

    /// Stored, unscaled weight of the entry under the cursor.
    pub fn weight_at(&self, cursor: &Cursor) -> Option<&W> {
        let pos = self.stamp.check(cursor)?;
        Some(&self.arena.node(pos.node).entries[pos.entry].weight)
    }

    pub fn key_weight_at(&self, cursor: &Cursor) -> Option<W> {
        let pos = self.stamp.check(cursor)?;
        Some(self.arena.node(pos.node).own_weight())
    }

    pub fn remove_at(&mut self, cursor: Cursor) -> bool {
        let Some(pos) = self.stamp.check(&cursor) else {
            return false;
        };
        self.stamp.bump();
        self.arena
            .remove_entry(pos.node, pos.entry, &mut self.roots[pos.fragment]);
        true
    }

    /// Entries of every fragment in key order, with stored weights.
    pub fn iter(&self) -> Iter<'_, K, V, W> {
        Iter::new(&self.arena, &self.roots, self.len())
    }

    pub fn assert_invariants(&self) {
        assert_eq!(self.fragments.len(), self.roots.len());
        assert!(self.fragments[0].start.is_none(), "first fragment is bounded");

        let mut nodes = 0;
        for (i, &root) in self.roots.iter().enumerate() {
            self.arena.check(root);
            self.arena.check_heap_order(root);
            nodes += self.arena.node_count(root);

            if i > 0 {
                assert!(self.fragments[i].start.is_some(), "fragment {i} has no start");
                if i > 1 {
                    assert!(
                        self.fragments[i - 1].start < self.fragments[i].start,
                        "fragment starts out of order at {i}"
                    );
                }
            }
            if root.is_nil() {
                continue;
            }
            let first = &self.arena.node(self.arena.find_first(root)).key;
            let last = &self.arena.node(self.arena.find_last(root)).key;
            if let Some(start) = &self.fragments[i].start {
                assert!(first >= start, "key below the start of fragment {i}");
            }
            if let Some(next) = self.fragments.get(i + 1).and_then(|f| f.start.as_ref()) {
                assert!(last < next, "key past the end of fragment {i}");
            }
        }
        assert_eq!(nodes, self.arena.live(), "arena holds unreachable nodes");
    }
}

impl<K, V, W, R> Default for FragmentedTreapMap<K, V, W, R, XorShift64>
where
    K: Ord + Clone,
    V: PartialEq,
    W: Weight,
    R: Ratio<W>,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, W, R, P> Extend<(K, V, W)> for FragmentedTreapMap<K, V, W, R, P>
where
    K: Ord + Clone,
    V: PartialEq,
    W: Weight,
    R: Ratio<W>,
    P: PrioritySource,
{
    fn extend<I: IntoIterator<Item = (K, V, W)>>(&mut self, iter: I) {
        for (key, value, weight) in iter {
            self.insert(key, value, weight);
        }
    }
}

impl<'a, K, V, W, R, P> IntoIterator for &'a FragmentedTreapMap<K, V, W, R, P>
where
    K: Ord + Clone,
    V: PartialEq,
    W: Weight,
    R: Ratio<W>,
    P: PrioritySource,
{
    type Item = (&'a K, &'a V, &'a W);
    type IntoIter = Iter<'a, K, V, W>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<K, V, W, R, P> fmt::Debug for FragmentedTreapMap<K, V, W, R, P>
where
    K: Ord + Clone + fmt::Debug,
    V: PartialEq + fmt::Debug,
    W: Weight,
    R: Ratio<W> + fmt::Debug,
    P: PrioritySource,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_list();
        for (fragment, &root) in self.fragments.iter().zip(&self.roots) {
            let entries = Iter::new(&self.arena, std::slice::from_ref(&root), self.arena.count(root));
            list.entry(&(&fragment.start, &fragment.ratio, entries.collect::<Vec<_>>()));
        }
        list.finish()
    }
}
