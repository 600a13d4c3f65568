//! Structural treap operations over a [`NodeArena`].
//!
//! Every operation receives the root of the tree it works on as
//! `&mut Id` and may replace it. The arena itself carries no notion of
//! which roots are alive, so several trees can share one arena.

use std::cmp::Ordering;

use crate::arena::NodeArena;
use crate::node::{Entries, Entry, Id, Node, Side};
use crate::priority::SENTINEL_PRIORITY;
use crate::weight::Weight;

impl<K: Ord, V, W: Weight> NodeArena<K, V, W> {
    pub(crate) fn find_first(&self, root: Id) -> Id {
        self.find_extreme(root, Side::Left)
    }

    pub(crate) fn find_last(&self, root: Id) -> Id {
        self.find_extreme(root, Side::Right)
    }

    fn find_extreme(&self, root: Id, side: Side) -> Id {
        let mut cur = root;
        if cur.is_nil() {
            return cur;
        }
        loop {
            let next = self.child(cur, side);
            if next.is_nil() {
                return cur;
            }
            cur = next;
        }
    }

    pub(crate) fn find_eq(&self, key: &K, root: Id) -> Id {
        let mut cur = root;
        while !cur.is_nil() {
            let n = self.node(cur);
            match key.cmp(&n.key) {
                Ordering::Less => cur = n.left,
                Ordering::Greater => cur = n.right,
                Ordering::Equal => return cur,
            }
        }
        Id::NIL
    }

    /// First node with key `>= key`.
    pub(crate) fn find_lower_bound(&self, key: &K, root: Id) -> Id {
        let mut cur = root;
        let mut best = Id::NIL;
        while !cur.is_nil() {
            let n = self.node(cur);
            match key.cmp(&n.key) {
                Ordering::Less => {
                    best = cur;
                    cur = n.left;
                }
                Ordering::Greater => cur = n.right,
                Ordering::Equal => return cur,
            }
        }
        best
    }

    /// First node with key `> key`.
    pub(crate) fn find_upper_bound(&self, key: &K, root: Id) -> Id {
        let mut cur = root;
        let mut best = Id::NIL;
        while !cur.is_nil() {
            let n = self.node(cur);
            if *key < n.key {
                best = cur;
                cur = n.left;
            } else {
                cur = n.right;
            }
        }
        best
    }

    pub(crate) fn find_entry(&self, key: &K, value: &V, root: Id) -> Option<(Id, usize)>
    where
        V: PartialEq,
    {
        let x = self.find_eq(key, root);
        if x.is_nil() {
            return None;
        }
        let idx = self.node(x).position(value)?;
        Some((x, idx))
    }

    pub(crate) fn successor(&self, x: Id) -> Id {
        self.neighbor(x, Side::Right)
    }

    pub(crate) fn predecessor(&self, x: Id) -> Id {
        self.neighbor(x, Side::Left)
    }

    fn neighbor(&self, x: Id, side: Side) -> Id {
        let down = self.child(x, side);
        if !down.is_nil() {
            return self.find_extreme(down, side.flip());
        }
        let mut cur = x;
        let mut p = self.parent(cur);
        while !p.is_nil() && self.child(p, side) == cur {
            cur = p;
            p = self.parent(p);
        }
        p
    }

    pub(crate) fn rotate_left(&mut self, u: Id, root: &mut Id) {
        self.rotate(u, Side::Right, root);
    }

    pub(crate) fn rotate_right(&mut self, u: Id, root: &mut Id) {
        self.rotate(u, Side::Left, root);
    }

    /// Promotes `u`'s child on `from` into `u`'s place.
    ///
    /// Aggregates are patched in O(1): the demoted node loses the promoted
    /// subtree but keeps the child that crosses over, and the promoted node
    /// then covers everything `u` covered before.
    fn rotate(&mut self, u: Id, from: Side, root: &mut Id) {
        let w = self.child(u, from);
        debug_assert!(!w.is_nil(), "rotation without a child to promote");
        let p = self.parent(u);
        let moved = self.child(w, from.flip());

        let moved_weight = self.weight(moved);
        let moved_count = self.count(moved);
        let (u_weight, u_count) = {
            let nu = self.node(u);
            (nu.weight.clone(), nu.count)
        };
        let (w_weight, w_count) = {
            let nw = self.node(w);
            (nw.weight.clone(), nw.count)
        };
        let new_u_weight = u_weight.sub(&w_weight).add(&moved_weight);
        let new_u_count = u_count - w_count + moved_count;
        let new_w_weight = w_weight.sub(&moved_weight).add(&new_u_weight);
        let new_w_count = w_count - moved_count + new_u_count;

        self.node_mut(w).parent = p;
        if !p.is_nil() {
            if self.node(p).left == u {
                self.node_mut(p).left = w;
            } else {
                self.node_mut(p).right = w;
            }
        }

        self.set_child(u, from, moved);
        if !moved.is_nil() {
            self.node_mut(moved).parent = u;
        }
        self.node_mut(u).parent = w;
        self.set_child(w, from.flip(), u);

        let nu = self.node_mut(u);
        nu.weight = new_u_weight;
        nu.count = new_u_count;
        let nw = self.node_mut(w);
        nw.weight = new_w_weight;
        nw.count = new_w_count;

        if *root == u {
            *root = w;
        }
    }

    pub(crate) fn bubble_up(&mut self, u: Id, root: &mut Id) {
        loop {
            let p = self.parent(u);
            if p.is_nil() || self.node(p).priority <= self.node(u).priority {
                break;
            }
            if self.node(p).right == u {
                self.rotate_left(p, root);
            } else {
                self.rotate_right(p, root);
            }
        }
        if self.parent(u).is_nil() {
            *root = u;
        }
    }

    /// Rotates `u` down until it is a leaf, always promoting the child that
    /// ranks first in heap order.
    pub(crate) fn trickle_down(&mut self, u: Id, root: &mut Id) {
        loop {
            let (left, right) = {
                let n = self.node(u);
                (n.left, n.right)
            };
            match (left.is_nil(), right.is_nil()) {
                (true, true) => break,
                (true, false) => self.rotate_left(u, root),
                (false, true) => self.rotate_right(u, root),
                (false, false) => {
                    if self.node(left).priority < self.node(right).priority {
                        self.rotate_right(u, root);
                    } else {
                        self.rotate_left(u, root);
                    }
                }
            }
        }
    }

    /// Unlinks `u`, which has at most one child, putting that child in its place.
    pub(crate) fn splice(&mut self, u: Id, root: &mut Id) {
        let (left, right, p) = {
            let n = self.node(u);
            (n.left, n.right, n.parent)
        };
        debug_assert!(left.is_nil() || right.is_nil());
        let s = if left.is_nil() { right } else { left };

        if *root == u {
            *root = s;
        } else if self.node(p).left == u {
            self.node_mut(p).left = s;
        } else {
            self.node_mut(p).right = s;
        }
        if !s.is_nil() {
            self.node_mut(s).parent = p;
        }
        let n = self.node_mut(u);
        n.parent = Id::NIL;
        n.left = Id::NIL;
        n.right = Id::NIL;
    }

    /// Inserts the detached, childless node `u`. If its key is already
    /// present the existing node absorbs `u`'s entries and `u` is released.
    /// Returns the node now holding the entries.
    pub(crate) fn insert_node(&mut self, u: Id, root: &mut Id) -> Id {
        debug_assert!(self.node(u).left.is_nil() && self.node(u).right.is_nil());
        if root.is_nil() {
            self.node_mut(u).parent = Id::NIL;
            *root = u;
            return u;
        }

        let (u_weight, u_count) = {
            let n = self.node(u);
            (n.weight.clone(), n.count)
        };
        let mut cur = *root;
        loop {
            let side = match self.node(u).key.cmp(&self.node(cur).key) {
                Ordering::Less => Side::Left,
                Ordering::Greater => Side::Right,
                Ordering::Equal => {
                    let absorbed = self.release(u);
                    let n = self.node_mut(cur);
                    n.entries.extend(absorbed.entries);
                    n.weight.add_assign(&u_weight);
                    n.count += u_count;
                    return cur;
                }
            };

            let n = self.node_mut(cur);
            n.weight.add_assign(&u_weight);
            n.count += u_count;
            let next = self.child(cur, side);
            if next.is_nil() {
                self.set_child(cur, side, u);
                self.node_mut(u).parent = cur;
                self.bubble_up(u, root);
                return u;
            }
            cur = next;
        }
    }

    /// Removes entry `idx` of node `u`, dropping the node if it was the last one.
    pub(crate) fn remove_entry(&mut self, u: Id, idx: usize, root: &mut Id) -> Entry<V, W> {
        if self.node(u).entries.len() > 1 {
            let n = self.node_mut(u);
            let entry = n.entries.remove(idx);
            n.weight.sub_assign(&entry.weight);
            n.count -= 1;
            let p = n.parent;
            self.propagate_removal(p, &entry.weight, 1);
            return entry;
        }
        debug_assert_eq!(idx, 0);
        let mut entries = self.remove_node(u, root);
        entries.remove(idx)
    }

    /// Removes node `u` with all of its entries.
    pub(crate) fn remove_node(&mut self, u: Id, root: &mut Id) -> Entries<V, W> {
        self.trickle_down(u, root);
        let p = self.parent(u);
        self.splice(u, root);
        let node = self.release(u);
        // As a leaf its aggregates cover exactly its own entries.
        self.propagate_removal(p, &node.weight, node.count);
        node.entries
    }

    fn propagate_removal(&mut self, from: Id, weight: &W, count: usize) {
        let mut p = from;
        while !p.is_nil() {
            let n = self.node_mut(p);
            n.weight.sub_assign(weight);
            n.count -= count;
            p = n.parent;
        }
    }

    /// Replaces the weight of entry `idx` at `u` and returns the old one.
    pub(crate) fn set_entry_weight(&mut self, u: Id, idx: usize, weight: W) -> W {
        let n = self.node_mut(u);
        let old = std::mem::replace(&mut n.entries[idx].weight, weight);
        let delta = n.entries[idx].weight.sub(&old);
        n.weight.add_assign(&delta);
        let mut p = n.parent;
        while !p.is_nil() {
            let n = self.node_mut(p);
            n.weight.add_assign(&delta);
            p = n.parent;
        }
        old
    }

    /// Splits off every key `>= key` into a new tree and returns its root.
    ///
    /// The lower-bound node is given the sentinel priority and bubbled to the
    /// root, which leaves the two halves hanging off it; it then gets
    /// `priority` and is inserted into the upper half.
    pub(crate) fn split(&mut self, key: &K, root: &mut Id, priority: i64) -> Id {
        let u = self.find_lower_bound(key, *root);
        if u.is_nil() {
            return Id::NIL;
        }

        self.node_mut(u).priority = SENTINEL_PRIORITY;
        self.bubble_up(u, root);
        debug_assert_eq!(*root, u);

        let (left, right) = {
            let n = self.node(u);
            (n.left, n.right)
        };
        let mut other = right;
        for half in [left, right] {
            if half.is_nil() {
                continue;
            }
            self.node_mut(half).parent = Id::NIL;
            let half_weight = self.weight(half);
            let half_count = self.count(half);
            let n = self.node_mut(u);
            n.weight.sub_assign(&half_weight);
            n.count -= half_count;
        }
        *root = left;

        let n = self.node_mut(u);
        n.left = Id::NIL;
        n.right = Id::NIL;
        n.parent = Id::NIL;
        n.priority = priority;
        self.insert_node(u, &mut other);
        other
    }

    /// Appends the tree at `other` to the tree at `root`. Every key of `root`
    /// must be smaller than every key of `other`; otherwise nothing changes
    /// and `false` is returned. On success `other` is left empty.
    pub(crate) fn merge(&mut self, root: &mut Id, other: &mut Id) -> bool
    where
        K: Clone,
    {
        if other.is_nil() {
            return true;
        }
        if root.is_nil() {
            *root = *other;
            *other = Id::NIL;
            return true;
        }

        let first_other = self.find_first(*other);
        let last_root = self.find_last(*root);
        if self.node(last_root).key >= self.node(first_other).key {
            return false;
        }

        let key = self.node(first_other).key.clone();
        let mut top = Node::synthetic(key, SENTINEL_PRIORITY);
        top.left = *root;
        top.right = *other;
        top.weight = self.weight(*root).add(&self.weight(*other));
        top.count = self.count(*root) + self.count(*other);
        let t = self.alloc(top);
        self.node_mut(*root).parent = t;
        self.node_mut(*other).parent = t;

        *root = t;
        *other = Id::NIL;
        self.remove_node(t, root);
        true
    }

    /// Releases every node of the tree with a post-order walk over parent
    /// links; no recursion and no auxiliary stack.
    pub(crate) fn clear(&mut self, root: &mut Id) {
        let mut u = *root;
        let mut prev = Id::NIL;
        while !u.is_nil() {
            let (p, left, right) = {
                let n = self.node(u);
                (n.parent, n.left, n.right)
            };
            let next = if prev == p {
                if !left.is_nil() {
                    left
                } else if !right.is_nil() {
                    right
                } else {
                    p
                }
            } else if prev == left && !right.is_nil() {
                right
            } else {
                p
            };

            prev = u;
            if next == p {
                self.release(u);
            }
            u = next;
        }
        *root = Id::NIL;
    }

    /// Total weight of keys `< key` (`<= key` when `inclusive`).
    pub(crate) fn left_weight(&self, key: &K, inclusive: bool, root: Id) -> W {
        self.side_weight(key, inclusive, root, Side::Left)
    }

    /// Total weight of keys `> key` (`>= key` when `inclusive`).
    pub(crate) fn right_weight(&self, key: &K, inclusive: bool, root: Id) -> W {
        self.side_weight(key, inclusive, root, Side::Right)
    }

    fn side_weight(&self, key: &K, inclusive: bool, root: Id, side: Side) -> W {
        let toward = match side {
            Side::Left => Ordering::Less,
            Side::Right => Ordering::Greater,
        };
        let mut sum = W::zero();
        let mut cur = root;
        while !cur.is_nil() {
            let n = self.node(cur);
            let ord = key.cmp(&n.key);
            if ord == toward {
                cur = self.child(cur, side);
                continue;
            }
            if ord == Ordering::Equal {
                if inclusive {
                    sum.add_assign(&n.weight.sub(&self.weight(self.child(cur, side.flip()))));
                } else {
                    sum.add_assign(&self.weight(self.child(cur, side)));
                }
                break;
            }
            // Node and the whole subtree on `side` lie within the range.
            sum.add_assign(&n.weight.sub(&self.weight(self.child(cur, side.flip()))));
            cur = self.child(cur, side.flip());
        }
        sum
    }

    /// Weight of everything ordered before entry `idx` of node `x`
    /// (including that entry when `inclusive`). A nil `x` means past the end.
    pub(crate) fn left_weight_at(&self, x: Id, idx: usize, inclusive: bool, root: Id) -> W {
        if root.is_nil() {
            return W::zero();
        }
        if x.is_nil() {
            return self.weight(root);
        }

        let n = self.node(x);
        let upto = if inclusive { idx + 1 } else { idx };
        let mut sum = n.entries[..upto]
            .iter()
            .fold(W::zero(), |acc, e| acc.add(&e.weight));
        sum.add_assign(&self.weight_left(x));

        let mut cur = x;
        let mut p = n.parent;
        while !p.is_nil() {
            let np = self.node(p);
            if np.right == cur {
                sum.add_assign(&np.weight.sub(&self.weight_right(p)));
            }
            cur = p;
            p = np.parent;
        }
        sum
    }

    /// Panics if some child ranks before its parent in priority order.
    /// Kept apart from [`check`](Self::check) since single rotations break
    /// heap order on purpose.
    pub(crate) fn check_heap_order(&self, root: Id) {
        let mut stack = Vec::new();
        if !root.is_nil() {
            stack.push(root);
        }
        while let Some(x) = stack.pop() {
            let n = self.node(x);
            for c in [n.left, n.right] {
                if !c.is_nil() {
                    assert!(
                        n.priority <= self.node(c).priority,
                        "heap order violated under {x:?}"
                    );
                    stack.push(c);
                }
            }
        }
    }

    pub(crate) fn node_count(&self, root: Id) -> usize {
        let mut nodes = 0;
        let mut cur = self.find_first(root);
        while !cur.is_nil() {
            nodes += 1;
            cur = self.successor(cur);
        }
        nodes
    }

    /// Depth of the deepest node, counting the root as 1.
    pub(crate) fn height(&self, root: Id) -> usize {
        let mut best = 0;
        let mut stack = Vec::new();
        if !root.is_nil() {
            stack.push((root, 1_usize));
        }
        while let Some((x, depth)) = stack.pop() {
            best = best.max(depth);
            let n = self.node(x);
            for c in [n.left, n.right] {
                if !c.is_nil() {
                    stack.push((c, depth + 1));
                }
            }
        }
        best
    }

    /// Panics unless the tree at `root` satisfies every structural and
    /// aggregate invariant. Returns the number of entries.
    pub(crate) fn check(&self, root: Id) -> usize {
        if root.is_nil() {
            return 0;
        }
        assert!(self.parent(root).is_nil(), "root {root:?} has a parent");

        let mut stack = vec![root];
        let mut nodes = 0_usize;
        while let Some(x) = stack.pop() {
            nodes += 1;
            let n = self.node(x);
            assert!(!n.entries.is_empty(), "node {x:?} has no entries");

            let mut weight = n.own_weight();
            let mut count = n.entries.len();
            for c in [n.left, n.right] {
                if c.is_nil() {
                    continue;
                }
                assert_eq!(self.parent(c), x, "broken parent link under {x:?}");
                weight.add_assign(&self.node(c).weight);
                count += self.node(c).count;
                stack.push(c);
            }
            assert_eq!(n.weight, weight, "weight aggregate mismatch at {x:?}");
            assert_eq!(n.count, count, "count aggregate mismatch at {x:?}");
        }

        let mut visited = 0_usize;
        let mut cur = self.find_first(root);
        while !cur.is_nil() {
            visited += 1;
            let next = self.successor(cur);
            if !next.is_nil() {
                assert!(
                    self.node(cur).key < self.node(next).key,
                    "keys out of order at {cur:?}"
                );
            }
            cur = next;
        }
        assert_eq!(visited, nodes, "in-order walk missed nodes");
        self.node(root).count
    }
}
