use std::iter::FusedIterator;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::arena::NodeArena;
use crate::node::Id;
use crate::weight::Weight;

/// Identities are unique per process, not per priority stream: two maps
/// built from the same seed must still reject each other's cursors.
static NEXT_MAP_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_map_id() -> u64 {
    NEXT_MAP_ID.fetch_add(1, Ordering::Relaxed)
}

/// Position of one entry inside a map, or the past-the-end position.
///
/// A cursor does not borrow its map. It is stamped with the map's
/// generation and every structural mutation (insert, any removal, move,
/// split, merge, clear) invalidates it; handing a stale cursor back to the
/// map panics. Changing a weight keeps cursors valid.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cursor {
    pub(crate) fragment: usize,
    pub(crate) node: Id,
    pub(crate) entry: usize,
    pub(crate) map: u64,
    pub(crate) generation: u64,
}

impl Cursor {
    pub fn is_end(&self) -> bool {
        self.node.is_nil()
    }
}

/// Identity and generation of a map, checked against cursors it receives.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Stamp {
    map: u64,
    generation: u64,
}

impl Stamp {
    pub(crate) fn new() -> Self {
        Self {
            map: next_map_id(),
            generation: 0,
        }
    }

    pub(crate) fn bump(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }

    pub(crate) fn cursor(&self, pos: Option<Pos>) -> Cursor {
        match pos {
            Some(pos) => Cursor {
                fragment: pos.fragment,
                node: pos.node,
                entry: pos.entry,
                map: self.map,
                generation: self.generation,
            },
            None => Cursor {
                fragment: 0,
                node: Id::NIL,
                entry: 0,
                map: self.map,
                generation: self.generation,
            },
        }
    }

    /// Panics if `cursor` was not produced by this map at its current generation.
    pub(crate) fn check(&self, cursor: &Cursor) -> Option<Pos> {
        assert_eq!(cursor.map, self.map, "cursor belongs to a different map");
        assert_eq!(
            cursor.generation, self.generation,
            "cursor used after the map was structurally modified"
        );
        if cursor.node.is_nil() {
            None
        } else {
            Some(Pos {
                fragment: cursor.fragment,
                node: cursor.node,
                entry: cursor.entry,
            })
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Pos {
    pub(crate) fragment: usize,
    pub(crate) node: Id,
    pub(crate) entry: usize,
}

/// In-order stepping over a sequence of trees whose key ranges follow
/// each other, as given by `roots`.
impl<K: Ord, V, W: Weight> NodeArena<K, V, W> {
    pub(crate) fn first_pos(&self, roots: &[Id]) -> Option<Pos> {
        self.first_pos_from(roots, 0)
    }

    pub(crate) fn first_pos_from(&self, roots: &[Id], start: usize) -> Option<Pos> {
        roots
            .iter()
            .enumerate()
            .skip(start)
            .find(|(_, root)| !root.is_nil())
            .map(|(fragment, &root)| Pos {
                fragment,
                node: self.find_first(root),
                entry: 0,
            })
    }

    pub(crate) fn last_pos(&self, roots: &[Id]) -> Option<Pos> {
        self.last_pos_before(roots, roots.len())
    }

    fn last_pos_before(&self, roots: &[Id], end: usize) -> Option<Pos> {
        roots[..end]
            .iter()
            .enumerate()
            .rev()
            .find(|(_, root)| !root.is_nil())
            .map(|(fragment, &root)| {
                let node = self.find_last(root);
                Pos {
                    fragment,
                    node,
                    entry: self.node(node).entries.len() - 1,
                }
            })
    }

    pub(crate) fn node_pos(&self, fragment: usize, node: Id) -> Option<Pos> {
        if node.is_nil() {
            None
        } else {
            Some(Pos {
                fragment,
                node,
                entry: 0,
            })
        }
    }

    pub(crate) fn next_pos(&self, roots: &[Id], pos: Pos) -> Option<Pos> {
        if pos.entry + 1 < self.node(pos.node).entries.len() {
            return Some(Pos {
                entry: pos.entry + 1,
                ..pos
            });
        }
        let next = self.successor(pos.node);
        if next.is_nil() {
            return self.first_pos_from(roots, pos.fragment + 1);
        }
        Some(Pos {
            fragment: pos.fragment,
            node: next,
            entry: 0,
        })
    }

    pub(crate) fn prev_pos(&self, roots: &[Id], pos: Pos) -> Option<Pos> {
        if pos.entry > 0 {
            return Some(Pos {
                entry: pos.entry - 1,
                ..pos
            });
        }
        let prev = self.predecessor(pos.node);
        if prev.is_nil() {
            return self.last_pos_before(roots, pos.fragment);
        }
        Some(Pos {
            fragment: pos.fragment,
            node: prev,
            entry: self.node(prev).entries.len() - 1,
        })
    }
}

/// Borrowing in-order iterator over `(key, value, weight)` triples.
pub struct Iter<'a, K, V, W> {
    arena: &'a NodeArena<K, V, W>,
    roots: &'a [Id],
    front: Option<Pos>,
    back: Option<Pos>,
    remaining: usize,
}

impl<'a, K: Ord, V, W: Weight> Iter<'a, K, V, W> {
    pub(crate) fn new(arena: &'a NodeArena<K, V, W>, roots: &'a [Id], len: usize) -> Self {
        Self {
            arena,
            roots,
            front: arena.first_pos(roots),
            back: arena.last_pos(roots),
            remaining: len,
        }
    }

    fn item(&self, pos: Pos) -> (&'a K, &'a V, &'a W) {
        let arena: &'a NodeArena<K, V, W> = self.arena;
        let n = arena.node(pos.node);
        let e = &n.entries[pos.entry];
        (&n.key, &e.value, &e.weight)
    }
}

impl<'a, K: Ord, V, W: Weight> Iterator for Iter<'a, K, V, W> {
    type Item = (&'a K, &'a V, &'a W);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let pos = self.front?;
        self.remaining -= 1;
        self.front = self.arena.next_pos(self.roots, pos);
        Some(self.item(pos))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K: Ord, V, W: Weight> DoubleEndedIterator for Iter<'_, K, V, W> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let pos = self.back?;
        self.remaining -= 1;
        self.back = self.arena.prev_pos(self.roots, pos);
        Some(self.item(pos))
    }
}

impl<K: Ord, V, W: Weight> ExactSizeIterator for Iter<'_, K, V, W> {}

impl<K: Ord, V, W: Weight> FusedIterator for Iter<'_, K, V, W> {}
