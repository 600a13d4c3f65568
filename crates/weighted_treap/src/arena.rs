use tracing::trace;

use crate::node::{Id, Node, Side};
use crate::weight::Weight;

/// Slot storage for treap nodes. One arena may back several roots.
pub(crate) struct NodeArena<K, V, W> {
    slots: Vec<Option<Node<K, V, W>>>,
    free: Vec<Id>,
}

impl<K, V, W> NodeArena<K, V, W> {
    pub(crate) fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    /// Number of live nodes.
    pub(crate) fn live(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Drops all storage. Only valid once no root refers into the arena.
    pub(crate) fn reset(&mut self) {
        debug_assert_eq!(self.live(), 0, "reset with live nodes");
        self.slots.clear();
        self.free.clear();
    }

    pub(crate) fn alloc(&mut self, node: Node<K, V, W>) -> Id {
        if let Some(id) = self.free.pop() {
            self.slots[id.idx()] = Some(node);
            return id;
        }
        let id = Id::from_idx(self.slots.len());
        self.slots.push(Some(node));
        id
    }

    pub(crate) fn release(&mut self, x: Id) -> Node<K, V, W> {
        match self.slots[x.idx()].take() {
            Some(node) => {
                self.free.push(x);
                node
            }
            None => unreachable!("double release of node {x:?}"),
        }
    }

    #[inline(always)]
    pub(crate) fn node(&self, x: Id) -> &Node<K, V, W> {
        debug_assert!(!x.is_nil());
        match &self.slots[x.idx()] {
            Some(node) => node,
            None => unreachable!("dangling node id {x:?}"),
        }
    }

    #[inline(always)]
    pub(crate) fn node_mut(&mut self, x: Id) -> &mut Node<K, V, W> {
        debug_assert!(!x.is_nil());
        match &mut self.slots[x.idx()] {
            Some(node) => node,
            None => unreachable!("dangling node id {x:?}"),
        }
    }

    #[inline(always)]
    pub(crate) fn parent(&self, x: Id) -> Id {
        self.node(x).parent
    }

    #[inline(always)]
    pub(crate) fn child(&self, x: Id, side: Side) -> Id {
        let n = self.node(x);
        match side {
            Side::Left => n.left,
            Side::Right => n.right,
        }
    }

    #[inline(always)]
    pub(crate) fn set_child(&mut self, x: Id, side: Side, c: Id) {
        let n = self.node_mut(x);
        match side {
            Side::Left => n.left = c,
            Side::Right => n.right = c,
        }
    }

    #[inline(always)]
    pub(crate) fn count(&self, x: Id) -> usize {
        if x.is_nil() { 0 } else { self.node(x).count }
    }

    /// Moves the detached subtree rooted at `root` into `into`, returning
    /// its id there. Walks with an explicit stack.
    pub(crate) fn relocate(&mut self, root: Id, into: &mut Self) -> Id {
        if root.is_nil() {
            return Id::NIL;
        }
        debug_assert!(self.parent(root).is_nil());

        let mut moved = 0_usize;
        let mut new_root = Id::NIL;
        let mut stack = vec![(root, Id::NIL, Side::Left)];
        while let Some((old, new_parent, side)) = stack.pop() {
            let mut node = self.release(old);
            let (left, right) = (node.left, node.right);
            node.parent = new_parent;
            node.left = Id::NIL;
            node.right = Id::NIL;

            let id = into.alloc(node);
            if new_parent.is_nil() {
                new_root = id;
            } else {
                into.set_child(new_parent, side, id);
            }
            if !left.is_nil() {
                stack.push((left, id, Side::Left));
            }
            if !right.is_nil() {
                stack.push((right, id, Side::Right));
            }
            moved += 1;
        }
        trace!(moved, "relocated subtree between arenas");
        new_root
    }
}

impl<K, V, W: Weight> NodeArena<K, V, W> {
    #[inline(always)]
    pub(crate) fn weight(&self, x: Id) -> W {
        if x.is_nil() {
            W::zero()
        } else {
            self.node(x).weight.clone()
        }
    }

    pub(crate) fn weight_left(&self, x: Id) -> W {
        self.weight(self.node(x).left)
    }

    pub(crate) fn weight_right(&self, x: Id) -> W {
        self.weight(self.node(x).right)
    }
}
