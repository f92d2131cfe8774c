//! # Sparse Spatial Index
//!
//! A point-keyed octree (3D) / quadtree (2D) over a fixed inclusive domain,
//! used as the in-memory cache for chunks and regions.
//!
//! ```text
//!                 Internal [min, max]
//!        ┌──────────┬─────┴─────┬──────────┐
//!      child 0    child 1    child 2    child 3      (quadtree)
//!   [min, c-1]²  x:[c, max]  y:[c, max]   [c, max]²
//!        │
//!      Leaf (p, v)
//! ```
//!
//! Each leaf holds exactly one key. Inserting a key whose slot already holds a
//! different leaf splits the slot until the two keys land in different
//! children. Removing a key prunes emptied internal nodes and pulls a lone
//! leaf back up, so the shape only depends on the current key set.
//!
//! ## Storage
//!
//! Nodes live in one arena (`Vec<Node>`) addressed by index, with a free list
//! for recycled slots. The whole tree sits behind one `parking_lot::RwLock`:
//! mutators take the exclusive side, lookups and traversals the shared side.

use std::fmt;

use parking_lot::RwLock;

use crate::coords::{Bounds, IVec2, IVec3, TreePoint};
use crate::error::{WorldError, WorldResult};

/// Octree keyed by 3D points.
pub type Octree<V> = SparseTree<IVec3, V>;

/// Quadtree keyed by 2D points.
pub type QuadTree<V> = SparseTree<IVec2, V>;

/// Widest node fan-out supported (3 axes).
const MAX_ARITY: usize = 8;

type NodeId = usize;

enum Node<P, V> {
    /// Recycled slot, listed in the free list.
    Vacant,
    Leaf {
        pos: P,
        value: V,
    },
    Internal {
        bounds: Bounds<P>,
        children: [Option<NodeId>; MAX_ARITY],
    },
}

/// Where a node hangs: the root, or a child slot of an internal node.
#[derive(Clone, Copy)]
enum Slot {
    Root,
    Child(NodeId, usize),
}

struct Arena<P, V> {
    nodes: Vec<Node<P, V>>,
    free: Vec<NodeId>,
    root: Option<NodeId>,
    len: usize,
}

impl<P: TreePoint, V> Arena<P, V> {
    const fn new() -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            root: None,
            len: 0,
        }
    }

    fn alloc(&mut self, node: Node<P, V>) -> NodeId {
        if let Some(id) = self.free.pop() {
            self.nodes[id] = node;
            id
        } else {
            self.nodes.push(node);
            self.nodes.len() - 1
        }
    }

    fn release(&mut self, id: NodeId) {
        self.nodes[id] = Node::Vacant;
        self.free.push(id);
    }

    fn slot(&self, slot: Slot) -> Option<NodeId> {
        match slot {
            Slot::Root => self.root,
            Slot::Child(parent, offset) => match &self.nodes[parent] {
                Node::Internal { children, .. } => children[offset],
                _ => None,
            },
        }
    }

    fn set_slot(&mut self, slot: Slot, id: Option<NodeId>) {
        match slot {
            Slot::Root => self.root = id,
            Slot::Child(parent, offset) => {
                if let Node::Internal { children, .. } = &mut self.nodes[parent] {
                    children[offset] = id;
                }
            }
        }
    }

    fn insert(&mut self, domain: Bounds<P>, pos: P, value: V) -> WorldResult<()> {
        let mut slot = Slot::Root;
        let mut bounds = domain;

        loop {
            let Some(current) = self.slot(slot) else {
                let leaf = self.alloc(Node::Leaf { pos, value });
                self.set_slot(slot, Some(leaf));
                self.len += 1;
                return Ok(());
            };

            match &self.nodes[current] {
                Node::Leaf { pos: existing, .. } => {
                    let existing = *existing;
                    if existing == pos {
                        return Err(WorldError::DuplicateKey(pos.components()));
                    }

                    // Split: an internal node over this slot's bounds takes the
                    // old leaf as its only child, then the loop descends again.
                    let offset = Bounds::child_offset(bounds.center(), existing);
                    let mut children = [None; MAX_ARITY];
                    children[offset] = Some(current);
                    let internal = self.alloc(Node::Internal { bounds, children });
                    self.set_slot(slot, Some(internal));
                }
                Node::Internal {
                    bounds: node_bounds,
                    ..
                } => {
                    let offset = Bounds::child_offset(node_bounds.center(), pos);
                    bounds = node_bounds.child(offset);
                    slot = Slot::Child(current, offset);
                }
                Node::Vacant => unreachable!("vacant node reachable from the root"),
            }
        }
    }

    fn find(&self, pos: P) -> Option<NodeId> {
        let mut current = self.root?;
        loop {
            match &self.nodes[current] {
                Node::Leaf { pos: existing, .. } => {
                    return (*existing == pos).then_some(current);
                }
                Node::Internal { bounds, children } => {
                    current = children[Bounds::child_offset(bounds.center(), pos)]?;
                }
                Node::Vacant => return None,
            }
        }
    }

    fn remove(&mut self, pos: P) -> bool {
        let mut path: Vec<(NodeId, usize)> = Vec::new();
        let Some(mut current) = self.root else {
            return false;
        };

        loop {
            match &self.nodes[current] {
                Node::Leaf { pos: existing, .. } => {
                    if *existing != pos {
                        return false;
                    }
                    break;
                }
                Node::Internal { bounds, children } => {
                    let offset = Bounds::child_offset(bounds.center(), pos);
                    let Some(child) = children[offset] else {
                        return false;
                    };
                    path.push((current, offset));
                    current = child;
                }
                Node::Vacant => return false,
            }
        }

        self.release(current);
        self.len -= 1;

        // Prune bottom-up. An emptied internal node disappears; one left with
        // a single leaf is replaced by that leaf.
        let mut replacement = None;
        while let Some((parent, offset)) = path.pop() {
            self.set_slot(Slot::Child(parent, offset), replacement);

            let Node::Internal { children, .. } = &self.nodes[parent] else {
                return true;
            };
            let mut occupied = children.iter().flatten();
            let first = occupied.next().copied();
            let single = occupied.next().is_none();

            match first {
                None => {
                    self.release(parent);
                    replacement = None;
                }
                Some(only) if single && matches!(self.nodes[only], Node::Leaf { .. }) => {
                    self.release(parent);
                    replacement = Some(only);
                }
                Some(_) => return true,
            }
        }

        self.root = replacement;
        true
    }

    /// Depth-first walk; `descend` decides whether an internal node's subtree
    /// is entered.
    fn walk(
        &self,
        mut descend: impl FnMut(&Bounds<P>) -> bool,
        mut leaf: impl FnMut(P, &V),
    ) {
        let Some(root) = self.root else {
            return;
        };
        let mut stack = vec![root];

        while let Some(id) = stack.pop() {
            match &self.nodes[id] {
                Node::Leaf { pos, value } => leaf(*pos, value),
                Node::Internal { bounds, children } => {
                    if descend(bounds) {
                        // reversed so that child 0 is visited first
                        stack.extend(children.iter().rev().flatten());
                    }
                }
                Node::Vacant => {}
            }
        }
    }
}

/// Point-keyed sparse tree over an inclusive domain.
///
/// # Example
///
/// ```rust,ignore
/// let tree: Octree<&str> = Octree::new(Bounds::new(IVec3::new(-8, -8, -8), IVec3::new(7, 7, 7)));
///
/// tree.insert(IVec3::new(1, 2, 3), "a")?;
/// assert_eq!(tree.try_get(IVec3::new(1, 2, 3)), Some("a"));
/// assert!(tree.insert(IVec3::new(1, 2, 3), "b").is_err());
/// ```
pub struct SparseTree<P, V> {
    bounds: Bounds<P>,
    arena: RwLock<Arena<P, V>>,
}

impl<P: TreePoint, V> SparseTree<P, V> {
    /// Creates an empty tree over `bounds`.
    #[must_use]
    pub fn new(bounds: Bounds<P>) -> Self {
        debug_assert!(P::ARITY <= MAX_ARITY);
        Self {
            bounds,
            arena: RwLock::new(Arena::new()),
        }
    }

    /// The domain of the tree.
    #[inline]
    #[must_use]
    pub const fn bounds(&self) -> Bounds<P> {
        self.bounds
    }

    /// Inserts a new key.
    ///
    /// # Errors
    ///
    /// - [`WorldError::OutOfRange`] if `pos` is outside the tree domain
    /// - [`WorldError::DuplicateKey`] if `pos` is already present
    pub fn insert(&self, pos: P, value: V) -> WorldResult<()> {
        if !self.bounds.contains(pos) {
            return Err(WorldError::OutOfRange {
                coord: pos.components(),
                min: self.bounds.min.components(),
                max: self.bounds.max.components(),
            });
        }
        self.arena.write().insert(self.bounds, pos, value)
    }

    /// Removes a key. Returns false if it was not present.
    pub fn remove(&self, pos: P) -> bool {
        if !self.bounds.contains(pos) {
            return false;
        }
        self.arena.write().remove(pos)
    }

    /// Returns true if `pos` is present.
    #[must_use]
    pub fn contains(&self, pos: P) -> bool {
        self.bounds.contains(pos) && self.arena.read().find(pos).is_some()
    }

    /// Number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.arena.read().len
    }

    /// Returns true if the tree holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of live arena nodes (leaves plus internal nodes).
    #[must_use]
    pub fn node_count(&self) -> usize {
        let arena = self.arena.read();
        arena.nodes.len() - arena.free.len()
    }

    /// Visits every entry depth-first, lower children first.
    ///
    /// The shared lock is held for the whole walk; the visitor must not
    /// mutate this tree.
    pub fn preorder<F>(&self, mut visitor: F)
    where
        F: FnMut(P, &V),
    {
        self.arena.read().walk(|_| true, |pos, value| visitor(pos, value));
    }
}

impl<P: TreePoint, V: Clone> SparseTree<P, V> {
    /// Returns a clone of the value at `pos`.
    #[must_use]
    pub fn try_get(&self, pos: P) -> Option<V> {
        if !self.bounds.contains(pos) {
            return None;
        }
        let arena = self.arena.read();
        let id = arena.find(pos)?;
        match &arena.nodes[id] {
            Node::Leaf { value, .. } => Some(value.clone()),
            _ => None,
        }
    }

    /// All entries whose key lies inside `query`, skipping subtrees whose
    /// bounds do not overlap it.
    #[must_use]
    pub fn overlap_box(&self, query: &Bounds<P>) -> Vec<(P, V)> {
        let mut hits = Vec::new();
        if !self.bounds.overlaps(query) {
            return hits;
        }
        self.arena.read().walk(
            |bounds| bounds.overlaps(query),
            |pos, value| {
                if query.contains(pos) {
                    hits.push((pos, value.clone()));
                }
            },
        );
        hits
    }

    /// Snapshot of every entry in preorder.
    #[must_use]
    pub fn entries(&self) -> Vec<(P, V)> {
        let mut out = Vec::with_capacity(self.len());
        self.preorder(|pos, value| out.push((pos, value.clone())));
        out
    }
}

impl<P: TreePoint, V> fmt::Debug for SparseTree<P, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SparseTree")
            .field("bounds", &self.bounds)
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}
