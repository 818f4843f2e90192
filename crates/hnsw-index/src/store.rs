use parking_lot::RwLock;
use smallvec::SmallVec;

use crate::NodeId;

/// Neighbor list backing store. Inline capacity of 16 covers the
/// teacher's default `Mmax(0) = 2*M = 20`-ish range without spilling to
/// the heap for typical configurations; larger `M` values still work,
/// just via a heap allocation like a plain `Vec`.
pub type NeighborList = SmallVec<[NodeId; 16]>;

/// One graph node: a dense id plus one neighbor list per layer it
/// participates in. `layers[0]` is the base layer; `layers.len() ==
/// max_layer + 1` and never changes after creation (spec §3).
#[derive(Debug)]
pub struct Node {
    pub id: NodeId,
    pub layers: Vec<RwLock<NeighborList>>,
}

impl Node {
    fn new(id: NodeId, max_layer: usize, m_max: impl Fn(usize) -> usize) -> Self {
        let layers = (0..=max_layer)
            // Reserve one slot past `Mmax(l)` so the legal
            // overshoot-then-shrink sequence (spec §9) never reallocates.
            .map(|l| RwLock::new(SmallVec::with_capacity(m_max(l) + 1)))
            .collect();
        Self { id, layers }
    }

    pub fn max_layer(&self) -> usize {
        self.layers.len() - 1
    }
}

/// Append-only node and item arrays, indexed by dense `u32` id (spec
/// §4.4 / §9 "cyclic neighbor references").
#[derive(Debug)]
pub struct NodeStore<T> {
    nodes: RwLock<Vec<Node>>,
    items: RwLock<Vec<T>>,
}

impl<T: Clone> NodeStore<T> {
    pub fn with_capacity(initial_items_size: usize) -> Self {
        Self {
            nodes: RwLock::new(Vec::with_capacity(initial_items_size)),
            items: RwLock::new(Vec::with_capacity(initial_items_size)),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Direct access to the node array, for callers (search/insert) that
    /// need to hold one read lock across a whole traversal rather than
    /// re-acquiring it per neighbor list.
    pub fn nodes(&self) -> &RwLock<Vec<Node>> {
        &self.nodes
    }

    pub fn item(&self, id: NodeId) -> T {
        self.items.read()[id as usize].clone()
    }

    /// Appends a new node/item pair. Writer-only.
    pub fn push(&self, item: T, max_layer: usize, m_max: impl Fn(usize) -> usize) -> NodeId {
        let mut nodes = self.nodes.write();
        let mut items = self.items.write();
        let id = nodes.len() as NodeId;
        nodes.push(Node::new(id, max_layer, m_max));
        items.push(item);
        id
    }

    pub fn max_layer_of(&self, id: NodeId) -> usize {
        self.nodes.read()[id as usize].max_layer()
    }

    pub fn neighbors_snapshot(&self, id: NodeId, layer: usize) -> Vec<NodeId> {
        self.nodes.read()[id as usize].layers[layer]
            .read()
            .iter()
            .copied()
            .collect()
    }

    /// Appends `dst` to `src`'s layer-`layer` neighbor list (deduplicated,
    /// never self-referential by construction). Returns the resulting
    /// length so the caller can decide whether a shrink is due. Writer-only.
    pub fn connect(&self, src: NodeId, dst: NodeId, layer: usize) -> usize {
        let nodes = self.nodes.read();
        let mut list = nodes[src as usize].layers[layer].write();
        if dst != src && !list.contains(&dst) {
            list.push(dst);
        }
        list.len()
    }

    /// Replaces `id`'s layer-`layer` neighbor list wholesale, used by the
    /// shrink path after the selector has chosen survivors. Writer-only.
    pub fn replace_neighbors(&self, id: NodeId, layer: usize, new_list: Vec<NodeId>) {
        let nodes = self.nodes.read();
        *nodes[id as usize].layers[layer].write() = NeighborList::from_vec(new_list);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_assigns_dense_increasing_ids() {
        let store = NodeStore::<u32>::with_capacity(4);
        let a = store.push(10, 0, |_| 4);
        let b = store.push(20, 0, |_| 4);
        assert_eq!(a, 0);
        assert_eq!(b, 1);
        assert_eq!(store.item(a), 10);
        assert_eq!(store.item(b), 20);
    }

    #[test]
    fn connect_deduplicates_and_rejects_self() {
        let store = NodeStore::<u32>::with_capacity(4);
        let a = store.push(1, 0, |_| 4);
        let b = store.push(2, 0, |_| 4);
        assert_eq!(store.connect(a, b, 0), 1);
        assert_eq!(store.connect(a, b, 0), 1);
        assert_eq!(store.connect(a, a, 0), 0);
    }

    #[test]
    fn replace_neighbors_overwrites_list() {
        let store = NodeStore::<u32>::with_capacity(4);
        let a = store.push(1, 0, |_| 4);
        store.connect(a, 1, 0);
        store.connect(a, 2, 0);
        store.replace_neighbors(a, 0, vec![2]);
        assert_eq!(store.neighbors_snapshot(a, 0), vec![2]);
    }
}
