//! The in-memory HNSW graph engine: layer assignment, insertion, layered
//! search, and the distance/concurrency substrate underneath them.

/// Dense node identifier, assigned in insertion order starting at 0
/// (spec §3 invariant 5).
pub type NodeId = u32;

mod distance;
mod index;
mod insert;
mod queue;
mod search;
mod select;
mod snapshot;
mod store;
mod visited;

pub use distance::{pair_key, DistanceCache, DistanceOracle};
pub use index::{HnswIndex, SearchResult};
pub use insert::insert;
pub use queue::{Candidate, ExpansionHeap, ResultHeap};
pub use search::{greedy_descend, knn_search, search_layer, with_scratch, SearchScratch};
pub use select::{select_heuristic, select_simple};
pub use snapshot::{decode, encode, Decoded, SnapshotData, SnapshotNode, SnapshotParams};
pub use store::{NeighborList, Node, NodeStore};
pub use visited::VisitedSet;
