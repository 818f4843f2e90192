use std::cell::RefCell;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use parking_lot::RwLock;

use hnsw_core::{CancellationToken, HnswError};

use crate::queue::{Candidate, ExpansionHeap, ResultHeap};
use crate::store::Node;
use crate::visited::VisitedSet;
use crate::NodeId;

/// Reusable per-thread buffers for `search_layer`, grounded in the
/// teacher's `VISITED_SCRATCH` thread-local.
#[derive(Default)]
pub struct SearchScratch {
    visited: VisitedSet,
    expansion: ExpansionHeap,
    results: ResultHeap,
}

thread_local! {
    static SCRATCH: RefCell<SearchScratch> = RefCell::new(SearchScratch::default());
}

pub fn with_scratch<R>(f: impl FnOnce(&mut SearchScratch) -> R) -> R {
    SCRATCH.with(|cell| f(&mut cell.borrow_mut()))
}

/// C6: `search_layer` (spec §4.6).
///
/// `cost(id)` is the distance from `id` to whatever is being searched
/// for. Because it is a closure rather than a node id, the same routine
/// serves both "distance to a stored node" during insertion and
/// "distance to an ad-hoc query" during a lookup, with no sentinel id
/// needed for the query side.
///
/// `keep`, when present, gates the *output* and the ef-bound alike: the
/// beam's admission/break test is driven by the filtered `results` heap,
/// not by raw visitation, so a filter that rejects most locally-nearest
/// nodes widens the effective search radius rather than starving it
/// (spec §4.6/§4.8 "cost proportional to the filtered fraction"). A
/// filtered-out node is still explored and can still lead to matching
/// neighbors — it just never occupies a `results` slot itself.
///
/// Returns `Err(GraphChanged)` the moment `version` no longer matches
/// `start_version`; the caller is expected to retry from a fresh entry
/// point. A set `cancel` token stops the loop without being an error —
/// the best partial result gathered so far is returned.
#[allow(clippy::too_many_arguments)]
pub fn search_layer(
    nodes: &RwLock<Vec<Node>>,
    scratch: &mut SearchScratch,
    entry_id: NodeId,
    cost: &dyn Fn(NodeId) -> f64,
    layer: usize,
    ef: usize,
    keep: Option<&dyn Fn(NodeId) -> bool>,
    cancel: &CancellationToken,
    version: &AtomicU64,
    start_version: u64,
) -> Result<Vec<Candidate>, HnswError> {
    let guard = nodes.read();

    scratch.visited.reset_for_len(guard.len());
    scratch.expansion.clear();
    scratch.results.clear();

    if guard.get(entry_id as usize).is_none() {
        return Ok(Vec::new());
    }

    let passes = |id: NodeId| keep.map_or(true, |f| f(id));

    let entry = Candidate {
        id: entry_id,
        distance: cost(entry_id),
    };
    scratch.expansion.push(entry);
    scratch.visited.insert(entry_id);
    if passes(entry_id) {
        scratch.results.push(entry);
    }

    while let Some(cand) = scratch.expansion.pop() {
        if version.load(Ordering::Acquire) != start_version {
            return Err(HnswError::GraphChanged);
        }
        if cancel.is_cancelled() {
            break;
        }

        if let Some(worst) = scratch.results.peek_farthest() {
            if cand.distance > worst.distance && scratch.results.len() >= ef {
                break;
            }
        }

        let Some(node) = guard.get(cand.id as usize) else {
            continue;
        };
        if node.layers.len() <= layer {
            continue;
        }

        let neighbors = node.layers[layer].read();
        for &neighbor in neighbors.iter() {
            if !scratch.visited.insert(neighbor) {
                continue;
            }
            let d = cost(neighbor);
            let worst = scratch.results.peek_farthest().map(|c| c.distance);
            let admits = match worst {
                None => true,
                Some(w) => scratch.results.len() < ef || d < w,
            };
            if !admits {
                continue;
            }

            let c = Candidate { id: neighbor, distance: d };
            scratch.expansion.push(c);
            if passes(neighbor) {
                scratch.results.push(c);
                if scratch.results.len() > ef {
                    scratch.results.pop_farthest();
                }
            }
        }
    }

    Ok(scratch.results.to_sorted_vec())
}

/// Single-best greedy descent across the layers strictly above
/// `down_to`, used by both the zoom-in phase of a query and the descent
/// phase of an insert (spec §4.6's "zoom-in", §4.7 step 3).
pub fn greedy_descend(
    nodes: &RwLock<Vec<Node>>,
    cost: &dyn Fn(NodeId) -> f64,
    mut curr: NodeId,
    mut curr_dist: f64,
    from_layer: usize,
    down_to: usize,
) -> (NodeId, f64) {
    if from_layer < down_to {
        return (curr, curr_dist);
    }
    let guard = nodes.read();
    for layer in (down_to..=from_layer).rev() {
        loop {
            let Some(node) = guard.get(curr as usize) else { break };
            if node.layers.len() <= layer {
                break;
            }
            let neighbors = node.layers[layer].read();
            let mut moved = false;
            for &n in neighbors.iter() {
                let d = cost(n);
                if d < curr_dist {
                    curr_dist = d;
                    curr = n;
                    moved = true;
                }
            }
            drop(neighbors);
            if !moved {
                break;
            }
        }
    }
    (curr, curr_dist)
}

/// C8: `K-NN-SEARCH` (spec §4.8). Retries on `GraphChanged` up to a
/// bounded number of attempts; exhausting the budget is surfaced as an
/// error (it should never happen under correct single-writer discipline)
/// rather than silently degrading.
#[allow(clippy::too_many_arguments)]
pub fn knn_search(
    nodes: &RwLock<Vec<Node>>,
    entry_point: &AtomicI64,
    version: &AtomicU64,
    cost: &dyn Fn(NodeId) -> f64,
    k: usize,
    ef_search: usize,
    keep: Option<&dyn Fn(NodeId) -> bool>,
    cancel: &CancellationToken,
) -> Result<Vec<Candidate>, HnswError> {
    const MAX_RETRIES: u32 = 1024;
    let ef = ef_search.max(k);

    for _ in 0..MAX_RETRIES {
        let start_version = version.load(Ordering::Acquire);
        let entry = entry_point.load(Ordering::Acquire);
        if entry < 0 {
            return Ok(Vec::new());
        }
        let entry_id = entry as NodeId;

        let (top_layer, entry_dist) = {
            let guard = nodes.read();
            match guard.get(entry_id as usize) {
                Some(node) => (node.max_layer(), cost(entry_id)),
                None => return Ok(Vec::new()),
            }
        };

        if cancel.is_cancelled() {
            return Ok(Vec::new());
        }

        let (ep, _) = greedy_descend(nodes, cost, entry_id, entry_dist, top_layer, 1);

        let attempt = with_scratch(|scratch| {
            search_layer(nodes, scratch, ep, cost, 0, ef, keep, cancel, version, start_version)
        });

        match attempt {
            Ok(mut results) => {
                results.truncate(k);
                return Ok(results);
            }
            Err(HnswError::GraphChanged) => continue,
            Err(other) => return Err(other),
        }
    }

    tracing::warn!("k-nearest-neighbor search exhausted its graph-change retry budget");
    Err(HnswError::GraphChanged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::NodeStore;

    /// Builds a line graph `0 - 1 - 2 - ... - (n-1)` over `f64` points
    /// `0.0, 1.0, ...` connected at layer 0, all single-layer nodes.
    fn line_graph(n: u32) -> NodeStore<f64> {
        let store = NodeStore::with_capacity(n as usize);
        for i in 0..n {
            store.push(i as f64, 0, |_| 8);
        }
        for i in 0..n.saturating_sub(1) {
            store.connect(i, i + 1, 0);
            store.connect(i + 1, i, 0);
        }
        store
    }

    #[test]
    fn search_layer_finds_nearest_along_chain() {
        let store = line_graph(10);
        let target = 7.2;
        let cost = |id: NodeId| (store.item(id) - target).abs();
        let version = AtomicU64::new(0);
        let cancel = CancellationToken::new();
        let result = with_scratch(|scratch| {
            search_layer(store.nodes(), scratch, 0, &cost, 0, 3, None, &cancel, &version, 0)
        })
        .unwrap();
        assert_eq!(result[0].id, 7);
    }

    #[test]
    fn search_layer_filter_does_not_block_traversal() {
        let store = line_graph(10);
        let target = 9.0;
        let cost = |id: NodeId| (store.item(id) - target).abs();
        let version = AtomicU64::new(0);
        let cancel = CancellationToken::new();
        // Node 5 fails the filter but sits on the only path to node 9.
        let keep = |id: NodeId| id != 5;
        let result = with_scratch(|scratch| {
            search_layer(
                store.nodes(),
                scratch,
                0,
                &cost,
                0,
                5,
                Some(&keep),
                &cancel,
                &version,
                0,
            )
        })
        .unwrap();
        assert!(result.iter().any(|c| c.id == 9));
        assert!(!result.iter().any(|c| c.id == 5));
    }

    #[test]
    fn search_layer_reports_graph_changed_on_stale_version() {
        let store = line_graph(4);
        let cost = |id: NodeId| store.item(id);
        let version = AtomicU64::new(5);
        let cancel = CancellationToken::new();
        let result = with_scratch(|scratch| {
            search_layer(store.nodes(), scratch, 0, &cost, 0, 2, None, &cancel, &version, 1)
        });
        assert!(matches!(result, Err(HnswError::GraphChanged)));
    }

    #[test]
    fn search_layer_respects_cancellation_with_partial_results() {
        let store = line_graph(20);
        let cost = |id: NodeId| store.item(id);
        let version = AtomicU64::new(0);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = with_scratch(|scratch| {
            search_layer(store.nodes(), scratch, 0, &cost, 0, 10, None, &cancel, &version, 0)
        })
        .unwrap();
        // The entry point is admitted before the loop head cancellation
        // check is ever reached.
        assert!(!result.is_empty());
    }

    #[test]
    fn knn_search_returns_k_nearest_sorted() {
        let store = line_graph(30);
        let target = 14.6;
        let cost = |id: NodeId| (store.item(id) - target).abs();
        let entry_point = AtomicI64::new(0);
        let version = AtomicU64::new(0);
        let cancel = CancellationToken::new();
        let result = knn_search(store.nodes(), &entry_point, &version, &cost, 3, 16, None, &cancel)
            .unwrap();
        assert_eq!(result.len(), 3);
        assert_eq!(result[0].id, 15);
        for pair in result.windows(2) {
            assert!(pair[0].distance <= pair[1].distance);
        }
    }

    #[test]
    fn knn_search_on_empty_graph_returns_empty() {
        let store = NodeStore::<f64>::with_capacity(4);
        let cost = |_id: NodeId| 0.0;
        let entry_point = AtomicI64::new(-1);
        let version = AtomicU64::new(0);
        let cancel = CancellationToken::new();
        let result = knn_search(store.nodes(), &entry_point, &version, &cost, 3, 16, None, &cancel)
            .unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn knn_search_cancelled_before_start_returns_empty() {
        let store = line_graph(10);
        let cost = |id: NodeId| store.item(id);
        let entry_point = AtomicI64::new(0);
        let version = AtomicU64::new(0);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = knn_search(store.nodes(), &entry_point, &version, &cost, 3, 16, None, &cancel)
            .unwrap();
        assert!(result.is_empty());
    }
}
