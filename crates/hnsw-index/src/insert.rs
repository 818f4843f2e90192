use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU64, Ordering};

use hnsw_core::{CancellationToken, Metric, NeighbourHeuristic, Parameters, SeededRng};

use crate::distance::{DistanceCache, DistanceOracle};
use crate::queue::Candidate;
use crate::search::{greedy_descend, search_layer, with_scratch};
use crate::select::{select_heuristic, select_simple};
use crate::store::NodeStore;
use crate::NodeId;

/// Allocation safety bound on the sampled level, not a spec-mandated cap:
/// `-ln(u)` has unbounded support, and without a ceiling a pathological
/// RNG draw could ask for an absurd number of layers on a single node.
const MAX_LAYERS: usize = 32;

/// Bundles the item store with an optional single-writer distance cache
/// behind a `RefCell`, so distance closures can stay `Fn` (as
/// `search_layer` requires) while still mutating the cache internally.
struct Oracle<'a, T, M> {
    store: &'a NodeStore<T>,
    cache: Option<RefCell<&'a mut DistanceCache>>,
    _marker: PhantomData<fn() -> M>,
}

impl<'a, T: Clone, M: Metric<T>> Oracle<'a, T, M> {
    fn between(&self, a: NodeId, b: NodeId) -> f64 {
        let ia = self.store.item(a);
        let ib = self.store.item(b);
        match &self.cache {
            Some(cell) => {
                let mut c = cell.borrow_mut();
                DistanceOracle::<T, M>::cached_distance(&mut **c, a, b, &ia, &ib)
            }
            None => DistanceOracle::<T, M>::distance(&ia, &ib),
        }
    }
}

fn select_neighbors<T: Clone, M: Metric<T>>(
    oracle: &Oracle<T, M>,
    params: &Parameters,
    target: NodeId,
    candidates: Vec<Candidate>,
    cap: usize,
    layer: usize,
) -> Vec<NodeId> {
    match params.neighbour_heuristic {
        NeighbourHeuristic::Simple => select_simple(candidates, cap),
        NeighbourHeuristic::Heuristic => select_heuristic(
            candidates,
            cap,
            params.expand_best_selection,
            params.keep_pruned_connections,
            |n| oracle.between(target, n),
            |a, b| oracle.between(a, b),
            |n| oracle.store.neighbors_snapshot(n, layer),
        ),
    }
}

/// Re-selects `node`'s layer-`layer` neighbor list down to `Mmax(layer)`
/// after a connection pushed it over the limit (spec §4.7 step 6).
fn shrink<T: Clone, M: Metric<T>>(oracle: &Oracle<T, M>, params: &Parameters, node: NodeId, layer: usize) {
    let m_max = params.m_max(layer);
    let neighbors = oracle.store.neighbors_snapshot(node, layer);
    let candidates: Vec<Candidate> = neighbors
        .into_iter()
        .map(|n| Candidate {
            id: n,
            distance: oracle.between(node, n),
        })
        .collect();
    let selected = select_neighbors(oracle, params, node, candidates, m_max, layer);
    oracle.store.replace_neighbors(node, layer, selected);
}

/// C7: `INSERT` (spec §4.7). Runs entirely under the caller's write gate;
/// bumps `version` once before touching the graph and once after, so any
/// reader holding an older version observes `GraphChanged` for the whole
/// duration of the insert rather than a narrower, harder-to-reason-about
/// window.
#[allow(clippy::too_many_arguments)]
pub fn insert<T, M>(
    store: &NodeStore<T>,
    params: &Parameters,
    rng: &mut SeededRng,
    cache: Option<&mut DistanceCache>,
    entry_point: &AtomicI64,
    top_layer: &AtomicU32,
    version: &AtomicU64,
    item: T,
) -> NodeId
where
    T: Clone,
    M: Metric<T>,
{
    version.fetch_add(1, Ordering::AcqRel);

    // Step 1: sample the level this node will participate up to.
    let u = rng.sample_unit();
    let level = ((-u.ln() * params.level_lambda).floor() as usize).min(MAX_LAYERS - 1);

    // Step 2: allocate the node and its per-layer neighbor lists.
    let id = store.push(item, level, |l| params.m_max(l));
    let oracle = Oracle::<T, M> {
        store,
        cache: cache.map(RefCell::new),
        _marker: PhantomData,
    };

    let prev_entry = entry_point.load(Ordering::Acquire);
    if prev_entry < 0 {
        entry_point.store(id as i64, Ordering::Release);
        top_layer.store(level as u32, Ordering::Release);
        version.fetch_add(1, Ordering::AcqRel);
        tracing::debug!(node = id, level, "first insert becomes the entry point");
        return id;
    }

    let prev_entry = prev_entry as NodeId;
    let prev_top = top_layer.load(Ordering::Acquire) as usize;
    let cost = |other: NodeId| oracle.between(id, other);

    // Step 3: zoom-in phase, greedy descent from the current top layer
    // down to one above this node's own level.
    let entry_dist = cost(prev_entry);
    let (mut curr, _) = greedy_descend(store.nodes(), &cost, prev_entry, entry_dist, prev_top, level + 1);

    // Steps 4-6: from min(level, top_layer) down to 0, search for
    // candidates, select neighbors, connect both directions, and shrink
    // any neighbor whose list now exceeds Mmax(l).
    let no_cancel = CancellationToken::new();
    for layer in (0..=level.min(prev_top)).rev() {
        let start_version = version.load(Ordering::Acquire);
        let candidates = with_scratch(|scratch| {
            search_layer(
                store.nodes(),
                scratch,
                curr,
                &cost,
                layer,
                params.ef_construction,
                None,
                &no_cancel,
                version,
                start_version,
            )
        })
        .expect("construction search runs under the writer gate and never observes a graph change");

        let m_max = params.m_max(layer);
        let selected = select_neighbors(&oracle, params, id, candidates, m_max, layer);

        if let Some(&first) = selected.first() {
            curr = first;
        }

        for &neighbor in &selected {
            store.connect(id, neighbor, layer);
            let new_len = store.connect(neighbor, id, layer);
            if new_len > m_max {
                shrink(&oracle, params, neighbor, layer);
            }
        }
    }

    // Step 7: promote the entry point if this node reached a new top layer.
    if level > prev_top {
        top_layer.store(level as u32, Ordering::Release);
        entry_point.store(id as i64, Ordering::Release);
        tracing::debug!(node = id, level, "entry point promoted");
    }

    version.fetch_add(1, Ordering::AcqRel);
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use hnsw_core::ParametersBuilder;

    struct Abs;
    impl Metric<f64> for Abs {
        fn distance(a: &f64, b: &f64) -> f64 {
            (a - b).abs()
        }
    }

    fn fresh_state() -> (NodeStore<f64>, Parameters, SeededRng, AtomicI64, AtomicU32, AtomicU64) {
        let params = ParametersBuilder::default().m(4).seed(1).build().unwrap();
        (
            NodeStore::with_capacity(16),
            params,
            SeededRng::from_seed(1),
            AtomicI64::new(-1),
            AtomicU32::new(0),
            AtomicU64::new(0),
        )
    }

    #[test]
    fn first_insert_becomes_entry_point() {
        let (store, params, mut rng, entry, top, version) = fresh_state();
        let id = insert::<f64, Abs>(&store, &params, &mut rng, None, &entry, &top, &version, 1.0);
        assert_eq!(entry.load(Ordering::Acquire), id as i64);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn inserted_nodes_are_mutually_reachable() {
        let (store, params, mut rng, entry, top, version) = fresh_state();
        let mut ids = Vec::new();
        for i in 0..30 {
            let id = insert::<f64, Abs>(&store, &params, &mut rng, None, &entry, &top, &version, i as f64);
            ids.push(id);
        }
        // Every node should have at least one layer-0 neighbor once more
        // than one point exists.
        for &id in &ids {
            assert!(!store.neighbors_snapshot(id, 0).is_empty());
        }
    }

    #[test]
    fn neighbor_lists_never_exceed_m_max() {
        let (store, params, mut rng, entry, top, version) = fresh_state();
        let mut ids = Vec::new();
        for i in 0..50 {
            let id = insert::<f64, Abs>(&store, &params, &mut rng, None, &entry, &top, &version, i as f64);
            ids.push(id);
        }
        for &id in &ids {
            let max_layer = store.max_layer_of(id);
            for layer in 0..=max_layer {
                let m_max = params.m_max(layer);
                assert!(store.neighbors_snapshot(id, layer).len() <= m_max);
            }
        }
    }

    #[test]
    fn version_advances_on_every_insert() {
        let (store, params, mut rng, entry, top, version) = fresh_state();
        let before = version.load(Ordering::Acquire);
        insert::<f64, Abs>(&store, &params, &mut rng, None, &entry, &top, &version, 1.0);
        assert!(version.load(Ordering::Acquire) > before);
    }

    #[test]
    fn construction_cache_does_not_change_connectivity() {
        let (store_a, params_a, mut rng_a, entry_a, top_a, version_a) = fresh_state();
        for i in 0..20 {
            insert::<f64, Abs>(&store_a, &params_a, &mut rng_a, None, &entry_a, &top_a, &version_a, i as f64);
        }

        let (store_b, params_b, mut rng_b, entry_b, top_b, version_b) = fresh_state();
        let mut cache = DistanceCache::new(32, 1 << 10);
        for i in 0..20 {
            insert::<f64, Abs>(
                &store_b,
                &params_b,
                &mut rng_b,
                Some(&mut cache),
                &entry_b,
                &top_b,
                &version_b,
                i as f64,
            );
        }

        for id in 0..20u32 {
            assert_eq!(store_a.neighbors_snapshot(id, 0), store_b.neighbors_snapshot(id, 0));
        }
    }
}
