use std::marker::PhantomData;
use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU64, Ordering};

use parking_lot::Mutex;

use hnsw_core::{CancellationToken, HnswError, Metric, Parameters, Result, SeededRng};

use crate::distance::{DistanceCache, DistanceOracle};
use crate::insert::insert;
use crate::search::knn_search;
use crate::snapshot::{self, Decoded};
use crate::store::NodeStore;
use crate::NodeId;

/// One query result: the stored id, a materialized copy of its item,
/// and its distance to the query (spec §4.8).
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult<T> {
    pub id: NodeId,
    pub item: T,
    pub distance: f64,
}

/// C9: the index facade tying the graph engine's components together.
///
/// Writer-exclusive operations (`add`, `resize_distance_cache`, the
/// finalization step of `restore`) serialize through `write_gate`; this
/// never blocks readers, which proceed against the lock-free
/// `entry_point`/`top_layer`/`version` atomics and the per-node
/// `RwLock`s in `store` (spec §5).
pub struct HnswIndex<T, M> {
    store: NodeStore<T>,
    params: Parameters,
    cache: Mutex<Option<DistanceCache>>,
    rng: Mutex<SeededRng>,
    write_gate: Mutex<()>,
    entry_point: AtomicI64,
    top_layer: AtomicU32,
    version: AtomicU64,
    _marker: PhantomData<fn(&T, &T) -> M>,
}

impl<T, M> HnswIndex<T, M>
where
    T: Clone + Send + Sync + 'static,
    M: Metric<T>,
{
    pub fn new(params: Parameters) -> Self {
        let cache = if params.enable_construction_cache {
            Some(DistanceCache::new(
                params.initial_items_size,
                params.max_cache_entries,
            ))
        } else {
            None
        };
        let rng = params.make_rng();
        let initial_items_size = params.initial_items_size;
        Self {
            store: NodeStore::with_capacity(initial_items_size),
            params,
            cache: Mutex::new(cache),
            rng: Mutex::new(rng),
            write_gate: Mutex::new(()),
            entry_point: AtomicI64::new(-1),
            top_layer: AtomicU32::new(0),
            version: AtomicU64::new(0),
            _marker: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// C7: inserts `item`, returning its assigned id. Writer-exclusive.
    pub fn add(&self, item: T) -> NodeId {
        let _gate = self.write_gate.lock();
        let mut rng = self.rng.lock();
        let mut cache = self.cache.lock();

        let span = tracing::debug_span!("hnsw_add");
        let _enter = span.enter();

        insert::<T, M>(
            &self.store,
            &self.params,
            &mut rng,
            cache.as_mut(),
            &self.entry_point,
            &self.top_layer,
            &self.version,
            item,
        )
    }

    /// Returns a clone of the item stored at `id`, if it exists.
    pub fn item(&self, id: NodeId) -> Option<T> {
        if (id as usize) >= self.store.len() {
            return None;
        }
        Some(self.store.item(id))
    }

    /// C8: `K-NN-SEARCH` for the `k` nearest neighbors of `query`.
    pub fn search(&self, query: &T, k: usize) -> Result<Vec<SearchResult<T>>> {
        self.search_with(query, k, None, &CancellationToken::new())
    }

    /// Like `search`, but only candidates for which `filter` returns
    /// `true` are included in the result — the filter never changes
    /// which nodes are traversed, only which survive into the output
    /// (spec §4.6 edge case, §4.8).
    pub fn search_filtered(
        &self,
        query: &T,
        k: usize,
        filter: impl Fn(NodeId) -> bool,
    ) -> Result<Vec<SearchResult<T>>> {
        self.search_with(query, k, Some(&filter), &CancellationToken::new())
    }

    /// Fully general query entry point: optional filter, explicit
    /// cancellation token. A cancelled search returns the best partial
    /// result gathered so far, never an error (spec §5, §7).
    pub fn search_with(
        &self,
        query: &T,
        k: usize,
        filter: Option<&dyn Fn(NodeId) -> bool>,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchResult<T>>> {
        let span = tracing::debug_span!("hnsw_search", k);
        let _enter = span.enter();

        let cost = |id: NodeId| {
            let candidate = self.store.item(id);
            DistanceOracle::<T, M>::distance(&candidate, query)
        };

        let candidates = knn_search(
            self.store.nodes(),
            &self.entry_point,
            &self.version,
            &cost,
            k,
            self.params.ef_search,
            filter,
            cancel,
        )?;

        Ok(candidates
            .into_iter()
            .map(|c| SearchResult {
                id: c.id,
                item: self.store.item(c.id),
                distance: c.distance,
            })
            .collect())
    }

    /// Resizes the construction distance cache in place. Writer-exclusive;
    /// has no effect on search results, only on construction-time reuse.
    pub fn resize_distance_cache(&self, initial_points_hint: usize) {
        let _gate = self.write_gate.lock();
        let mut cache = self.cache.lock();
        if let Some(cache) = cache.as_mut() {
            cache.resize(initial_points_hint);
        }
    }

    /// C10: serializes the graph structure and its parameters. Item
    /// vectors are never part of the archive — the caller owns them and
    /// supplies them back into `restore` (spec §4.9). Writer-exclusive
    /// (mutually exclusive with `add`), but does not bump `version` —
    /// readers in flight are unaffected.
    pub fn snapshot(&self) -> Result<Vec<u8>> {
        let _gate = self.write_gate.lock();
        snapshot::encode(
            &self.params,
            self.entry_point.load(Ordering::Acquire),
            self.top_layer.load(Ordering::Acquire),
            &self.store,
        )
    }

    /// C10: rebuilds an index from bytes produced by `snapshot` plus the
    /// caller's own items, restoring `items[i]` as the item of node `i`
    /// (node ids are dense and assigned in insertion order, spec §3
    /// invariant 5, so this is the same order `snapshot` walked them in).
    /// Returns the rebuilt index and any items past the node count,
    /// unconsumed (spec §4.9's `restore(sink, items) -> (Index,
    /// leftover_items)`). Forces the construction distance cache to
    /// empty regardless of what was serialized (spec §4.10) — call
    /// `resize_distance_cache` afterward if further construction is
    /// planned.
    pub fn restore(bytes: &[u8], mut items: Vec<T>) -> Result<(Self, Vec<T>)> {
        let Decoded {
            params,
            entry_point,
            top_layer,
            nodes,
        } = snapshot::decode(bytes)?;

        if items.len() < nodes.len() {
            return Err(HnswError::Archive(
                "fewer items supplied than the snapshot has nodes".into(),
            ));
        }
        let leftover = items.split_off(nodes.len());

        let store = NodeStore::with_capacity(nodes.len());
        for (item, node) in items.into_iter().zip(nodes.iter()) {
            let max_layer = node.layers.len().saturating_sub(1);
            let id = store.push(item, max_layer, |l| params.m_max(l));
            for (layer, neighbors) in node.layers.iter().enumerate() {
                store.replace_neighbors(id, layer, neighbors.clone());
            }
        }

        let rng = params.make_rng();
        let index = Self {
            store,
            cache: Mutex::new(None),
            rng: Mutex::new(rng),
            write_gate: Mutex::new(()),
            entry_point: AtomicI64::new(entry_point),
            top_layer: AtomicU32::new(top_layer),
            version: AtomicU64::new(0),
            params,
            _marker: PhantomData,
        };
        Ok((index, leftover))
    }
}
