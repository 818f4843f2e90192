use rkyv::ser::serializers::AllocSerializer;
use rkyv::ser::Serializer;
use rkyv::{Archive, Deserialize, Serialize};

use hnsw_core::{HnswError, NeighbourHeuristic, Parameters, ParametersBuilder, Result};

use crate::store::NodeStore;
use crate::NodeId;

/// 4-byte magic, checked *before* any `rkyv` validation runs so a
/// truncated or unrelated blob is rejected with a precise error rather
/// than a confusing archive-validation failure (spec §4.10).
const MAGIC: &[u8; 4] = b"HNSW";

#[derive(Archive, Deserialize, Serialize)]
#[archive(check_bytes)]
pub struct SnapshotNode {
    pub id: NodeId,
    pub layers: Vec<Vec<NodeId>>,
}

/// Plain mirror of `hnsw_core::Parameters` — kept local to this crate so
/// `hnsw-core` itself stays free of the `rkyv` dependency.
#[derive(Archive, Deserialize, Serialize, Clone)]
#[archive(check_bytes)]
pub struct SnapshotParams {
    pub m: usize,
    pub level_lambda: f64,
    pub heuristic_is_simple: bool,
    pub ef_construction: usize,
    pub ef_search: usize,
    pub expand_best_selection: bool,
    pub keep_pruned_connections: bool,
    pub enable_construction_cache: bool,
    pub initial_items_size: usize,
    pub max_cache_entries: usize,
}

impl SnapshotParams {
    fn from_params(p: &Parameters) -> Self {
        Self {
            m: p.m,
            level_lambda: p.level_lambda,
            heuristic_is_simple: matches!(p.neighbour_heuristic, NeighbourHeuristic::Simple),
            ef_construction: p.ef_construction,
            ef_search: p.ef_search,
            expand_best_selection: p.expand_best_selection,
            keep_pruned_connections: p.keep_pruned_connections,
            enable_construction_cache: p.enable_construction_cache,
            initial_items_size: p.initial_items_size,
            max_cache_entries: p.max_cache_entries,
        }
    }

    /// Rebuilds a `Parameters`, forcing the construction cache size to
    /// zero regardless of what was serialized — a restored graph is read
    /// for queries, not grown, until the caller explicitly resizes the
    /// cache back up (spec §4.10).
    fn into_builder(self) -> ParametersBuilder {
        let heuristic = if self.heuristic_is_simple {
            NeighbourHeuristic::Simple
        } else {
            NeighbourHeuristic::Heuristic
        };
        Parameters::builder()
            .m(self.m)
            .level_lambda(self.level_lambda)
            .neighbour_heuristic(heuristic)
            .ef_construction(self.ef_construction)
            .ef_search(self.ef_search)
            .expand_best_selection(self.expand_best_selection)
            .keep_pruned_connections(self.keep_pruned_connections)
            .enable_construction_cache(self.enable_construction_cache)
            .initial_items_size(self.initial_items_size)
            .max_cache_entries(self.max_cache_entries)
            .initial_distance_cache_size(0)
    }
}

/// The archived payload never carries item vectors — they live in
/// whatever storage the caller already owns and are supplied back in on
/// `restore` (spec §4.9's `restore(sink, items) -> (Index,
/// leftover_items)` contract; grounded in the teacher's `SnapshotData`,
/// which likewise carries only graph structure, and `load_snapshot`,
/// which takes the vector storage as an external parameter).
#[derive(Archive, Deserialize, Serialize)]
#[archive(check_bytes)]
pub struct SnapshotData {
    pub params: SnapshotParams,
    pub entry_point: i64,
    pub top_layer: u32,
    pub nodes: Vec<SnapshotNode>,
}

pub struct Decoded {
    pub params: Parameters,
    pub entry_point: i64,
    pub top_layer: u32,
    pub nodes: Vec<SnapshotNode>,
}

/// C10 encode half: header, then an `rkyv`-archived `SnapshotData`.
pub fn encode<T: Clone>(
    params: &Parameters,
    entry_point: i64,
    top_layer: u32,
    store: &NodeStore<T>,
) -> Result<Vec<u8>> {
    let snapshot_nodes = {
        let guard = store.nodes().read();
        guard
            .iter()
            .map(|node| SnapshotNode {
                id: node.id,
                layers: node
                    .layers
                    .iter()
                    .map(|layer| layer.read().iter().copied().collect())
                    .collect(),
            })
            .collect::<Vec<_>>()
    };

    let data = SnapshotData {
        params: SnapshotParams::from_params(params),
        entry_point,
        top_layer,
        nodes: snapshot_nodes,
    };

    let mut serializer = AllocSerializer::<256>::default();
    serializer
        .serialize_value(&data)
        .map_err(|e| HnswError::Archive(format!("{e:?}")))?;
    let body = serializer.into_serializer().into_inner();

    let mut out = Vec::with_capacity(MAGIC.len() + body.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&body);
    Ok(out)
}

/// C10 decode half: checks the header, validates the archive, then
/// deserializes it into owned graph structure. The caller zips this
/// against its own item vector to rebuild a `NodeStore`.
pub fn decode(bytes: &[u8]) -> Result<Decoded> {
    if bytes.len() < MAGIC.len() || &bytes[..MAGIC.len()] != MAGIC {
        return Err(HnswError::InvalidHeader);
    }
    let body = &bytes[MAGIC.len()..];
    // `body` is a sub-slice starting 4 bytes into `bytes`, so it is not
    // guaranteed to land on the 8-byte boundary `rkyv` validation
    // requires; copy it into a properly aligned buffer before checking.
    let mut aligned_body = rkyv::AlignedVec::with_capacity(body.len());
    aligned_body.extend_from_slice(body);

    let archived = rkyv::check_archived_root::<SnapshotData>(&aligned_body)
        .map_err(|e| HnswError::Archive(format!("{e:?}")))?;
    let data: SnapshotData = archived
        .deserialize(&mut rkyv::Infallible)
        .map_err(|_: std::convert::Infallible| HnswError::Archive("unreachable".into()))?;

    let params = data
        .params
        .into_builder()
        .build()
        .map_err(|e| HnswError::Archive(format!("restored parameters were invalid: {e}")))?;

    Ok(Decoded {
        params,
        entry_point: data.entry_point,
        top_layer: data.top_layer,
        nodes: data.nodes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_mismatch_is_rejected_before_archive_validation() {
        let bytes = b"NOPE-not-an-archive".to_vec();
        let result: Result<Decoded> = decode(&bytes);
        assert!(matches!(result, Err(HnswError::InvalidHeader)));
    }

    #[test]
    fn truncated_header_is_rejected() {
        let bytes = vec![b'H', b'N'];
        let result: Result<Decoded> = decode(&bytes);
        assert!(matches!(result, Err(HnswError::InvalidHeader)));
    }

    #[test]
    fn round_trips_params_through_snapshot_params() {
        let params = Parameters::builder().m(7).ef_search(33).build().unwrap();
        let snap = SnapshotParams::from_params(&params);
        let rebuilt = snap.into_builder().build().unwrap();
        assert_eq!(rebuilt.m, 7);
        assert_eq!(rebuilt.ef_search, 33);
        assert_eq!(rebuilt.initial_distance_cache_size, 0);
    }
}
