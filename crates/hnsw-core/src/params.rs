use crate::error::{HnswError, Result};
use crate::rng::SeededRng;

/// Neighbor-selection strategy (spec §4.5 / §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeighbourHeuristic {
    /// Top-`M` by distance, ties broken by smaller id.
    Simple,
    /// Paper Algorithm 4: relative-neighborhood pruning with optional
    /// candidate expansion and pruned-connection top-up.
    Heuristic,
}

impl Default for NeighbourHeuristic {
    fn default() -> Self {
        Self::Simple
    }
}

/// Frozen-at-construction configuration (spec §6).
#[derive(Debug, Clone)]
pub struct Parameters {
    pub m: usize,
    pub level_lambda: f64,
    pub neighbour_heuristic: NeighbourHeuristic,
    pub ef_construction: usize,
    pub ef_search: usize,
    pub expand_best_selection: bool,
    pub keep_pruned_connections: bool,
    pub enable_construction_cache: bool,
    pub initial_distance_cache_size: usize,
    pub initial_items_size: usize,
    pub max_cache_entries: usize,
    pub(crate) seed: Option<u64>,
}

impl Parameters {
    pub fn builder() -> ParametersBuilder {
        ParametersBuilder::default()
    }

    /// `Mmax(layer)`: `2*M` at layer 0, `M` above it (spec §3 invariant 2).
    pub fn m_max(&self, layer: usize) -> usize {
        if layer == 0 {
            self.m * 2
        } else {
            self.m
        }
    }

    pub fn make_rng(&self) -> SeededRng {
        match self.seed {
            Some(seed) => SeededRng::from_seed(seed),
            None => SeededRng::from_entropy(),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.m == 0 {
            return Err(HnswError::InvalidParameters("M must be positive".into()));
        }
        if self.level_lambda <= 0.0 || !self.level_lambda.is_finite() {
            return Err(HnswError::InvalidParameters(
                "level_lambda must be a positive finite real".into(),
            ));
        }
        if self.ef_construction == 0 {
            return Err(HnswError::InvalidParameters(
                "ef_construction must be positive".into(),
            ));
        }
        if self.ef_search == 0 {
            return Err(HnswError::InvalidParameters(
                "ef_search must be positive".into(),
            ));
        }
        if self.max_cache_entries == 0 {
            return Err(HnswError::InvalidParameters(
                "max_cache_entries must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Builder for `Parameters`, mirroring the fluent-setter shape used
/// elsewhere in the pack's HNSW crates (e.g. `instant-distance::Builder`).
#[derive(Debug, Clone)]
pub struct ParametersBuilder {
    m: usize,
    level_lambda: Option<f64>,
    neighbour_heuristic: NeighbourHeuristic,
    ef_construction: usize,
    ef_search: usize,
    expand_best_selection: bool,
    keep_pruned_connections: bool,
    enable_construction_cache: bool,
    initial_distance_cache_size: usize,
    initial_items_size: usize,
    max_cache_entries: usize,
    seed: Option<u64>,
}

impl Default for ParametersBuilder {
    fn default() -> Self {
        Self {
            m: 10,
            level_lambda: None,
            neighbour_heuristic: NeighbourHeuristic::Simple,
            ef_construction: 200,
            ef_search: 50,
            expand_best_selection: false,
            keep_pruned_connections: false,
            enable_construction_cache: true,
            initial_distance_cache_size: 1 << 20,
            initial_items_size: 1024,
            max_cache_entries: 1 << 28,
            seed: None,
        }
    }
}

impl ParametersBuilder {
    pub fn m(mut self, m: usize) -> Self {
        self.m = m;
        self
    }

    /// Defaults to `1 / ln(M)` if never called (spec §6).
    pub fn level_lambda(mut self, lambda: f64) -> Self {
        self.level_lambda = Some(lambda);
        self
    }

    pub fn neighbour_heuristic(mut self, h: NeighbourHeuristic) -> Self {
        self.neighbour_heuristic = h;
        self
    }

    pub fn ef_construction(mut self, ef: usize) -> Self {
        self.ef_construction = ef;
        self
    }

    pub fn ef_search(mut self, ef: usize) -> Self {
        self.ef_search = ef;
        self
    }

    pub fn expand_best_selection(mut self, v: bool) -> Self {
        self.expand_best_selection = v;
        self
    }

    pub fn keep_pruned_connections(mut self, v: bool) -> Self {
        self.keep_pruned_connections = v;
        self
    }

    pub fn enable_construction_cache(mut self, v: bool) -> Self {
        self.enable_construction_cache = v;
        self
    }

    pub fn initial_distance_cache_size(mut self, n: usize) -> Self {
        self.initial_distance_cache_size = n;
        self
    }

    pub fn initial_items_size(mut self, n: usize) -> Self {
        self.initial_items_size = n;
        self
    }

    pub fn max_cache_entries(mut self, n: usize) -> Self {
        self.max_cache_entries = n;
        self
    }

    /// Seeds the level-sampling RNG for deterministic construction.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn build(self) -> Result<Parameters> {
        let m = self.m.max(1);
        let level_lambda = self.level_lambda.unwrap_or_else(|| 1.0 / (m as f64).ln().max(f64::MIN_POSITIVE));
        let params = Parameters {
            m: self.m,
            level_lambda,
            neighbour_heuristic: self.neighbour_heuristic,
            ef_construction: self.ef_construction,
            ef_search: self.ef_search,
            expand_best_selection: self.expand_best_selection,
            keep_pruned_connections: self.keep_pruned_connections,
            enable_construction_cache: self.enable_construction_cache,
            initial_distance_cache_size: self.initial_distance_cache_size,
            initial_items_size: self.initial_items_size,
            max_cache_entries: self.max_cache_entries,
            seed: self.seed,
        };
        params.validate()?;
        Ok(params)
    }
}
