use hnsw_core::{CancellationToken, Metric, ParametersBuilder};
use hnsw_index::HnswIndex;

struct Euclidean1d;
impl Metric<f64> for Euclidean1d {
    fn distance(a: &f64, b: &f64) -> f64 {
        (a - b).abs()
    }
}

fn index_with(n: usize) -> HnswIndex<f64, Euclidean1d> {
    let params = ParametersBuilder::default().m(6).seed(5).build().unwrap();
    let index = HnswIndex::new(params);
    for i in 0..n {
        index.add(i as f64);
    }
    index
}

#[test]
fn search_on_empty_graph_returns_empty_not_an_error() {
    let index: HnswIndex<f64, Euclidean1d> = index_with(0);
    let results = index.search(&0.0, 5).unwrap();
    assert!(results.is_empty());
}

#[test]
fn search_on_single_node_graph_returns_that_node() {
    let index = index_with(1);
    let results = index.search(&42.0, 5).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].item, 0.0);
}

#[test]
fn k_larger_than_graph_size_returns_every_node() {
    let index = index_with(7);
    let results = index.search(&3.0, 1000).unwrap();
    assert_eq!(results.len(), 7);
}

#[test]
fn k_zero_returns_empty() {
    let index = index_with(10);
    let results = index.search(&3.0, 0).unwrap();
    assert!(results.is_empty());
}

#[test]
fn filter_that_rejects_everything_returns_empty() {
    let index = index_with(30);
    let results = index.search_filtered(&15.0, 5, |_| false).unwrap();
    assert!(results.is_empty());
}

#[test]
fn cancellation_before_any_work_returns_empty_ok() {
    let index = index_with(30);
    let cancel = CancellationToken::new();
    cancel.cancel();
    let result = index.search_with(&15.0, 5, None, &cancel);
    assert!(result.is_ok());
}

#[test]
fn identity_retrieval_matches_inserted_value() {
    let index = index_with(50);
    for i in 0..50u32 {
        assert_eq!(index.item(i), Some(i as f64));
    }
    assert_eq!(index.item(50), None);
}

#[test]
fn recall_does_not_worsen_as_ef_search_grows() {
    let params_small = ParametersBuilder::default()
        .m(4)
        .ef_search(1)
        .seed(9)
        .build()
        .unwrap();
    let params_large = ParametersBuilder::default()
        .m(4)
        .ef_search(200)
        .seed(9)
        .build()
        .unwrap();

    let small: HnswIndex<f64, Euclidean1d> = HnswIndex::new(params_small);
    let large: HnswIndex<f64, Euclidean1d> = HnswIndex::new(params_large);
    for i in 0..300 {
        small.add(i as f64);
        large.add(i as f64);
    }

    let target = 150.0;
    let exact_nearest = 150.0;

    let small_hit = small
        .search(&target, 1)
        .unwrap()
        .first()
        .map(|r| r.item == exact_nearest)
        .unwrap_or(false);
    let large_hit = large
        .search(&target, 1)
        .unwrap()
        .first()
        .map(|r| r.item == exact_nearest)
        .unwrap_or(false);

    assert!(large_hit || !small_hit, "a wider beam should never find the true nearest less often than a narrower one");
}
