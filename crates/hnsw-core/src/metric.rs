/// Distance function over the caller's item type.
///
/// Implemented as a zero-sized marker type rather than a trait object so
/// `search_layer`'s hot loop never pays a vtable call (see spec §9,
/// "no virtual call on the hot path").
///
/// `distance` must be a symmetric, NaN-free total function: `d(x, y) ==
/// d(y, x)`. The triangle inequality is recommended but not enforced —
/// the graph degrades gracefully (lower recall) rather than panicking if
/// it doesn't hold.
pub trait Metric<T>: Send + Sync + 'static {
    fn distance(a: &T, b: &T) -> f64;
}
