mod cancel;
mod error;
mod metric;
mod params;
mod rng;

pub use cancel::CancellationToken;
pub use error::{HnswError, Result};
pub use metric::Metric;
pub use params::{NeighbourHeuristic, Parameters, ParametersBuilder};
pub use rng::SeededRng;
