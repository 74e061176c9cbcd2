// Engine layer - session aggregation and digest rendering.
// Sits between parsed turns (providers) and delivery (runtime).

pub mod aggregator;
pub mod digest;

pub use aggregator::{SessionAggregator, SweepReport};
pub use digest::render_digest;
