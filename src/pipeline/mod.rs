//! The concurrent collection and enrichment pipeline.
//!
//! A cycle resolves each namespace's resources through the cache, splits
//! its metric identifiers into batches, fetches every batch under a shared
//! concurrency limit, joins the results with cached labels and passes them
//! through the conflict guard into the sink.

pub mod collector;
pub mod guard;
pub mod joiner;
pub mod scheduler;
pub mod sink;

pub use collector::{Collector, CycleReport, QueryWindow};
pub use guard::ConflictGuard;
pub use joiner::{LabelJoiner, ResourceKeyRules};
pub use scheduler::{BatchOutcome, BatchScheduler};
pub use sink::Sink;
