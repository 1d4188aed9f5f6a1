pub mod artifacts;
pub mod extraction;
pub mod outcome;
pub mod planner;
pub mod runner;
pub mod segids;
pub mod stats;

// Re-export main types for convenient access
pub use outcome::{Outcome, OutcomeKind, StageError};
pub use planner::{plan, RunMode, RunPolicy, TaskPlan};
pub use runner::{RunSummary, Runner};
pub use segids::SegidSource;
pub use stats::{CableStats, Skeleton, StatsEngine, StatsRecord};
