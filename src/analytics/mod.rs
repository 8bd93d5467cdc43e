// =============================================================================
// Analytics Module
// =============================================================================
//
// Trend analytics over the stored subnet snapshots:
// - Short/long EMA gap and trend classification per subnet
// - Second-order acceleration of the aggregate price series
// - Sampling continuity diagnostics
// - Aggregation and emission ranking (the engine entry point)

pub mod acceleration;
pub mod continuity;
pub mod engine;
pub mod gap;

pub use acceleration::SmoothingParams;
pub use engine::{run_analysis, AnalysisParams, AnalysisSnapshot};
pub use gap::GapWindows;
