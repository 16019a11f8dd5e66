//! Historical metrics buffer fed by the periodic metrics tick.

pub mod metrics_history;
pub mod types;

pub use metrics_history::MetricsHistory;
pub use types::{HistoricalPoint, MetricsSnapshot};
