//! Metric collection and accumulation
//!
//! - Point-in-time host/process snapshots
//! - Custom metric queue drained on every report
//! - Per-command invocation counters

mod commands;
mod queue;
mod snapshot;

pub use commands::CommandCounter;
pub use queue::{CustomEvent, CustomGraph, CustomMetricEntry, CustomMetricQueue, MetricValue};
pub use snapshot::{MetricsSnapshot, SystemSample, SystemSampler};
