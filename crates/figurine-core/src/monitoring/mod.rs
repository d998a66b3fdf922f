//! Pipeline instrumentation.

pub mod metrics;

pub use metrics::{HistogramSummary, MetricAggregate, MetricKey, MetricsCollector, MetricsSummary};
