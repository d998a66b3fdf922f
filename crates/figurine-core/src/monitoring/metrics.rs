//! Process-wide metrics aggregation.
//!
//! Series are keyed by metric name plus label set. Each series carries a
//! monotonic counter, histogram observations and a last-set gauge; whichever
//! parts a metric uses are reported in its snapshot. Writers only touch the
//! shard holding their key, so concurrent orders never lose updates and a
//! snapshot never waits on more than one shard at a time.

use dashmap::DashMap;
use figurine_types::{current_timestamp, StageName};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

pub const STAGE_INVOCATIONS_TOTAL: &str = "stage_invocations_total";
pub const STAGE_DURATION_SECONDS: &str = "stage_duration_seconds";
pub const ORDERS_TOTAL: &str = "orders_total";
pub const ORDER_DURATION_SECONDS: &str = "order_duration_seconds";
pub const COMPOSITE_SCORE: &str = "composite_score";
pub const ORDERS_IN_FLIGHT: &str = "orders_in_flight";

/// Raw observations kept per series; aggregates cover every observation.
const MAX_RETAINED_OBSERVATIONS: usize = 10_000;

/// Identity of one series.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetricKey {
	pub name: String,
	pub labels: BTreeMap<String, String>,
}

impl MetricKey {
	pub fn new(name: &str, labels: &[(&str, &str)]) -> Self {
		Self {
			name: name.to_string(),
			labels: labels
				.iter()
				.map(|(k, v)| (k.to_string(), v.to_string()))
				.collect(),
		}
	}
}

impl fmt::Display for MetricKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.name)?;
		if self.labels.is_empty() {
			return Ok(());
		}
		let labels: Vec<String> = self
			.labels
			.iter()
			.map(|(k, v)| format!("{}=\"{}\"", k, v))
			.collect();
		write!(f, "{{{}}}", labels.join(","))
	}
}

#[derive(Debug, Default)]
struct Series {
	counter: u64,
	count: u64,
	sum: f64,
	min: f64,
	max: f64,
	observations: Vec<f64>,
	gauge: Option<f64>,
}

impl Series {
	fn observe(&mut self, value: f64) {
		if self.count == 0 {
			self.min = value;
			self.max = value;
		} else {
			self.min = self.min.min(value);
			self.max = self.max.max(value);
		}
		self.count += 1;
		self.sum += value;
		if self.observations.len() < MAX_RETAINED_OBSERVATIONS {
			self.observations.push(value);
		}
	}

	fn aggregate(&self, key: &MetricKey) -> MetricAggregate {
		let histogram = (self.count > 0).then(|| HistogramSummary {
			count: self.count,
			sum: self.sum,
			min: self.min,
			max: self.max,
			mean: self.sum / self.count as f64,
			observations: self.observations.clone(),
		});

		MetricAggregate {
			name: key.name.clone(),
			labels: key.labels.clone(),
			counter: self.counter,
			histogram,
			gauge: self.gauge,
		}
	}
}

/// Histogram statistics of one series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramSummary {
	pub count: u64,
	pub sum: f64,
	pub min: f64,
	pub max: f64,
	pub mean: f64,
	pub observations: Vec<f64>,
}

/// Point-in-time view of one series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricAggregate {
	pub name: String,
	pub labels: BTreeMap<String, String>,
	pub counter: u64,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub histogram: Option<HistogramSummary>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub gauge: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSummary {
	pub total_metrics: usize,
	/// Unix seconds at which the snapshot was taken.
	pub timestamp: u64,
	pub metrics: BTreeMap<String, MetricAggregate>,
}

/// Concurrency-safe metrics store shared by all order flows.
///
/// Recording never fails and never affects the caller.
#[derive(Debug, Default)]
pub struct MetricsCollector {
	series: DashMap<MetricKey, Series>,
}

impl MetricsCollector {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn increment_counter(&self, name: &str, labels: &[(&str, &str)]) {
		self.series
			.entry(MetricKey::new(name, labels))
			.or_default()
			.counter += 1;
	}

	pub fn record_histogram(&self, name: &str, labels: &[(&str, &str)], value: f64) {
		self.series
			.entry(MetricKey::new(name, labels))
			.or_default()
			.observe(value);
	}

	pub fn set_gauge(&self, name: &str, labels: &[(&str, &str)], value: f64) {
		self.series
			.entry(MetricKey::new(name, labels))
			.or_default()
			.gauge = Some(value);
	}

	/// Adds `delta` to a gauge, starting from zero.
	pub fn adjust_gauge(&self, name: &str, labels: &[(&str, &str)], delta: f64) {
		let mut series = self.series.entry(MetricKey::new(name, labels)).or_default();
		series.gauge = Some(series.gauge.unwrap_or(0.0) + delta);
	}

	/// Records one stage invocation and its duration.
	pub fn record_stage(&self, stage: StageName, outcome: &str, elapsed: Duration) {
		self.increment_counter(
			STAGE_INVOCATIONS_TOTAL,
			&[("stage", stage.as_str()), ("outcome", outcome)],
		);
		self.record_histogram(
			STAGE_DURATION_SECONDS,
			&[("stage", stage.as_str())],
			elapsed.as_secs_f64(),
		);
	}

	/// Current counter value of a series, zero if it was never touched.
	pub fn counter_value(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
		self.series
			.get(&MetricKey::new(name, labels))
			.map(|series| series.counter)
			.unwrap_or(0)
	}

	/// Current gauge value of a series.
	pub fn gauge_value(&self, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
		self.series
			.get(&MetricKey::new(name, labels))
			.and_then(|series| series.gauge)
	}

	/// Aggregates of every series, keyed by rendered series name.
	pub fn snapshot(&self) -> BTreeMap<String, MetricAggregate> {
		self.series
			.iter()
			.map(|entry| (entry.key().to_string(), entry.value().aggregate(entry.key())))
			.collect()
	}

	pub fn summary(&self) -> MetricsSummary {
		let metrics = self.snapshot();
		MetricsSummary {
			total_metrics: metrics.len(),
			timestamp: current_timestamp(),
			metrics,
		}
	}
}
