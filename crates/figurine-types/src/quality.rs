//! Quality scoring types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Technical and aesthetic quality of a generated artifact.
///
/// `overall` feeds the composite score; each named sub-metric is checked
/// against the recommendation threshold independently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnicalQuality {
	pub overall: f64,
	#[serde(default)]
	pub metrics: BTreeMap<String, f64>,
}

impl TechnicalQuality {
	pub fn new(overall: f64) -> Self {
		Self {
			overall,
			metrics: BTreeMap::new(),
		}
	}

	pub fn with_metric(mut self, name: impl Into<String>, value: f64) -> Self {
		self.metrics.insert(name.into(), value);
		self
	}
}

/// Composite score and recommendations for a completed order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
	/// `0.4 * face_similarity + 0.3 * style_consistency + 0.3 * technical.overall`.
	pub composite_score: f64,
	pub face_similarity: f64,
	pub style_consistency: f64,
	pub technical: TechnicalQuality,
	/// Fired threshold rules, or a single affirmative message.
	pub recommendations: Vec<String>,
}
