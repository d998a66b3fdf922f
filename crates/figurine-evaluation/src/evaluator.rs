//! Composite quality scoring.
//!
//! The evaluator is a pure function of the three sub-scores and the technical
//! sub-metric map. It owns the weights, the recommendation thresholds and the
//! wording of every recommendation.

use crate::EvaluationError;
use figurine_types::{QualityReport, TechnicalQuality};

pub const FACE_SIMILARITY_WEIGHT: f64 = 0.4;
pub const STYLE_CONSISTENCY_WEIGHT: f64 = 0.3;
pub const TECHNICAL_QUALITY_WEIGHT: f64 = 0.3;

/// Below this face similarity a recommendation fires.
pub const SIMILARITY_THRESHOLD: f64 = 0.70;
/// Below this style consistency a recommendation fires.
pub const STYLE_THRESHOLD: f64 = 0.80;
/// Below this value a technical sub-metric fires its own recommendation.
pub const TECHNICAL_THRESHOLD: f64 = 0.80;

pub const LOW_SIMILARITY: &str =
	"Consider improving face similarity - current score is below threshold";
pub const STYLE_MISMATCH: &str =
	"Style consistency could be improved - adjust stylization parameters";
pub const ALL_GOOD: &str = "Avatar quality is good across all metrics!";

/// Stateless composite scorer.
#[derive(Debug, Clone, Copy, Default)]
pub struct Evaluator;

impl Evaluator {
	pub fn new() -> Self {
		Self
	}

	/// Computes the composite score and recommendations.
	///
	/// Every input, including each technical sub-metric, must be a finite
	/// value in `[0, 1]`. Recommendations appear in a fixed order: similarity,
	/// style, then technical sub-metrics by name.
	pub fn score(
		&self,
		face_similarity: f64,
		style_consistency: f64,
		technical: &TechnicalQuality,
	) -> Result<QualityReport, EvaluationError> {
		check_unit("face_similarity", face_similarity)?;
		check_unit("style_consistency", style_consistency)?;
		check_unit("technical_quality", technical.overall)?;
		for (name, value) in &technical.metrics {
			check_unit(name, *value)?;
		}

		let composite_score = (FACE_SIMILARITY_WEIGHT * face_similarity
			+ STYLE_CONSISTENCY_WEIGHT * style_consistency
			+ TECHNICAL_QUALITY_WEIGHT * technical.overall)
			.clamp(0.0, 1.0);

		let mut recommendations = Vec::new();
		if face_similarity < SIMILARITY_THRESHOLD {
			recommendations.push(LOW_SIMILARITY.to_string());
		}
		if style_consistency < STYLE_THRESHOLD {
			recommendations.push(STYLE_MISMATCH.to_string());
		}
		for (name, value) in &technical.metrics {
			if *value < TECHNICAL_THRESHOLD {
				recommendations.push(technical_recommendation(name));
			}
		}
		if recommendations.is_empty() {
			recommendations.push(ALL_GOOD.to_string());
		}

		Ok(QualityReport {
			composite_score,
			face_similarity,
			style_consistency,
			technical: technical.clone(),
			recommendations,
		})
	}
}

fn technical_recommendation(metric: &str) -> String {
	match metric {
		"sharpness_score" => {
			"Image sharpness could be enhanced - check resolution and upscaling".to_string()
		},
		"color_harmony" => "Color harmony could be improved - adjust color palette".to_string(),
		other => format!(
			"Technical metric '{}' is below threshold - review generation output",
			other
		),
	}
}

fn check_unit(name: &str, value: f64) -> Result<(), EvaluationError> {
	if value.is_finite() && (0.0..=1.0).contains(&value) {
		Ok(())
	} else {
		Err(EvaluationError::InvalidScore {
			name: name.to_string(),
			value,
		})
	}
}
