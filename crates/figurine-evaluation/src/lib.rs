//! Quality evaluation for the figurine pipeline.
//!
//! A [`ScoringOracle`] measures a generated artifact: how closely it resembles
//! the reference face, how well it matches the requested style and its
//! technical quality. The [`Evaluator`] turns those measurements into a
//! composite score with recommendations. [`EvaluationService`] selects the
//! configured oracle and chains the two.

use async_trait::async_trait;
use bytes::Bytes;
use figurine_types::{
	truncate_id, ConfigSchema, ImplementationRegistry, QualityReport, TechnicalQuality,
};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

mod evaluator;

pub use evaluator::{
	Evaluator, FACE_SIMILARITY_WEIGHT, SIMILARITY_THRESHOLD, STYLE_CONSISTENCY_WEIGHT,
	STYLE_THRESHOLD, TECHNICAL_QUALITY_WEIGHT, TECHNICAL_THRESHOLD,
};

/// Re-export implementations
pub mod implementations {
	pub mod fixed;
}

/// Errors that can occur during evaluation.
#[derive(Debug, Error)]
pub enum EvaluationError {
	/// The oracle could not produce measurements.
	#[error("Oracle error: {0}")]
	Oracle(String),
	/// A score is outside `[0, 1]` or not a number.
	#[error("Invalid score for '{name}': {value}")]
	InvalidScore { name: String, value: f64 },
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// What the oracle is asked to measure.
#[derive(Debug, Clone)]
pub struct AssessmentRequest {
	pub order_id: String,
	/// The caller's original face image.
	pub reference: Bytes,
	/// The final generated artifact.
	pub generated: Bytes,
	/// Style the artifact was asked to follow.
	pub target_style: String,
}

/// Raw measurements produced by an oracle.
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
	pub face_similarity: f64,
	pub style_consistency: f64,
	pub technical: TechnicalQuality,
}

/// Interface for quality scoring oracles.
#[async_trait]
pub trait ScoringOracle: Send + Sync {
	/// Returns the configuration schema for this oracle.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	async fn assess(&self, request: &AssessmentRequest) -> Result<Assessment, EvaluationError>;
}

/// Type alias for oracle factory functions.
pub type OracleFactory = fn(&toml::Value) -> Result<Box<dyn ScoringOracle>, EvaluationError>;

/// Registry trait for oracle implementations.
pub trait OracleRegistry: ImplementationRegistry<Factory = OracleFactory> {}

/// Get all registered oracle implementations.
pub fn get_all_implementations() -> Vec<(&'static str, OracleFactory)> {
	use implementations::fixed;

	vec![(fixed::Registry::NAME, fixed::Registry::factory())]
}

/// Runs the primary oracle and scores its measurements.
pub struct EvaluationService {
	implementations: HashMap<String, Arc<dyn ScoringOracle>>,
	primary: String,
	evaluator: Evaluator,
}

impl EvaluationService {
	pub fn new(
		implementations: HashMap<String, Arc<dyn ScoringOracle>>,
		primary: String,
	) -> Result<Self, EvaluationError> {
		if !implementations.contains_key(&primary) {
			return Err(EvaluationError::Configuration(format!(
				"Primary implementation '{}' not found in available implementations",
				primary
			)));
		}

		Ok(Self {
			implementations,
			primary,
			evaluator: Evaluator::new(),
		})
	}

	pub fn primary(&self) -> &str {
		&self.primary
	}

	/// Assesses the artifact with the primary oracle and computes the report.
	#[instrument(skip_all, fields(order_id = %truncate_id(&request.order_id), oracle = %self.primary))]
	pub async fn evaluate(
		&self,
		request: &AssessmentRequest,
	) -> Result<QualityReport, EvaluationError> {
		let oracle = self.implementations.get(&self.primary).ok_or_else(|| {
			EvaluationError::Configuration(format!(
				"Primary implementation '{}' not available",
				self.primary
			))
		})?;

		let assessment = oracle.assess(request).await?;
		let report = self.evaluator.score(
			assessment.face_similarity,
			assessment.style_consistency,
			&assessment.technical,
		)?;

		tracing::debug!(
			composite_score = report.composite_score,
			recommendations = report.recommendations.len(),
			"Evaluation complete"
		);

		Ok(report)
	}
}
