//! Fixed scoring oracle.
//!
//! Returns configured constants regardless of input. Stands in for a real
//! similarity and aesthetics model during development.

use crate::{Assessment, AssessmentRequest, EvaluationError, ScoringOracle};
use async_trait::async_trait;
use figurine_types::{
	ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, TechnicalQuality,
	ValidationError,
};

const DEFAULT_METRICS: [(&str, f64); 8] = [
	("resolution_score", 0.85),
	("sharpness_score", 0.77),
	("noise_score", 0.83),
	("artifact_score", 0.74),
	("composition_score", 0.81),
	("color_harmony", 0.78),
	("lighting_quality", 0.76),
	("detail_level", 0.82),
];

/// Oracle answering every request with the same measurements.
#[derive(Debug, Clone)]
pub struct FixedOracle {
	assessment: Assessment,
}

impl FixedOracle {
	pub fn new(assessment: Assessment) -> Self {
		Self { assessment }
	}
}

impl Default for FixedOracle {
	fn default() -> Self {
		let technical = DEFAULT_METRICS
			.iter()
			.fold(TechnicalQuality::new(0.79), |quality, (name, value)| {
				quality.with_metric(*name, *value)
			});

		Self::new(Assessment {
			face_similarity: 0.78,
			style_consistency: 0.82,
			technical,
		})
	}
}

#[async_trait]
impl ScoringOracle for FixedOracle {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FixedOracleSchema)
	}

	async fn assess(&self, _request: &AssessmentRequest) -> Result<Assessment, EvaluationError> {
		Ok(self.assessment.clone())
	}
}

/// Configuration schema for FixedOracle.
pub struct FixedOracleSchema;

impl ConfigSchema for FixedOracleSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![
				Field::new("face_similarity", FieldType::unit_interval()),
				Field::new("style_consistency", FieldType::unit_interval()),
				Field::new("technical_quality", FieldType::unit_interval()),
				Field::new("metrics", FieldType::Table(Schema::new(vec![], vec![])))
					.with_validator(|value| {
						let table = value.as_table().ok_or("metrics must be a table")?;
						for (name, metric) in table {
							match as_number(metric) {
								Some(v) if (0.0..=1.0).contains(&v) => {},
								_ => {
									return Err(format!(
										"metrics.{} must be a number in [0, 1]",
										name
									))
								},
							}
						}
						Ok(())
					}),
			],
		);

		schema.validate(config)
	}
}

fn as_number(value: &toml::Value) -> Option<f64> {
	value
		.as_float()
		.or_else(|| value.as_integer().map(|i| i as f64))
}

fn unit_value(config: &toml::Value, key: &str) -> Option<f64> {
	config.get(key).and_then(as_number)
}

/// Factory function to create a fixed oracle from configuration.
///
/// Configuration parameters (all optional, in `[0, 1]`):
/// - `face_similarity`, default 0.78
/// - `style_consistency`, default 0.82
/// - `technical_quality`, default 0.79
/// - `metrics`: sub-metric overrides; a configured table replaces the defaults
pub fn create_oracle(config: &toml::Value) -> Result<Box<dyn ScoringOracle>, EvaluationError> {
	FixedOracleSchema
		.validate(config)
		.map_err(|e| EvaluationError::Configuration(format!("Invalid configuration: {}", e)))?;

	let mut oracle = FixedOracle::default();
	let assessment = &mut oracle.assessment;
	if let Some(v) = unit_value(config, "face_similarity") {
		assessment.face_similarity = v;
	}
	if let Some(v) = unit_value(config, "style_consistency") {
		assessment.style_consistency = v;
	}
	if let Some(v) = unit_value(config, "technical_quality") {
		assessment.technical.overall = v;
	}
	if let Some(metrics) = config.get("metrics").and_then(|v| v.as_table()) {
		assessment.technical.metrics = metrics
			.iter()
			.filter_map(|(name, value)| as_number(value).map(|v| (name.clone(), v)))
			.collect();
	}

	Ok(Box::new(oracle))
}

/// Registry for the fixed oracle implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "fixed";
	type Factory = crate::OracleFactory;

	fn factory() -> Self::Factory {
		create_oracle
	}
}

impl crate::OracleRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use bytes::Bytes;

	fn request() -> AssessmentRequest {
		AssessmentRequest {
			order_id: "order-1".into(),
			reference: Bytes::from_static(b"face"),
			generated: Bytes::from_static(b"model"),
			target_style: "anime".into(),
		}
	}

	#[tokio::test]
	async fn test_defaults() {
		let assessment = FixedOracle::default().assess(&request()).await.unwrap();
		assert_eq!(assessment.face_similarity, 0.78);
		assert_eq!(assessment.style_consistency, 0.82);
		assert_eq!(assessment.technical.overall, 0.79);
		assert_eq!(assessment.technical.metrics.len(), 8);
		assert_eq!(assessment.technical.metrics.get("noise_score"), Some(&0.83));
	}

	#[tokio::test]
	async fn test_config_overrides() {
		let config: toml::Value = toml::from_str(
			r#"
			face_similarity = 0.5
			technical_quality = 1
			[metrics]
			sharpness_score = 0.9
			"#,
		)
		.unwrap();

		let oracle = create_oracle(&config).unwrap();
		let assessment = oracle.assess(&request()).await.unwrap();
		assert_eq!(assessment.face_similarity, 0.5);
		assert_eq!(assessment.style_consistency, 0.82);
		assert_eq!(assessment.technical.overall, 1.0);
		assert_eq!(assessment.technical.metrics.len(), 1);
	}

	#[test]
	fn test_out_of_range_config_rejected() {
		let config: toml::Value = toml::from_str("style_consistency = 1.4").unwrap();
		assert!(create_oracle(&config).is_err());

		let config: toml::Value = toml::from_str("[metrics]\nnoise_score = -0.2").unwrap();
		assert!(create_oracle(&config).is_err());
	}
}
