//! Mock stage implementation for local development and testing.
//!
//! Echoes the request payload back after a fixed latency. Parameters can be
//! restricted to a set of accepted values, and the stage can be forced to
//! behave as unreachable or to reject everything.

use crate::{StageCallError, StageError, StageInterface};
use async_trait::async_trait;
use figurine_types::{
	ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, StagePayload, StageRequest,
	ValidationError,
};
use std::collections::HashMap;
use std::time::Duration;

/// Forced behavior of a mock stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockBehavior {
	Echo,
	Unavailable,
	Reject,
}

impl MockBehavior {
	fn parse(s: &str) -> Option<Self> {
		match s {
			"echo" => Some(MockBehavior::Echo),
			"unavailable" => Some(MockBehavior::Unavailable),
			"reject" => Some(MockBehavior::Reject),
			_ => None,
		}
	}
}

/// In-process stand-in for a remote stage.
pub struct MockStage {
	latency: Duration,
	behavior: MockBehavior,
	content_type: String,
	accepted_values: HashMap<String, Vec<String>>,
}

impl MockStage {
	pub fn new(latency: Duration, behavior: MockBehavior) -> Self {
		Self {
			latency,
			behavior,
			content_type: "image/png".to_string(),
			accepted_values: HashMap::new(),
		}
	}

	/// Restricts a request parameter to the given values.
	pub fn with_accepted_values(mut self, param: impl Into<String>, values: Vec<String>) -> Self {
		self.accepted_values.insert(param.into(), values);
		self
	}

	fn check_params(&self, request: &StageRequest) -> Result<(), StageCallError> {
		for (param, allowed) in &self.accepted_values {
			if let Some(value) = request.params.get(param) {
				if !allowed.contains(value) {
					return Err(StageCallError::Rejected {
						status_code: 422,
						reason: format!(
							"Unsupported {} '{}'. Available: [{}]",
							param,
							value,
							allowed.join(", ")
						),
					});
				}
			}
		}
		Ok(())
	}
}

#[async_trait]
impl StageInterface for MockStage {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MockStageSchema)
	}

	async fn call(&self, request: &StageRequest) -> Result<StagePayload, StageCallError> {
		if !self.latency.is_zero() {
			tokio::time::sleep(self.latency).await;
		}

		match self.behavior {
			MockBehavior::Unavailable => {
				return Err(StageCallError::Transport("mock stage is unavailable".into()))
			},
			MockBehavior::Reject => {
				return Err(StageCallError::Rejected {
					status_code: 400,
					reason: "mock stage rejects all input".into(),
				})
			},
			MockBehavior::Echo => {},
		}

		self.check_params(request)?;

		Ok(
			StagePayload::new(self.content_type.clone(), request.payload.clone())
				.with_processing_time(self.latency.as_secs_f64()),
		)
	}
}

/// Configuration schema for MockStage.
pub struct MockStageSchema;

impl ConfigSchema for MockStageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![
				Field::new(
					"latency_ms",
					FieldType::Integer {
						min: Some(0),
						max: Some(600_000),
					},
				),
				Field::new("behavior", FieldType::String).with_validator(|value| {
					match value.as_str().and_then(MockBehavior::parse) {
						Some(_) => Ok(()),
						None => Err("behavior must be one of: echo, unavailable, reject".into()),
					}
				}),
				Field::new("content_type", FieldType::String),
				Field::new(
					"accepted_values",
					FieldType::Table(Schema::new(vec![], vec![])),
				)
				.with_validator(|value| {
					let table = value.as_table().ok_or("accepted_values must be a table")?;
					for (param, allowed) in table {
						let all_strings = allowed
							.as_array()
							.map(|values| values.iter().all(|v| v.is_str()))
							.unwrap_or(false);
						if !all_strings {
							return Err(format!(
								"accepted_values.{} must be an array of strings",
								param
							));
						}
					}
					Ok(())
				}),
			],
		);

		schema.validate(config)
	}
}

/// Factory function to create a mock stage from configuration.
///
/// Configuration parameters:
/// - `latency_ms` (optional): simulated processing time, default 0
/// - `behavior` (optional): `echo` (default), `unavailable` or `reject`
/// - `content_type` (optional): MIME type of the echoed payload, default `image/png`
/// - `accepted_values` (optional): parameter name to the values it may take
pub fn create_stage(config: &toml::Value) -> Result<Box<dyn StageInterface>, StageError> {
	MockStageSchema
		.validate(config)
		.map_err(|e| StageError::Configuration(format!("Invalid configuration: {}", e)))?;

	let latency_ms = config
		.get("latency_ms")
		.and_then(|v| v.as_integer())
		.unwrap_or(0) as u64;
	let behavior = config
		.get("behavior")
		.and_then(|v| v.as_str())
		.and_then(MockBehavior::parse)
		.unwrap_or(MockBehavior::Echo);

	let mut stage = MockStage::new(Duration::from_millis(latency_ms), behavior);
	if let Some(content_type) = config.get("content_type").and_then(|v| v.as_str()) {
		stage.content_type = content_type.to_string();
	}
	if let Some(table) = config.get("accepted_values").and_then(|v| v.as_table()) {
		for (param, allowed) in table {
			let values = allowed
				.as_array()
				.map(|values| {
					values
						.iter()
						.filter_map(|v| v.as_str().map(str::to_string))
						.collect()
				})
				.unwrap_or_default();
			stage = stage.with_accepted_values(param.clone(), values);
		}
	}

	Ok(Box::new(stage))
}

/// Registry for the mock stage implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "mock";
	type Factory = crate::StageFactory;

	fn factory() -> Self::Factory {
		create_stage
	}
}

impl crate::StageRegistry for Registry {}
