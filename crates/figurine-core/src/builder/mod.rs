//! Builder pattern for constructing pipeline engines.
//!
//! Composes a PipelineEngine from configuration and factory functions. Every
//! configured implementation is constructed, so a broken table fails at
//! startup even if it is not the primary; the primary is then selected.

use crate::engine::PipelineEngine;
use crate::intake::ExtensionValidator;
use crate::monitoring::MetricsCollector;
use figurine_config::Config;
use figurine_evaluation::{EvaluationError, EvaluationService, ScoringOracle};
use figurine_stage::{StageClient, StageError, StageInterface};
use figurine_types::StageName;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during pipeline construction.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Container for the factory functions needed to build a PipelineEngine.
///
/// Each factory takes the implementation's TOML table and returns the
/// implementation, validating the table on the way.
pub struct PipelineFactories<SF, OF> {
	pub stage_factories: HashMap<String, SF>,
	pub oracle_factories: HashMap<String, OF>,
}

/// Builder for constructing a PipelineEngine with pluggable implementations.
pub struct PipelineBuilder {
	config: Config,
	metrics: Option<Arc<MetricsCollector>>,
}

impl PipelineBuilder {
	/// Creates a new PipelineBuilder with the given configuration.
	pub fn new(config: Config) -> Self {
		Self {
			config,
			metrics: None,
		}
	}

	/// Shares an existing metrics collector instead of creating a fresh one.
	pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
		self.metrics = Some(metrics);
		self
	}

	/// Builds the PipelineEngine using the given factories.
	pub fn build<SF, OF>(self, factories: PipelineFactories<SF, OF>) -> Result<PipelineEngine, BuilderError>
	where
		SF: Fn(&toml::Value) -> Result<Box<dyn StageInterface>, StageError>,
		OF: Fn(&toml::Value) -> Result<Box<dyn ScoringOracle>, EvaluationError>,
	{
		let stylize = self.build_stage(StageName::Stylize, &factories.stage_factories)?;
		let fuse = self.build_stage(StageName::Fuse, &factories.stage_factories)?;

		// Create oracle implementations
		let mut oracle_impls: HashMap<String, Arc<dyn ScoringOracle>> = HashMap::new();
		for (name, config) in &self.config.evaluation.implementations {
			let Some(factory) = factories.oracle_factories.get(name) else {
				tracing::warn!(component = "evaluation", implementation = %name, "Unknown implementation, skipping");
				continue;
			};
			match factory(config) {
				Ok(implementation) => {
					oracle_impls.insert(name.clone(), Arc::from(implementation));
					let is_primary = &self.config.evaluation.primary == name;
					tracing::info!(component = "evaluation", implementation = %name, enabled = %is_primary, "Loaded");
				},
				Err(e) => {
					tracing::error!(
						component = "evaluation",
						implementation = %name,
						error = %e,
						"Failed to create oracle implementation"
					);
					return Err(BuilderError::Config(format!(
						"Failed to create oracle implementation '{}': {}",
						name, e
					)));
				},
			}
		}

		let primary_oracle = &self.config.evaluation.primary;
		if !oracle_impls.contains_key(primary_oracle) {
			return Err(BuilderError::MissingComponent(format!(
				"Primary oracle '{}' failed to load or has no factory",
				primary_oracle
			)));
		}
		let evaluation = EvaluationService::new(oracle_impls, primary_oracle.clone())
			.map_err(|e| BuilderError::Config(e.to_string()))?;

		let intake = Arc::new(ExtensionValidator::from_config(&self.config.intake));
		let metrics = self
			.metrics
			.unwrap_or_else(|| Arc::new(MetricsCollector::new()));

		PipelineEngine::new(self.config, stylize, fuse, evaluation, intake, metrics)
			.map_err(|e| BuilderError::Config(e.to_string()))
	}

	fn build_stage<SF>(
		&self,
		stage: StageName,
		stage_factories: &HashMap<String, SF>,
	) -> Result<StageClient, BuilderError>
	where
		SF: Fn(&toml::Value) -> Result<Box<dyn StageInterface>, StageError>,
	{
		let stage_config = self
			.config
			.stage(stage)
			.ok_or_else(|| BuilderError::MissingComponent(format!("stage '{}'", stage)))?;

		let mut stage_impls = HashMap::new();
		for (name, config) in &stage_config.implementations {
			let Some(factory) = stage_factories.get(name) else {
				tracing::warn!(component = %stage, implementation = %name, "Unknown implementation, skipping");
				continue;
			};
			match factory(config) {
				Ok(implementation) => {
					stage_impls.insert(name.clone(), implementation);
					let is_primary = &stage_config.primary == name;
					tracing::info!(component = %stage, implementation = %name, enabled = %is_primary, "Loaded");
				},
				Err(e) => {
					tracing::error!(
						component = %stage,
						implementation = %name,
						error = %e,
						"Failed to create stage implementation"
					);
					return Err(BuilderError::Config(format!(
						"Failed to create {} implementation '{}': {}",
						stage, name, e
					)));
				},
			}
		}

		let implementation = stage_impls.remove(&stage_config.primary).ok_or_else(|| {
			BuilderError::MissingComponent(format!(
				"Primary {} implementation '{}' failed to load or has no factory",
				stage, stage_config.primary
			))
		})?;

		Ok(StageClient::new(stage, stage_config.timeout(), implementation))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use figurine_evaluation::OracleFactory;
	use figurine_stage::StageFactory;
	use figurine_types::{FaceInput, Order, OrderStatus, Preferences, Priority};

	const CONFIG: &str = r#"
		[pipeline]
		id = "builder-test"

		[intake]
		allowed_extensions = [".png"]

		[stages.stylize]
		primary = "mock"
		timeout_seconds = 5
		[stages.stylize.implementations.mock]

		[stages.fuse]
		primary = "mock"
		[stages.fuse.implementations.mock]
		accepted_values = { body_template = ["default"] }

		[evaluation]
		primary = "fixed"
		[evaluation.implementations.fixed]
		face_similarity = 0.95
		style_consistency = 0.95
		technical_quality = 0.95
		metrics = {}
	"#;

	fn factories() -> PipelineFactories<StageFactory, OracleFactory> {
		PipelineFactories {
			stage_factories: figurine_stage::get_all_implementations()
				.into_iter()
				.map(|(name, factory)| (name.to_string(), factory))
				.collect(),
			oracle_factories: figurine_evaluation::get_all_implementations()
				.into_iter()
				.map(|(name, factory)| (name.to_string(), factory))
				.collect(),
		}
	}

	fn order(filename: &str, template: &str) -> Order {
		Order::new(
			FaceInput::new(filename, vec![1u8; 16]),
			Preferences {
				body_template: template.into(),
				..Preferences::default()
			},
			Priority::Normal,
		)
	}

	#[tokio::test]
	async fn test_build_from_config() {
		let config: Config = CONFIG.parse().unwrap();
		let engine = PipelineBuilder::new(config).build(factories()).unwrap();

		assert_eq!(engine.evaluation_primary(), "fixed");
		assert_eq!(engine.stylize.timeout().as_secs(), 5);
		assert_eq!(engine.fuse.timeout().as_secs(), 30);

		let completed = engine.process(order("face.png", "default")).await.unwrap();
		assert_eq!(completed.status, OrderStatus::Completed);
		assert_eq!(
			completed.quality.unwrap().recommendations,
			vec!["Avatar quality is good across all metrics!".to_string()]
		);

		// Intake limits come from the [intake] section.
		let refused = engine.process(order("face.jpg", "default")).await.unwrap();
		assert_eq!(refused.status, OrderStatus::Failed);

		// The mock fusion stage rejects templates it does not know.
		let rejected = engine.process(order("face.png", "sporty")).await.unwrap();
		assert_eq!(rejected.status, OrderStatus::Failed);
		assert_eq!(
			rejected.failure.unwrap().status_code,
			Some(422)
		);
	}

	#[test]
	fn test_invalid_implementation_config_fails_build() {
		let config: Config = CONFIG
			.replace("timeout_seconds = 5\n", "timeout_seconds = 5\n\t\t[stages.stylize.implementations.http]\n\t\tpath = \"/stylize\"\n")
			.parse()
			.unwrap();

		let result = PipelineBuilder::new(config).build(factories());
		assert!(matches!(result, Err(BuilderError::Config(ref msg)) if msg.contains("http")));
	}

	#[test]
	fn test_missing_factory_for_primary() {
		let config: Config = CONFIG.parse().unwrap();
		let mut factories = factories();
		factories.oracle_factories.clear();

		let result = PipelineBuilder::new(config).build(factories);
		assert!(matches!(result, Err(BuilderError::MissingComponent(_))));
	}

	#[test]
	fn test_shared_metrics_collector() {
		let config: Config = CONFIG.parse().unwrap();
		let metrics = Arc::new(MetricsCollector::new());
		let engine = PipelineBuilder::new(config)
			.with_metrics(metrics.clone())
			.build(factories())
			.unwrap();

		assert!(Arc::ptr_eq(engine.metrics(), &metrics));
	}
}
