//! Dynamic factory registry for pipeline implementations.
//!
//! This module provides a centralized registry for all factory functions,
//! allowing dynamic instantiation of implementations based on configuration.

use figurine_config::Config;
use figurine_core::{PipelineBuilder, PipelineEngine, PipelineFactories};
use figurine_evaluation::OracleFactory;
use figurine_stage::StageFactory;
use figurine_types::StageName;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Global registry for all implementation factories
pub struct FactoryRegistry {
	pub stages: HashMap<String, StageFactory>,
	pub oracles: HashMap<String, OracleFactory>,
}

impl FactoryRegistry {
	/// Create a new empty registry
	pub fn new() -> Self {
		Self {
			stages: HashMap::new(),
			oracles: HashMap::new(),
		}
	}

	/// Register a stage implementation
	pub fn register_stage(&mut self, name: impl Into<String>, factory: StageFactory) {
		self.stages.insert(name.into(), factory);
	}

	/// Register a scoring oracle implementation
	pub fn register_oracle(&mut self, name: impl Into<String>, factory: OracleFactory) {
		self.oracles.insert(name.into(), factory);
	}
}

// Global registry instance
static REGISTRY: OnceLock<FactoryRegistry> = OnceLock::new();

/// Initialize the global registry with all available implementations
pub fn initialize_registry() -> &'static FactoryRegistry {
	REGISTRY.get_or_init(|| {
		let mut registry = FactoryRegistry::new();

		for (name, factory) in figurine_stage::get_all_implementations() {
			tracing::debug!("Registering stage implementation: {}", name);
			registry.register_stage(name, factory);
		}

		for (name, factory) in figurine_evaluation::get_all_implementations() {
			tracing::debug!("Registering oracle implementation: {}", name);
			registry.register_oracle(name, factory);
		}

		registry
	})
}

/// Get the global factory registry
pub fn get_registry() -> &'static FactoryRegistry {
	initialize_registry()
}

/// Macro to build factories from config implementations
macro_rules! build_factories {
	($registry:expr, $config_impls:expr, $registry_field:ident, $type_name:expr) => {{
		let mut factories = HashMap::new();
		for name in $config_impls.keys() {
			if let Some(factory) = $registry.$registry_field.get(name) {
				factories.insert(name.clone(), *factory);
			} else {
				let mut available: Vec<_> = $registry.$registry_field.keys().cloned().collect();
				available.sort();
				return Err(format!(
					"Unknown {} implementation '{}'. Available: [{}]",
					$type_name,
					name,
					available.join(", ")
				)
				.into());
			}
		}
		factories
	}};
}

/// Build the pipeline engine using the registry and config
pub fn build_pipeline_from_config(
	config: Config,
) -> Result<PipelineEngine, Box<dyn std::error::Error>> {
	let registry = get_registry();

	let mut stage_factories = HashMap::new();
	for stage in StageName::ALL {
		let Some(stage_config) = config.stage(stage) else {
			return Err(format!("Missing [stages.{}] section", stage).into());
		};
		let factories = build_factories!(registry, stage_config.implementations, stages, stage);
		stage_factories.extend(factories);
	}
	let oracle_factories =
		build_factories!(registry, config.evaluation.implementations, oracles, "oracle");

	let factories = PipelineFactories {
		stage_factories,
		oracle_factories,
	};

	Ok(PipelineBuilder::new(config).build(factories)?)
}

#[cfg(test)]
mod tests {
	use super::*;

	const CONFIG: &str = r#"
		[pipeline]
		id = "registry-test"

		[stages.stylize]
		primary = "http"
		[stages.stylize.implementations.http]
		base_url = "http://localhost:8001"
		path = "/stylize"
		result_field = "stylized_image"

		[stages.fuse]
		primary = "mock"
		[stages.fuse.implementations.mock]

		[evaluation]
		primary = "fixed"
		[evaluation.implementations.fixed]
	"#;

	#[test]
	fn test_registry_contains_all_implementations() {
		let registry = get_registry();
		assert!(registry.stages.contains_key("http"));
		assert!(registry.stages.contains_key("mock"));
		assert!(registry.oracles.contains_key("fixed"));
	}

	#[test]
	fn test_build_pipeline_from_config() {
		let config: Config = CONFIG.parse().unwrap();
		let engine = build_pipeline_from_config(config).unwrap();
		assert_eq!(engine.config().pipeline.id, "registry-test");
		assert_eq!(engine.evaluation_primary(), "fixed");
	}

	#[test]
	fn test_unknown_implementation_lists_available() {
		let config: Config = CONFIG
			.replace(
				"[stages.fuse.implementations.mock]",
				"[stages.fuse.implementations.mock]\n[stages.fuse.implementations.gpu]",
			)
			.parse()
			.unwrap();

		let err = build_pipeline_from_config(config).err().unwrap();
		assert_eq!(
			err.to_string(),
			"Unknown fuse implementation 'gpu'. Available: [http, mock]"
		);
	}
}
