//! Lifecycle management for the pipeline engine.
//!
//! Startup reporting and a graceful shutdown that waits for in-flight orders.

use super::{EngineError, PipelineEngine};

impl PipelineEngine {
	/// Performs any initialization required before accepting orders
	pub async fn initialize(&self) -> Result<(), EngineError> {
		tracing::info!(
			pipeline_id = %self.config.pipeline.id,
			max_concurrent_orders = self.config.pipeline.max_concurrent_orders,
			stylize_timeout_secs = self.stylize.timeout().as_secs(),
			fuse_timeout_secs = self.fuse.timeout().as_secs(),
			oracle = %self.evaluation.primary(),
			"Initializing pipeline engine"
		);
		Ok(())
	}

	/// Waits for submitted orders to finish, then refuses new submissions.
	pub async fn shutdown(&self) -> Result<(), EngineError> {
		tracing::info!("Shutting down pipeline engine");

		let permits = u32::try_from(self.config.pipeline.max_concurrent_orders)
			.map_err(|e| EngineError::Config(e.to_string()))?;
		let _drained = self
			.semaphore
			.acquire_many(permits)
			.await
			.map_err(|e| EngineError::Service(e.to_string()))?;
		self.semaphore.close();

		tracing::info!("Pipeline engine stopped");
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use crate::engine::PipelineEngine;
	use crate::intake::ExtensionValidator;
	use crate::monitoring::metrics::{MetricsCollector, ORDERS_TOTAL};
	use figurine_config::Config;
	use figurine_evaluation::implementations::fixed::FixedOracle;
	use figurine_evaluation::{EvaluationService, ScoringOracle};
	use figurine_stage::implementations::mock::{MockBehavior, MockStage};
	use figurine_stage::StageClient;
	use figurine_types::{FaceInput, Order, Preferences, Priority, StageName};
	use std::collections::HashMap;
	use std::sync::Arc;
	use std::time::Duration;

	fn engine() -> PipelineEngine {
		let config: Config = r#"
			[pipeline]
			id = "lifecycle"
			max_concurrent_orders = 2

			[stages.stylize]
			primary = "mock"
			[stages.stylize.implementations.mock]

			[stages.fuse]
			primary = "mock"
			[stages.fuse.implementations.mock]

			[evaluation]
			primary = "fixed"
			[evaluation.implementations.fixed]
		"#
		.parse()
		.unwrap();

		let oracle: Arc<dyn ScoringOracle> = Arc::new(FixedOracle::default());
		let mut oracles = HashMap::new();
		oracles.insert("fixed".to_string(), oracle);

		let stage = |name| {
			StageClient::new(
				name,
				Duration::from_secs(30),
				Box::new(MockStage::new(Duration::from_millis(800), MockBehavior::Echo)),
			)
		};

		PipelineEngine::new(
			config,
			stage(StageName::Stylize),
			stage(StageName::Fuse),
			EvaluationService::new(oracles, "fixed".into()).unwrap(),
			Arc::new(ExtensionValidator::default()),
			Arc::new(MetricsCollector::new()),
		)
		.unwrap()
	}

	fn order() -> Order {
		Order::new(
			FaceInput::new("face.png", vec![1u8; 4]),
			Preferences::default(),
			Priority::Low,
		)
	}

	#[tokio::test(start_paused = true)]
	async fn test_shutdown_waits_for_abandoned_orders() {
		let engine = engine();
		engine.initialize().await.unwrap();

		// The caller walks away; the order must still run to completion.
		drop(engine.submit(order()).await.unwrap());
		engine.shutdown().await.unwrap();

		assert_eq!(
			engine
				.metrics()
				.counter_value(ORDERS_TOTAL, &[("status", "completed")]),
			1
		);
		assert!(engine.submit(order()).await.is_err());
	}
}
