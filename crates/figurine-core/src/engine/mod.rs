//! Pipeline engine that drives orders through their lifecycle.
//!
//! One order is owned by exactly one flow of control: intake, stylization,
//! fusion and evaluation run strictly in sequence because every step consumes
//! the previous one's output. Many orders may run at once; the only state they
//! share is the metrics collector.

pub mod lifecycle;

use crate::fallback::{self, StageDecision};
use crate::intake::InputValidator;
use crate::monitoring::metrics::{
	MetricsCollector, COMPOSITE_SCORE, ORDERS_IN_FLIGHT, ORDERS_TOTAL, ORDER_DURATION_SECONDS,
	STAGE_INVOCATIONS_TOTAL,
};
use crate::state::{OrderStateError, OrderStateMachine};
use figurine_config::Config;
use figurine_evaluation::{AssessmentRequest, EvaluationService};
use figurine_stage::StageClient;
use figurine_types::{
	truncate_id, FailureDetails, Order, OrderStatus, StageName, StagePayload, StageRequest,
};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::instrument;

/// Errors that can occur during engine operations.
///
/// Stage failures are not errors; they end up in the order's status. These
/// variants report misuse of the engine itself.
#[derive(Debug, Error)]
pub enum EngineError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Service error: {0}")]
	Service(String),
	#[error("State error: {0}")]
	State(String),
}

impl From<OrderStateError> for EngineError {
	fn from(err: OrderStateError) -> Self {
		EngineError::State(err.to_string())
	}
}

/// Orchestrates orders through the stylize and fuse stages and evaluation.
#[derive(Clone)]
pub struct PipelineEngine {
	/// Pipeline configuration.
	pub(crate) config: Config,
	/// Client for the stylization stage.
	pub(crate) stylize: Arc<StageClient>,
	/// Client for the fusion stage.
	pub(crate) fuse: Arc<StageClient>,
	/// Scoring oracle plus composite evaluator.
	pub(crate) evaluation: Arc<EvaluationService>,
	/// Gate consulted before the first stage.
	pub(crate) intake: Arc<dyn InputValidator>,
	pub(crate) metrics: Arc<MetricsCollector>,
	pub(crate) state_machine: OrderStateMachine,
	/// Bounds the number of orders in flight through `submit`.
	pub(crate) semaphore: Arc<Semaphore>,
}

impl PipelineEngine {
	/// Creates a new engine from already constructed collaborators.
	pub fn new(
		config: Config,
		stylize: StageClient,
		fuse: StageClient,
		evaluation: EvaluationService,
		intake: Arc<dyn InputValidator>,
		metrics: Arc<MetricsCollector>,
	) -> Result<Self, EngineError> {
		if stylize.stage() != StageName::Stylize || fuse.stage() != StageName::Fuse {
			return Err(EngineError::Config(format!(
				"Stage clients wired in the wrong order: got '{}' then '{}'",
				stylize.stage(),
				fuse.stage()
			)));
		}

		let semaphore = Arc::new(Semaphore::new(config.pipeline.max_concurrent_orders));
		Ok(Self {
			config,
			stylize: Arc::new(stylize),
			fuse: Arc::new(fuse),
			evaluation: Arc::new(evaluation),
			intake,
			metrics,
			state_machine: OrderStateMachine::new(),
			semaphore,
		})
	}

	/// Returns a reference to the configuration.
	pub fn config(&self) -> &Config {
		&self.config
	}

	/// Returns the shared metrics collector.
	pub fn metrics(&self) -> &Arc<MetricsCollector> {
		&self.metrics
	}

	/// Name of the oracle used for evaluation.
	pub fn evaluation_primary(&self) -> &str {
		self.evaluation.primary()
	}

	/// Drives a pending order to a terminal status and returns it.
	///
	/// Stage unavailability and rejection are reflected in the returned
	/// order. `Err` means the order could not be advanced at all, e.g. it was
	/// not pending when handed in.
	#[instrument(skip_all, fields(order_id = %truncate_id(&order.id)))]
	pub async fn process(&self, mut order: Order) -> Result<Order, EngineError> {
		self.metrics.adjust_gauge(ORDERS_IN_FLIGHT, &[], 1.0);
		let result = self.drive(&mut order).await;
		self.metrics.adjust_gauge(ORDERS_IN_FLIGHT, &[], -1.0);
		result?;

		self.record_terminal(&order);
		Ok(order)
	}

	/// Processes an order on its own task once a concurrency permit is free.
	///
	/// Dropping the returned handle does not cancel the order; it runs to its
	/// terminal status and the result is discarded.
	pub async fn submit(
		&self,
		order: Order,
	) -> Result<JoinHandle<Result<Order, EngineError>>, EngineError> {
		let permit = self
			.semaphore
			.clone()
			.acquire_owned()
			.await
			.map_err(|e| EngineError::Service(format!("Failed to acquire semaphore permit: {}", e)))?;

		let engine = self.clone();
		Ok(tokio::spawn(async move {
			let _permit = permit; // Keep permit alive for duration of task
			engine.process(order).await
		}))
	}

	async fn drive(&self, order: &mut Order) -> Result<(), EngineError> {
		self.state_machine
			.transition(order, OrderStatus::Processing)?;

		match self
			.intake
			.validate(&order.face_input.data, &order.face_input.filename)
		{
			Ok(report) => {
				tracing::debug!(format = %report.format, size = report.size, "Input accepted");
				order.intake = Some(report);
			},
			Err(e) => {
				tracing::warn!(error = %e, "Input rejected at intake");
				self.state_machine.fail(
					order,
					FailureDetails::internal(format!("Intake validation failed: {}", e)),
				)?;
				return Ok(());
			},
		}

		let request = StageRequest::new(
			order.id.clone(),
			order.face_input.filename.clone(),
			order.face_input.data.clone(),
		)
		.with_param("style", order.preferences.style.clone())
		.with_param("color_scheme", order.preferences.color_scheme.clone());

		let Some(stylized) = self.run_stage(order, &self.stylize, request).await? else {
			return Ok(());
		};

		let request = StageRequest::new(
			order.id.clone(),
			artifact_filename("stylized", &stylized),
			stylized.data,
		)
		.with_param("body_template", order.preferences.body_template.clone())
		.with_param("style", order.preferences.style.clone());

		let Some(fused) = self.run_stage(order, &self.fuse, request).await? else {
			return Ok(());
		};

		let assessment = AssessmentRequest {
			order_id: order.id.clone(),
			reference: order.face_input.data.clone(),
			generated: fused.data,
			target_style: order.preferences.style.clone(),
		};

		match self.evaluation.evaluate(&assessment).await {
			Ok(report) => {
				self.metrics
					.record_histogram(COMPOSITE_SCORE, &[], report.composite_score);
				self.state_machine.complete(order, report)?;
			},
			Err(e) => {
				tracing::error!(error = %e, "Evaluation failed");
				self.state_machine.fail(
					order,
					FailureDetails::internal(format!("Evaluation failed: {}", e)),
				)?;
			},
		}

		Ok(())
	}

	/// Invokes one stage and applies the fallback policy.
	///
	/// Returns the payload for the next step, or `None` once the order has
	/// been failed.
	async fn run_stage(
		&self,
		order: &mut Order,
		client: &StageClient,
		request: StageRequest,
	) -> Result<Option<StagePayload>, EngineError> {
		let stage = client.stage();
		let status = match stage {
			StageName::Stylize => OrderStatus::Stylizing,
			StageName::Fuse => OrderStatus::Fusing,
		};
		self.state_machine.transition(order, status)?;

		let outcome = match client.invoke(request).await {
			Ok(outcome) => outcome,
			Err(e) => {
				tracing::error!(stage = %stage, error = %e, "Stage contract violation");
				self.metrics.increment_counter(
					STAGE_INVOCATIONS_TOTAL,
					&[("stage", stage.as_str()), ("outcome", "error")],
				);
				self.state_machine
					.fail(order, FailureDetails::stage(stage, None, e.to_string()))?;
				return Ok(None);
			},
		};

		self.metrics
			.record_stage(stage, outcome.kind().as_str(), outcome.elapsed());

		let decision = fallback::resolve(stage, &outcome);
		self.state_machine
			.record_stage_result(order, fallback::stage_result(stage, &outcome, &decision))?;

		match decision {
			StageDecision::Proceed(payload) => Ok(Some(payload)),
			StageDecision::Degrade(payload) => {
				tracing::warn!(stage = %stage, "Stage unavailable, continuing with placeholder");
				Ok(Some(payload))
			},
			StageDecision::Abort(failure) => {
				self.state_machine.fail(order, failure)?;
				Ok(None)
			},
		}
	}

	fn record_terminal(&self, order: &Order) {
		self.metrics
			.increment_counter(ORDERS_TOTAL, &[("status", order.status.as_str())]);
		if let Some(ms) = order.total_elapsed_ms {
			self.metrics
				.record_histogram(ORDER_DURATION_SECONDS, &[], ms as f64 / 1000.0);
		}

		match (&order.quality, &order.failure) {
			(Some(quality), _) => tracing::info!(
				composite_score = quality.composite_score,
				degraded = order.is_degraded(),
				elapsed_ms = order.total_elapsed_ms.unwrap_or(0),
				"Order completed"
			),
			(None, Some(failure)) => tracing::warn!(
				stage = failure.stage.map(|s| s.as_str()).unwrap_or("none"),
				reason = %failure.reason,
				"Order failed"
			),
			(None, None) => {},
		}
	}
}

/// Filename for an intermediate artifact, derived from its MIME type.
fn artifact_filename(prefix: &str, payload: &StagePayload) -> String {
	let extension = payload
		.content_type
		.split('/')
		.nth(1)
		.and_then(|subtype| subtype.split(';').next())
		.filter(|subtype| !subtype.is_empty())
		.unwrap_or("bin");
	format!("{}.{}", prefix, extension)
}
