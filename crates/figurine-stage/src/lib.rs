//! Stage clients for the figurine pipeline.
//!
//! A stage is an independently deployed processing step (stylization, fusion)
//! reached over the network. Implementations of [`StageInterface`] perform the
//! raw call; [`StageClient`] wraps one with a per-stage deadline and classifies
//! whatever happened into exactly one [`StageOutcome`]. Stage failures are
//! returned as values, never as errors: `Err` is reserved for requests that
//! violate the client's contract.

use async_trait::async_trait;
use figurine_types::{
	truncate_id, ConfigSchema, ImplementationRegistry, StageName, StageOutcome, StagePayload,
	StageRequest,
};
use std::time::Duration;
use tokio::time::Instant;
use thiserror::Error;
use tracing::instrument;

/// Re-export implementations
pub mod implementations {
	pub mod http;
	pub mod mock;
}

/// Errors returned by stage clients and factories.
///
/// These never describe the remote stage's behavior; see [`StageOutcome`].
#[derive(Debug, Error)]
pub enum StageError {
	/// The request violates the client contract, e.g. an empty payload.
	#[error("Invalid stage request: {0}")]
	InvalidRequest(String),
	/// The implementation could not be built from its configuration.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Failure reported by a raw stage call, before classification.
#[derive(Debug, Error)]
pub enum StageCallError {
	/// The stage could not be reached or the connection broke.
	#[error("Transport error: {0}")]
	Transport(String),
	/// The stage answered but the reply could not be interpreted.
	#[error("Malformed reply: {0}")]
	Malformed(String),
	/// The stage declined the input.
	#[error("Rejected with status {status_code}: {reason}")]
	Rejected { status_code: u16, reason: String },
}

/// Interface every stage implementation provides.
#[async_trait]
pub trait StageInterface: Send + Sync {
	/// Returns the configuration schema for this implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Performs one call against the stage.
	///
	/// Deadlines are enforced by [`StageClient`]; implementations need not
	/// time themselves out.
	async fn call(&self, request: &StageRequest) -> Result<StagePayload, StageCallError>;
}

/// Type alias for stage factory functions.
pub type StageFactory = fn(&toml::Value) -> Result<Box<dyn StageInterface>, StageError>;

/// Registry trait for stage implementations.
pub trait StageRegistry: ImplementationRegistry<Factory = StageFactory> {}

/// Get all registered stage implementations.
pub fn get_all_implementations() -> Vec<(&'static str, StageFactory)> {
	use implementations::{http, mock};

	vec![
		(http::Registry::NAME, http::Registry::factory()),
		(mock::Registry::NAME, mock::Registry::factory()),
	]
}

/// Deadline-bound client for one stage.
pub struct StageClient {
	stage: StageName,
	timeout: Duration,
	implementation: Box<dyn StageInterface>,
}

impl StageClient {
	pub fn new(stage: StageName, timeout: Duration, implementation: Box<dyn StageInterface>) -> Self {
		Self {
			stage,
			timeout,
			implementation,
		}
	}

	pub fn stage(&self) -> StageName {
		self.stage
	}

	pub fn timeout(&self) -> Duration {
		self.timeout
	}

	/// Invokes the stage once and classifies the result.
	///
	/// Resolves within the configured timeout plus scheduling overhead. The
	/// reported elapsed time covers the whole attempt, including the time
	/// spent before a transport failure or the deadline.
	#[instrument(skip_all, fields(stage = %self.stage, order_id = %truncate_id(&request.order_id)))]
	pub async fn invoke(&self, request: StageRequest) -> Result<StageOutcome, StageError> {
		if request.payload.is_empty() {
			return Err(StageError::InvalidRequest(format!(
				"empty payload for stage '{}'",
				self.stage
			)));
		}
		if self.timeout.is_zero() {
			return Err(StageError::InvalidRequest(format!(
				"zero timeout for stage '{}'",
				self.stage
			)));
		}

		let started = Instant::now();
		let result = tokio::time::timeout(self.timeout, self.implementation.call(&request)).await;
		let elapsed = started.elapsed();

		let outcome = match result {
			Ok(Ok(payload)) => StageOutcome::Success { payload, elapsed },
			Ok(Err(StageCallError::Rejected {
				status_code,
				reason,
			})) => StageOutcome::Rejected {
				status_code,
				reason,
				elapsed,
			},
			Ok(Err(e @ (StageCallError::Transport(_) | StageCallError::Malformed(_)))) => {
				StageOutcome::Unavailable {
					reason: e.to_string(),
					elapsed,
				}
			},
			Err(_) => StageOutcome::Unavailable {
				reason: format!("timed out after {}s", self.timeout.as_secs_f64()),
				elapsed,
			},
		};

		match &outcome {
			StageOutcome::Success { .. } => {
				tracing::debug!(elapsed_ms = elapsed.as_millis() as u64, "Stage succeeded")
			},
			StageOutcome::Unavailable { reason, .. } => {
				tracing::warn!(elapsed_ms = elapsed.as_millis() as u64, %reason, "Stage unavailable")
			},
			StageOutcome::Rejected {
				status_code, reason, ..
			} => tracing::warn!(
				elapsed_ms = elapsed.as_millis() as u64,
				status_code,
				%reason,
				"Stage rejected input"
			),
		}

		Ok(outcome)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use bytes::Bytes;
	use figurine_types::{OutcomeKind, Schema, ValidationError};

	struct NoSchema;

	impl ConfigSchema for NoSchema {
		fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
			Schema::new(vec![], vec![]).validate(config)
		}
	}

	/// Stage double whose single answer is fixed at construction.
	enum Scripted {
		Succeed,
		Refuse,
		Unreachable,
		Garbled,
		Hang,
	}

	#[async_trait]
	impl StageInterface for Scripted {
		fn config_schema(&self) -> Box<dyn ConfigSchema> {
			Box::new(NoSchema)
		}

		async fn call(&self, request: &StageRequest) -> Result<StagePayload, StageCallError> {
			match self {
				Scripted::Succeed => Ok(StagePayload::new("image/png", request.payload.clone())),
				Scripted::Refuse => Err(StageCallError::Rejected {
					status_code: 400,
					reason: "No face detected".into(),
				}),
				Scripted::Unreachable => Err(StageCallError::Transport("connection refused".into())),
				Scripted::Garbled => Err(StageCallError::Malformed("missing field".into())),
				Scripted::Hang => {
					tokio::time::sleep(Duration::from_secs(3600)).await;
					Ok(StagePayload::new("image/png", Bytes::new()))
				},
			}
		}
	}

	fn client(script: Scripted, timeout: Duration) -> StageClient {
		StageClient::new(StageName::Stylize, timeout, Box::new(script))
	}

	fn request() -> StageRequest {
		StageRequest::new("order-1", "face.png", Bytes::from_static(b"face"))
	}

	#[tokio::test]
	async fn test_success_carries_payload() {
		let outcome = client(Scripted::Succeed, Duration::from_secs(5))
			.invoke(request())
			.await
			.unwrap();

		match outcome {
			StageOutcome::Success { payload, .. } => assert_eq!(payload.data.as_ref(), b"face"),
			other => panic!("unexpected outcome: {:?}", other),
		}
	}

	#[tokio::test]
	async fn test_rejection_keeps_status_and_reason() {
		let outcome = client(Scripted::Refuse, Duration::from_secs(5))
			.invoke(request())
			.await
			.unwrap();

		assert_eq!(
			outcome,
			StageOutcome::Rejected {
				status_code: 400,
				reason: "No face detected".into(),
				elapsed: outcome.elapsed(),
			}
		);
	}

	#[tokio::test]
	async fn test_transport_and_malformed_are_unavailable() {
		for script in [Scripted::Unreachable, Scripted::Garbled] {
			let outcome = client(script, Duration::from_secs(5))
				.invoke(request())
				.await
				.unwrap();
			assert_eq!(outcome.kind(), OutcomeKind::Unavailable);
		}
	}

	#[tokio::test(start_paused = true)]
	async fn test_deadline_yields_unavailable() {
		let outcome = client(Scripted::Hang, Duration::from_secs(30))
			.invoke(request())
			.await
			.unwrap();

		assert_eq!(outcome.kind(), OutcomeKind::Unavailable);
		assert!(outcome.elapsed() >= Duration::from_secs(30));
		assert!(outcome.elapsed() < Duration::from_secs(31));
	}

	#[tokio::test]
	async fn test_empty_payload_is_contract_violation() {
		let empty = StageRequest::new("order-1", "face.png", Bytes::new());
		let result = client(Scripted::Succeed, Duration::from_secs(5)).invoke(empty).await;
		assert!(matches!(result, Err(StageError::InvalidRequest(_))));
	}

	#[tokio::test]
	async fn test_zero_timeout_is_contract_violation() {
		let result = client(Scripted::Succeed, Duration::ZERO).invoke(request()).await;
		assert!(matches!(result, Err(StageError::InvalidRequest(_))));
	}

	#[test]
	fn test_all_implementations_registered() {
		let names: Vec<_> = get_all_implementations()
			.into_iter()
			.map(|(name, _)| name)
			.collect();
		assert_eq!(names, vec!["http", "mock"]);
	}
}
