//! Fallback policy for stage outcomes.
//!
//! An unreachable stage is replaced by a fixed placeholder so the order can
//! still finish; a stage that rejects the input ends the order.

use figurine_types::{FailureDetails, StageName, StageOutcome, StagePayload, StageResult};

/// 1x1 transparent PNG substituted for stylization.
const PLACEHOLDER_PNG: [u8; 70] = [
	0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x48, 0x44, 0x52,
	0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1f, 0x15, 0xc4,
	0x89, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x44, 0x41, 0x54, 0x78, 0xda, 0x63, 0xfc, 0xff, 0x9f, 0xa1,
	0x1e, 0x00, 0x07, 0x82, 0x02, 0x7f, 0x3d, 0xc8, 0x48, 0xef, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45,
	0x4e, 0x44, 0xae, 0x42, 0x60, 0x82,
];

/// Mesh descriptor substituted for fusion.
const PLACEHOLDER_MESH: &str = r#"{"vertices":1024,"faces":2048,"format":"obj","texture_maps":["diffuse","normal","roughness"]}"#;

/// What the orchestrator does next with a stage outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum StageDecision {
	/// Continue with the stage's genuine output.
	Proceed(StagePayload),
	/// Continue with a tagged placeholder.
	Degrade(StagePayload),
	/// Halt the chain and fail the order.
	Abort(FailureDetails),
}

impl StageDecision {
	/// Payload handed to the next step, if the chain continues.
	pub fn payload(&self) -> Option<&StagePayload> {
		match self {
			StageDecision::Proceed(payload) | StageDecision::Degrade(payload) => Some(payload),
			StageDecision::Abort(_) => None,
		}
	}

	pub fn is_degraded(&self) -> bool {
		matches!(self, StageDecision::Degrade(_))
	}
}

/// Deterministic stand-in output for a stage.
pub fn placeholder(stage: StageName) -> StagePayload {
	match stage {
		StageName::Stylize => StagePayload::placeholder("image/png", PLACEHOLDER_PNG.to_vec()),
		StageName::Fuse => StagePayload::placeholder("application/json", PLACEHOLDER_MESH),
	}
}

/// Maps a stage outcome to the next pipeline step.
pub fn resolve(stage: StageName, outcome: &StageOutcome) -> StageDecision {
	match outcome {
		StageOutcome::Success { payload, .. } => StageDecision::Proceed(payload.clone()),
		StageOutcome::Unavailable { .. } => StageDecision::Degrade(placeholder(stage)),
		StageOutcome::Rejected {
			status_code,
			reason,
			..
		} => StageDecision::Abort(FailureDetails::stage(
			stage,
			Some(*status_code),
			reason.clone(),
		)),
	}
}

/// Builds the record kept on the order for one resolved stage.
pub fn stage_result(stage: StageName, outcome: &StageOutcome, decision: &StageDecision) -> StageResult {
	let (status_code, reason) = match outcome {
		StageOutcome::Success { .. } => (None, None),
		StageOutcome::Unavailable { reason, .. } => (None, Some(reason.clone())),
		StageOutcome::Rejected {
			status_code,
			reason,
			..
		} => (Some(*status_code), Some(reason.clone())),
	};

	StageResult {
		stage,
		outcome: outcome.kind(),
		payload: decision.payload().cloned(),
		degraded: decision.is_degraded(),
		elapsed_ms: outcome.elapsed().as_millis() as u64,
		status_code,
		reason,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use figurine_types::OutcomeKind;
	use std::time::Duration;

	#[test]
	fn test_success_proceeds_with_genuine_payload() {
		let payload = StagePayload::new("image/png", vec![7u8; 3]);
		let outcome = StageOutcome::Success {
			payload: payload.clone(),
			elapsed: Duration::from_millis(40),
		};

		let decision = resolve(StageName::Stylize, &outcome);
		assert_eq!(decision, StageDecision::Proceed(payload));

		let result = stage_result(StageName::Stylize, &outcome, &decision);
		assert_eq!(result.outcome, OutcomeKind::Success);
		assert!(!result.degraded);
		assert_eq!(result.elapsed_ms, 40);
		assert!(result.reason.is_none());
	}

	#[test]
	fn test_unavailable_degrades_to_tagged_placeholder() {
		let outcome = StageOutcome::Unavailable {
			reason: "connection refused".into(),
			elapsed: Duration::from_millis(3),
		};

		let decision = resolve(StageName::Stylize, &outcome);
		let payload = decision.payload().unwrap();
		assert!(decision.is_degraded());
		assert!(payload.placeholder);
		assert_eq!(payload.content_type, "image/png");
		assert_eq!(&payload.data[..8], b"\x89PNG\r\n\x1a\n");

		let result = stage_result(StageName::Stylize, &outcome, &decision);
		assert!(result.degraded);
		assert_eq!(result.outcome, OutcomeKind::Unavailable);
		assert_eq!(result.reason.as_deref(), Some("connection refused"));
	}

	#[test]
	fn test_fuse_placeholder_is_mesh_descriptor() {
		let payload = placeholder(StageName::Fuse);
		let mesh: serde_json::Value = serde_json::from_slice(&payload.data).unwrap();
		assert_eq!(payload.content_type, "application/json");
		assert_eq!(mesh["format"], "obj");
		assert_eq!(mesh["vertices"], 1024);
		assert_eq!(placeholder(StageName::Fuse), payload);
	}

	#[test]
	fn test_rejected_aborts_with_stage_and_reason() {
		let outcome = StageOutcome::Rejected {
			status_code: 400,
			reason: "Invalid image format".into(),
			elapsed: Duration::from_millis(12),
		};

		let decision = resolve(StageName::Fuse, &outcome);
		assert_eq!(
			decision,
			StageDecision::Abort(FailureDetails::stage(
				StageName::Fuse,
				Some(400),
				"Invalid image format"
			))
		);

		let result = stage_result(StageName::Fuse, &outcome, &decision);
		assert!(result.payload.is_none());
		assert_eq!(result.status_code, Some(400));
	}
}
