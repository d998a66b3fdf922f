//! Stage types shared by stage clients and the orchestrator.
//!
//! A stage is one independently deployed processing step. Calling it yields a
//! [`StageOutcome`]; the orchestrator records what it did with that outcome as
//! a [`StageResult`] on the order.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// The processing stages, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageName {
	/// 2D cartoon stylization of the face image.
	Stylize,
	/// Fusion of the stylized face with a body template.
	Fuse,
}

impl StageName {
	/// All stages in the order they run.
	pub const ALL: [StageName; 2] = [StageName::Stylize, StageName::Fuse];

	pub fn as_str(&self) -> &'static str {
		match self {
			StageName::Stylize => "stylize",
			StageName::Fuse => "fuse",
		}
	}
}

impl fmt::Display for StageName {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for StageName {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"stylize" => Ok(StageName::Stylize),
			"fuse" => Ok(StageName::Fuse),
			other => Err(format!("Unknown stage '{}'", other)),
		}
	}
}

/// Input for one stage invocation.
#[derive(Debug, Clone)]
pub struct StageRequest {
	/// Order this call belongs to, for logging and tracing.
	pub order_id: String,
	/// Filename forwarded with the payload.
	pub filename: String,
	/// Binary payload: the face image for stylization, the stylized image for fusion.
	pub payload: Bytes,
	/// Stage-specific parameters such as `style` or `body_template`.
	pub params: BTreeMap<String, String>,
}

impl StageRequest {
	pub fn new(order_id: impl Into<String>, filename: impl Into<String>, payload: Bytes) -> Self {
		Self {
			order_id: order_id.into(),
			filename: filename.into(),
			payload,
			params: BTreeMap::new(),
		}
	}

	pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.params.insert(key.into(), value.into());
		self
	}
}

/// Artifact produced by a stage, or substituted for one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagePayload {
	/// MIME type of `data`.
	pub content_type: String,
	#[serde(with = "crate::utils::base64_bytes")]
	pub data: Bytes,
	/// Processing time in seconds reported by the stage itself.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub processing_time: Option<f64>,
	/// True when this is a deterministic placeholder, not genuine stage output.
	#[serde(default)]
	pub placeholder: bool,
}

impl StagePayload {
	pub fn new(content_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
		Self {
			content_type: content_type.into(),
			data: data.into(),
			processing_time: None,
			placeholder: false,
		}
	}

	pub fn placeholder(content_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
		Self {
			placeholder: true,
			..Self::new(content_type, data)
		}
	}

	pub fn with_processing_time(mut self, seconds: f64) -> Self {
		self.processing_time = Some(seconds);
		self
	}
}

/// Classified result of one stage invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
	/// The stage answered with a well-formed result before the deadline.
	Success {
		payload: StagePayload,
		elapsed: Duration,
	},
	/// The stage could not be reached or did not answer in time.
	Unavailable { reason: String, elapsed: Duration },
	/// The stage was reached and declined the input.
	Rejected {
		status_code: u16,
		reason: String,
		elapsed: Duration,
	},
}

impl StageOutcome {
	pub fn kind(&self) -> OutcomeKind {
		match self {
			StageOutcome::Success { .. } => OutcomeKind::Success,
			StageOutcome::Unavailable { .. } => OutcomeKind::Unavailable,
			StageOutcome::Rejected { .. } => OutcomeKind::Rejected,
		}
	}

	/// Time from call start to outcome resolution.
	pub fn elapsed(&self) -> Duration {
		match self {
			StageOutcome::Success { elapsed, .. }
			| StageOutcome::Unavailable { elapsed, .. }
			| StageOutcome::Rejected { elapsed, .. } => *elapsed,
		}
	}
}

/// Outcome classification, used as a metric label and in stage results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeKind {
	Success,
	Unavailable,
	Rejected,
}

impl OutcomeKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			OutcomeKind::Success => "success",
			OutcomeKind::Unavailable => "unavailable",
			OutcomeKind::Rejected => "rejected",
		}
	}
}

impl fmt::Display for OutcomeKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// What the pipeline recorded for one invoked stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
	pub stage: StageName,
	pub outcome: OutcomeKind,
	/// Genuine or placeholder payload; absent for rejections.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub payload: Option<StagePayload>,
	/// True when the payload is a placeholder substituted for an unavailable stage.
	pub degraded: bool,
	pub elapsed_ms: u64,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub status_code: Option<u16>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_stage_order_follows_pipeline() {
		assert!(StageName::Stylize < StageName::Fuse);
		assert_eq!(StageName::ALL, [StageName::Stylize, StageName::Fuse]);
	}

	#[test]
	fn test_outcome_kind_and_elapsed() {
		let outcome = StageOutcome::Rejected {
			status_code: 400,
			reason: "Invalid image".into(),
			elapsed: Duration::from_millis(120),
		};
		assert_eq!(outcome.kind(), OutcomeKind::Rejected);
		assert_eq!(outcome.elapsed(), Duration::from_millis(120));
	}

	#[test]
	fn test_placeholder_payload_is_tagged() {
		let payload = StagePayload::placeholder("image/png", vec![0u8; 4]);
		assert!(payload.placeholder);
		assert!(!StagePayload::new("image/png", vec![0u8; 4]).placeholder);
	}

	#[test]
	fn test_payload_data_serializes_as_base64() {
		let payload = StagePayload::new("text/plain", b"hello".to_vec()).with_processing_time(0.5);
		let json = serde_json::to_value(&payload).unwrap();
		assert_eq!(json["data"], "aGVsbG8=");

		let back: StagePayload = serde_json::from_value(json).unwrap();
		assert_eq!(back.data.as_ref(), b"hello");
		assert_eq!(back.processing_time, Some(0.5));
	}

	#[test]
	fn test_stage_name_parsing() {
		assert_eq!("fuse".parse::<StageName>().unwrap(), StageName::Fuse);
		assert!("print".parse::<StageName>().is_err());
	}
}
