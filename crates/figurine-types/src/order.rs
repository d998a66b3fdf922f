//! Order types for the figurine pipeline.
//!
//! An [`Order`] is the full record of one submission: the caller's face input
//! and preferences, the lifecycle status, every stage result and, once the
//! pipeline completes, the composite quality report.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::{QualityReport, StageName, StageResult};

/// Record of one submission's progress from intake to terminal state.
///
/// Orders are created in [`OrderStatus::Pending`]. All later mutation goes
/// through the order state machine owned by the orchestrator; once the status
/// is terminal the record is read-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
	/// Unique identifier assigned at creation.
	pub id: String,
	/// Current lifecycle status.
	pub status: OrderStatus,
	/// Advisory priority, carried through unchanged.
	pub priority: Priority,
	/// Caller-owned face image.
	pub face_input: FaceInput,
	/// Style, body template and color scheme selected at submission.
	pub preferences: Preferences,
	/// Metadata reported by intake validation, as returned by the validator.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub intake: Option<IntakeReport>,
	/// One entry per stage actually invoked, in pipeline order.
	#[serde(default)]
	pub stage_results: BTreeMap<StageName, StageResult>,
	/// Composite quality report, present only when completed.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub quality: Option<QualityReport>,
	/// Failure details, present only when failed.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub failure: Option<FailureDetails>,
	/// Lifecycle timestamps.
	pub timestamps: OrderTimestamps,
	/// Every status change applied to this order, oldest first.
	#[serde(default)]
	pub status_history: Vec<StatusTransition>,
	/// Milliseconds between the first stage invocation and the terminal transition.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub total_elapsed_ms: Option<u64>,
}

impl Order {
	/// Creates a new pending order with a fresh identifier.
	pub fn new(face_input: FaceInput, preferences: Preferences, priority: Priority) -> Self {
		Self {
			id: uuid::Uuid::new_v4().to_string(),
			status: OrderStatus::Pending,
			priority,
			face_input,
			preferences,
			intake: None,
			stage_results: BTreeMap::new(),
			quality: None,
			failure: None,
			timestamps: OrderTimestamps::new(Utc::now()),
			status_history: Vec::new(),
			total_elapsed_ms: None,
		}
	}

	/// Returns true once the order has reached `completed` or `failed`.
	pub fn is_terminal(&self) -> bool {
		self.status.is_terminal()
	}

	/// Returns true if any recorded stage used a placeholder result.
	pub fn is_degraded(&self) -> bool {
		self.stage_results.values().any(|result| result.degraded)
	}

	/// Returns the recorded result for a stage, if that stage was invoked.
	pub fn stage_result(&self, stage: StageName) -> Option<&StageResult> {
		self.stage_results.get(&stage)
	}
}

/// Lifecycle status of an order.
///
/// `pending → processing → stylizing → fusing → completed`, with `failed`
/// reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
	/// Created, no work started.
	Pending,
	/// The orchestrator has picked the order up and is checking its input.
	Processing,
	/// The stylize stage is in flight.
	Stylizing,
	/// The fuse stage is in flight, or fusion resolved and evaluation is running.
	Fusing,
	/// Evaluation produced a composite score.
	Completed,
	/// A stage rejected the input or an unrecoverable internal error occurred.
	Failed,
}

impl OrderStatus {
	/// All statuses in lifecycle order.
	pub const ALL: [OrderStatus; 6] = [
		OrderStatus::Pending,
		OrderStatus::Processing,
		OrderStatus::Stylizing,
		OrderStatus::Fusing,
		OrderStatus::Completed,
		OrderStatus::Failed,
	];

	pub fn is_terminal(&self) -> bool {
		matches!(self, OrderStatus::Completed | OrderStatus::Failed)
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			OrderStatus::Pending => "pending",
			OrderStatus::Processing => "processing",
			OrderStatus::Stylizing => "stylizing",
			OrderStatus::Fusing => "fusing",
			OrderStatus::Completed => "completed",
			OrderStatus::Failed => "failed",
		}
	}
}

impl fmt::Display for OrderStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Advisory priority of an order.
///
/// Nothing in the pipeline schedules by priority; it is carried so that
/// downstream consumers see what the caller asked for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
	Low,
	#[default]
	Normal,
	High,
	Urgent,
}

impl Priority {
	pub fn as_str(&self) -> &'static str {
		match self {
			Priority::Low => "low",
			Priority::Normal => "normal",
			Priority::High => "high",
			Priority::Urgent => "urgent",
		}
	}
}

impl fmt::Display for Priority {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for Priority {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"low" => Ok(Priority::Low),
			"normal" => Ok(Priority::Normal),
			"high" => Ok(Priority::High),
			"urgent" => Ok(Priority::Urgent),
			other => Err(format!(
				"Unknown priority '{}'. Expected one of: low, normal, high, urgent",
				other
			)),
		}
	}
}

/// The caller's face image.
///
/// The bytes are shared, immutable and never serialized back out; only the
/// declared filename and size appear in order records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceInput {
	/// Filename declared by the caller.
	pub filename: String,
	/// Size of the image in bytes.
	pub size: usize,
	#[serde(skip)]
	pub data: Bytes,
}

impl FaceInput {
	pub fn new(filename: impl Into<String>, data: impl Into<Bytes>) -> Self {
		let data = data.into();
		Self {
			filename: filename.into(),
			size: data.len(),
			data,
		}
	}

	pub fn is_empty(&self) -> bool {
		self.data.is_empty()
	}
}

/// Metadata about an input accepted at intake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntakeReport {
	pub filename: String,
	pub size: usize,
	/// Declared format, derived from the extension (e.g. `jpeg`).
	pub format: String,
}

/// Generation preferences selected at submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
	/// Target style descriptor passed to stylization and style scoring.
	#[serde(default = "default_style")]
	pub style: String,
	/// Body template identifier passed to fusion.
	#[serde(default = "default_body_template")]
	pub body_template: String,
	/// Color scheme passed to stylization.
	#[serde(default = "default_color_scheme")]
	pub color_scheme: String,
}

fn default_style() -> String {
	"cartoon".to_string()
}

fn default_body_template() -> String {
	"default".to_string()
}

fn default_color_scheme() -> String {
	"vibrant".to_string()
}

impl Default for Preferences {
	fn default() -> Self {
		Self {
			style: default_style(),
			body_template: default_body_template(),
			color_scheme: default_color_scheme(),
		}
	}
}

/// Lifecycle timestamps of an order.
///
/// `completed_at` and `failed_at` are mutually exclusive and each set at most once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderTimestamps {
	pub submitted_at: DateTime<Utc>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub started_at: Option<DateTime<Utc>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub completed_at: Option<DateTime<Utc>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub failed_at: Option<DateTime<Utc>>,
}

impl OrderTimestamps {
	pub fn new(submitted_at: DateTime<Utc>) -> Self {
		Self {
			submitted_at,
			started_at: None,
			completed_at: None,
			failed_at: None,
		}
	}
}

/// One applied status change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusTransition {
	pub from: OrderStatus,
	pub to: OrderStatus,
	pub at: DateTime<Utc>,
}

/// Why an order failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureDetails {
	/// The stage responsible, or `None` for intake and evaluation failures.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub stage: Option<StageName>,
	/// Status code reported by the stage, when it rejected the input.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub status_code: Option<u16>,
	/// Human-readable reason.
	pub reason: String,
}

impl FailureDetails {
	pub fn stage(stage: StageName, status_code: Option<u16>, reason: impl Into<String>) -> Self {
		Self {
			stage: Some(stage),
			status_code,
			reason: reason.into(),
		}
	}

	pub fn internal(reason: impl Into<String>) -> Self {
		Self {
			stage: None,
			status_code: None,
			reason: reason.into(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_new_order_is_pending() {
		let order = Order::new(
			FaceInput::new("face.jpg", vec![1u8, 2, 3]),
			Preferences::default(),
			Priority::High,
		);

		assert_eq!(order.status, OrderStatus::Pending);
		assert_eq!(order.priority, Priority::High);
		assert_eq!(order.face_input.size, 3);
		assert!(order.stage_results.is_empty());
		assert!(order.quality.is_none());
		assert!(order.timestamps.started_at.is_none());
		assert!(!order.is_terminal());
	}

	#[test]
	fn test_status_serializes_lowercase() {
		let json = serde_json::to_string(&OrderStatus::Stylizing).unwrap();
		assert_eq!(json, "\"stylizing\"");
		assert_eq!(OrderStatus::Fusing.to_string(), "fusing");
	}

	#[test]
	fn test_priority_parsing() {
		assert_eq!("URGENT".parse::<Priority>().unwrap(), Priority::Urgent);
		assert_eq!("low".parse::<Priority>().unwrap(), Priority::Low);
		assert!("asap".parse::<Priority>().is_err());
	}

	#[test]
	fn test_face_bytes_not_serialized() {
		let input = FaceInput::new("face.png", vec![9u8; 16]);
		let json = serde_json::to_value(&input).unwrap();
		assert_eq!(json["filename"], "face.png");
		assert_eq!(json["size"], 16);
		assert!(json.get("data").is_none());
	}

	#[test]
	fn test_preferences_defaults_apply_to_missing_fields() {
		let prefs: Preferences = serde_json::from_str(r#"{"style": "anime"}"#).unwrap();
		assert_eq!(prefs.style, "anime");
		assert_eq!(prefs.body_template, "default");
		assert_eq!(prefs.color_scheme, "vibrant");
	}
}
