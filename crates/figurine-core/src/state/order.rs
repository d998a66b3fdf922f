//! Order state machine implementation.
//!
//! Advances an order through `pending -> processing -> stylizing -> fusing ->
//! completed`, with `failed` reachable from any non-terminal state. Every
//! applied change is appended to the order's status history. Terminal orders
//! reject all further mutation.

use chrono::{DateTime, Utc};
use figurine_types::{
	FailureDetails, Order, OrderStatus, QualityReport, StageName, StageResult, StatusTransition,
};
use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Errors that can occur during order state management.
///
/// Every variant is a contract violation by the caller; none of them are
/// produced by stage behavior.
#[derive(Debug, Error, PartialEq)]
pub enum OrderStateError {
	#[error("Order {order_id} is terminal ({status}) and cannot be modified")]
	Terminal {
		order_id: String,
		status: OrderStatus,
	},
	#[error("Invalid state transition from {from} to {to}")]
	InvalidTransition { from: OrderStatus, to: OrderStatus },
	#[error("Result for stage '{0}' already recorded")]
	StageAlreadyRecorded(StageName),
	#[error("Cannot record stage '{stage}' while order is {status}")]
	StageOutOfOrder {
		stage: StageName,
		status: OrderStatus,
	},
}

// Static transition table - each state maps to allowed next states
static TRANSITIONS: Lazy<HashMap<OrderStatus, HashSet<OrderStatus>>> = Lazy::new(|| {
	let mut m = HashMap::new();
	m.insert(
		OrderStatus::Pending,
		HashSet::from([OrderStatus::Processing, OrderStatus::Failed]),
	);
	m.insert(
		OrderStatus::Processing,
		HashSet::from([OrderStatus::Stylizing, OrderStatus::Failed]),
	);
	m.insert(
		OrderStatus::Stylizing,
		HashSet::from([OrderStatus::Fusing, OrderStatus::Failed]),
	);
	m.insert(
		OrderStatus::Fusing,
		HashSet::from([OrderStatus::Completed, OrderStatus::Failed]),
	);
	m.insert(OrderStatus::Completed, HashSet::new()); // terminal
	m.insert(OrderStatus::Failed, HashSet::new()); // terminal
	m
});

/// Applies validated lifecycle changes to orders.
///
/// Holds no state of its own; each order is owned by the single flow that
/// processes it.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderStateMachine;

impl OrderStateMachine {
	pub fn new() -> Self {
		Self
	}

	/// Checks if a state transition is valid
	pub fn is_valid_transition(from: OrderStatus, to: OrderStatus) -> bool {
		TRANSITIONS
			.get(&from)
			.is_some_and(|set| set.contains(&to))
	}

	/// Moves an order to a non-terminal status.
	///
	/// Entering `stylizing` marks the first stage invocation and sets
	/// `started_at`. Terminal statuses are reached through [`complete`] and
	/// [`fail`] only, since they carry a payload.
	///
	/// [`complete`]: Self::complete
	/// [`fail`]: Self::fail
	pub fn transition(&self, order: &mut Order, to: OrderStatus) -> Result<(), OrderStateError> {
		if to.is_terminal() {
			return Err(OrderStateError::InvalidTransition {
				from: order.status,
				to,
			});
		}

		let now = self.apply(order, to)?;
		if to == OrderStatus::Stylizing && order.timestamps.started_at.is_none() {
			order.timestamps.started_at = Some(now);
		}
		Ok(())
	}

	/// Records the result of the stage currently in flight.
	pub fn record_stage_result(
		&self,
		order: &mut Order,
		result: StageResult,
	) -> Result<(), OrderStateError> {
		ensure_mutable(order)?;

		let expected = match result.stage {
			StageName::Stylize => OrderStatus::Stylizing,
			StageName::Fuse => OrderStatus::Fusing,
		};
		if order.status != expected {
			return Err(OrderStateError::StageOutOfOrder {
				stage: result.stage,
				status: order.status,
			});
		}
		if order.stage_results.contains_key(&result.stage) {
			return Err(OrderStateError::StageAlreadyRecorded(result.stage));
		}

		order.stage_results.insert(result.stage, result);
		Ok(())
	}

	/// Moves an order from `fusing` to `completed` with its quality report.
	pub fn complete(&self, order: &mut Order, quality: QualityReport) -> Result<(), OrderStateError> {
		let now = self.apply(order, OrderStatus::Completed)?;
		order.quality = Some(quality);
		order.timestamps.completed_at = Some(now);
		order.total_elapsed_ms = elapsed_since_start(order, now);
		Ok(())
	}

	/// Moves a non-terminal order to `failed`.
	pub fn fail(&self, order: &mut Order, failure: FailureDetails) -> Result<(), OrderStateError> {
		let now = self.apply(order, OrderStatus::Failed)?;
		order.failure = Some(failure);
		order.timestamps.failed_at = Some(now);
		order.total_elapsed_ms = elapsed_since_start(order, now);
		Ok(())
	}

	fn apply(&self, order: &mut Order, to: OrderStatus) -> Result<DateTime<Utc>, OrderStateError> {
		ensure_mutable(order)?;
		if !Self::is_valid_transition(order.status, to) {
			return Err(OrderStateError::InvalidTransition {
				from: order.status,
				to,
			});
		}

		let now = Utc::now();
		order.status_history.push(StatusTransition {
			from: order.status,
			to,
			at: now,
		});
		order.status = to;
		Ok(now)
	}
}

fn ensure_mutable(order: &Order) -> Result<(), OrderStateError> {
	if order.is_terminal() {
		return Err(OrderStateError::Terminal {
			order_id: order.id.clone(),
			status: order.status,
		});
	}
	Ok(())
}

fn elapsed_since_start(order: &Order, now: DateTime<Utc>) -> Option<u64> {
	order
		.timestamps
		.started_at
		.map(|started| (now - started).num_milliseconds().max(0) as u64)
}
