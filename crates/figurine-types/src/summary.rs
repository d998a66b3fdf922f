//! Aggregate statistics over a set of orders.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::utils::round_to;
use crate::{Order, OrderStatus};

/// Batch statistics served by the summary endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OrderSummary {
	pub total_orders: usize,
	pub status_distribution: BTreeMap<String, usize>,
	pub priority_distribution: BTreeMap<String, usize>,
	pub style_distribution: BTreeMap<String, usize>,
	pub completed_orders: usize,
	/// Percentage of orders completed, rounded to one decimal.
	pub completion_rate: f64,
	/// Mean seconds from first stage call to completion, over completed orders.
	pub average_processing_seconds: f64,
	/// Orders that carry at least one placeholder stage result.
	pub degraded_orders: usize,
}

impl OrderSummary {
	pub fn from_orders<'a, I>(orders: I) -> Self
	where
		I: IntoIterator<Item = &'a Order>,
	{
		let mut summary = OrderSummary::default();
		let mut processing_ms: Vec<u64> = Vec::new();

		for order in orders {
			summary.total_orders += 1;
			*summary
				.status_distribution
				.entry(order.status.to_string())
				.or_default() += 1;
			*summary
				.priority_distribution
				.entry(order.priority.to_string())
				.or_default() += 1;
			*summary
				.style_distribution
				.entry(order.preferences.style.clone())
				.or_default() += 1;

			if order.is_degraded() {
				summary.degraded_orders += 1;
			}

			if order.status == OrderStatus::Completed {
				summary.completed_orders += 1;
				if let Some(ms) = order.total_elapsed_ms {
					processing_ms.push(ms);
				}
			}
		}

		if summary.total_orders > 0 {
			summary.completion_rate = round_to(
				summary.completed_orders as f64 / summary.total_orders as f64 * 100.0,
				1,
			);
		}

		if !processing_ms.is_empty() {
			let total: u64 = processing_ms.iter().sum();
			summary.average_processing_seconds =
				total as f64 / processing_ms.len() as f64 / 1000.0;
		}

		summary
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{FaceInput, Preferences, Priority};

	fn order(status: OrderStatus, priority: Priority, style: &str, elapsed: Option<u64>) -> Order {
		let mut order = Order::new(
			FaceInput::new("face.jpg", vec![1u8]),
			Preferences {
				style: style.to_string(),
				..Preferences::default()
			},
			priority,
		);
		order.status = status;
		order.total_elapsed_ms = elapsed;
		order
	}

	#[test]
	fn test_empty_summary() {
		let summary = OrderSummary::from_orders(&Vec::<Order>::new());
		assert_eq!(summary.total_orders, 0);
		assert_eq!(summary.completion_rate, 0.0);
		assert_eq!(summary.average_processing_seconds, 0.0);
	}

	#[test]
	fn test_distributions_and_rates() {
		let orders = vec![
			order(OrderStatus::Completed, Priority::High, "cartoon", Some(2000)),
			order(OrderStatus::Completed, Priority::Normal, "anime", Some(4000)),
			order(OrderStatus::Failed, Priority::Normal, "cartoon", Some(500)),
		];

		let summary = OrderSummary::from_orders(&orders);
		assert_eq!(summary.total_orders, 3);
		assert_eq!(summary.completed_orders, 2);
		assert_eq!(summary.completion_rate, 66.7);
		assert_eq!(summary.average_processing_seconds, 3.0);
		assert_eq!(summary.status_distribution.get("failed"), Some(&1));
		assert_eq!(summary.priority_distribution.get("normal"), Some(&2));
		assert_eq!(summary.style_distribution.get("cartoon"), Some(&2));
		assert_eq!(summary.degraded_orders, 0);
	}
}
