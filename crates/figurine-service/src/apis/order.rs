//! Order submission and retrieval.
//!
//! Orders are processed to a terminal status before the submitting request
//! returns, then kept in an in-process registry keyed by id.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use dashmap::DashMap;
use figurine_core::{EngineError, PipelineEngine};
use figurine_types::{truncate_id, APIError, FaceInput, Order, OrderSummary, SubmitOrderRequest};

/// In-process store of terminal orders.
pub type OrderStore = DashMap<String, Order>;

/// Decodes the submitted image, runs the order and stores the result.
pub async fn submit_order(
	request: SubmitOrderRequest,
	engine: &PipelineEngine,
	store: &OrderStore,
) -> Result<Order, APIError> {
	if request.filename.trim().is_empty() {
		return Err(APIError::bad_request("MISSING_FILENAME", "filename must not be empty"));
	}

	let image = STANDARD.decode(request.image.trim()).map_err(|e| {
		APIError::bad_request("INVALID_IMAGE", format!("image is not valid base64: {}", e))
	})?;
	if image.is_empty() {
		return Err(APIError::bad_request("EMPTY_IMAGE", "image must not be empty"));
	}

	let order = Order::new(
		FaceInput::new(request.filename, image),
		request.preferences,
		request.priority,
	);
	let order_id = order.id.clone();
	tracing::info!(
		order_id = %truncate_id(&order_id),
		priority = %order.priority,
		style = %order.preferences.style,
		"Order submitted"
	);

	let handle = engine.submit(order).await.map_err(|e| APIError::ServiceUnavailable {
		error_type: "PIPELINE_UNAVAILABLE".to_string(),
		message: e.to_string(),
	})?;
	let order = handle
		.await
		.map_err(|e| APIError::internal(format!("Order task failed: {}", e)))?
		.map_err(|e: EngineError| APIError::internal(e.to_string()))?;

	store.insert(order_id, order.clone());
	Ok(order)
}

/// Looks up a stored order.
pub fn get_order_by_id(id: &str, store: &OrderStore) -> Result<Order, APIError> {
	store
		.get(id)
		.map(|entry| entry.value().clone())
		.ok_or_else(|| APIError::not_found(format!("Order {} not found", id)))
}

/// Aggregate statistics over every stored order.
pub fn order_summary(store: &OrderStore) -> OrderSummary {
	let orders: Vec<Order> = store.iter().map(|entry| entry.value().clone()).collect();
	OrderSummary::from_orders(&orders)
}
