//! HTTP server for the figurine API.
//!
//! Accepts face images, runs them through the pipeline and serves the
//! resulting order records, aggregate statistics and metrics.

use crate::apis::order::{self, OrderStore};
use axum::{
	extract::{DefaultBodyLimit, Path, State},
	http::StatusCode,
	response::Json,
	routing::{get, post},
	Router,
};
use figurine_config::ApiConfig;
use figurine_core::{MetricsSummary, PipelineEngine};
use figurine_types::{
	body_templates, current_timestamp, APIError, BodyTemplate, HealthResponse, Order,
	OrderSummary, StageName, SubmitOrderRequest,
};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Shared application state for the API server.
#[derive(Clone)]
pub struct AppState {
	/// Pipeline engine processing submitted orders.
	pub engine: Arc<PipelineEngine>,
	/// Terminal orders by id.
	pub orders: Arc<OrderStore>,
}

impl AppState {
	pub fn new(engine: Arc<PipelineEngine>) -> Self {
		Self {
			engine,
			orders: Arc::new(OrderStore::new()),
		}
	}
}

/// Builds the router with all API routes.
pub fn router(state: AppState, max_request_size: usize) -> Router {
	Router::new()
		.nest(
			"/api",
			Router::new()
				.route("/orders", post(handle_submit_order))
				.route("/orders/summary", get(handle_order_summary))
				.route("/orders/{id}", get(handle_get_order_by_id))
				.route("/templates", get(handle_templates))
				.route("/metrics", get(handle_metrics)),
		)
		.route("/health", get(handle_health))
		.layer(
			ServiceBuilder::new()
				.layer(TraceLayer::new_for_http())
				.layer(CorsLayer::permissive())
				.layer(DefaultBodyLimit::max(max_request_size)),
		)
		.with_state(state)
}

/// Starts the HTTP server and runs until `shutdown` resolves.
pub async fn start_server(
	api_config: ApiConfig,
	engine: Arc<PipelineEngine>,
	shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), Box<dyn std::error::Error>> {
	let app = router(AppState::new(engine), api_config.max_request_size);

	let bind_address = format!("{}:{}", api_config.host, api_config.port);
	let listener = TcpListener::bind(&bind_address).await?;

	tracing::info!("Figurine API server starting on {}", bind_address);

	axum::serve(listener, app)
		.with_graceful_shutdown(shutdown)
		.await?;

	Ok(())
}

/// Handles POST /api/orders requests.
///
/// Runs the order to completion and returns the terminal record. Stage
/// rejections are reported through the order's `failed` status, not as an
/// HTTP error.
async fn handle_submit_order(
	State(state): State<AppState>,
	Json(request): Json<SubmitOrderRequest>,
) -> Result<(StatusCode, Json<Order>), APIError> {
	match order::submit_order(request, &state.engine, &state.orders).await {
		Ok(order) => Ok((StatusCode::CREATED, Json(order))),
		Err(e) => {
			tracing::warn!("Order submission failed: {}", e);
			Err(e)
		},
	}
}

/// Handles GET /api/orders/{id} requests.
async fn handle_get_order_by_id(
	Path(id): Path<String>,
	State(state): State<AppState>,
) -> Result<Json<Order>, APIError> {
	order::get_order_by_id(&id, &state.orders).map(Json)
}

/// Handles GET /api/orders/summary requests.
async fn handle_order_summary(State(state): State<AppState>) -> Json<OrderSummary> {
	Json(order::order_summary(&state.orders))
}

async fn handle_templates() -> Json<&'static [BodyTemplate]> {
	Json(body_templates())
}

async fn handle_metrics(State(state): State<AppState>) -> Json<MetricsSummary> {
	Json(state.engine.metrics().summary())
}

/// Handles GET /health requests.
async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
	let config = state.engine.config();

	let mut implementations = BTreeMap::new();
	for stage in StageName::ALL {
		if let Some(stage_config) = config.stage(stage) {
			implementations.insert(stage.to_string(), stage_config.primary.clone());
		}
	}
	implementations.insert(
		"evaluation".to_string(),
		state.engine.evaluation_primary().to_string(),
	);

	Json(HealthResponse {
		status: "healthy".to_string(),
		pipeline_id: config.pipeline.id.clone(),
		implementations,
		timestamp: current_timestamp(),
	})
}
