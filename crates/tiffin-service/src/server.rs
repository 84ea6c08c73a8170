//! HTTP server for the marketplace API.

use crate::apis::{applications, chefs, orders};
use axum::{
	extract::{DefaultBodyLimit, Path, Query, State},
	http::{HeaderValue, StatusCode},
	response::Json,
	routing::{get, post},
	Router,
};
use std::sync::Arc;
use std::time::Duration;
use tiffin_config::ApiConfig;
use tiffin_core::MarketplaceEngine;
use tiffin_types::{
	APIError, ApplicantProfile, ApplicationListQuery, ApproveRequest, ChefApplication,
	CheckoutRequest, DecisionResponse, NearbyQuery, NearbyResponse, OrderListQuery,
	OrderResponse, PaymentCallbackRequest, RejectRequest, TransitionRequest, TransitionResponse,
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;

/// Shared application state for the API server.
#[derive(Clone)]
pub struct AppState {
	/// Reference to the engine for processing requests.
	pub engine: Arc<MarketplaceEngine>,
}

fn cors_layer(api_config: &ApiConfig) -> CorsLayer {
	match &api_config.cors {
		Some(cors) => {
			let origins: Vec<HeaderValue> = cors
				.allowed_origins
				.iter()
				.filter_map(|origin| match origin.parse() {
					Ok(value) => Some(value),
					Err(_) => {
						tracing::warn!(%origin, "Ignoring invalid CORS origin");
						None
					},
				})
				.collect();
			CorsLayer::new()
				.allow_origin(AllowOrigin::list(origins))
				.allow_methods(Any)
				.allow_headers(Any)
		},
		None => CorsLayer::permissive(),
	}
}

/// Builds the router with every route nested under `/api`.
pub fn router(api_config: &ApiConfig, engine: Arc<MarketplaceEngine>) -> Router {
	Router::new()
		.nest(
			"/api",
			Router::new()
				.route("/orders", get(handle_list_orders).post(handle_checkout))
				.route("/orders/{id}", get(handle_get_order))
				.route("/orders/{id}/payment", post(handle_payment))
				.route("/orders/{id}/transitions", post(handle_transition))
				.route(
					"/applications",
					get(handle_list_applications).post(handle_submit_application),
				)
				.route("/applications/{id}/approve", post(handle_approve))
				.route("/applications/{id}/reject", post(handle_reject))
				.route("/chefs/nearby", get(handle_nearby)),
		)
		.layer(
			ServiceBuilder::new()
				.layer(cors_layer(api_config))
				.layer(TimeoutLayer::new(Duration::from_secs(api_config.timeout_seconds)))
				.layer(DefaultBodyLimit::max(api_config.max_request_size)),
		)
		.with_state(AppState { engine })
}

/// Starts the HTTP server for the API.
pub async fn start_server(
	api_config: ApiConfig,
	engine: Arc<MarketplaceEngine>,
) -> Result<(), Box<dyn std::error::Error>> {
	let app = router(&api_config, engine);

	let bind_address = format!("{}:{}", api_config.host, api_config.port);
	let listener = TcpListener::bind(&bind_address).await?;

	tracing::info!("Marketplace API server starting on {}", bind_address);

	axum::serve(listener, app).await?;

	Ok(())
}

/// Handles GET /api/orders requests.
async fn handle_list_orders(
	State(state): State<AppState>,
	Query(query): Query<OrderListQuery>,
) -> Result<Json<Vec<OrderResponse>>, APIError> {
	orders::list_orders(&state.engine, query.customer_id.as_deref())
		.await
		.map(Json)
}

/// Handles GET /api/orders/{id} requests.
async fn handle_get_order(
	Path(id): Path<String>,
	State(state): State<AppState>,
) -> Result<Json<OrderResponse>, APIError> {
	orders::get_order(&state.engine, &id).await.map(Json)
}

/// Handles POST /api/orders requests.
async fn handle_checkout(
	State(state): State<AppState>,
	Json(request): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), APIError> {
	let order = orders::checkout(&state.engine, request).await?;
	Ok((StatusCode::CREATED, Json(order)))
}

/// Handles POST /api/orders/{id}/payment requests from the payment collaborator.
async fn handle_payment(
	Path(id): Path<String>,
	State(state): State<AppState>,
	Json(request): Json<PaymentCallbackRequest>,
) -> Result<Json<TransitionResponse>, APIError> {
	match orders::payment_callback(&state.engine, &id, request).await {
		Ok(response) => Ok(Json(response)),
		Err(e) => {
			tracing::warn!("Payment callback failed: {}", e);
			Err(e)
		},
	}
}

/// Handles POST /api/orders/{id}/transitions requests.
async fn handle_transition(
	Path(id): Path<String>,
	State(state): State<AppState>,
	Json(request): Json<TransitionRequest>,
) -> Result<Json<TransitionResponse>, APIError> {
	orders::transition(&state.engine, &id, request).await.map(Json)
}

/// Handles POST /api/applications requests.
async fn handle_submit_application(
	State(state): State<AppState>,
	Json(applicant): Json<ApplicantProfile>,
) -> Result<(StatusCode, Json<ChefApplication>), APIError> {
	let application = applications::submit(&state.engine, applicant).await?;
	Ok((StatusCode::CREATED, Json(application)))
}

/// Handles GET /api/applications requests.
async fn handle_list_applications(
	State(state): State<AppState>,
	Query(query): Query<ApplicationListQuery>,
) -> Result<Json<Vec<ChefApplication>>, APIError> {
	applications::list(&state.engine, query.status).await.map(Json)
}

/// Handles POST /api/applications/{id}/approve requests.
async fn handle_approve(
	Path(id): Path<String>,
	State(state): State<AppState>,
	Json(request): Json<ApproveRequest>,
) -> Result<Json<DecisionResponse>, APIError> {
	applications::approve(&state.engine, &id, &request.reviewer)
		.await
		.map(Json)
}

/// Handles POST /api/applications/{id}/reject requests.
async fn handle_reject(
	Path(id): Path<String>,
	State(state): State<AppState>,
	Json(request): Json<RejectRequest>,
) -> Result<Json<DecisionResponse>, APIError> {
	applications::reject(&state.engine, &id, &request.reviewer, &request.reason)
		.await
		.map(Json)
}

/// Handles GET /api/chefs/nearby requests.
async fn handle_nearby(
	State(state): State<AppState>,
	Query(query): Query<NearbyQuery>,
) -> Result<Json<NearbyResponse>, APIError> {
	chefs::nearby(&state.engine, query).await.map(Json)
}
