//! Order endpoints.
//!
//! Every response carries the raw order next to its derived tracking
//! summary, so clients never recompute stages from the status enum.

use tiffin_core::{order_response, LifecycleError, MarketplaceEngine, Transition};
use tiffin_types::{
	APIError, CheckoutRequest, OrderResponse, PaymentCallbackRequest, TransitionRequest,
	TransitionResponse,
};

/// Maps lifecycle failures onto HTTP errors.
pub fn lifecycle_error(e: LifecycleError) -> APIError {
	match e {
		LifecycleError::NotFound(id) => {
			APIError::not_found("ORDER_NOT_FOUND", format!("Order not found: {}", id))
		},
		LifecycleError::Unauthorized { .. } => APIError::Forbidden {
			error_type: "FORBIDDEN".to_string(),
			message: e.to_string(),
		},
		LifecycleError::InvalidTransition { stage, .. } => APIError::Conflict {
			error_type: "INVALID_TRANSITION".to_string(),
			message: e.to_string(),
			details: Some(serde_json::json!({ "stage": stage })),
		},
		LifecycleError::InvalidRequest(message) => APIError::UnprocessableEntity {
			error_type: "INVALID_REQUEST".to_string(),
			message,
			details: None,
		},
		LifecycleError::Storage(message) => APIError::internal(message),
	}
}

pub async fn list_orders(
	engine: &MarketplaceEngine,
	customer_id: Option<&str>,
) -> Result<Vec<OrderResponse>, APIError> {
	let orders = engine
		.orders()
		.list_orders(customer_id)
		.await
		.map_err(lifecycle_error)?;
	Ok(orders.into_iter().map(order_response).collect())
}

pub async fn get_order(engine: &MarketplaceEngine, id: &str) -> Result<OrderResponse, APIError> {
	let order = engine.orders().get_order(id).await.map_err(lifecycle_error)?;
	Ok(order_response(order))
}

pub async fn checkout(
	engine: &MarketplaceEngine,
	request: CheckoutRequest,
) -> Result<OrderResponse, APIError> {
	let order = engine.orders().checkout(request).await.map_err(lifecycle_error)?;
	Ok(order_response(order))
}

pub async fn payment_callback(
	engine: &MarketplaceEngine,
	id: &str,
	request: PaymentCallbackRequest,
) -> Result<TransitionResponse, APIError> {
	let (order, outcome) = engine
		.orders()
		.payment_callback(id, request)
		.await
		.map_err(lifecycle_error)?;
	Ok(TransitionResponse {
		outcome,
		order: order_response(order),
	})
}

pub async fn transition(
	engine: &MarketplaceEngine,
	id: &str,
	request: TransitionRequest,
) -> Result<TransitionResponse, APIError> {
	let transition = Transition::new(request.action, request.actor).with_reason(request.reason);
	let (order, outcome) = engine
		.orders()
		.apply(id, transition)
		.await
		.map_err(lifecycle_error)?;
	Ok(TransitionResponse {
		outcome,
		order: order_response(order),
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use tiffin_types::Stage;

	#[test]
	fn test_lifecycle_error_statuses() {
		assert_eq!(lifecycle_error(LifecycleError::NotFound("x".into())).status_code(), 404);
		assert_eq!(
			lifecycle_error(LifecycleError::Unauthorized {
				action: "dispatch".into(),
				actor: "customer:c".into(),
			})
			.status_code(),
			403
		);
		assert_eq!(
			lifecycle_error(LifecycleError::InvalidTransition {
				action: "cancel".into(),
				stage: Stage::OutForDelivery,
				reason: "order has already left the kitchen".into(),
			})
			.status_code(),
			409
		);
		assert_eq!(
			lifecycle_error(LifecycleError::InvalidRequest("bad".into())).status_code(),
			422
		);
		assert_eq!(lifecycle_error(LifecycleError::Storage("io".into())).status_code(), 500);
	}
}
