//! API types for the marketplace HTTP API.
//!
//! Request and response bodies for the order, application and chef
//! discovery endpoints, plus the structured error type every handler
//! returns.

use crate::{
	Actor, ApplicationStatus, ChefApplication, DeliveryAddress, LineItem, Milestone, NearbyChef,
	Order, OrderAction, PaymentStatus, Stage, TransitionOutcome,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Body of `POST /api/orders`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
	pub customer_id: String,
	#[serde(default)]
	pub chef_id: Option<String>,
	pub items: Vec<LineItem>,
	pub delivery_address: DeliveryAddress,
}

/// Body of `POST /api/orders/{id}/payment`, sent by the payment collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentCallbackRequest {
	pub status: PaymentStatus,
	#[serde(default)]
	pub reference: Option<String>,
	/// Chef to assign if the order does not have one yet.
	#[serde(default)]
	pub chef_id: Option<String>,
}

/// Body of `POST /api/orders/{id}/transitions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRequest {
	pub action: OrderAction,
	pub actor: Actor,
	/// Free-text reason, recorded on cancellation.
	#[serde(default)]
	pub reason: Option<String>,
}

/// Derived tracking information attached to every order response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingSummary {
	pub stage: Stage,
	pub progress: u8,
	/// Exact most advanced milestone, distinguishing preparing from ready.
	pub milestone: Option<Milestone>,
	pub trackable: bool,
}

/// An order as returned by the API.
///
/// The order record is flattened so clients that only know the raw record
/// shape can still deserialize it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResponse {
	#[serde(flatten)]
	pub order: Order,
	pub tracking: TrackingSummary,
}

/// Response to a lifecycle call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionResponse {
	pub outcome: TransitionOutcome,
	pub order: OrderResponse,
}

/// Query parameters of `GET /api/orders`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderListQuery {
	#[serde(default)]
	pub customer_id: Option<String>,
}

/// Query parameters of `GET /api/applications`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplicationListQuery {
	#[serde(default)]
	pub status: Option<ApplicationStatus>,
}

/// Body of `POST /api/applications/{id}/approve`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApproveRequest {
	pub reviewer: String,
}

/// Body of `POST /api/applications/{id}/reject`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectRequest {
	pub reviewer: String,
	#[serde(default)]
	pub reason: String,
}

/// Response to an approve or reject call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionResponse {
	pub outcome: TransitionOutcome,
	pub application: ChefApplication,
}

/// Query parameters of `GET /api/chefs/nearby`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NearbyQuery {
	pub lat: f64,
	pub lon: f64,
	#[serde(default)]
	pub city: Option<String>,
}

/// Response of `GET /api/chefs/nearby`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyResponse {
	pub customer_city: Option<String>,
	pub chefs: Vec<NearbyChef>,
}

/// Error body returned by every endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
	/// Error type/code
	pub error: String,
	/// Human-readable description
	pub message: String,
	/// Additional error context
	pub details: Option<serde_json::Value>,
	/// Suggested retry delay in seconds
	#[serde(rename = "retryAfter")]
	pub retry_after: Option<u64>,
}

/// Structured API error type with appropriate HTTP status mapping.
#[derive(Debug)]
pub enum APIError {
	/// Malformed or invalid input (400)
	BadRequest {
		error_type: String,
		message: String,
		details: Option<serde_json::Value>,
	},
	/// Caller may not perform the action (403)
	Forbidden { error_type: String, message: String },
	/// Unknown record (404)
	NotFound { error_type: String, message: String },
	/// Request conflicts with the record's current state (409)
	Conflict {
		error_type: String,
		message: String,
		details: Option<serde_json::Value>,
	},
	/// Well-formed request the business rules refuse (422)
	UnprocessableEntity {
		error_type: String,
		message: String,
		details: Option<serde_json::Value>,
	},
	/// Service unavailable with optional retry information (503)
	ServiceUnavailable {
		error_type: String,
		message: String,
		retry_after: Option<u64>,
	},
	/// Internal server error (500)
	InternalServerError { error_type: String, message: String },
}

impl APIError {
	pub fn bad_request(error_type: &str, message: impl Into<String>) -> Self {
		APIError::BadRequest {
			error_type: error_type.to_string(),
			message: message.into(),
			details: None,
		}
	}

	pub fn not_found(error_type: &str, message: impl Into<String>) -> Self {
		APIError::NotFound {
			error_type: error_type.to_string(),
			message: message.into(),
		}
	}

	pub fn internal(message: impl Into<String>) -> Self {
		APIError::InternalServerError {
			error_type: "INTERNAL_ERROR".to_string(),
			message: message.into(),
		}
	}

	/// Get the HTTP status code for this error.
	pub fn status_code(&self) -> u16 {
		match self {
			APIError::BadRequest { .. } => 400,
			APIError::Forbidden { .. } => 403,
			APIError::NotFound { .. } => 404,
			APIError::Conflict { .. } => 409,
			APIError::UnprocessableEntity { .. } => 422,
			APIError::ServiceUnavailable { .. } => 503,
			APIError::InternalServerError { .. } => 500,
		}
	}

	/// Convert to ErrorResponse for JSON serialization.
	pub fn to_error_response(&self) -> ErrorResponse {
		let (error, message, details, retry_after) = match self {
			APIError::BadRequest {
				error_type,
				message,
				details,
			}
			| APIError::Conflict {
				error_type,
				message,
				details,
			}
			| APIError::UnprocessableEntity {
				error_type,
				message,
				details,
			} => (error_type, message, details.clone(), None),
			APIError::Forbidden {
				error_type,
				message,
			}
			| APIError::NotFound {
				error_type,
				message,
			}
			| APIError::InternalServerError {
				error_type,
				message,
			} => (error_type, message, None, None),
			APIError::ServiceUnavailable {
				error_type,
				message,
				retry_after,
			} => (error_type, message, None, *retry_after),
		};
		ErrorResponse {
			error: error.clone(),
			message: message.clone(),
			details,
			retry_after,
		}
	}
}

impl fmt::Display for APIError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let response = self.to_error_response();
		write!(f, "{} ({}): {}", response.error, self.status_code(), response.message)
	}
}

impl std::error::Error for APIError {}

impl axum::response::IntoResponse for APIError {
	fn into_response(self) -> axum::response::Response {
		use axum::{http::StatusCode, response::Json};

		let status = StatusCode::from_u16(self.status_code())
			.unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
		(status, Json(self.to_error_response())).into_response()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_status_codes() {
		assert_eq!(APIError::bad_request("X", "bad").status_code(), 400);
		assert_eq!(APIError::not_found("X", "gone").status_code(), 404);
		assert_eq!(APIError::internal("boom").status_code(), 500);
	}

	#[test]
	fn test_error_response_carries_retry_after() {
		let err = APIError::ServiceUnavailable {
			error_type: "GEOCODER_DOWN".into(),
			message: "try later".into(),
			retry_after: Some(30),
		};
		let body = serde_json::to_value(err.to_error_response()).unwrap();
		assert_eq!(body["retryAfter"], 30);
		assert_eq!(body["error"], "GEOCODER_DOWN");
	}

	#[test]
	fn test_transition_request_wire_format() {
		let json = r#"{"action":"mark_ready","actor":{"role":"chef","id":"chef-1"}}"#;
		let req: TransitionRequest = serde_json::from_str(json).unwrap();
		assert_eq!(req.action, OrderAction::MarkReady);
		assert_eq!(req.actor, Actor::Chef { id: "chef-1".into() });
		assert!(req.reason.is_none());
	}
}
