//! Chef application endpoints.

use tiffin_core::{ApplicationError, MarketplaceEngine};
use tiffin_types::{
	APIError, ApplicantProfile, ApplicationStatus, ChefApplication, DecisionResponse,
};

/// Maps workflow failures onto HTTP errors.
pub fn application_error(e: ApplicationError) -> APIError {
	match e {
		ApplicationError::NotFound(id) => APIError::not_found(
			"APPLICATION_NOT_FOUND",
			format!("Application not found: {}", id),
		),
		ApplicationError::AlreadyDecided { status, .. } => APIError::Conflict {
			error_type: "ALREADY_DECIDED".to_string(),
			message: e.to_string(),
			details: Some(serde_json::json!({ "status": status })),
		},
		ApplicationError::MissingReason => APIError::UnprocessableEntity {
			error_type: "MISSING_REASON".to_string(),
			message: e.to_string(),
			details: None,
		},
		ApplicationError::InvalidRequest(message) => {
			APIError::bad_request("INVALID_APPLICATION", message)
		},
		ApplicationError::Storage(message) => APIError::internal(message),
	}
}

pub async fn submit(
	engine: &MarketplaceEngine,
	applicant: ApplicantProfile,
) -> Result<ChefApplication, APIError> {
	engine
		.applications()
		.submit(applicant)
		.await
		.map_err(application_error)
}

pub async fn list(
	engine: &MarketplaceEngine,
	status: Option<ApplicationStatus>,
) -> Result<Vec<ChefApplication>, APIError> {
	engine
		.applications()
		.list(status)
		.await
		.map_err(application_error)
}

pub async fn approve(
	engine: &MarketplaceEngine,
	id: &str,
	reviewer: &str,
) -> Result<DecisionResponse, APIError> {
	let (application, outcome) = engine
		.approve_application(id, reviewer)
		.await
		.map_err(application_error)?;
	Ok(DecisionResponse {
		outcome,
		application,
	})
}

pub async fn reject(
	engine: &MarketplaceEngine,
	id: &str,
	reviewer: &str,
	reason: &str,
) -> Result<DecisionResponse, APIError> {
	let (application, outcome) = engine
		.applications()
		.reject(id, reviewer, reason)
		.await
		.map_err(application_error)?;
	Ok(DecisionResponse {
		outcome,
		application,
	})
}
