//! Application handler for provisioning chefs.
//!
//! Reacts to approved applications by creating the chef record that the
//! nearby search reads. Chefs are keyed by application id, so a replayed
//! approval event finds the existing record and does nothing.

use std::sync::Arc;
use thiserror::Error;
use tiffin_geocoding::GeocodingService;
use tiffin_storage::StorageService;
use tiffin_types::{truncate_id, ApplicationStatus, Chef, ChefApplication, StorageKey};
use tracing::instrument;

/// Errors that can occur while provisioning a chef.
#[derive(Debug, Error)]
pub enum HandlerError {
	#[error("Storage error: {0}")]
	Storage(String),
	#[error("Application {0} is not approved")]
	NotApproved(String),
}

/// Handler for approved chef applications.
pub struct ApplicationHandler {
	storage: Arc<StorageService>,
	geocoding: Arc<GeocodingService>,
}

impl ApplicationHandler {
	pub fn new(storage: Arc<StorageService>, geocoding: Arc<GeocodingService>) -> Self {
		Self { storage, geocoding }
	}

	/// Creates the chef for an approved application.
	///
	/// Returns `None` when the chef already exists. Coordinates are resolved
	/// on a best-effort basis; a chef without them is still listed through
	/// geocoding or the city fallback at search time.
	#[instrument(skip_all, fields(application_id = %truncate_id(&application.id)))]
	pub async fn handle_approved(
		&self,
		application: ChefApplication,
	) -> Result<Option<Chef>, HandlerError> {
		if application.status != ApplicationStatus::Approved {
			return Err(HandlerError::NotApproved(application.id));
		}

		let chefs = StorageKey::Chefs.as_str();
		if self
			.storage
			.exists(chefs, &application.id)
			.await
			.map_err(|e| HandlerError::Storage(e.to_string()))?
		{
			tracing::debug!("Chef already provisioned");
			return Ok(None);
		}

		let coordinates = match self.geocoding.forward(&application.applicant.location).await {
			Ok(coordinates) => Some(coordinates),
			Err(e) => {
				tracing::warn!(error = %e, "Could not geocode chef location");
				None
			},
		};

		let applicant = application.applicant;
		let chef = Chef {
			id: application.id.clone(),
			name: applicant.name,
			location: applicant.location,
			coordinates,
			cuisines: applicant.cuisines,
			application_id: Some(application.id),
		};

		self.storage
			.store(chefs, &chef.id, &chef)
			.await
			.map_err(|e| HandlerError::Storage(e.to_string()))?;

		tracing::info!(
			chef_id = %truncate_id(&chef.id),
			geocoded = chef.coordinates.is_some(),
			"Chef provisioned"
		);
		Ok(Some(chef))
	}
}
