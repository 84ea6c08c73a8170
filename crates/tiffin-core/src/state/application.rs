//! Chef application approval workflow.
//!
//! An application is submitted as pending and decided exactly once by an
//! admin. Repeating the decision that was already made is a no-op; asking
//! for the opposite decision fails with [`ApplicationError::AlreadyDecided`].

use crate::engine::event_bus::EventBus;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use tiffin_storage::{StorageError, StorageService};
use tiffin_types::{
	truncate_id, ApplicantProfile, ApplicationEvent, ApplicationStatus, ChefApplication,
	MarketplaceEvent, StorageKey, TransitionOutcome,
};
use tracing::instrument;

/// Errors that can occur in the application workflow.
#[derive(Debug, Error)]
pub enum ApplicationError {
	#[error("Application not found: {0}")]
	NotFound(String),
	#[error("Application {id} was already {status}")]
	AlreadyDecided {
		id: String,
		status: ApplicationStatus,
	},
	#[error("A rejection reason is required")]
	MissingReason,
	#[error("Invalid application: {0}")]
	InvalidRequest(String),
	#[error("Storage error: {0}")]
	Storage(String),
}

fn require_reviewer(reviewer: &str) -> Result<(), ApplicationError> {
	if reviewer.trim().is_empty() {
		return Err(ApplicationError::InvalidRequest(
			"reviewer is required".into(),
		));
	}
	Ok(())
}

/// Approves a pending application.
pub fn approve_application(
	application: &ChefApplication,
	reviewer: &str,
	now: DateTime<Utc>,
) -> Result<(ChefApplication, TransitionOutcome), ApplicationError> {
	match application.status {
		ApplicationStatus::Approved => Ok((application.clone(), TransitionOutcome::NoOp)),
		ApplicationStatus::Rejected => Err(ApplicationError::AlreadyDecided {
			id: application.id.clone(),
			status: application.status,
		}),
		ApplicationStatus::Pending => {
			let mut next = application.clone();
			next.status = ApplicationStatus::Approved;
			next.reviewed_by = Some(reviewer.trim().to_string());
			next.decided_at = Some(now);
			next.admin_notes = None;
			Ok((next, TransitionOutcome::Applied))
		},
	}
}

/// Rejects a pending application with a mandatory reason.
///
/// A blank reason is refused before the current status is looked at.
pub fn reject_application(
	application: &ChefApplication,
	reviewer: &str,
	reason: &str,
	now: DateTime<Utc>,
) -> Result<(ChefApplication, TransitionOutcome), ApplicationError> {
	let reason = reason.trim();
	if reason.is_empty() {
		return Err(ApplicationError::MissingReason);
	}

	match application.status {
		// The original notes stay in place
		ApplicationStatus::Rejected => Ok((application.clone(), TransitionOutcome::NoOp)),
		ApplicationStatus::Approved => Err(ApplicationError::AlreadyDecided {
			id: application.id.clone(),
			status: application.status,
		}),
		ApplicationStatus::Pending => {
			let mut next = application.clone();
			next.status = ApplicationStatus::Rejected;
			next.admin_notes = Some(reason.to_string());
			next.reviewed_by = Some(reviewer.trim().to_string());
			next.decided_at = Some(now);
			Ok((next, TransitionOutcome::Applied))
		},
	}
}

/// Storage-backed application workflow.
pub struct ApplicationWorkflow {
	storage: Arc<StorageService>,
	event_bus: EventBus,
}

impl ApplicationWorkflow {
	pub fn new(storage: Arc<StorageService>, event_bus: EventBus) -> Self {
		Self { storage, event_bus }
	}

	fn publish(&self, event: ApplicationEvent) {
		self.event_bus
			.publish(MarketplaceEvent::Application(event))
			.ok();
	}

	/// Records a new pending application.
	pub async fn submit(
		&self,
		applicant: ApplicantProfile,
	) -> Result<ChefApplication, ApplicationError> {
		for (field, value) in [
			("name", &applicant.name),
			("email", &applicant.email),
			("location", &applicant.location),
		] {
			if value.trim().is_empty() {
				return Err(ApplicationError::InvalidRequest(format!(
					"{} is required",
					field
				)));
			}
		}
		if !applicant.email.contains('@') {
			return Err(ApplicationError::InvalidRequest(
				"email is not valid".into(),
			));
		}

		let application = ChefApplication {
			id: uuid::Uuid::new_v4().to_string(),
			applicant,
			status: ApplicationStatus::Pending,
			admin_notes: None,
			reviewed_by: None,
			submitted_at: Utc::now(),
			decided_at: None,
		};

		self.storage
			.store(StorageKey::Applications.as_str(), &application.id, &application)
			.await
			.map_err(|e| ApplicationError::Storage(e.to_string()))?;

		tracing::info!(application_id = %truncate_id(&application.id), "Application submitted");
		self.publish(ApplicationEvent::Submitted {
			application_id: application.id.clone(),
		});
		Ok(application)
	}

	pub async fn get(&self, id: &str) -> Result<ChefApplication, ApplicationError> {
		self.storage
			.retrieve(StorageKey::Applications.as_str(), id)
			.await
			.map_err(|e| match e {
				StorageError::NotFound => ApplicationError::NotFound(id.to_string()),
				other => ApplicationError::Storage(other.to_string()),
			})
	}

	/// Lists applications, oldest first, optionally filtered by status.
	pub async fn list(
		&self,
		status: Option<ApplicationStatus>,
	) -> Result<Vec<ChefApplication>, ApplicationError> {
		let mut applications: Vec<ChefApplication> = self
			.storage
			.list(StorageKey::Applications.as_str())
			.await
			.map_err(|e| ApplicationError::Storage(e.to_string()))?;

		if let Some(status) = status {
			applications.retain(|a| a.status == status);
		}
		applications.sort_by(|a, b| a.submitted_at.cmp(&b.submitted_at));
		Ok(applications)
	}

	async fn persist(&self, application: &ChefApplication) -> Result<(), ApplicationError> {
		self.storage
			.update(StorageKey::Applications.as_str(), &application.id, application)
			.await
			.map_err(|e| ApplicationError::Storage(e.to_string()))
	}

	#[instrument(skip_all, fields(application_id = %truncate_id(id)))]
	pub async fn approve(
		&self,
		id: &str,
		reviewer: &str,
	) -> Result<(ChefApplication, TransitionOutcome), ApplicationError> {
		require_reviewer(reviewer)?;
		let current = self.get(id).await?;
		let (application, outcome) = approve_application(&current, reviewer, Utc::now())?;

		if outcome.is_applied() {
			self.persist(&application).await?;
			tracing::info!(reviewer = %reviewer, "Application approved");
			self.publish(ApplicationEvent::Approved {
				application: application.clone(),
			});
		}
		Ok((application, outcome))
	}

	#[instrument(skip_all, fields(application_id = %truncate_id(id)))]
	pub async fn reject(
		&self,
		id: &str,
		reviewer: &str,
		reason: &str,
	) -> Result<(ChefApplication, TransitionOutcome), ApplicationError> {
		if reason.trim().is_empty() {
			return Err(ApplicationError::MissingReason);
		}
		require_reviewer(reviewer)?;
		let current = self.get(id).await?;
		let (application, outcome) = reject_application(&current, reviewer, reason, Utc::now())?;

		if outcome.is_applied() {
			self.persist(&application).await?;
			tracing::info!(reviewer = %reviewer, "Application rejected");
			self.publish(ApplicationEvent::Rejected {
				application_id: application.id.clone(),
				reason: reason.trim().to_string(),
			});
		}
		Ok((application, outcome))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tiffin_storage::implementations::memory::MemoryStorage;

	fn profile() -> ApplicantProfile {
		ApplicantProfile {
			name: "Meera Iyer".into(),
			email: "meera@example.com".into(),
			phone: None,
			location: "Indiranagar, Bengaluru".into(),
			cuisines: vec!["south indian".into()],
			years_experience: Some(6),
			bio: None,
		}
	}

	fn workflow() -> (ApplicationWorkflow, EventBus) {
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		let bus = EventBus::default();
		(ApplicationWorkflow::new(storage, bus.clone()), bus)
	}

	#[tokio::test]
	async fn test_submit_validates_profile() {
		let (workflow, _) = workflow();
		let mut missing = profile();
		missing.location = "  ".into();
		assert!(matches!(
			workflow.submit(missing).await,
			Err(ApplicationError::InvalidRequest(_))
		));

		let application = workflow.submit(profile()).await.unwrap();
		assert_eq!(application.status, ApplicationStatus::Pending);
		assert!(!application.is_decided());
	}

	#[tokio::test]
	async fn test_reject_workflow() {
		let (workflow, _) = workflow();
		let application = workflow.submit(profile()).await.unwrap();

		assert!(matches!(
			workflow.reject(&application.id, "admin-1", "   ").await,
			Err(ApplicationError::MissingReason)
		));

		let (rejected, outcome) = workflow
			.reject(&application.id, "admin-1", "Incomplete kitchen certification")
			.await
			.unwrap();
		assert_eq!(outcome, TransitionOutcome::Applied);
		assert_eq!(rejected.status, ApplicationStatus::Rejected);
		assert_eq!(
			rejected.admin_notes.as_deref(),
			Some("Incomplete kitchen certification")
		);

		let (again, outcome) = workflow
			.reject(&application.id, "admin-2", "Different reason")
			.await
			.unwrap();
		assert_eq!(outcome, TransitionOutcome::NoOp);
		assert_eq!(
			again.admin_notes.as_deref(),
			Some("Incomplete kitchen certification")
		);

		assert!(matches!(
			workflow.approve(&application.id, "admin-1").await,
			Err(ApplicationError::AlreadyDecided { .. })
		));
	}

	#[tokio::test]
	async fn test_approve_publishes_once() {
		let (workflow, bus) = workflow();
		let application = workflow.submit(profile()).await.unwrap();
		let mut events = bus.subscribe();

		let (approved, outcome) = workflow.approve(&application.id, "admin-1").await.unwrap();
		assert_eq!(outcome, TransitionOutcome::Applied);
		assert_eq!(approved.reviewed_by.as_deref(), Some("admin-1"));
		assert!(approved.decided_at.is_some());

		let (_, again) = workflow.approve(&application.id, "admin-1").await.unwrap();
		assert_eq!(again, TransitionOutcome::NoOp);

		assert!(matches!(
			events.recv().await.unwrap(),
			MarketplaceEvent::Application(ApplicationEvent::Approved { .. })
		));
		assert!(events.try_recv().is_err());

		assert!(matches!(
			workflow.reject(&application.id, "admin-1", "Too late").await,
			Err(ApplicationError::AlreadyDecided { .. })
		));
	}

	#[tokio::test]
	async fn test_blank_reason_checked_before_lookup() {
		let (workflow, _) = workflow();
		assert!(matches!(
			workflow.reject("no-such-id", "admin-1", "").await,
			Err(ApplicationError::MissingReason)
		));
		assert!(matches!(
			workflow.reject("no-such-id", "admin-1", "spam").await,
			Err(ApplicationError::NotFound(_))
		));
	}

	#[tokio::test]
	async fn test_list_by_status() {
		let (workflow, _) = workflow();
		let first = workflow.submit(profile()).await.unwrap();
		workflow.submit(profile()).await.unwrap();
		workflow.approve(&first.id, "admin-1").await.unwrap();

		assert_eq!(workflow.list(None).await.unwrap().len(), 2);
		let pending = workflow
			.list(Some(ApplicationStatus::Pending))
			.await
			.unwrap();
		assert_eq!(pending.len(), 1);
		assert_ne!(pending[0].id, first.id);
	}
}
