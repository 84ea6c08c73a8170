//! Lifecycle management for the marketplace engine.

use super::{EngineError, MarketplaceEngine};
use tiffin_types::{truncate_id, ApplicationStatus};

impl MarketplaceEngine {
	/// Performs any initialization required before running.
	///
	/// Rewrites legacy order records in storage when
	/// `lifecycle.migrate_legacy_on_start` is set, then provisions chefs for
	/// approved applications that have none.
	pub async fn initialize(&self) -> Result<(), EngineError> {
		tracing::info!(
			marketplace = %self.config.marketplace.id,
			"Initializing marketplace engine"
		);

		if self.config.lifecycle.migrate_legacy_on_start {
			let migrated = self
				.orders
				.migrate_all()
				.await
				.map_err(|e| {
					EngineError::Service(format!("Legacy order migration failed: {}", e))
				})?;
			if migrated > 0 {
				tracing::info!(migrated, "Migrated legacy orders");
			}
		}

		let provisioned = self.reconcile_chefs().await?;
		if provisioned > 0 {
			tracing::info!(provisioned, "Provisioned chefs for approved applications");
		}

		Ok(())
	}

	/// Provisions the chef of every approved application that lacks one.
	///
	/// Returns how many chefs were created. A failure for one application is
	/// logged and does not stop the others.
	pub async fn reconcile_chefs(&self) -> Result<usize, EngineError> {
		let approved = self
			.applications
			.list(Some(ApplicationStatus::Approved))
			.await
			.map_err(|e| EngineError::Service(e.to_string()))?;

		let mut provisioned = 0;
		for application in approved {
			let id = application.id.clone();
			match self.application_handler.handle_approved(application).await {
				Ok(Some(_)) => provisioned += 1,
				Ok(None) => {},
				Err(e) => {
					tracing::warn!(
						application_id = %truncate_id(&id),
						error = %e,
						"Could not provision chef"
					);
				},
			}
		}
		Ok(provisioned)
	}

	/// Performs cleanup operations.
	pub async fn shutdown(&self) -> Result<(), EngineError> {
		tracing::info!("Shutting down marketplace engine");
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use crate::engine::tests::{engine_failing_first_chef_write, profile, test_engine};
	use crate::state::transition::tests::sample_order;
	use tiffin_types::{
		Chef, Milestone, OrderStatus, PaymentStatus, StorageKey, LEGACY_SCHEMA_VERSION,
	};

	#[tokio::test]
	async fn test_initialize_migrates_legacy_orders() {
		let engine = test_engine();

		let mut legacy = sample_order();
		legacy.schema_version = LEGACY_SCHEMA_VERSION;
		legacy.payment_status = PaymentStatus::Paid;
		legacy.status = OrderStatus::Ready;
		engine
			.storage
			.store(StorageKey::Orders.as_str(), &legacy.id, &legacy)
			.await
			.unwrap();

		engine.initialize().await.unwrap();

		let stored: tiffin_types::Order = engine
			.storage
			.retrieve(StorageKey::Orders.as_str(), &legacy.id)
			.await
			.unwrap();
		assert!(!stored.is_legacy());
		assert!(stored.delivery_status.is_set(Milestone::Ready));
		assert!(!stored.delivery_status.is_set(Milestone::OutForDelivery));
	}

	#[tokio::test]
	async fn test_initialize_provisions_chefs_left_behind() {
		let engine = engine_failing_first_chef_write();
		let first = engine.applications.submit(profile("Rohini")).await.unwrap();
		let second = engine.applications.submit(profile("Saket, New Delhi")).await.unwrap();
		let pending = engine.applications.submit(profile("Noida")).await.unwrap();

		let (approved, _) = engine.applications.approve(&first.id, "admin-1").await.unwrap();
		assert!(engine
			.application_handler
			.handle_approved(approved)
			.await
			.is_err());
		engine.applications.approve(&second.id, "admin-1").await.unwrap();

		engine.initialize().await.unwrap();

		let chefs: Vec<Chef> = engine.storage.list(StorageKey::Chefs.as_str()).await.unwrap();
		let mut ids: Vec<_> = chefs.iter().map(|c| c.id.clone()).collect();
		ids.sort();
		let mut expected = vec![first.id.clone(), second.id.clone()];
		expected.sort();
		assert_eq!(ids, expected);
		assert!(!ids.contains(&pending.id));

		assert_eq!(engine.reconcile_chefs().await.unwrap(), 0);
	}
}
