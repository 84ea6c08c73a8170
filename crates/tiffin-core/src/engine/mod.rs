//! Core marketplace engine.
//!
//! The engine owns the shared services (storage, geocoding, the event bus)
//! and the workflows built on them, and runs the event loop that reacts to
//! what those workflows publish.

pub mod event_bus;
pub mod lifecycle;

use crate::handlers::ApplicationHandler;
use crate::nearby::NearbyMatcher;
use crate::state::{ApplicationError, ApplicationWorkflow, OrderStateMachine};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tiffin_config::Config;
use tiffin_geocoding::GeocodingService;
use tiffin_storage::StorageService;
use tiffin_types::{
	truncate_id, ApplicationEvent, Chef, ChefApplication, Coordinates, MarketplaceEvent,
	NearbyChef, OrderEvent, StorageKey, TransitionOutcome,
};
use tokio::sync::{broadcast, Semaphore};

/// Errors that can occur during engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Service error: {0}")]
	Service(String),
	#[error("Handler error: {0}")]
	Handler(String),
}

/// Main marketplace engine.
#[derive(Clone)]
pub struct MarketplaceEngine {
	/// Marketplace configuration.
	pub(crate) config: Config,
	/// Storage service for persisting state.
	pub(crate) storage: Arc<StorageService>,
	/// Geocoder chain shared by the nearby search and chef provisioning.
	pub(crate) geocoding: Arc<GeocodingService>,
	/// Event bus for inter-service communication.
	pub(crate) event_bus: event_bus::EventBus,
	/// Order lifecycle.
	pub(crate) orders: Arc<OrderStateMachine>,
	/// Chef application review.
	pub(crate) applications: Arc<ApplicationWorkflow>,
	/// Nearby chef search.
	pub(crate) nearby: Arc<NearbyMatcher>,
	/// Application handler
	pub(crate) application_handler: Arc<ApplicationHandler>,
}

impl MarketplaceEngine {
	/// Creates a new engine with the given services.
	pub fn new(
		config: Config,
		storage: Arc<StorageService>,
		geocoding: Arc<GeocodingService>,
		event_bus: event_bus::EventBus,
	) -> Self {
		let orders = Arc::new(OrderStateMachine::new(storage.clone(), event_bus.clone()));
		let applications = Arc::new(ApplicationWorkflow::new(storage.clone(), event_bus.clone()));
		let nearby = Arc::new(NearbyMatcher::new(geocoding.clone(), config.nearby.clone()));
		let application_handler =
			Arc::new(ApplicationHandler::new(storage.clone(), geocoding.clone()));

		Self {
			config,
			storage,
			geocoding,
			event_bus,
			orders,
			applications,
			nearby,
			application_handler,
		}
	}

	/// Main event loop. Returns on Ctrl-C.
	pub async fn run(&self) -> Result<(), EngineError> {
		let mut event_receiver = self.event_bus.subscribe();
		let semaphore = Arc::new(Semaphore::new(self.config.lifecycle.handler_concurrency.max(1)));

		loop {
			tokio::select! {
				event = event_receiver.recv() => {
					match event {
						Ok(MarketplaceEvent::Application(ApplicationEvent::Approved {
							application,
						})) => {
							self.spawn_handler(&semaphore, move |engine| async move {
								let handler = &engine.application_handler;
								if let Err(e) = handler.handle_approved(application).await {
									return Err(EngineError::Handler(format!(
										"Failed to provision chef: {}",
										e
									)));
								}
								Ok(())
							})
							.await;
						},
						Ok(MarketplaceEvent::Application(ApplicationEvent::Submitted {
							application_id,
						})) => {
							tracing::info!(
								application_id = %truncate_id(&application_id),
								"Application awaiting review"
							);
						},
						Ok(MarketplaceEvent::Application(ApplicationEvent::Rejected {
							application_id,
							reason,
						})) => {
							tracing::info!(
								application_id = %truncate_id(&application_id),
								%reason,
								"Application rejected"
							);
						},
						Ok(MarketplaceEvent::Order(event)) => log_order_event(&event),
						Err(broadcast::error::RecvError::Lagged(skipped)) => {
							tracing::warn!(skipped, "Event loop lagged behind the bus");
						},
						Err(broadcast::error::RecvError::Closed) => break,
					}
				}

				_ = tokio::signal::ctrl_c() => {
					break;
				}
			}
		}

		Ok(())
	}

	/// Approves an application.
	///
	/// A repeated approval provisions the chef inline, which covers an
	/// earlier provisioning attempt that failed or whose event was dropped.
	pub async fn approve_application(
		&self,
		id: &str,
		reviewer: &str,
	) -> Result<(ChefApplication, TransitionOutcome), ApplicationError> {
		let (application, outcome) = self.applications.approve(id, reviewer).await?;

		if outcome == TransitionOutcome::NoOp {
			match self.application_handler.handle_approved(application.clone()).await {
				Ok(Some(_)) => {
					tracing::info!(application_id = %truncate_id(id), "Provisioned missing chef");
				},
				Ok(None) => {},
				Err(e) => {
					tracing::warn!(
						application_id = %truncate_id(id),
						error = %e,
						"Chef provisioning failed"
					);
				},
			}
		}
		Ok((application, outcome))
	}

	/// Lists chefs near the customer.
	///
	/// When no city is given, one is looked up from the coordinates. A
	/// failed lookup leaves it unknown. Returns the city used alongside the
	/// matches.
	pub async fn nearby_chefs(
		&self,
		customer: Coordinates,
		city: Option<String>,
	) -> Result<(Option<String>, Vec<NearbyChef>), EngineError> {
		if !customer.is_valid() {
			return Err(EngineError::Service(format!(
				"Invalid coordinates: {}, {}",
				customer.lat, customer.lon
			)));
		}

		let city = match city.filter(|c| !c.trim().is_empty()) {
			Some(city) => Some(city),
			None => match self.geocoding.reverse(customer).await {
				Ok(address) => address.city,
				Err(e) => {
					tracing::debug!(error = %e, "Customer city unknown");
					None
				},
			},
		};

		let chefs: Vec<Chef> = self
			.storage
			.list(StorageKey::Chefs.as_str())
			.await
			.map_err(|e| EngineError::Service(e.to_string()))?;

		let matches = self.nearby.find(customer, city.as_deref(), chefs).await;
		Ok((city, matches))
	}

	/// Returns a reference to the event bus.
	pub fn event_bus(&self) -> &event_bus::EventBus {
		&self.event_bus
	}

	/// Returns a reference to the configuration.
	pub fn config(&self) -> &Config {
		&self.config
	}

	/// Returns a reference to the storage service.
	pub fn storage(&self) -> &Arc<StorageService> {
		&self.storage
	}

	pub fn orders(&self) -> &Arc<OrderStateMachine> {
		&self.orders
	}

	pub fn applications(&self) -> &Arc<ApplicationWorkflow> {
		&self.applications
	}

	/// Spawns a handler task once a semaphore permit is available.
	async fn spawn_handler<F, Fut>(&self, semaphore: &Arc<Semaphore>, handler: F)
	where
		F: FnOnce(MarketplaceEngine) -> Fut + Send + 'static,
		Fut: Future<Output = Result<(), EngineError>> + Send,
	{
		let engine = self.clone();
		match semaphore.clone().acquire_owned().await {
			Ok(permit) => {
				tokio::spawn(async move {
					let _permit = permit;
					if let Err(e) = handler(engine).await {
						tracing::error!("Handler error: {}", e);
					}
				});
			},
			Err(e) => {
				tracing::error!("Failed to acquire semaphore permit: {}", e);
			},
		}
	}
}

fn log_order_event(event: &OrderEvent) {
	match event {
		OrderEvent::Created {
			order_id,
			customer_id,
		} => {
			tracing::info!(
				order_id = %truncate_id(order_id),
				customer_id = %customer_id,
				"Order placed"
			);
		},
		OrderEvent::Advanced {
			order_id,
			action,
			stage,
			..
		} => {
			tracing::info!(order_id = %truncate_id(order_id), %action, %stage, "Order advanced");
		},
		OrderEvent::Cancelled {
			order_id,
			actor,
			refund_due,
		} => {
			tracing::info!(
				order_id = %truncate_id(order_id),
				%actor,
				refund_due,
				"Order cancelled"
			);
		},
		OrderEvent::Refunded { order_id } => {
			tracing::info!(order_id = %truncate_id(order_id), "Order refunded");
		},
	}
}

#[cfg(test)]
pub(crate) mod tests {
	use super::*;
	use async_trait::async_trait;
	use std::sync::atomic::{AtomicBool, Ordering};
	use std::time::Duration;
	use tiffin_geocoding::{implementations::table::TableGeocoder, GeocoderInterface};
	use tiffin_storage::implementations::memory::MemoryStorage;
	use tiffin_storage::{StorageError, StorageInterface};
	use tiffin_types::{ApplicantProfile, ApplicationStatus, ConfigSchema, MatchMethod};

	pub(crate) fn test_config() -> Config {
		r#"
			[marketplace]
			id = "test"

			[storage]
			primary = "memory"
			[storage.implementations.memory]
		"#
		.parse()
		.unwrap()
	}

	pub(crate) fn test_engine() -> MarketplaceEngine {
		engine_with(Box::new(MemoryStorage::new()))
	}

	fn engine_with(backend: Box<dyn StorageInterface>) -> MarketplaceEngine {
		let storage = Arc::new(StorageService::new(backend));
		let table: Box<dyn GeocoderInterface> = Box::new(TableGeocoder::new(
			vec![
				("Rohini".to_string(), Coordinates::new(28.7, 77.1)),
				("New Delhi".to_string(), Coordinates::new(28.6139, 77.2090)),
			],
			25.0,
		));
		let geocoding = Arc::new(GeocodingService::new(
			vec![("table".into(), table)],
			Duration::from_secs(1),
		));
		MarketplaceEngine::new(test_config(), storage, geocoding, event_bus::EventBus::default())
	}

	/// Memory storage whose first chef write fails.
	pub(crate) struct FirstChefWriteFails {
		inner: MemoryStorage,
		failed: AtomicBool,
	}

	impl FirstChefWriteFails {
		pub(crate) fn new() -> Self {
			Self {
				inner: MemoryStorage::new(),
				failed: AtomicBool::new(false),
			}
		}
	}

	#[async_trait]
	impl StorageInterface for FirstChefWriteFails {
		async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
			self.inner.get_bytes(key).await
		}

		async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
			if key.starts_with("chefs:") && !self.failed.swap(true, Ordering::SeqCst) {
				return Err(StorageError::Backend("disk full".into()));
			}
			self.inner.set_bytes(key, value).await
		}

		async fn delete(&self, key: &str) -> Result<(), StorageError> {
			self.inner.delete(key).await
		}

		async fn exists(&self, key: &str) -> Result<bool, StorageError> {
			self.inner.exists(key).await
		}

		async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
			self.inner.list_keys(prefix).await
		}

		fn config_schema(&self) -> Box<dyn ConfigSchema> {
			self.inner.config_schema()
		}
	}

	pub(crate) fn engine_failing_first_chef_write() -> MarketplaceEngine {
		engine_with(Box::new(FirstChefWriteFails::new()))
	}

	pub(crate) fn profile(location: &str) -> ApplicantProfile {
		ApplicantProfile {
			name: "Asha".into(),
			email: "asha@example.com".into(),
			phone: None,
			location: location.into(),
			cuisines: vec![],
			years_experience: None,
			bio: None,
		}
	}

	#[tokio::test]
	async fn test_nearby_resolves_city_by_reverse_lookup() {
		let engine = test_engine();
		let application = engine.applications.submit(profile("Rohini")).await.unwrap();
		let (approved, _) = engine.applications.approve(&application.id, "admin-1").await.unwrap();
		assert_eq!(approved.status, ApplicationStatus::Approved);
		engine.application_handler.handle_approved(approved).await.unwrap();

		let (city, chefs) = engine
			.nearby_chefs(Coordinates::new(28.6139, 77.2090), None)
			.await
			.unwrap();

		assert_eq!(city.as_deref(), Some("New Delhi"));
		assert_eq!(chefs.len(), 1);
		assert_eq!(chefs[0].method, MatchMethod::Stored);
	}

	#[tokio::test]
	async fn test_repeated_approval_provisions_missing_chef() {
		let engine = engine_failing_first_chef_write();
		let application = engine.applications.submit(profile("Rohini")).await.unwrap();

		let (approved, outcome) = engine
			.approve_application(&application.id, "admin-1")
			.await
			.unwrap();
		assert_eq!(outcome, TransitionOutcome::Applied);
		// What the event loop would run for the Approved event
		assert!(engine
			.application_handler
			.handle_approved(approved)
			.await
			.is_err());
		let chefs: Vec<Chef> = engine.storage.list(StorageKey::Chefs.as_str()).await.unwrap();
		assert!(chefs.is_empty());

		let (_, outcome) = engine
			.approve_application(&application.id, "admin-1")
			.await
			.unwrap();
		assert_eq!(outcome, TransitionOutcome::NoOp);
		let chefs: Vec<Chef> = engine.storage.list(StorageKey::Chefs.as_str()).await.unwrap();
		assert_eq!(chefs.len(), 1);
		assert_eq!(chefs[0].application_id.as_deref(), Some(application.id.as_str()));

		// Once provisioned, further approvals leave the chef alone
		engine
			.approve_application(&application.id, "admin-1")
			.await
			.unwrap();
		let chefs: Vec<Chef> = engine.storage.list(StorageKey::Chefs.as_str()).await.unwrap();
		assert_eq!(chefs.len(), 1);
	}

	#[tokio::test]
	async fn test_nearby_rejects_invalid_coordinates() {
		let engine = test_engine();
		assert!(engine
			.nearby_chefs(Coordinates::new(95.0, 0.0), None)
			.await
			.is_err());
	}
}
