//! Storage-backed order state machine.
//!
//! Loads an order, applies a lifecycle rule from [`super::transition`],
//! persists the result and publishes an event, but only when the rule
//! reports that something changed. Duplicate calls therefore never write
//! and never publish twice.

use super::transition::{apply_refund, apply_transition, migrate_legacy_order, Transition};
use super::LifecycleError;
use crate::engine::event_bus::EventBus;
use crate::tracking::derive_stage;
use chrono::Utc;
use std::sync::Arc;
use tiffin_storage::{StorageError, StorageService};
use tiffin_types::{
	truncate_id, Actor, CheckoutRequest, DeliveryLedger, MarketplaceEvent, Order, OrderAction,
	OrderEvent, OrderStatus, PaymentCallbackRequest, PaymentStatus, StorageKey, TransitionOutcome,
	CURRENT_SCHEMA_VERSION,
};
use tracing::instrument;

/// Manages order state transitions and persistence
pub struct OrderStateMachine {
	storage: Arc<StorageService>,
	event_bus: EventBus,
}

fn storage_error(order_id: &str) -> impl FnOnce(StorageError) -> LifecycleError + '_ {
	move |e| match e {
		StorageError::NotFound => LifecycleError::NotFound(order_id.to_string()),
		other => LifecycleError::Storage(other.to_string()),
	}
}

fn validate_checkout(request: &CheckoutRequest) -> Result<(), LifecycleError> {
	let invalid = |msg: &str| Err(LifecycleError::InvalidRequest(msg.to_string()));

	if request.customer_id.trim().is_empty() {
		return invalid("customerId is required");
	}
	if request.items.is_empty() {
		return invalid("an order needs at least one item");
	}
	for item in &request.items {
		if item.quantity == 0 {
			return Err(LifecycleError::InvalidRequest(format!(
				"quantity of '{}' must be positive",
				item.name
			)));
		}
		if item.unit_price.is_sign_negative() {
			return Err(LifecycleError::InvalidRequest(format!(
				"price of '{}' cannot be negative",
				item.name
			)));
		}
	}
	let address = &request.delivery_address;
	if address.street.trim().is_empty() || address.city.trim().is_empty() {
		return invalid("delivery address needs a street and a city");
	}
	if address.phone.trim().is_empty() {
		return invalid("delivery address needs a phone number");
	}
	Ok(())
}

impl OrderStateMachine {
	pub fn new(storage: Arc<StorageService>, event_bus: EventBus) -> Self {
		Self { storage, event_bus }
	}

	fn publish(&self, event: OrderEvent) {
		// No subscriber just means the engine loop is not running
		self.event_bus.publish(MarketplaceEvent::Order(event)).ok();
	}

	/// Creates a pending, unpaid order.
	#[instrument(skip_all, fields(customer_id = %request.customer_id))]
	pub async fn checkout(&self, request: CheckoutRequest) -> Result<Order, LifecycleError> {
		validate_checkout(&request)?;

		let now = Utc::now();
		let order = Order {
			id: uuid::Uuid::new_v4().to_string(),
			customer_id: request.customer_id.trim().to_string(),
			chef_id: request.chef_id.filter(|c| !c.trim().is_empty()),
			items: request.items,
			payment_status: PaymentStatus::Unpaid,
			status: OrderStatus::Pending,
			delivery_status: DeliveryLedger::new(),
			delivery_address: request.delivery_address,
			payment_reference: None,
			cancelled_at: None,
			cancellation_reason: None,
			created_at: now,
			updated_at: now,
			schema_version: CURRENT_SCHEMA_VERSION,
		};

		self.storage
			.store(StorageKey::Orders.as_str(), &order.id, &order)
			.await
			.map_err(|e| LifecycleError::Storage(e.to_string()))?;

		tracing::info!(order_id = %truncate_id(&order.id), total = %order.total(), "Order placed");
		self.publish(OrderEvent::Created {
			order_id: order.id.clone(),
			customer_id: order.customer_id.clone(),
		});
		Ok(order)
	}

	/// Gets an order by ID, upgrading legacy records in place.
	pub async fn get_order(&self, order_id: &str) -> Result<Order, LifecycleError> {
		let mut order: Order = self
			.storage
			.retrieve(StorageKey::Orders.as_str(), order_id)
			.await
			.map_err(storage_error(order_id))?;

		if migrate_legacy_order(&mut order) {
			self.persist(&order).await?;
			tracing::info!(order_id = %truncate_id(order_id), "Migrated legacy order");
		}
		Ok(order)
	}

	/// Lists orders, newest first, optionally for a single customer.
	///
	/// Legacy records are upgraded in the returned view only; they are
	/// rewritten on their next individual read or write.
	pub async fn list_orders(
		&self,
		customer_id: Option<&str>,
	) -> Result<Vec<Order>, LifecycleError> {
		let mut orders: Vec<Order> = self
			.storage
			.list(StorageKey::Orders.as_str())
			.await
			.map_err(|e| LifecycleError::Storage(e.to_string()))?;

		if let Some(customer_id) = customer_id {
			orders.retain(|o| o.customer_id == customer_id);
		}
		for order in orders.iter_mut() {
			migrate_legacy_order(order);
		}
		orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
		Ok(orders)
	}

	async fn persist(&self, order: &Order) -> Result<(), LifecycleError> {
		self.storage
			.update(StorageKey::Orders.as_str(), &order.id, order)
			.await
			.map_err(storage_error(&order.id))
	}

	/// Applies a lifecycle action and persists the result.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id), action = %transition.action))]
	pub async fn apply(
		&self,
		order_id: &str,
		transition: Transition,
	) -> Result<(Order, TransitionOutcome), LifecycleError> {
		let order = self.get_order(order_id).await?;

		let (order, outcome) = match apply_transition(&order, &transition, Utc::now()) {
			Ok(result) => result,
			Err(e) => {
				tracing::warn!(actor = %transition.actor, error = %e, "Transition refused");
				return Err(e);
			},
		};

		if !outcome.is_applied() {
			tracing::debug!("Transition already satisfied");
			return Ok((order, outcome));
		}

		self.persist(&order).await?;

		match transition.action.target_milestone() {
			Some(milestone) => {
				let stage = derive_stage(&order);
				tracing::info!(milestone = %milestone, stage = %stage, "Order advanced");
				self.publish(OrderEvent::Advanced {
					order_id: order.id.clone(),
					action: transition.action,
					milestone,
					stage,
				});
			},
			None => {
				tracing::info!(actor = %transition.actor, "Order cancelled");
				self.publish(OrderEvent::Cancelled {
					order_id: order.id.clone(),
					actor: transition.actor,
					refund_due: order.is_paid(),
				});
			},
		}

		Ok((order, outcome))
	}

	/// Records a refund reported by the payment collaborator.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id)))]
	pub async fn refund(
		&self,
		order_id: &str,
	) -> Result<(Order, TransitionOutcome), LifecycleError> {
		let order = self.get_order(order_id).await?;
		let (order, outcome) = apply_refund(&order, Utc::now())?;

		if outcome.is_applied() {
			self.persist(&order).await?;
			tracing::info!("Order refunded");
			self.publish(OrderEvent::Refunded {
				order_id: order.id.clone(),
			});
		}
		Ok((order, outcome))
	}

	/// Entry point for payment collaborator callbacks.
	pub async fn payment_callback(
		&self,
		order_id: &str,
		callback: PaymentCallbackRequest,
	) -> Result<(Order, TransitionOutcome), LifecycleError> {
		match callback.status {
			PaymentStatus::Paid => {
				self.apply(
					order_id,
					Transition::payment_confirmed(callback.reference, callback.chef_id),
				)
				.await
			},
			PaymentStatus::Refunded => self.refund(order_id).await,
			PaymentStatus::Unpaid => Err(LifecycleError::InvalidRequest(
				"payment callbacks must report paid or refunded".into(),
			)),
		}
	}

	/// Cancels an order on behalf of a customer or admin.
	pub async fn cancel(
		&self,
		order_id: &str,
		actor: Actor,
		reason: Option<String>,
	) -> Result<(Order, TransitionOutcome), LifecycleError> {
		self.apply(
			order_id,
			Transition::new(OrderAction::Cancel, actor).with_reason(reason),
		)
		.await
	}

	/// Upgrades every legacy record in storage. Returns how many changed.
	pub async fn migrate_all(&self) -> Result<usize, LifecycleError> {
		let orders: Vec<Order> = self
			.storage
			.list(StorageKey::Orders.as_str())
			.await
			.map_err(|e| LifecycleError::Storage(e.to_string()))?;

		let mut migrated = 0;
		for mut order in orders {
			if migrate_legacy_order(&mut order) {
				self.persist(&order).await?;
				migrated += 1;
			}
		}
		Ok(migrated)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::state::transition::tests::sample_order;
	use rust_decimal::Decimal;
	use tiffin_storage::implementations::memory::MemoryStorage;
	use tiffin_types::{LineItem, Milestone, Stage, LEGACY_SCHEMA_VERSION};

	fn machine() -> (OrderStateMachine, Arc<StorageService>, EventBus) {
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		let bus = EventBus::default();
		(OrderStateMachine::new(storage.clone(), bus.clone()), storage, bus)
	}

	fn checkout_request() -> CheckoutRequest {
		let order = sample_order();
		CheckoutRequest {
			customer_id: order.customer_id,
			chef_id: order.chef_id,
			items: order.items,
			delivery_address: order.delivery_address,
		}
	}

	#[tokio::test]
	async fn test_checkout_creates_pending_unpaid_order() {
		let (machine, _, bus) = machine();
		let mut events = bus.subscribe();

		let order = machine.checkout(checkout_request()).await.unwrap();

		assert_eq!(order.status, OrderStatus::Pending);
		assert_eq!(order.payment_status, PaymentStatus::Unpaid);
		assert!(order.delivery_status.is_empty());
		assert_eq!(order.total(), Decimal::new(29900, 2));
		assert!(matches!(
			events.recv().await.unwrap(),
			MarketplaceEvent::Order(OrderEvent::Created { .. })
		));
		assert_eq!(machine.get_order(&order.id).await.unwrap(), order);
	}

	#[tokio::test]
	async fn test_checkout_validation() {
		let (machine, _, _) = machine();

		let mut empty = checkout_request();
		empty.items.clear();
		assert!(matches!(
			machine.checkout(empty).await,
			Err(LifecycleError::InvalidRequest(_))
		));

		let mut zero = checkout_request();
		zero.items = vec![LineItem {
			quantity: 0,
			..zero.items[0].clone()
		}];
		assert!(matches!(
			machine.checkout(zero).await,
			Err(LifecycleError::InvalidRequest(_))
		));
	}

	#[tokio::test]
	async fn test_payment_callback_then_duplicate() {
		let (machine, _, bus) = machine();
		let order = machine.checkout(checkout_request()).await.unwrap();
		let mut events = bus.subscribe();

		let callback = PaymentCallbackRequest {
			status: PaymentStatus::Paid,
			reference: Some("pay_42".into()),
			chef_id: None,
		};
		let (paid, outcome) = machine
			.payment_callback(&order.id, callback.clone())
			.await
			.unwrap();
		assert_eq!(outcome, TransitionOutcome::Applied);
		assert_eq!(derive_stage(&paid), Stage::Confirmed);

		match events.recv().await.unwrap() {
			MarketplaceEvent::Order(OrderEvent::Advanced {
				milestone, stage, ..
			}) => {
				assert_eq!(milestone, Milestone::Confirmed);
				assert_eq!(stage, Stage::Confirmed);
			},
			other => panic!("unexpected event: {:?}", other),
		}

		let (_, again) = machine.payment_callback(&order.id, callback).await.unwrap();
		assert_eq!(again, TransitionOutcome::NoOp);
		// The duplicate published nothing
		assert!(events.try_recv().is_err());
	}

	#[tokio::test]
	async fn test_cancel_paid_order_flags_refund() {
		let (machine, _, bus) = machine();
		let order = machine.checkout(checkout_request()).await.unwrap();
		machine
			.apply(&order.id, Transition::payment_confirmed(None, None))
			.await
			.unwrap();
		let mut events = bus.subscribe();

		let (cancelled, _) = machine
			.cancel(&order.id, Actor::Customer { id: "cust-1".into() }, None)
			.await
			.unwrap();
		assert!(cancelled.is_cancelled());
		assert!(matches!(
			events.recv().await.unwrap(),
			MarketplaceEvent::Order(OrderEvent::Cancelled {
				refund_due: true,
				..
			})
		));

		let refund = PaymentCallbackRequest {
			status: PaymentStatus::Refunded,
			reference: None,
			chef_id: None,
		};
		let (refunded, outcome) = machine.payment_callback(&order.id, refund).await.unwrap();
		assert_eq!(outcome, TransitionOutcome::Applied);
		assert_eq!(refunded.payment_status, PaymentStatus::Refunded);
	}

	#[tokio::test]
	async fn test_unknown_order() {
		let (machine, _, _) = machine();
		assert!(matches!(
			machine.get_order("missing").await,
			Err(LifecycleError::NotFound(_))
		));
	}

	#[tokio::test]
	async fn test_legacy_records_are_migrated() {
		let (machine, storage, _) = machine();
		let mut legacy = sample_order();
		legacy.schema_version = LEGACY_SCHEMA_VERSION;
		legacy.payment_status = PaymentStatus::Paid;
		legacy.status = OrderStatus::Preparing;
		storage
			.store(StorageKey::Orders.as_str(), &legacy.id, &legacy)
			.await
			.unwrap();

		let listed = machine.list_orders(Some("cust-1")).await.unwrap();
		assert_eq!(listed[0].delivery_status.latest(), Some(Milestone::Preparing));

		assert_eq!(machine.migrate_all().await.unwrap(), 1);
		assert_eq!(machine.migrate_all().await.unwrap(), 0);

		let stored: Order = storage
			.retrieve(StorageKey::Orders.as_str(), &legacy.id)
			.await
			.unwrap();
		assert_eq!(stored.schema_version, CURRENT_SCHEMA_VERSION);
	}

	#[tokio::test]
	async fn test_list_filters_by_customer() {
		let (machine, _, _) = machine();
		machine.checkout(checkout_request()).await.unwrap();
		let mut other = checkout_request();
		other.customer_id = "cust-2".into();
		machine.checkout(other).await.unwrap();

		assert_eq!(machine.list_orders(None).await.unwrap().len(), 2);
		let mine = machine.list_orders(Some("cust-2")).await.unwrap();
		assert_eq!(mine.len(), 1);
		assert_eq!(mine[0].customer_id, "cust-2");
	}
}
