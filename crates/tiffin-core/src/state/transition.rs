//! Order lifecycle rules.
//!
//! Orders move `pending -> confirmed -> preparing -> ready ->
//! out_for_delivery -> delivered`, or to `cancelled` before dispatch. Each
//! forward step stamps one ledger milestone exactly once; asking for a step
//! that has already happened is a no-op rather than an error.
//!
//! Everything here is a pure function of the current record. Persistence
//! and event publication live in [`super::OrderStateMachine`].

use crate::tracking::derive::implied_milestone;
use crate::tracking::derive_stage;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use thiserror::Error;
use tiffin_types::{
	Actor, LedgerError, Milestone, Order, OrderAction, OrderStatus, PaymentStatus, Stage,
	TransitionOutcome, CURRENT_SCHEMA_VERSION,
};

/// Errors that can occur during order lifecycle operations.
#[derive(Debug, Error)]
pub enum LifecycleError {
	#[error("Order not found: {0}")]
	NotFound(String),
	#[error("{actor} is not allowed to {action} this order")]
	Unauthorized { action: String, actor: String },
	#[error("Cannot {action} order at stage {stage}: {reason}")]
	InvalidTransition {
		action: String,
		stage: Stage,
		reason: String,
	},
	#[error("Invalid request: {0}")]
	InvalidRequest(String),
	#[error("Storage error: {0}")]
	Storage(String),
}

/// A requested lifecycle change.
#[derive(Debug, Clone)]
pub struct Transition {
	pub action: OrderAction,
	pub actor: Actor,
	/// Chef to assign on payment confirmation.
	pub chef_id: Option<String>,
	/// Gateway reference recorded on payment confirmation.
	pub reference: Option<String>,
	/// Reason recorded on cancellation.
	pub reason: Option<String>,
}

impl Transition {
	pub fn new(action: OrderAction, actor: Actor) -> Self {
		Self {
			action,
			actor,
			chef_id: None,
			reference: None,
			reason: None,
		}
	}

	/// Payment-success callback.
	pub fn payment_confirmed(reference: Option<String>, chef_id: Option<String>) -> Self {
		Self {
			chef_id,
			reference,
			..Self::new(OrderAction::ConfirmPayment, Actor::PaymentGateway)
		}
	}

	pub fn with_reason(mut self, reason: Option<String>) -> Self {
		self.reason = reason;
		self
	}
}

/// Roles allowed to trigger each action.
static AUTHORITY: Lazy<HashMap<OrderAction, &'static [&'static str]>> = Lazy::new(|| {
	HashMap::from([
		(OrderAction::ConfirmPayment, &["payment_gateway"][..]),
		(OrderAction::StartPreparing, &["chef"][..]),
		(OrderAction::MarkReady, &["chef"][..]),
		(OrderAction::Dispatch, &["chef", "delivery_agent"][..]),
		(OrderAction::Deliver, &["chef", "delivery_agent"][..]),
		(OrderAction::Cancel, &["customer", "admin"][..]),
	])
});

fn authorize(order: &Order, transition: &Transition) -> Result<(), LifecycleError> {
	let unauthorized = || LifecycleError::Unauthorized {
		action: transition.action.to_string(),
		actor: transition.actor.to_string(),
	};

	let role_allowed = AUTHORITY
		.get(&transition.action)
		.is_some_and(|roles| roles.contains(&transition.actor.role()));
	if !role_allowed {
		return Err(unauthorized());
	}

	// Chefs act only on their own orders, customers cancel only their own
	match &transition.actor {
		Actor::Chef { id } if order.chef_id.as_deref() != Some(id.as_str()) => Err(unauthorized()),
		Actor::Customer { id } if order.customer_id != *id => Err(unauthorized()),
		_ => Ok(()),
	}
}

/// Upgrades a record that predates the delivery ledger.
///
/// When the ledger is empty, every milestone up to the one implied by the
/// status enum is stamped with the record's `updated_at`, and a paid order
/// still marked pending is moved to confirmed. The schema version is raised
/// either way. Returns whether anything changed.
pub fn migrate_legacy_order(order: &mut Order) -> bool {
	if !order.is_legacy() {
		return false;
	}
	if order.delivery_status.is_empty() {
		if let Some(milestone) = implied_milestone(order) {
			order
				.delivery_status
				.backfill_through(milestone, order.updated_at);
			if order.status == OrderStatus::Pending {
				order.status = OrderStatus::from(milestone);
			}
		}
	}
	order.schema_version = CURRENT_SCHEMA_VERSION;
	true
}

/// Applies a lifecycle action to an order.
///
/// Returns the updated record and whether anything changed. On
/// [`TransitionOutcome::NoOp`] the returned record equals the input apart
/// from a legacy-schema upgrade, and callers need not persist it.
pub fn apply_transition(
	order: &Order,
	transition: &Transition,
	now: DateTime<Utc>,
) -> Result<(Order, TransitionOutcome), LifecycleError> {
	authorize(order, transition)?;

	let mut next = order.clone();
	migrate_legacy_order(&mut next);

	let outcome = match transition.action.target_milestone() {
		Some(milestone) => advance(&mut next, transition, milestone, now)?,
		None => cancel(&mut next, transition, now)?,
	};

	if outcome.is_applied() {
		next.updated_at = now;
	}
	Ok((next, outcome))
}

fn invalid(order: &Order, action: impl ToString, reason: impl Into<String>) -> LifecycleError {
	LifecycleError::InvalidTransition {
		action: action.to_string(),
		stage: derive_stage(order),
		reason: reason.into(),
	}
}

fn advance(
	order: &mut Order,
	transition: &Transition,
	milestone: Milestone,
	now: DateTime<Utc>,
) -> Result<TransitionOutcome, LifecycleError> {
	let action = transition.action;

	if order.is_cancelled() {
		return Err(invalid(order, action, "order is cancelled"));
	}

	if action == OrderAction::ConfirmPayment {
		return confirm_payment(order, transition, now);
	}

	if !order.is_paid() {
		return Err(invalid(order, action, "payment has not been confirmed"));
	}
	if order.delivery_status.is_set(milestone) {
		return Ok(TransitionOutcome::NoOp);
	}

	match order.delivery_status.record(milestone, now) {
		Ok(_) => {
			order.status = OrderStatus::from(milestone);
			Ok(TransitionOutcome::Applied)
		},
		Err(LedgerError::OutOfOrder { missing, .. }) => Err(invalid(
			order,
			action,
			format!("{} has not been reached", missing),
		)),
	}
}

fn confirm_payment(
	order: &mut Order,
	transition: &Transition,
	now: DateTime<Utc>,
) -> Result<TransitionOutcome, LifecycleError> {
	let action = transition.action;

	match (&order.chef_id, &transition.chef_id) {
		(Some(assigned), Some(requested)) if assigned != requested => {
			return Err(invalid(
				order,
				action,
				format!("order is already assigned to chef {}", assigned),
			));
		},
		(None, None) => return Err(invalid(order, action, "no chef assigned")),
		_ => {},
	}

	match order.payment_status {
		PaymentStatus::Refunded => return Err(invalid(order, action, "payment was refunded")),
		PaymentStatus::Paid if order.delivery_status.is_set(Milestone::Confirmed) => {
			return Ok(TransitionOutcome::NoOp);
		},
		_ => {},
	}

	// Payment and confirmation land in the same write
	order.payment_status = PaymentStatus::Paid;
	if order.chef_id.is_none() {
		order.chef_id = transition.chef_id.clone();
	}
	if transition.reference.is_some() {
		order.payment_reference = transition.reference.clone();
	}
	if let Err(e) = order.delivery_status.record(Milestone::Confirmed, now) {
		return Err(invalid(order, action, e.to_string()));
	}
	if order.status == OrderStatus::Pending {
		order.status = OrderStatus::Confirmed;
	}
	Ok(TransitionOutcome::Applied)
}

fn cancel(
	order: &mut Order,
	transition: &Transition,
	now: DateTime<Utc>,
) -> Result<TransitionOutcome, LifecycleError> {
	if order.is_cancelled() {
		return Ok(TransitionOutcome::NoOp);
	}
	if derive_stage(order) >= Stage::OutForDelivery {
		return Err(invalid(
			order,
			transition.action,
			"order has already left the kitchen",
		));
	}

	order.status = OrderStatus::Cancelled;
	order.cancelled_at = Some(now);
	order.cancellation_reason = transition
		.reason
		.as_ref()
		.map(|r| r.trim().to_string())
		.filter(|r| !r.is_empty());
	Ok(TransitionOutcome::Applied)
}

/// Records a refund reported by the payment collaborator.
///
/// Only cancelled, paid orders can be refunded; a repeated refund is a no-op.
pub fn apply_refund(
	order: &Order,
	now: DateTime<Utc>,
) -> Result<(Order, TransitionOutcome), LifecycleError> {
	let mut next = order.clone();
	migrate_legacy_order(&mut next);

	match next.payment_status {
		PaymentStatus::Refunded => return Ok((next, TransitionOutcome::NoOp)),
		PaymentStatus::Unpaid => return Err(invalid(&next, "refund", "order was never paid")),
		PaymentStatus::Paid if !next.is_cancelled() => {
			return Err(invalid(&next, "refund", "only cancelled orders can be refunded"));
		},
		PaymentStatus::Paid => {},
	}

	next.payment_status = PaymentStatus::Refunded;
	next.updated_at = now;
	Ok((next, TransitionOutcome::Applied))
}
