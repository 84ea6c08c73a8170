//! Actions, actors, and outcomes for order and application workflows.

use crate::Milestone;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An action that moves an order through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderAction {
	ConfirmPayment,
	StartPreparing,
	MarkReady,
	Dispatch,
	Deliver,
	Cancel,
}

impl OrderAction {
	pub fn as_str(&self) -> &'static str {
		match self {
			OrderAction::ConfirmPayment => "confirm_payment",
			OrderAction::StartPreparing => "start_preparing",
			OrderAction::MarkReady => "mark_ready",
			OrderAction::Dispatch => "dispatch",
			OrderAction::Deliver => "deliver",
			OrderAction::Cancel => "cancel",
		}
	}

	/// The ledger milestone a forward action stamps.
	pub fn target_milestone(&self) -> Option<Milestone> {
		match self {
			OrderAction::ConfirmPayment => Some(Milestone::Confirmed),
			OrderAction::StartPreparing => Some(Milestone::Preparing),
			OrderAction::MarkReady => Some(Milestone::Ready),
			OrderAction::Dispatch => Some(Milestone::OutForDelivery),
			OrderAction::Deliver => Some(Milestone::Delivered),
			OrderAction::Cancel => None,
		}
	}
}

impl fmt::Display for OrderAction {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Who is asking for a change.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Actor {
	/// Payment-success and refund callbacks.
	PaymentGateway,
	Chef { id: String },
	DeliveryAgent { id: String },
	Customer { id: String },
	Admin { id: String },
}

impl Actor {
	pub fn role(&self) -> &'static str {
		match self {
			Actor::PaymentGateway => "payment_gateway",
			Actor::Chef { .. } => "chef",
			Actor::DeliveryAgent { .. } => "delivery_agent",
			Actor::Customer { .. } => "customer",
			Actor::Admin { .. } => "admin",
		}
	}
}

impl fmt::Display for Actor {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Actor::PaymentGateway => f.write_str("payment_gateway"),
			Actor::Chef { id }
			| Actor::DeliveryAgent { id }
			| Actor::Customer { id }
			| Actor::Admin { id } => write!(f, "{}:{}", self.role(), id),
		}
	}
}

/// Result of a successful workflow call.
///
/// `NoOp` means the requested state was already in place and nothing was
/// written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionOutcome {
	Applied,
	NoOp,
}

impl TransitionOutcome {
	pub fn is_applied(&self) -> bool {
		matches!(self, TransitionOutcome::Applied)
	}
}
