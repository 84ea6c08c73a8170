//! Event types for inter-service communication.
//!
//! Workflows publish an event only when a call actually changed state, so
//! consumers see each transition once even when callers retry.

use crate::{Actor, ChefApplication, Milestone, OrderAction, Stage};
use serde::{Deserialize, Serialize};

/// Main event type encompassing all marketplace events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MarketplaceEvent {
	/// Events from the order lifecycle.
	Order(OrderEvent),
	/// Events from the chef application workflow.
	Application(ApplicationEvent),
}

/// Events related to order processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OrderEvent {
	/// A new order was placed at checkout.
	Created { order_id: String, customer_id: String },
	/// A forward transition stamped a ledger milestone.
	Advanced {
		order_id: String,
		action: OrderAction,
		milestone: Milestone,
		stage: Stage,
	},
	/// The order was cancelled. `refund_due` is set when it had been paid.
	Cancelled {
		order_id: String,
		actor: Actor,
		refund_due: bool,
	},
	/// The payment collaborator reported a refund.
	Refunded { order_id: String },
}

/// Events related to chef applications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ApplicationEvent {
	/// A new application awaits review.
	Submitted { application_id: String },
	/// An application was approved and its chef should be provisioned.
	Approved { application: ChefApplication },
	/// An application was rejected.
	Rejected {
		application_id: String,
		reason: String,
	},
}
