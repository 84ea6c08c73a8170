//! Tracking stage derivation.
//!
//! The stage shown to a customer is never stored. It is recomputed from the
//! payment status, the delivery ledger and, for records that predate the
//! ledger, the explicit status enum. Derivation is pure and total.

use tiffin_types::{
	Milestone, Order, OrderResponse, OrderStatus, PaymentStatus, Stage, TrackingSummary,
};

/// Derives the tracking stage of an order.
///
/// Unpaid orders are always `PaymentPending`. Otherwise the most advanced
/// ledger milestone wins; an empty ledger falls back to the status enum,
/// and anything else (such as a cancelled legacy order) reads as
/// `Confirmed` because the order has been paid.
pub fn derive_stage(order: &Order) -> Stage {
	if order.payment_status != PaymentStatus::Paid {
		return Stage::PaymentPending;
	}

	if let Some(milestone) = order.delivery_status.latest() {
		return Stage::from(milestone);
	}

	match order.status {
		OrderStatus::Pending | OrderStatus::Confirmed => Stage::Confirmed,
		OrderStatus::Preparing | OrderStatus::Ready => Stage::Preparing,
		OrderStatus::OutForDelivery => Stage::OutForDelivery,
		OrderStatus::Delivered => Stage::Delivered,
		OrderStatus::Cancelled => Stage::Confirmed,
	}
}

/// The exact milestone behind the derived stage.
///
/// Unlike [`Stage`] this tells preparing and ready apart. `None` while
/// payment is pending or when nothing has been recorded.
pub fn derive_milestone(order: &Order) -> Option<Milestone> {
	if order.payment_status != PaymentStatus::Paid {
		return None;
	}
	order
		.delivery_status
		.latest()
		.or_else(|| implied_milestone(order))
}

/// The milestone a record's status enum stands for.
///
/// A paid order still marked pending has been confirmed, since payment and
/// confirmation are one step.
pub(crate) fn implied_milestone(order: &Order) -> Option<Milestone> {
	match order.status {
		OrderStatus::Pending if order.payment_status == PaymentStatus::Paid => {
			Some(Milestone::Confirmed)
		},
		status => status.milestone(),
	}
}

pub fn tracking_summary(order: &Order) -> TrackingSummary {
	let stage = derive_stage(order);
	TrackingSummary {
		stage,
		progress: stage.progress(),
		milestone: derive_milestone(order),
		trackable: order.is_trackable(),
	}
}

/// Pairs an order record with its derived tracking summary.
pub fn order_response(order: Order) -> OrderResponse {
	let tracking = tracking_summary(&order);
	OrderResponse { order, tracking }
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::state::transition::tests::sample_order;
	use chrono::Utc;

	#[test]
	fn test_unpaid_dominates_everything() {
		let mut order = sample_order();
		order.status = OrderStatus::Delivered;
		let now = Utc::now();
		order
			.delivery_status
			.backfill_through(Milestone::Delivered, now);

		assert_eq!(derive_stage(&order), Stage::PaymentPending);
		assert_eq!(derive_milestone(&order), None);
		assert_eq!(tracking_summary(&order).progress, 0);
	}

	#[test]
	fn test_ledger_beats_stale_enum() {
		let mut order = sample_order();
		order.payment_status = PaymentStatus::Paid;
		order.status = OrderStatus::Confirmed;
		order
			.delivery_status
			.backfill_through(Milestone::Delivered, Utc::now());

		assert_eq!(derive_stage(&order), Stage::Delivered);
		assert_eq!(derive_stage(&order).progress(), 4);
	}

	#[test]
	fn test_ready_collapses_into_preparing() {
		let mut order = sample_order();
		order.payment_status = PaymentStatus::Paid;
		order
			.delivery_status
			.backfill_through(Milestone::Ready, Utc::now());

		let summary = tracking_summary(&order);
		assert_eq!(summary.stage, Stage::Preparing);
		assert_eq!(summary.milestone, Some(Milestone::Ready));
		assert!(summary.trackable);
	}

	#[test]
	fn test_enum_fallback_for_empty_ledger() {
		let mut order = sample_order();
		order.payment_status = PaymentStatus::Paid;

		let cases = [
			(OrderStatus::Pending, Stage::Confirmed),
			(OrderStatus::Confirmed, Stage::Confirmed),
			(OrderStatus::Preparing, Stage::Preparing),
			(OrderStatus::Ready, Stage::Preparing),
			(OrderStatus::OutForDelivery, Stage::OutForDelivery),
			(OrderStatus::Delivered, Stage::Delivered),
			(OrderStatus::Cancelled, Stage::Confirmed),
		];
		for (status, expected) in cases {
			order.status = status;
			assert_eq!(derive_stage(&order), expected, "status {}", status);
		}
	}

	#[test]
	fn test_response_flattens_order() {
		let order = sample_order();
		let json = serde_json::to_value(order_response(order.clone())).unwrap();

		assert_eq!(json["id"], order.id);
		assert_eq!(json["paymentStatus"], "unpaid");
		assert_eq!(json["tracking"]["stage"], "payment_pending");
	}
}
