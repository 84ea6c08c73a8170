//! Order types for the marketplace.
//!
//! An order is created at checkout, becomes trackable once paid, and ends
//! either delivered or cancelled. The explicit `status` enum mirrors the
//! delivery ledger; the ledger is the authoritative history.

use crate::{DeliveryLedger, Milestone};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Schema version for records written before the delivery ledger existed.
pub const LEGACY_SCHEMA_VERSION: u32 = 1;

/// Schema version for records whose ledger is authoritative.
pub const CURRENT_SCHEMA_VERSION: u32 = 2;

fn default_schema_version() -> u32 {
	LEGACY_SCHEMA_VERSION
}

/// Payment state, driven only by the payment collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
	Unpaid,
	Paid,
	Refunded,
}

impl PaymentStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			PaymentStatus::Unpaid => "unpaid",
			PaymentStatus::Paid => "paid",
			PaymentStatus::Refunded => "refunded",
		}
	}
}

impl fmt::Display for PaymentStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Explicit order status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
	Pending,
	Confirmed,
	Preparing,
	Ready,
	OutForDelivery,
	Delivered,
	Cancelled,
}

impl OrderStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			OrderStatus::Pending => "pending",
			OrderStatus::Confirmed => "confirmed",
			OrderStatus::Preparing => "preparing",
			OrderStatus::Ready => "ready",
			OrderStatus::OutForDelivery => "out_for_delivery",
			OrderStatus::Delivered => "delivered",
			OrderStatus::Cancelled => "cancelled",
		}
	}

	/// The ledger milestone this status corresponds to, if any.
	pub fn milestone(&self) -> Option<Milestone> {
		match self {
			OrderStatus::Pending | OrderStatus::Cancelled => None,
			OrderStatus::Confirmed => Some(Milestone::Confirmed),
			OrderStatus::Preparing => Some(Milestone::Preparing),
			OrderStatus::Ready => Some(Milestone::Ready),
			OrderStatus::OutForDelivery => Some(Milestone::OutForDelivery),
			OrderStatus::Delivered => Some(Milestone::Delivered),
		}
	}
}

impl From<Milestone> for OrderStatus {
	fn from(milestone: Milestone) -> Self {
		match milestone {
			Milestone::Confirmed => OrderStatus::Confirmed,
			Milestone::Preparing => OrderStatus::Preparing,
			Milestone::Ready => OrderStatus::Ready,
			Milestone::OutForDelivery => OrderStatus::OutForDelivery,
			Milestone::Delivered => OrderStatus::Delivered,
		}
	}
}

impl fmt::Display for OrderStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for OrderStatus {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"pending" => Ok(OrderStatus::Pending),
			"cancelled" => Ok(OrderStatus::Cancelled),
			other => other
				.parse::<Milestone>()
				.map(OrderStatus::from)
				.map_err(|_| format!("Unknown order status: {}", other)),
		}
	}
}

/// Nutrition facts attached to a dish.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Nutrition {
	pub calories: u32,
	#[serde(default)]
	pub protein_g: f32,
	#[serde(default)]
	pub carbs_g: f32,
	#[serde(default)]
	pub fat_g: f32,
}

/// One dish in an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
	pub dish_id: String,
	pub name: String,
	pub quantity: u32,
	pub unit_price: Decimal,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub nutrition: Option<Nutrition>,
}

impl LineItem {
	pub fn subtotal(&self) -> Decimal {
		self.unit_price * Decimal::from(self.quantity)
	}
}

/// Where an order is delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryAddress {
	pub street: String,
	pub city: String,
	#[serde(default)]
	pub state: String,
	#[serde(default)]
	pub zip: String,
	#[serde(default)]
	pub phone: String,
}

/// A customer order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
	/// Opaque identifier assigned at checkout.
	pub id: String,
	/// Customer who placed the order.
	pub customer_id: String,
	/// Chef fulfilling the order. Immutable once assigned.
	#[serde(default)]
	pub chef_id: Option<String>,
	pub items: Vec<LineItem>,
	pub payment_status: PaymentStatus,
	pub status: OrderStatus,
	/// Timestamp ledger of fulfilment milestones.
	#[serde(default)]
	pub delivery_status: DeliveryLedger,
	pub delivery_address: DeliveryAddress,
	#[serde(default)]
	pub payment_reference: Option<String>,
	#[serde(default)]
	pub cancelled_at: Option<DateTime<Utc>>,
	#[serde(default)]
	pub cancellation_reason: Option<String>,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
	#[serde(default = "default_schema_version")]
	pub schema_version: u32,
}

impl Order {
	/// Sum of all line item subtotals.
	pub fn total(&self) -> Decimal {
		self.items.iter().map(LineItem::subtotal).sum()
	}

	pub fn is_paid(&self) -> bool {
		self.payment_status == PaymentStatus::Paid
	}

	pub fn is_cancelled(&self) -> bool {
		self.status == OrderStatus::Cancelled
	}

	/// Paid and not cancelled orders are shown on the tracking view.
	pub fn is_trackable(&self) -> bool {
		self.is_paid() && !self.is_cancelled()
	}

	/// True when the record predates the authoritative ledger.
	pub fn is_legacy(&self) -> bool {
		self.schema_version < CURRENT_SCHEMA_VERSION
	}
}
