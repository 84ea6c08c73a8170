//! Customer-facing tracking stages.

use crate::Milestone;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stage shown on the tracking view.
///
/// `Preparing` covers both the preparing and ready milestones. The numeric
/// progress value runs from 0 to 4 and drives progress rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
	PaymentPending,
	Confirmed,
	Preparing,
	OutForDelivery,
	Delivered,
}

impl Stage {
	pub fn progress(&self) -> u8 {
		match self {
			Stage::PaymentPending => 0,
			Stage::Confirmed => 1,
			Stage::Preparing => 2,
			Stage::OutForDelivery => 3,
			Stage::Delivered => 4,
		}
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			Stage::PaymentPending => "payment_pending",
			Stage::Confirmed => "confirmed",
			Stage::Preparing => "preparing",
			Stage::OutForDelivery => "out_for_delivery",
			Stage::Delivered => "delivered",
		}
	}

	/// Human-readable label.
	pub fn label(&self) -> &'static str {
		match self {
			Stage::PaymentPending => "Awaiting payment",
			Stage::Confirmed => "Order confirmed",
			Stage::Preparing => "Being prepared",
			Stage::OutForDelivery => "Out for delivery",
			Stage::Delivered => "Delivered",
		}
	}
}

impl From<Milestone> for Stage {
	fn from(milestone: Milestone) -> Self {
		match milestone {
			Milestone::Confirmed => Stage::Confirmed,
			Milestone::Preparing | Milestone::Ready => Stage::Preparing,
			Milestone::OutForDelivery => Stage::OutForDelivery,
			Milestone::Delivered => Stage::Delivered,
		}
	}
}

impl fmt::Display for Stage {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
