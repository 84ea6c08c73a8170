//! Delivery timestamp ledger.
//!
//! Every order carries an append-only record of when it reached each
//! fulfilment milestone. Milestones are strictly ordered and a milestone
//! may only be stamped once every earlier milestone has been stamped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised when writing to a ledger.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
	/// The milestone's predecessor has not been stamped yet.
	#[error("Cannot record {milestone} before {missing}")]
	OutOfOrder {
		milestone: Milestone,
		missing: Milestone,
	},
}

/// Fulfilment milestones in the order they must occur.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Milestone {
	Confirmed,
	Preparing,
	Ready,
	OutForDelivery,
	Delivered,
}

impl Milestone {
	/// All milestones, least advanced first.
	pub const ALL: [Milestone; 5] = [
		Milestone::Confirmed,
		Milestone::Preparing,
		Milestone::Ready,
		Milestone::OutForDelivery,
		Milestone::Delivered,
	];

	pub fn as_str(&self) -> &'static str {
		match self {
			Milestone::Confirmed => "confirmed",
			Milestone::Preparing => "preparing",
			Milestone::Ready => "ready",
			Milestone::OutForDelivery => "out_for_delivery",
			Milestone::Delivered => "delivered",
		}
	}

	/// The milestone that must be stamped before this one.
	pub fn previous(&self) -> Option<Milestone> {
		match self {
			Milestone::Confirmed => None,
			Milestone::Preparing => Some(Milestone::Confirmed),
			Milestone::Ready => Some(Milestone::Preparing),
			Milestone::OutForDelivery => Some(Milestone::Ready),
			Milestone::Delivered => Some(Milestone::OutForDelivery),
		}
	}
}

impl fmt::Display for Milestone {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for Milestone {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"confirmed" => Ok(Milestone::Confirmed),
			"preparing" => Ok(Milestone::Preparing),
			"ready" => Ok(Milestone::Ready),
			"out_for_delivery" => Ok(Milestone::OutForDelivery),
			"delivered" => Ok(Milestone::Delivered),
			other => Err(format!("Unknown milestone: {}", other)),
		}
	}
}

/// Append-only map from milestone to the time it was reached.
///
/// Serialized as an object keyed by milestone name with nullable
/// RFC 3339 timestamps, so records written before a milestone existed
/// deserialize with that entry unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryLedger {
	#[serde(default)]
	confirmed: Option<DateTime<Utc>>,
	#[serde(default)]
	preparing: Option<DateTime<Utc>>,
	#[serde(default)]
	ready: Option<DateTime<Utc>>,
	#[serde(default)]
	out_for_delivery: Option<DateTime<Utc>>,
	#[serde(default)]
	delivered: Option<DateTime<Utc>>,
}

impl DeliveryLedger {
	pub fn new() -> Self {
		Self::default()
	}

	fn slot(&self, milestone: Milestone) -> &Option<DateTime<Utc>> {
		match milestone {
			Milestone::Confirmed => &self.confirmed,
			Milestone::Preparing => &self.preparing,
			Milestone::Ready => &self.ready,
			Milestone::OutForDelivery => &self.out_for_delivery,
			Milestone::Delivered => &self.delivered,
		}
	}

	fn slot_mut(&mut self, milestone: Milestone) -> &mut Option<DateTime<Utc>> {
		match milestone {
			Milestone::Confirmed => &mut self.confirmed,
			Milestone::Preparing => &mut self.preparing,
			Milestone::Ready => &mut self.ready,
			Milestone::OutForDelivery => &mut self.out_for_delivery,
			Milestone::Delivered => &mut self.delivered,
		}
	}

	/// Returns the time the milestone was reached, if it has been.
	pub fn get(&self, milestone: Milestone) -> Option<DateTime<Utc>> {
		*self.slot(milestone)
	}

	pub fn is_set(&self, milestone: Milestone) -> bool {
		self.slot(milestone).is_some()
	}

	pub fn is_empty(&self) -> bool {
		Milestone::ALL.iter().all(|m| !self.is_set(*m))
	}

	/// Stamps a milestone.
	///
	/// Returns `Ok(true)` when the entry was written and `Ok(false)` when it
	/// was already present. Existing entries are never overwritten.
	pub fn record(&mut self, milestone: Milestone, at: DateTime<Utc>) -> Result<bool, LedgerError> {
		if self.is_set(milestone) {
			return Ok(false);
		}
		if let Some(previous) = milestone.previous() {
			if !self.is_set(previous) {
				return Err(LedgerError::OutOfOrder {
					milestone,
					missing: previous,
				});
			}
		}
		*self.slot_mut(milestone) = Some(at);
		Ok(true)
	}

	/// Stamps every unset milestone up to and including `through`.
	///
	/// Used when upgrading records that predate the ledger.
	pub fn backfill_through(&mut self, through: Milestone, at: DateTime<Utc>) {
		for milestone in Milestone::ALL.iter().filter(|m| **m <= through) {
			let slot = self.slot_mut(*milestone);
			if slot.is_none() {
				*slot = Some(at);
			}
		}
	}

	/// The most advanced milestone that has been stamped.
	pub fn latest(&self) -> Option<Milestone> {
		Milestone::ALL
			.iter()
			.rev()
			.find(|m| self.is_set(**m))
			.copied()
	}

	/// Checks that no milestone is stamped while an earlier one is missing.
	pub fn is_monotonic(&self) -> bool {
		let mut gap_seen = false;
		for milestone in Milestone::ALL {
			match (self.is_set(milestone), gap_seen) {
				(true, true) => return false,
				(false, _) => gap_seen = true,
				_ => {},
			}
		}
		true
	}

	/// Iterates over stamped milestones, least advanced first.
	pub fn entries(&self) -> impl Iterator<Item = (Milestone, DateTime<Utc>)> + '_ {
		Milestone::ALL
			.into_iter()
			.filter_map(move |m| self.get(m).map(|at| (m, at)))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::TimeZone;

	fn at(hour: u32) -> DateTime<Utc> {
		Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap()
	}

	#[test]
	fn test_record_in_order() {
		let mut ledger = DeliveryLedger::new();
		assert!(ledger.record(Milestone::Confirmed, at(9)).unwrap());
		assert!(ledger.record(Milestone::Preparing, at(10)).unwrap());
		assert_eq!(ledger.latest(), Some(Milestone::Preparing));
		assert_eq!(ledger.get(Milestone::Confirmed), Some(at(9)));
		assert!(ledger.is_monotonic());
	}

	#[test]
	fn test_record_rejects_gap() {
		let mut ledger = DeliveryLedger::new();
		ledger.record(Milestone::Confirmed, at(9)).unwrap();

		let err = ledger.record(Milestone::Ready, at(10)).unwrap_err();
		assert_eq!(
			err,
			LedgerError::OutOfOrder {
				milestone: Milestone::Ready,
				missing: Milestone::Preparing,
			}
		);
		assert!(!ledger.is_set(Milestone::Ready));
	}

	#[test]
	fn test_record_never_overwrites() {
		let mut ledger = DeliveryLedger::new();
		ledger.record(Milestone::Confirmed, at(9)).unwrap();

		assert!(!ledger.record(Milestone::Confirmed, at(15)).unwrap());
		assert_eq!(ledger.get(Milestone::Confirmed), Some(at(9)));
	}

	#[test]
	fn test_backfill_keeps_existing_entries() {
		let mut ledger = DeliveryLedger::new();
		ledger.record(Milestone::Confirmed, at(9)).unwrap();
		ledger.backfill_through(Milestone::Ready, at(12));

		assert_eq!(ledger.get(Milestone::Confirmed), Some(at(9)));
		assert_eq!(ledger.get(Milestone::Preparing), Some(at(12)));
		assert_eq!(ledger.get(Milestone::Ready), Some(at(12)));
		assert!(!ledger.is_set(Milestone::OutForDelivery));
		assert!(ledger.is_monotonic());
	}

	#[test]
	fn test_deserializes_partial_object() {
		let json = r#"{"confirmed":"2024-03-01T09:00:00Z","preparing":null}"#;
		let ledger: DeliveryLedger = serde_json::from_str(json).unwrap();

		assert_eq!(ledger.latest(), Some(Milestone::Confirmed));
		assert!(!ledger.is_set(Milestone::Delivered));
	}

	#[test]
	fn test_detects_non_monotonic_history() {
		let json = r#"{"confirmed":"2024-03-01T09:00:00Z","delivered":"2024-03-01T11:00:00Z"}"#;
		let ledger: DeliveryLedger = serde_json::from_str(json).unwrap();

		assert!(!ledger.is_monotonic());
		assert_eq!(ledger.latest(), Some(Milestone::Delivered));
	}
}
