//! Delivery tracking: stage derivation and the polling synchronizer.

pub mod derive;
pub mod source;
pub mod synchronizer;

use thiserror::Error;

pub use derive::{derive_milestone, derive_stage, order_response, tracking_summary};
pub use source::{HttpOrderSource, OrderSource, StorageOrderSource};
pub use synchronizer::{
	reconcile, OrderTracker, SyncStatus, TrackedOrder, TrackerHandle, TrackingSnapshot,
};

/// Errors that can occur while synchronizing orders.
#[derive(Debug, Error)]
pub enum TrackingError {
	#[error("Fetch failed: {0}")]
	Fetch(String),
	#[error("Unreadable response: {0}")]
	Decode(String),
	#[error("Tracker is already running")]
	AlreadyRunning,
}
