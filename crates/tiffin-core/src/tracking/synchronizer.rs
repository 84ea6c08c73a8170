//! Polling synchronizer for the order tracking view.
//!
//! An [`OrderTracker`] re-fetches the whole order collection at a fixed
//! interval, derives each order's stage, reconciles the active selection and
//! publishes an immutable [`TrackingSnapshot`] through a watch channel. It
//! never writes back to the source.

use super::{tracking_summary, OrderSource, TrackingError};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tiffin_types::{truncate_id, Order, TrackingSummary};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// State of the most recent synchronization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatus {
	/// Nothing has been fetched yet.
	Loading,
	/// At least one fetch succeeded.
	Ready,
	/// The first fetch failed.
	Failed(String),
}

/// An order together with its derived tracking summary.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedOrder {
	pub order: Order,
	pub tracking: TrackingSummary,
}

/// Everything a tracking view renders.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingSnapshot {
	pub status: SyncStatus,
	pub orders: Vec<TrackedOrder>,
	/// Id of the order the view is focused on.
	pub selected: Option<String>,
	/// Time of the last successful fetch.
	pub fetched_at: Option<DateTime<Utc>>,
	/// Error from the last fetch, if it failed.
	pub last_error: Option<String>,
}

impl TrackingSnapshot {
	pub fn loading() -> Self {
		Self {
			status: SyncStatus::Loading,
			orders: Vec::new(),
			selected: None,
			fetched_at: None,
			last_error: None,
		}
	}

	pub fn selected_order(&self) -> Option<&TrackedOrder> {
		let selected = self.selected.as_deref()?;
		self.orders.iter().find(|t| t.order.id == selected)
	}

	fn contains(&self, order_id: &str) -> bool {
		self.orders.iter().any(|t| t.order.id == order_id)
	}
}

/// Folds a fetch result into the previous snapshot.
///
/// On success the selection is kept if that order is still present, else it
/// moves to the first trackable order, else it is cleared. On failure the
/// previous snapshot is kept, unless nothing has ever been fetched, in which
/// case the snapshot reports [`SyncStatus::Failed`].
pub fn reconcile(
	previous: &TrackingSnapshot,
	result: Result<Vec<Order>, TrackingError>,
	now: DateTime<Utc>,
) -> TrackingSnapshot {
	match result {
		Ok(orders) => {
			let orders: Vec<TrackedOrder> = orders
				.into_iter()
				.map(|order| TrackedOrder {
					tracking: tracking_summary(&order),
					order,
				})
				.collect();

			let selected = previous
				.selected
				.as_ref()
				.filter(|id| orders.iter().any(|t| &t.order.id == *id))
				.cloned()
				.or_else(|| {
					orders
						.iter()
						.find(|t| t.tracking.trackable)
						.map(|t| t.order.id.clone())
				});

			TrackingSnapshot {
				status: SyncStatus::Ready,
				orders,
				selected,
				fetched_at: Some(now),
				last_error: None,
			}
		},
		Err(e) if previous.fetched_at.is_none() => TrackingSnapshot {
			status: SyncStatus::Failed(e.to_string()),
			last_error: Some(e.to_string()),
			..previous.clone()
		},
		Err(e) => TrackingSnapshot {
			last_error: Some(e.to_string()),
			..previous.clone()
		},
	}
}

/// Owned polling context.
pub struct OrderTracker {
	source: Arc<dyn OrderSource>,
	interval: Duration,
	snapshot: Arc<watch::Sender<Arc<TrackingSnapshot>>>,
	is_running: Arc<AtomicBool>,
}

impl OrderTracker {
	pub fn new(source: Arc<dyn OrderSource>, interval: Duration) -> Self {
		let (snapshot, _) = watch::channel(Arc::new(TrackingSnapshot::loading()));
		Self {
			source,
			interval,
			snapshot: Arc::new(snapshot),
			is_running: Arc::new(AtomicBool::new(false)),
		}
	}

	/// Receiver that is notified after every fetch and selection change.
	pub fn subscribe(&self) -> watch::Receiver<Arc<TrackingSnapshot>> {
		self.snapshot.subscribe()
	}

	/// The current snapshot.
	pub fn snapshot(&self) -> Arc<TrackingSnapshot> {
		self.snapshot.borrow().clone()
	}

	pub fn is_running(&self) -> bool {
		self.is_running.load(Ordering::SeqCst)
	}

	/// Focuses the view on another order. Returns false for unknown ids.
	pub fn select(&self, order_id: &str) -> bool {
		self.snapshot.send_if_modified(|current| {
			if !current.contains(order_id) || current.selected.as_deref() == Some(order_id) {
				return false;
			}
			let mut next = TrackingSnapshot::clone(current);
			next.selected = Some(order_id.to_string());
			*current = Arc::new(next);
			true
		}) || self.snapshot.borrow().selected.as_deref() == Some(order_id)
	}

	/// Starts polling. The first fetch happens immediately.
	pub fn start(&self) -> Result<TrackerHandle, TrackingError> {
		if self.is_running.swap(true, Ordering::SeqCst) {
			return Err(TrackingError::AlreadyRunning);
		}

		let (stop_tx, stop_rx) = mpsc::channel(1);
		tracing::info!(
			source = %self.source.describe(),
			interval_secs = self.interval.as_secs(),
			"Order tracking started"
		);

		let task = tokio::spawn(Self::polling_loop(
			self.source.clone(),
			self.snapshot.clone(),
			stop_rx,
			self.interval,
		));

		Ok(TrackerHandle {
			stop_tx: Some(stop_tx),
			task: Some(task),
			is_running: self.is_running.clone(),
		})
	}

	async fn polling_loop(
		source: Arc<dyn OrderSource>,
		snapshot: Arc<watch::Sender<Arc<TrackingSnapshot>>>,
		mut stop_rx: mpsc::Receiver<()>,
		interval: Duration,
	) {
		let mut interval = tokio::time::interval(interval);
		interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

		loop {
			tokio::select! {
				biased;
				_ = stop_rx.recv() => break,
				_ = interval.tick() => {},
			}

			// Stopping while a fetch is in flight drops its response
			let result = tokio::select! {
				biased;
				_ = stop_rx.recv() => break,
				result = source.fetch() => result,
			};

			if let Err(e) = &result {
				tracing::warn!(source = %source.describe(), error = %e, "Order fetch failed");
			}

			snapshot.send_modify(|current| {
				let next = reconcile(current, result, Utc::now());
				log_stage_changes(current, &next);
				*current = Arc::new(next);
			});
		}

		tracing::debug!("Order tracking loop exited");
	}
}

fn log_stage_changes(previous: &TrackingSnapshot, next: &TrackingSnapshot) {
	for tracked in &next.orders {
		let before = previous
			.orders
			.iter()
			.find(|t| t.order.id == tracked.order.id)
			.map(|t| t.tracking.stage);
		if before.is_some_and(|stage| stage != tracked.tracking.stage) {
			tracing::info!(
				order_id = %truncate_id(&tracked.order.id),
				stage = %tracked.tracking.stage,
				"Stage changed"
			);
		}
	}
}

/// Running tracker. Dropping the handle cancels polling.
pub struct TrackerHandle {
	stop_tx: Option<mpsc::Sender<()>>,
	task: Option<JoinHandle<()>>,
	is_running: Arc<AtomicBool>,
}

impl TrackerHandle {
	/// Stops polling and waits for the loop to exit.
	pub async fn stop(mut self) {
		if let Some(stop_tx) = self.stop_tx.take() {
			if stop_tx.send(()).await.is_err() {
				tracing::debug!("Order tracking loop already exited");
			}
		}
		if let Some(task) = self.task.take() {
			if let Err(e) = task.await {
				tracing::warn!(error = %e, "Order tracking task ended abnormally");
			}
		}
		self.is_running.store(false, Ordering::SeqCst);
		tracing::info!("Order tracking stopped");
	}
}

impl Drop for TrackerHandle {
	fn drop(&mut self) {
		if let Some(task) = self.task.take() {
			task.abort();
		}
		self.is_running.store(false, Ordering::SeqCst);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::state::transition::tests::sample_order;
	use async_trait::async_trait;
	use std::collections::VecDeque;
	use std::sync::atomic::AtomicUsize;
	use std::sync::Mutex;
	use tiffin_types::{Milestone, PaymentStatus, Stage};

	/// Replays scripted results, repeating the last one forever.
	struct ScriptedSource {
		script: Mutex<VecDeque<Result<Vec<Order>, String>>>,
		delay: Duration,
		fetches: AtomicUsize,
	}

	impl ScriptedSource {
		fn new(script: Vec<Result<Vec<Order>, String>>) -> Arc<Self> {
			Self::with_delay(script, Duration::ZERO)
		}

		fn with_delay(script: Vec<Result<Vec<Order>, String>>, delay: Duration) -> Arc<Self> {
			Arc::new(Self {
				script: Mutex::new(script.into()),
				delay,
				fetches: AtomicUsize::new(0),
			})
		}

		fn fetches(&self) -> usize {
			self.fetches.load(Ordering::SeqCst)
		}
	}

	#[async_trait]
	impl OrderSource for ScriptedSource {
		async fn fetch(&self) -> Result<Vec<Order>, TrackingError> {
			self.fetches.fetch_add(1, Ordering::SeqCst);
			if !self.delay.is_zero() {
				tokio::time::sleep(self.delay).await;
			}
			let mut script = self.script.lock().unwrap();
			let next = if script.len() > 1 {
				script.pop_front()
			} else {
				script.front().cloned()
			};
			next.unwrap_or_else(|| Ok(Vec::new()))
				.map_err(TrackingError::Fetch)
		}

		fn describe(&self) -> String {
			"scripted".into()
		}
	}

	fn order(id: &str, paid: bool) -> Order {
		let mut order = sample_order();
		order.id = id.into();
		if paid {
			order.payment_status = PaymentStatus::Paid;
			order
				.delivery_status
				.record(Milestone::Confirmed, order.created_at)
				.unwrap();
		}
		order
	}

	#[test]
	fn test_reconcile_selects_first_trackable() {
		let snapshot = reconcile(
			&TrackingSnapshot::loading(),
			Ok(vec![order("a", false), order("b", true), order("c", true)]),
			Utc::now(),
		);
		assert_eq!(snapshot.status, SyncStatus::Ready);
		assert_eq!(snapshot.selected.as_deref(), Some("b"));
		assert_eq!(
			snapshot.selected_order().unwrap().tracking.stage,
			Stage::Confirmed
		);
	}

	#[test]
	fn test_reconcile_keeps_or_moves_selection() {
		let mut previous = reconcile(
			&TrackingSnapshot::loading(),
			Ok(vec![order("b", true), order("c", true)]),
			Utc::now(),
		);
		previous.selected = Some("c".into());

		let kept = reconcile(&previous, Ok(vec![order("b", true), order("c", true)]), Utc::now());
		assert_eq!(kept.selected.as_deref(), Some("c"));

		let moved = reconcile(&previous, Ok(vec![order("a", false), order("b", true)]), Utc::now());
		assert_eq!(moved.selected.as_deref(), Some("b"));

		let cleared = reconcile(&previous, Ok(vec![order("a", false)]), Utc::now());
		assert_eq!(cleared.selected, None);
	}

	#[test]
	fn test_reconcile_failure_handling() {
		let first = reconcile(
			&TrackingSnapshot::loading(),
			Err(TrackingError::Fetch("connection refused".into())),
			Utc::now(),
		);
		assert!(matches!(first.status, SyncStatus::Failed(_)));

		let good = reconcile(&TrackingSnapshot::loading(), Ok(vec![order("b", true)]), Utc::now());
		let after = reconcile(
			&good,
			Err(TrackingError::Fetch("timeout".into())),
			Utc::now(),
		);
		assert_eq!(after.status, SyncStatus::Ready);
		assert_eq!(after.orders, good.orders);
		assert_eq!(after.selected.as_deref(), Some("b"));
		assert!(after.last_error.is_some());
	}

	#[tokio::test(start_paused = true)]
	async fn test_polls_at_fixed_interval() {
		let source = ScriptedSource::new(vec![Ok(vec![order("b", true)])]);
		let tracker = OrderTracker::new(source.clone(), Duration::from_secs(10));
		let mut rx = tracker.subscribe();

		let handle = tracker.start().unwrap();
		rx.changed().await.unwrap();
		assert_eq!(source.fetches(), 1);
		assert_eq!(tracker.snapshot().selected.as_deref(), Some("b"));

		tokio::time::sleep(Duration::from_secs(25)).await;
		assert_eq!(source.fetches(), 3);

		handle.stop().await;
		assert!(!tracker.is_running());
		tokio::time::sleep(Duration::from_secs(60)).await;
		assert_eq!(source.fetches(), 3);
	}

	#[tokio::test(start_paused = true)]
	async fn test_failure_keeps_last_good_snapshot() {
		let source = ScriptedSource::new(vec![
			Ok(vec![order("b", true)]),
			Err("server error".into()),
		]);
		let tracker = OrderTracker::new(source.clone(), Duration::from_secs(10));
		let mut rx = tracker.subscribe();
		let _handle = tracker.start().unwrap();

		rx.changed().await.unwrap();
		rx.changed().await.unwrap();

		let snapshot = rx.borrow().clone();
		assert_eq!(snapshot.status, SyncStatus::Ready);
		assert_eq!(snapshot.orders.len(), 1);
		assert_eq!(snapshot.last_error.as_deref(), Some("Fetch failed: server error"));
	}

	#[tokio::test(start_paused = true)]
	async fn test_response_after_stop_is_discarded() {
		let source = ScriptedSource::with_delay(
			vec![Ok(vec![order("b", true)])],
			Duration::from_secs(5),
		);
		let tracker = OrderTracker::new(source.clone(), Duration::from_secs(10));
		let handle = tracker.start().unwrap();

		tokio::time::sleep(Duration::from_secs(1)).await;
		assert_eq!(source.fetches(), 1);
		handle.stop().await;

		tokio::time::sleep(Duration::from_secs(30)).await;
		assert_eq!(tracker.snapshot().status, SyncStatus::Loading);
	}

	#[tokio::test(start_paused = true)]
	async fn test_select_and_double_start() {
		let source = ScriptedSource::new(vec![Ok(vec![order("b", true), order("c", true)])]);
		let tracker = OrderTracker::new(source, Duration::from_secs(10));
		let mut rx = tracker.subscribe();
		let handle = tracker.start().unwrap();
		assert!(matches!(tracker.start(), Err(TrackingError::AlreadyRunning)));

		rx.changed().await.unwrap();
		assert!(tracker.select("c"));
		assert!(!tracker.select("zzz"));
		assert_eq!(tracker.snapshot().selected.as_deref(), Some("c"));

		// Selection survives the next poll
		tokio::time::sleep(Duration::from_secs(11)).await;
		assert_eq!(tracker.snapshot().selected.as_deref(), Some("c"));

		drop(handle);
		assert!(!tracker.is_running());
		assert!(tracker.start().is_ok());
	}

	struct PanickingSource;

	#[async_trait]
	impl OrderSource for PanickingSource {
		async fn fetch(&self) -> Result<Vec<Order>, TrackingError> {
			panic!("source crashed");
		}

		fn describe(&self) -> String {
			"panicking".into()
		}
	}

	#[tokio::test(start_paused = true)]
	async fn test_stop_after_loop_died() {
		let tracker = OrderTracker::new(Arc::new(PanickingSource), Duration::from_secs(10));
		let handle = tracker.start().unwrap();

		// Let the first tick run the fetch and kill the loop
		tokio::time::sleep(Duration::from_secs(1)).await;
		assert!(tracker.is_running());

		handle.stop().await;
		assert!(!tracker.is_running());
		assert_eq!(tracker.snapshot().status, SyncStatus::Loading);
		assert!(tracker.start().is_ok());
	}
}
