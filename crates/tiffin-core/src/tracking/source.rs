//! Where the synchronizer reads orders from.

use super::TrackingError;
use crate::state::OrderStateMachine;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tiffin_types::{Order, OrderResponse};

/// A read-only collection of orders.
#[async_trait]
pub trait OrderSource: Send + Sync {
	/// Fetches the full collection.
	async fn fetch(&self) -> Result<Vec<Order>, TrackingError>;

	/// Short description used in logs.
	fn describe(&self) -> String;
}

/// Reads orders straight from the in-process state machine.
pub struct StorageOrderSource {
	orders: Arc<OrderStateMachine>,
	customer_id: Option<String>,
}

impl StorageOrderSource {
	pub fn new(orders: Arc<OrderStateMachine>, customer_id: Option<String>) -> Self {
		Self {
			orders,
			customer_id,
		}
	}
}

#[async_trait]
impl OrderSource for StorageOrderSource {
	async fn fetch(&self) -> Result<Vec<Order>, TrackingError> {
		self.orders
			.list_orders(self.customer_id.as_deref())
			.await
			.map_err(|e| TrackingError::Fetch(e.to_string()))
	}

	fn describe(&self) -> String {
		match &self.customer_id {
			Some(id) => format!("storage (customer {})", id),
			None => "storage".to_string(),
		}
	}
}

/// Reads orders from a marketplace server over HTTP.
///
/// Issues `GET {base_url}/api/orders?customer_id=...` and keeps only the
/// raw records; tracking stages are derived locally.
pub struct HttpOrderSource {
	client: reqwest::Client,
	url: String,
	customer_id: Option<String>,
}

impl HttpOrderSource {
	pub fn new(
		base_url: &str,
		customer_id: Option<String>,
		timeout: Duration,
	) -> Result<Self, TrackingError> {
		let client = reqwest::Client::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| TrackingError::Fetch(e.to_string()))?;
		Ok(Self {
			client,
			url: format!("{}/api/orders", base_url.trim_end_matches('/')),
			customer_id,
		})
	}
}

#[async_trait]
impl OrderSource for HttpOrderSource {
	async fn fetch(&self) -> Result<Vec<Order>, TrackingError> {
		let mut request = self.client.get(&self.url);
		if let Some(customer_id) = &self.customer_id {
			request = request.query(&[("customer_id", customer_id)]);
		}

		let response = request
			.send()
			.await
			.map_err(|e| TrackingError::Fetch(e.to_string()))?;
		let status = response.status();
		if !status.is_success() {
			return Err(TrackingError::Fetch(format!("HTTP {}", status)));
		}

		let orders: Vec<OrderResponse> = response
			.json()
			.await
			.map_err(|e| TrackingError::Decode(e.to_string()))?;
		Ok(orders.into_iter().map(|r| r.order).collect())
	}

	fn describe(&self) -> String {
		self.url.clone()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::engine::event_bus::EventBus;
	use tiffin_storage::{implementations::memory::MemoryStorage, StorageService};

	#[tokio::test]
	async fn test_storage_source_scopes_by_customer() {
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		let machine = Arc::new(OrderStateMachine::new(storage, EventBus::default()));
		let source = StorageOrderSource::new(machine, Some("cust-1".into()));

		assert!(source.fetch().await.unwrap().is_empty());
		assert_eq!(source.describe(), "storage (customer cust-1)");
	}

	#[test]
	fn test_http_source_url() {
		let source =
			HttpOrderSource::new("http://localhost:3000/", None, Duration::from_secs(5)).unwrap();
		assert_eq!(source.describe(), "http://localhost:3000/api/orders");
	}
}
