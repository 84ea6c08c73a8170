//! Event bus for broadcasting marketplace events between components.

use tiffin_types::MarketplaceEvent;
use tokio::sync::broadcast;

/// Number of events buffered per subscriber before the slowest one lags.
const DEFAULT_CAPACITY: usize = 1000;

/// Cloneable handle to a broadcast channel of [`MarketplaceEvent`]s.
#[derive(Clone)]
pub struct EventBus {
	sender: broadcast::Sender<MarketplaceEvent>,
}

impl EventBus {
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	/// Creates a new receiver that sees every event published from now on.
	pub fn subscribe(&self) -> broadcast::Receiver<MarketplaceEvent> {
		self.sender.subscribe()
	}

	/// Publishes an event to all current subscribers.
	///
	/// Fails only when nobody is subscribed; callers treat that as harmless.
	pub fn publish(
		&self,
		event: MarketplaceEvent,
	) -> Result<usize, broadcast::error::SendError<MarketplaceEvent>> {
		self.sender.send(event)
	}
}

impl Default for EventBus {
	fn default() -> Self {
		Self::new(DEFAULT_CAPACITY)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tiffin_types::OrderEvent;

	#[tokio::test]
	async fn test_subscribers_receive_published_events() {
		let bus = EventBus::default();
		let mut first = bus.subscribe();
		let mut second = bus.subscribe();

		let delivered = bus
			.publish(MarketplaceEvent::Order(OrderEvent::Refunded {
				order_id: "ord-1".into(),
			}))
			.unwrap();
		assert_eq!(delivered, 2);

		for rx in [&mut first, &mut second] {
			match rx.recv().await.unwrap() {
				MarketplaceEvent::Order(OrderEvent::Refunded { order_id }) => {
					assert_eq!(order_id, "ord-1")
				},
				other => panic!("unexpected event: {:?}", other),
			}
		}
	}

	#[test]
	fn test_publish_without_subscribers_fails() {
		let bus = EventBus::new(4);
		assert!(bus
			.publish(MarketplaceEvent::Order(OrderEvent::Refunded {
				order_id: "ord-1".into(),
			}))
			.is_err());
	}
}
