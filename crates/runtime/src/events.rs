//! Fan-out of supervisor events to subscribers.

use lanbridge_protocol::SupervisorEvent;
use tokio::sync::broadcast;

/// Broadcast channel carrying [`SupervisorEvent`]s in emission order.
///
/// Dropping a receiver unsubscribes it. Emitting with no subscribers is a no-op.
#[derive(Debug, Clone)]
pub struct EventBus {
	sender: broadcast::Sender<SupervisorEvent>,
}

impl EventBus {
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity.max(1));
		Self { sender }
	}

	pub fn subscribe(&self) -> broadcast::Receiver<SupervisorEvent> {
		self.sender.subscribe()
	}

	pub fn emit(&self, event: SupervisorEvent) {
		let _ = self.sender.send(event);
	}

	pub fn subscriber_count(&self) -> usize {
		self.sender.receiver_count()
	}
}
