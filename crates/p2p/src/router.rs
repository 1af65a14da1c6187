use std::collections::HashMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{debug, trace};
use uuid::Uuid;

/// Correlates a response with the request that caused it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
	#[must_use]
	pub fn new() -> Self {
		Self(Uuid::new_v4())
	}
}

impl Default for MessageId {
	fn default() -> Self {
		Self::new()
	}
}

impl std::fmt::Display for MessageId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Pending requests of one peer, each waiting on its own oneshot channel.
///
/// A response is delivered to whoever registered its correlation id, exactly once. Responses
/// for ids nobody waits on anymore (the requester timed out) are dropped.
#[derive(Debug, Default)]
pub struct ResponseRouter {
	pending: Mutex<HashMap<MessageId, oneshot::Sender<Vec<u8>>>>,
}

impl ResponseRouter {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	pub fn register(&self, id: MessageId) -> oneshot::Receiver<Vec<u8>> {
		let (tx, rx) = oneshot::channel();
		self.pending.lock().insert(id, tx);
		rx
	}

	/// Forgets a request, used when the requester stops waiting.
	pub fn forget(&self, id: MessageId) {
		self.pending.lock().remove(&id);
	}

	/// Returns `false` when nobody was waiting for this response.
	pub fn complete(&self, id: MessageId, payload: Vec<u8>) -> bool {
		let Some(tx) = self.pending.lock().remove(&id) else {
			debug!(%id, "Discarding delayed response, nobody is waiting for it anymore");
			return false;
		};

		if tx.send(payload).is_err() {
			trace!(%id, "Requester dropped before its response arrived");
			return false;
		}

		true
	}

	#[must_use]
	pub fn pending(&self) -> usize {
		self.pending.lock().len()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn responses_reach_their_requester_only() {
		let router = ResponseRouter::new();
		let (first, second) = (MessageId::new(), MessageId::new());

		let first_rx = router.register(first);
		let second_rx = router.register(second);

		assert!(router.complete(second, b"two".to_vec()));
		assert!(router.complete(first, b"one".to_vec()));

		assert_eq!(first_rx.await.unwrap(), b"one");
		assert_eq!(second_rx.await.unwrap(), b"two");
		assert_eq!(router.pending(), 0);
	}

	#[test]
	fn late_responses_are_dropped() {
		let router = ResponseRouter::new();
		let id = MessageId::new();

		let _rx = router.register(id);
		router.forget(id);

		assert!(!router.complete(id, vec![]));
		assert!(!router.complete(MessageId::new(), vec![]));
	}
}
