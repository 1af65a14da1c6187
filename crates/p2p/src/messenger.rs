use std::{sync::Weak, time::Duration};

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{error::Error, peer::PeerAddress};

/// How many times a direct message is sent before the peer is considered unreachable.
pub const MAX_MESSAGE_SEND_ATTEMPTS: usize = 5;

/// Answers the direct messages a peer receives. Returning `Some` replies to a request, the
/// reply is ignored for one way messages.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
	async fn handle(&self, from: PeerAddress, payload: Vec<u8>) -> Option<Vec<u8>>;
}

/// The direct messaging interface the core needs from the p2p layer. Payloads are opaque,
/// callers encrypt them for the recipient beforehand.
#[async_trait]
pub trait DirectMessenger: Send + Sync + 'static {
	fn local_address(&self) -> &PeerAddress;

	/// Incoming messages go to `handler` for as long as it is alive.
	fn register_handler(&self, handler: Weak<dyn MessageHandler>);

	/// Resolves once the peer accepted the message.
	async fn send_direct(&self, to: &PeerAddress, payload: Vec<u8>) -> Result<(), Error>;

	/// Sends a request and waits at most `timeout` for the response correlated with it.
	async fn request(
		&self,
		to: &PeerAddress,
		payload: Vec<u8>,
		timeout: Duration,
	) -> Result<Vec<u8>, Error>;

	/// [`DirectMessenger::send_direct`] with a bounded number of attempts and a linear backoff.
	async fn send_direct_with_retry(
		&self,
		to: &PeerAddress,
		payload: Vec<u8>,
		max_attempts: usize,
		backoff: Duration,
	) -> Result<(), Error> {
		let max_attempts = max_attempts.max(1);

		for attempt in 1..=max_attempts {
			match self.send_direct(to, payload.clone()).await {
				Ok(()) => return Ok(()),
				Err(e) if attempt < max_attempts => {
					debug!(%to, attempt, %e, "Direct message not delivered, retrying");
					tokio::time::sleep(backoff * u32::try_from(attempt).unwrap_or(u32::MAX)).await;
				}
				Err(e) => {
					warn!(%to, attempt, %e, "Direct message not delivered, giving up");
				}
			}
		}

		Err(Error::SendAttemptsExhausted {
			peer: to.peer_id,
			attempts: max_attempts,
		})
	}
}
