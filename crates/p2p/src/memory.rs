use std::{
	collections::HashMap,
	sync::{Arc, Weak},
	time::Duration,
};

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::{spawn, sync::mpsc};
use tracing::{debug, trace, warn, Instrument};

use super::{
	error::Error,
	messenger::{DirectMessenger, MessageHandler},
	peer::{PeerAddress, PeerId},
	router::{MessageId, ResponseRouter},
};

/// How a member of a [`MemoryNetwork`] treats the messages it gets, to simulate a real network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PeerBehavior {
	#[default]
	Online,
	/// Deliveries fail right away, as for a peer that went offline.
	Unreachable,
	/// Deliveries succeed but nothing is ever processed or answered.
	Silent,
	/// Every message is processed only after the given delay.
	Delayed(Duration),
}

#[derive(Debug)]
enum Delivery {
	OneWay,
	Request(MessageId),
	Response(MessageId),
}

#[derive(Debug)]
struct Envelope {
	from: PeerAddress,
	delivery: Delivery,
	payload: Vec<u8>,
}

type HandlerSlot = Arc<RwLock<Option<Weak<dyn MessageHandler>>>>;

struct Member {
	inbox: mpsc::UnboundedSender<Envelope>,
	behavior: PeerBehavior,
}

/// In process network connecting [`MemoryMessenger`]s, one per simulated device.
#[derive(Default)]
pub struct MemoryNetwork {
	members: RwLock<HashMap<PeerId, Member>>,
}

impl MemoryNetwork {
	#[must_use]
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	/// Adds a device to the network. It stays a member until its messenger is dropped.
	pub fn join(self: &Arc<Self>, address: PeerAddress) -> MemoryMessenger {
		let (inbox, inbox_rx) = mpsc::unbounded_channel();
		let router = Arc::new(ResponseRouter::new());
		let handler = HandlerSlot::default();

		self.members.write().insert(
			address.peer_id,
			Member {
				inbox,
				behavior: PeerBehavior::Online,
			},
		);

		spawn(
			run_inbox(
				Arc::downgrade(self),
				address.clone(),
				inbox_rx,
				Arc::clone(&router),
				Arc::clone(&handler),
			)
			.instrument(tracing::debug_span!("memory_peer", peer = %address.peer_id)),
		);

		debug!(%address, "Peer joined the memory network");

		MemoryMessenger {
			network: Arc::clone(self),
			local: address,
			router,
			handler,
		}
	}

	pub fn set_behavior(&self, peer: PeerId, behavior: PeerBehavior) {
		if let Some(member) = self.members.write().get_mut(&peer) {
			member.behavior = behavior;
		} else {
			warn!(%peer, "Setting the behavior of a peer that is not in the network");
		}
	}

	fn behavior(&self, peer: PeerId) -> PeerBehavior {
		self.members
			.read()
			.get(&peer)
			.map_or(PeerBehavior::Unreachable, |member| member.behavior)
	}

	fn leave(&self, peer: PeerId) {
		if self.members.write().remove(&peer).is_some() {
			debug!(%peer, "Peer left the memory network");
		}
	}

	fn deliver(&self, to: &PeerAddress, envelope: Envelope) -> Result<(), Error> {
		let members = self.members.read();

		let Some(member) = members.get(&to.peer_id) else {
			return Err(Error::Unreachable(to.peer_id));
		};

		if member.behavior == PeerBehavior::Unreachable {
			return Err(Error::Unreachable(to.peer_id));
		}

		member
			.inbox
			.send(envelope)
			.map_err(|_| Error::Unreachable(to.peer_id))
	}
}

async fn run_inbox(
	network: Weak<MemoryNetwork>,
	local: PeerAddress,
	mut inbox_rx: mpsc::UnboundedReceiver<Envelope>,
	router: Arc<ResponseRouter>,
	handler: HandlerSlot,
) {
	while let Some(Envelope {
		from,
		delivery,
		payload,
	}) = inbox_rx.recv().await
	{
		if let Delivery::Response(id) = delivery {
			router.complete(id, payload);
			continue;
		}

		let Some(network) = network.upgrade() else {
			break;
		};

		let delay = match network.behavior(local.peer_id) {
			PeerBehavior::Silent => {
				trace!(%from, "Silent peer drops incoming message");
				continue;
			}
			PeerBehavior::Delayed(delay) => Some(delay),
			PeerBehavior::Online | PeerBehavior::Unreachable => None,
		};

		let Some(handler) = handler.read().as_ref().and_then(Weak::upgrade) else {
			warn!(%from, "No handler registered, dropping incoming message");
			continue;
		};

		let local = local.clone();

		spawn(
			async move {
				if let Some(delay) = delay {
					tokio::time::sleep(delay).await;
				}

				let reply = handler.handle(from.clone(), payload).await;

				match (delivery, reply) {
					(Delivery::Request(id), Some(reply)) => {
						let response = Envelope {
							from: local,
							delivery: Delivery::Response(id),
							payload: reply,
						};
						if let Err(e) = network.deliver(&from, response) {
							debug!(%from, %e, "Couldn't deliver response");
						}
					}
					(Delivery::Request(id), None) => {
						trace!(%id, %from, "Handler chose not to answer request");
					}
					_ => {}
				}
			}
			.in_current_span(),
		);
	}

	trace!("Inbox closed");
}

/// A device's endpoint on a [`MemoryNetwork`]. Dropping it takes the device off the network.
pub struct MemoryMessenger {
	network: Arc<MemoryNetwork>,
	local: PeerAddress,
	router: Arc<ResponseRouter>,
	handler: HandlerSlot,
}

impl MemoryMessenger {
	#[must_use]
	pub fn network(&self) -> &Arc<MemoryNetwork> {
		&self.network
	}
}

impl Drop for MemoryMessenger {
	fn drop(&mut self) {
		self.network.leave(self.local.peer_id);
	}
}

#[async_trait]
impl DirectMessenger for MemoryMessenger {
	fn local_address(&self) -> &PeerAddress {
		&self.local
	}

	fn register_handler(&self, handler: Weak<dyn MessageHandler>) {
		*self.handler.write() = Some(handler);
	}

	async fn send_direct(&self, to: &PeerAddress, payload: Vec<u8>) -> Result<(), Error> {
		self.network.deliver(
			to,
			Envelope {
				from: self.local.clone(),
				delivery: Delivery::OneWay,
				payload,
			},
		)
	}

	async fn request(
		&self,
		to: &PeerAddress,
		payload: Vec<u8>,
		timeout: Duration,
	) -> Result<Vec<u8>, Error> {
		let id = MessageId::new();
		let response_rx = self.router.register(id);

		if let Err(e) = self.network.deliver(
			to,
			Envelope {
				from: self.local.clone(),
				delivery: Delivery::Request(id),
				payload,
			},
		) {
			self.router.forget(id);
			return Err(e);
		}

		match tokio::time::timeout(timeout, response_rx).await {
			Ok(Ok(response)) => Ok(response),
			Ok(Err(_)) => Err(Error::Closed),
			Err(_) => {
				self.router.forget(id);
				Err(Error::Timeout {
					peer: to.peer_id,
					timeout,
				})
			}
		}
	}
}
