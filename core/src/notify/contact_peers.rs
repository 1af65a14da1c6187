use std::{
	collections::BTreeSet,
	sync::{
		atomic::{AtomicBool, Ordering},
		Arc,
	},
	time::Duration,
};

use async_trait::async_trait;
use hv_p2p::PeerAddress;
use hv_process::{Interrupter, ProcessError, Step};
use parking_lot::Mutex;
use tracing::{debug, info, instrument, trace, warn};

use super::{
	context::{NotifyProcessContext, RoundState},
	latch::CountDownLatch,
};
use crate::{
	error::{Error, Result},
	messages::{contact_evidence_message, Message},
};

/// Probes every other device listed in the user's locations and records who answered within
/// the contact window.
///
/// Answers arriving after the window closed are logged and dropped, the round keeps the
/// outcome it had at the deadline.
pub struct ContactPeersStep {
	context: Arc<NotifyProcessContext>,
}

impl ContactPeersStep {
	#[must_use]
	pub const fn new(context: Arc<NotifyProcessContext>) -> Self {
		Self { context }
	}

	#[instrument(skip_all, fields(user_id = %self.context.session().user_id()))]
	async fn probe(&self, interrupter: &Interrupter) -> Result<()> {
		let services = self.context.services();
		let session = self.context.session();
		let own_address = session.address();

		let targets = session
			.locations_manager(Arc::clone(&services.data))
			.get_latest()
			.await?
			.map(|(locations, _)| {
				locations
					.addresses()
					.filter(|address| address.peer_id != own_address.peer_id)
					.cloned()
					.collect::<Vec<_>>()
			})
			.unwrap_or_default();

		self.context.set_state(RoundState::Probing);

		let window = services.config.network.contact_peers_await();
		let latch = Arc::new(CountDownLatch::new(targets.len()));
		let closed = Arc::new(AtomicBool::new(false));
		let responded = Arc::new(Mutex::new(BTreeSet::new()));

		for target in &targets {
			tokio::spawn(probe_peer(
				Arc::clone(&self.context),
				target.clone(),
				window,
				Arc::clone(&latch),
				Arc::clone(&closed),
				Arc::clone(&responded),
			));
		}

		let all_responded = tokio::select! {
			all_responded = latch.await_timeout(window) => all_responded,
			() = interrupter.canceled() => {
				closed.store(true, Ordering::SeqCst);
				return Err(Error::Process(interrupter.cancellation()));
			}
		};
		let responded = {
			let mut responded = responded.lock();
			closed.store(true, Ordering::SeqCst);
			std::mem::take(&mut *responded)
		};
		let unreachable = targets
			.into_iter()
			.filter(|target| !responded.contains(target))
			.collect::<Vec<_>>();

		if all_responded {
			self.context.set_state(RoundState::AllResponded);
		} else {
			info!(
				responded = responded.len(),
				unreachable = unreachable.len(),
				?window,
				"Not every device answered the liveness probe in time"
			);
			self.context.set_state(RoundState::TimedOut);
		}

		self.context.record_probe(responded, unreachable);

		Ok(())
	}
}

async fn probe_peer(
	context: Arc<NotifyProcessContext>,
	target: PeerAddress,
	window: Duration,
	latch: Arc<CountDownLatch>,
	closed: Arc<AtomicBool>,
	responded: Arc<Mutex<BTreeSet<PeerAddress>>>,
) {
	let session = context.session();
	let own_keys = session.key_pair().public_keys();
	let challenge = rand::random::<[u8; 32]>();

	let request = match (Message::ContactPeer { challenge }).seal(session.user_id(), &own_keys) {
		Ok(request) => request,
		Err(e) => {
			warn!(%target, %e, "Failed to seal liveness probe");
			return;
		}
	};

	let response = match context
		.services()
		.messenger
		.request(&target, request, window)
		.await
	{
		Ok(response) => response,
		Err(e) => {
			debug!(%target, %e, "Device did not answer the liveness probe");
			return;
		}
	};

	let verified = match Message::open(&response, session.key_pair()) {
		Ok((sender, Message::ContactPeerResponse { evidence })) if sender == session.user_id() => {
			own_keys
				.verify(&contact_evidence_message(&challenge, &target), &evidence)
				.is_ok()
		}
		Ok((sender, message)) => {
			warn!(%target, %sender, ?message, "Unexpected answer to a liveness probe");
			false
		}
		Err(e) => {
			warn!(%target, %e, "Undecipherable answer to a liveness probe");
			false
		}
	};

	if !verified {
		warn!(%target, "Liveness evidence did not verify");
		return;
	}

	// The round closes under this lock, an answer is either counted or discarded
	let mut responded = responded.lock();
	if closed.load(Ordering::SeqCst) {
		debug!(%target, "Discarding delayed liveness response");
		return;
	}

	trace!(%target, "Device is alive");
	responded.insert(target);
	latch.count_down();
}

#[async_trait]
impl Step for ContactPeersStep {
	fn name(&self) -> &'static str {
		"ContactPeersStep"
	}

	async fn execute(&mut self, interrupter: &Interrupter) -> std::result::Result<(), ProcessError> {
		let res = self.probe(interrupter).await;
		self.context.errors().capture(res)
	}
}
