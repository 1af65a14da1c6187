use std::{collections::BTreeSet, fmt, sync::Arc};

use hv_p2p::PeerAddress;
use parking_lot::Mutex;
use tracing::debug;

use super::election::elect_master;
use crate::{error::ErrorSlot, services::NodeServices, session::Session};

/// Where a liveness and notification round is at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RoundState {
	Init,
	Probing,
	AllResponded,
	TimedOut,
	LocationsUpdated,
	MasterElected,
	NotifySent,
}

impl fmt::Display for RoundState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			Self::Init => "INIT",
			Self::Probing => "PROBING",
			Self::AllResponded => "ALL_RESPONDED",
			Self::TimedOut => "TIMED_OUT",
			Self::LocationsUpdated => "LOCATIONS_UPDATED",
			Self::MasterElected => "MASTER_ELECTED",
			Self::NotifySent => "NOTIFY_SENT",
		};

		f.write_str(name)
	}
}

#[derive(Debug)]
struct Round {
	state: RoundState,
	probed: bool,
	/// Devices that answered the probe, this one included
	live_peers: BTreeSet<PeerAddress>,
	/// Own devices that didn't answer or couldn't be notified
	unreachable: BTreeSet<PeerAddress>,
	master: Option<PeerAddress>,
}

/// State shared by the steps of one process.
///
/// | field         | written by                                   | read by                      |
/// |---------------|----------------------------------------------|------------------------------|
/// | `live_peers`  | `ContactPeersStep`, `SendNotificationsStep`  | election, notifications      |
/// | `unreachable` | `ContactPeersStep`, `SendNotificationsStep`  | locations cleanup            |
/// | `master`      | `ElectMasterStep`                            | task queue draining, callers |
pub struct NotifyProcessContext {
	services: NodeServices,
	session: Arc<Session>,
	round: Mutex<Round>,
	errors: ErrorSlot,
}

impl fmt::Debug for NotifyProcessContext {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("NotifyProcessContext")
			.field("user_id", &self.session.user_id())
			.field("round", &*self.round.lock())
			.finish_non_exhaustive()
	}
}

impl NotifyProcessContext {
	#[must_use]
	pub fn new(services: NodeServices, session: Arc<Session>) -> Arc<Self> {
		let mut live_peers = BTreeSet::new();
		live_peers.insert(session.address().clone());

		Arc::new(Self {
			services,
			session,
			round: Mutex::new(Round {
				state: RoundState::Init,
				probed: false,
				live_peers,
				unreachable: BTreeSet::new(),
				master: None,
			}),
			errors: ErrorSlot::default(),
		})
	}

	#[must_use]
	pub const fn services(&self) -> &NodeServices {
		&self.services
	}

	#[must_use]
	pub const fn session(&self) -> &Arc<Session> {
		&self.session
	}

	#[must_use]
	pub const fn errors(&self) -> &ErrorSlot {
		&self.errors
	}

	#[must_use]
	pub fn state(&self) -> RoundState {
		self.round.lock().state
	}

	pub(crate) fn set_state(&self, state: RoundState) {
		let mut round = self.round.lock();
		debug!(from = %round.state, to = %state, "Round state changed");
		round.state = state;
	}

	/// Whether a liveness probe ran in this process.
	#[must_use]
	pub fn probed(&self) -> bool {
		self.round.lock().probed
	}

	#[must_use]
	pub fn live_peers(&self) -> Vec<PeerAddress> {
		self.round.lock().live_peers.iter().cloned().collect()
	}

	#[must_use]
	pub fn unreachable(&self) -> Vec<PeerAddress> {
		self.round.lock().unreachable.iter().cloned().collect()
	}

	#[must_use]
	pub fn master(&self) -> Option<PeerAddress> {
		self.round.lock().master.clone()
	}

	#[must_use]
	pub fn is_master(&self) -> bool {
		self.round
			.lock()
			.master
			.as_ref()
			.is_some_and(|master| master == self.session.address())
	}

	pub(crate) fn record_probe(
		&self,
		responded: impl IntoIterator<Item = PeerAddress>,
		unreachable: impl IntoIterator<Item = PeerAddress>,
	) {
		let mut round = self.round.lock();
		round.probed = true;
		round.live_peers.extend(responded);
		round.unreachable.extend(unreachable);
	}

	/// An own device that failed to take a message, it's cleaned out of the locations later.
	pub(crate) fn mark_unreachable(&self, address: &PeerAddress) {
		let mut round = self.round.lock();
		round.live_peers.remove(address);
		round.unreachable.insert(address.clone());
	}

	/// Elects among the devices currently known to be live.
	pub(crate) fn elect(&self) -> Option<PeerAddress> {
		let mut round = self.round.lock();
		let master = elect_master(&round.live_peers).cloned();
		round.master.clone_from(&master);
		debug!(from = %round.state, to = %RoundState::MasterElected, "Round state changed");
		round.state = RoundState::MasterElected;
		master
	}
}
