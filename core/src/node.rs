use std::sync::{
	atomic::{AtomicBool, Ordering},
	Arc,
};

use async_trait::async_trait;
use hv_crypto::{HashingParams, UserKeyPair};
use hv_p2p::{MessageHandler, PeerAddress};
use hv_process::IntoComponent;
use parking_lot::RwLock;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, instrument, warn};

use crate::{
	data::UserProfileManager,
	error::{Error, Result},
	messages::{contact_evidence_message, Message, Notification},
	model::{Permission, UserProfile, UserProfileTask},
	notify::NotifyProcessContext,
	processes::{self, UpdateProfileStep},
	services::NodeServices,
	session::{Session, UserCredentials},
};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// What a node reports to whoever drives it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
	Notified {
		from_user: String,
		notification: Notification,
	},
	TaskApplied(UserProfileTask),
}

/// One device: wires the services together, answers direct messages and runs the user facing
/// processes.
pub struct PeerNode {
	services: NodeServices,
	hashing: HashingParams,
	session: RwLock<Option<Arc<Session>>>,
	/// Held for the whole of a login or logout, so they never interleave
	session_change: Mutex<()>,
	master: AtomicBool,
	events: broadcast::Sender<NodeEvent>,
}

impl PeerNode {
	/// Creates the node and registers it with the messenger for incoming messages.
	#[must_use]
	pub fn new(services: NodeServices, hashing: HashingParams) -> Arc<Self> {
		let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

		let node = Arc::new(Self {
			services,
			hashing,
			session: RwLock::new(None),
			session_change: Mutex::new(()),
			master: AtomicBool::new(false),
			events,
		});

		let handler: Arc<dyn MessageHandler> = Arc::clone(&node) as _;
		node.services.messenger.register_handler(Arc::downgrade(&handler));

		node
	}

	#[must_use]
	pub fn address(&self) -> &PeerAddress {
		self.services.messenger.local_address()
	}

	#[must_use]
	pub fn subscribe(&self) -> broadcast::Receiver<NodeEvent> {
		self.events.subscribe()
	}

	pub fn session(&self) -> Result<Arc<Session>> {
		self.session.read().clone().ok_or(Error::NotLoggedIn)
	}

	#[must_use]
	pub fn is_logged_in(&self) -> bool {
		self.session.read().is_some()
	}

	/// Whether this device was elected master at its last login.
	#[must_use]
	pub fn is_master(&self) -> bool {
		self.master.load(Ordering::Acquire)
	}

	fn context(&self, session: Arc<Session>) -> Arc<NotifyProcessContext> {
		NotifyProcessContext::new(self.services.clone(), session)
	}

	/// Creates the user: claims the user id and stores a fresh profile and empty locations.
	/// Doesn't log in.
	#[instrument(skip_all, fields(user_id = %credentials.user_id), err)]
	pub async fn register(&self, credentials: &UserCredentials) -> Result<()> {
		let keys = credentials.derive_keys(self.hashing)?;
		let session = Session::new(
			&credentials.user_id,
			keys,
			UserKeyPair::generate(),
			self.address().clone(),
		);

		let context = self.context(session);
		processes::run(processes::register_process(&context), &context).await
	}

	#[instrument(skip_all, fields(user_id = %credentials.user_id, address = %self.address()), err)]
	pub async fn login(&self, credentials: &UserCredentials) -> Result<()> {
		let _session_change = self.session_change.lock().await;

		if let Some(session) = self.session.read().as_ref() {
			return Err(Error::AlreadyLoggedIn(session.user_id().to_string()));
		}

		let keys = credentials.derive_keys(self.hashing)?;
		let (profile, _) = UserProfileManager::user_profile(
			Arc::clone(&self.services.data),
			&keys.profile_location_key,
			keys.profile_key.clone(),
			None,
		)
		.get()
		.await?;

		let session = Session::new(
			&credentials.user_id,
			keys,
			profile.key_pair(),
			self.address().clone(),
		);

		// Other devices may probe this one while it logs in
		*self.session.write() = Some(Arc::clone(&session));

		let context = self.context(session);
		if let Err(e) = processes::run(
			processes::login_process(&context, self.events.clone()),
			&context,
		)
		.await
		{
			*self.session.write() = None;
			return Err(e);
		}

		self.master.store(context.is_master(), Ordering::Release);
		info!(is_master = context.is_master(), "Logged in");

		Ok(())
	}

	#[instrument(skip_all, err)]
	pub async fn logout(&self) -> Result<()> {
		let _session_change = self.session_change.lock().await;
		let session = self.session()?;

		let context = self.context(session);
		processes::run(processes::logout_process(&context), &context).await?;

		*self.session.write() = None;
		self.master.store(false, Ordering::Release);

		Ok(())
	}

	pub async fn profile(&self) -> Result<UserProfile> {
		let session = self.session()?;

		Ok(session
			.profile_manager(Arc::clone(&self.services.data))
			.get()
			.await?
			.0)
	}

	/// Creates a folder in the profile and tells the other devices of the user.
	#[instrument(skip(self), err)]
	pub async fn add_folder(&self, path: &str) -> Result<()> {
		let context = self.context(self.session()?);

		let path = path.to_string();
		let change = UpdateProfileStep::new(Arc::clone(&context), move |profile| {
			profile.add_folder(&path)
		});

		processes::run(processes::update_profile_process(&context, change), &context).await
	}

	#[instrument(skip(self), err)]
	pub async fn share_folder(&self, folder: &str, friend: &str, permission: Permission) -> Result<()> {
		let context = self.context(self.session()?);

		processes::run(
			processes::share_folder_process(&context, folder, friend, permission),
			&context,
		)
		.await
	}

	/// Applies the queued tasks of the logged in user in the background.
	fn drain_task_queue(&self, session: Arc<Session>) {
		let context = self.context(session);

		let handle = processes::drain_task_queue_process(&context, self.events.clone())
			.into_component()
			.start();
		debug!(process_id = %handle.id(), "Draining task queue");
	}

	fn on_notification(&self, session: Arc<Session>, from_user: String, notification: Notification) {
		debug!(%from_user, ?notification, "Notified");

		if notification == Notification::TaskQueued && self.is_master() {
			self.drain_task_queue(session);
		}

		// Nobody listening is fine
		let _ = self.events.send(NodeEvent::Notified {
			from_user,
			notification,
		});
	}

	fn answer_probe(&self, session: &Session, sender: &str, challenge: &[u8; 32]) -> Option<Vec<u8>> {
		if sender != session.user_id() {
			warn!(%sender, "Liveness probe from another user");
			return None;
		}

		let evidence = session
			.key_pair()
			.sign(&contact_evidence_message(challenge, session.address()));

		Message::ContactPeerResponse { evidence }
			.seal(session.user_id(), &session.key_pair().public_keys())
			.map_err(|e| error!(%e, "Failed to seal liveness evidence"))
			.ok()
	}
}

#[async_trait]
impl MessageHandler for PeerNode {
	async fn handle(&self, from: PeerAddress, payload: Vec<u8>) -> Option<Vec<u8>> {
		let Some(session) = self.session.read().clone() else {
			debug!(%from, "Not logged in, ignoring message");
			return None;
		};

		let (sender, message) = match Message::open(&payload, session.key_pair()) {
			Ok(opened) => opened,
			Err(e) => {
				warn!(%from, %e, "Dropping undecipherable message");
				return None;
			}
		};

		match message {
			Message::ContactPeer { challenge } => self.answer_probe(&session, &sender, &challenge),
			Message::Notification(notification) => {
				self.on_notification(session, sender, notification);
				None
			}
			message @ Message::ContactPeerResponse { .. } => {
				warn!(%from, %sender, ?message, "Unsolicited message");
				None
			}
		}
	}
}
