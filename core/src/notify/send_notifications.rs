use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use hv_crypto::PublicKeys;
use hv_p2p::PeerAddress;
use hv_process::{check_interruption, Interrupter, ProcessError, Step};
use tracing::{debug, info, instrument, warn};

use super::context::{NotifyProcessContext, RoundState};
use crate::{
	data::LocationsManager,
	error::Result,
	messages::{Message, Notification},
};

/// Fans a notification out to the devices of a set of users.
///
/// Every other live device of the own user gets the message. Other users get it on one
/// device only: the first of their locations that takes it, their master when it is up.
/// Failed deliveries never fail the process, unreachable own devices are recorded for the
/// locations cleanup.
pub struct SendNotificationsStep {
	context: Arc<NotifyProcessContext>,
	notification: Notification,
	recipients: Vec<String>,
}

impl SendNotificationsStep {
	#[must_use]
	pub fn new(
		context: Arc<NotifyProcessContext>,
		notification: Notification,
		recipients: impl IntoIterator<Item = impl Into<String>>,
	) -> Self {
		Self {
			context,
			notification,
			recipients: recipients.into_iter().map(Into::into).collect(),
		}
	}

	#[instrument(skip_all, fields(notification = ?self.notification))]
	async fn notify_all(&self, interrupter: &Interrupter) -> Result<()> {
		let own_user = self.context.session().user_id();

		for user_id in &self.recipients {
			check_interruption!(interrupter);

			if user_id == own_user {
				self.notify_own_devices(interrupter).await?;
			} else {
				self.notify_other_user(user_id, interrupter).await?;
			}
		}

		self.context.set_state(RoundState::NotifySent);

		Ok(())
	}

	async fn notify_own_devices(&self, interrupter: &Interrupter) -> Result<()> {
		let session = self.context.session();
		let own_address = session.address();

		let targets = if self.context.probed() {
			self.context.live_peers()
		} else {
			session
				.locations_manager(Arc::clone(&self.context.services().data))
				.get_latest()
				.await?
				.map(|(locations, _)| locations.addresses().cloned().collect())
				.unwrap_or_default()
		};
		let targets = targets
			.into_iter()
			.filter(|address| address.peer_id != own_address.peer_id)
			.collect::<Vec<_>>();

		if targets.is_empty() {
			debug!("No other device of this user to notify");
			return Ok(());
		}

		let payload = Message::Notification(self.notification.clone())
			.seal(session.user_id(), &session.key_pair().public_keys())?;

		let outcomes = join_all(
			targets
				.iter()
				.map(|target| self.deliver(target, payload.clone(), interrupter)),
		)
		.await;

		for (target, delivered) in targets.iter().zip(outcomes) {
			let delivered = delivered?;
			if !delivered {
				self.context.mark_unreachable(target);
			}
		}

		Ok(())
	}

	async fn notify_other_user(&self, user_id: &str, interrupter: &Interrupter) -> Result<()> {
		let services = self.context.services();
		let session = self.context.session();

		let keys: PublicKeys = session.public_keys().get(&services.data, user_id).await?;

		let Some((locations, _)) =
			LocationsManager::locations(Arc::clone(&services.data), user_id, None)
				.get_latest()
				.await?
		else {
			info!(user_id, "User has no locations, the notification waits for their next login");
			return Ok(());
		};

		let payload =
			Message::Notification(self.notification.clone()).seal(session.user_id(), &keys)?;

		// Sorted, so the master is tried first
		for target in locations.addresses() {
			if self.deliver(target, payload.clone(), interrupter).await? {
				return Ok(());
			}
		}

		info!(
			user_id,
			devices = locations.len(),
			"No device of the user took the notification, it waits for their next login"
		);

		Ok(())
	}

	/// Whether `target` took the message. Gives up on the remaining attempts once the process
	/// is canceled.
	async fn deliver(
		&self,
		target: &PeerAddress,
		payload: Vec<u8>,
		interrupter: &Interrupter,
	) -> Result<bool> {
		let services = self.context.services();
		let network = &services.config.network;

		let send = services.messenger.send_direct_with_retry(
			target,
			payload,
			network.max_message_send_attempts,
			network.send_retry_backoff(),
		);

		tokio::select! {
			biased;
			() = interrupter.canceled() => {
				debug!(%target, "Canceled while notifying");
				Err(interrupter.cancellation().into())
			}
			res = send => Ok(match res {
				Ok(()) => true,
				Err(e) => {
					warn!(%target, %e, "Notification not delivered");
					false
				}
			}),
		}
	}
}

#[async_trait]
impl Step for SendNotificationsStep {
	fn name(&self) -> &'static str {
		"SendNotificationsStep"
	}

	async fn execute(&mut self, interrupter: &Interrupter) -> std::result::Result<(), ProcessError> {
		let res = self.notify_all(interrupter).await;
		self.context.errors().capture(res)
	}
}
