use std::sync::Arc;

use async_trait::async_trait;
use hv_process::{check_interruption, Interrupter, ProcessError, Step};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument};

use super::profile::modify_profile;
use crate::{
	error::Result,
	model::{UserProfileTask, UserProfileTaskKind},
	node::NodeEvent,
	notify::NotifyProcessContext,
	queue::UserProfileTaskQueue,
};

/// Applies the tasks queued for the user, oldest first, removing each once applied.
///
/// Applying a task twice is harmless, so two devices draining at once only cost duplicate
/// work.
pub struct DrainTaskQueueStep {
	context: Arc<NotifyProcessContext>,
	events: broadcast::Sender<NodeEvent>,
	only_if_master: bool,
}

impl DrainTaskQueueStep {
	#[must_use]
	pub const fn new(context: Arc<NotifyProcessContext>, events: broadcast::Sender<NodeEvent>) -> Self {
		Self {
			context,
			events,
			only_if_master: false,
		}
	}

	/// Drains only if this device was elected master earlier in the process.
	#[must_use]
	pub const fn when_master(
		context: Arc<NotifyProcessContext>,
		events: broadcast::Sender<NodeEvent>,
	) -> Self {
		Self {
			context,
			events,
			only_if_master: true,
		}
	}

	#[instrument(skip_all, fields(user_id = %self.context.session().user_id()))]
	async fn drain(&self, interrupter: &Interrupter) -> Result<()> {
		if self.only_if_master && !self.context.is_master() {
			debug!(master = ?self.context.master(), "Not the master, leaving the queue to it");
			return Ok(());
		}

		let session = self.context.session();
		let queue = UserProfileTaskQueue::new(Arc::clone(&self.context.services().data));
		let mut applied = 0_usize;

		while let Some(task) = queue
			.dequeue_oldest(session.user_id(), session.key_pair())
			.await?
		{
			self.apply(&task).await?;
			queue.remove(session.user_id(), &task).await?;
			applied += 1;

			// Nobody listening is fine
			let _ = self.events.send(NodeEvent::TaskApplied(task));

			check_interruption!(interrupter);
		}

		if applied > 0 {
			info!(applied, "Applied queued tasks");
		}

		Ok(())
	}

	async fn apply(&self, task: &UserProfileTask) -> Result<()> {
		debug!(task_id = %task.id, sender = %task.sender, "Applying queued task");

		match &task.kind {
			UserProfileTaskKind::ShareFolder {
				folder_name,
				sharer,
				permission,
			} => {
				let mounted_as = Mutex::new(None);
				modify_profile(&self.context, &|profile| {
					*mounted_as.lock() =
						Some(profile.accept_shared_folder(folder_name, sharer, *permission));
					Ok(())
				})
				.await?;

				if let Some(mounted_as) = mounted_as.into_inner() {
					if mounted_as != *folder_name {
						info!(
							%folder_name,
							%mounted_as,
							"Shared folder name was taken, mounted under another one"
						);
					}
				}
			}
			UserProfileTaskKind::Custom { kind, .. } => {
				debug!(kind, "Custom task is only announced");
			}
		}

		Ok(())
	}
}

#[async_trait]
impl Step for DrainTaskQueueStep {
	fn name(&self) -> &'static str {
		"DrainTaskQueueStep"
	}

	async fn execute(&mut self, interrupter: &Interrupter) -> std::result::Result<(), ProcessError> {
		let res = self.drain(interrupter).await;
		self.context.errors().capture(res)
	}
}
