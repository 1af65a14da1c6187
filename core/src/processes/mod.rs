//! The processes a node runs, built from the steps of this module and of
//! [`notify`](crate::notify).

use std::sync::Arc;

use hv_process::{AsyncComponent, IntoComponent, ProcessError, SequentialProcess};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::debug;

use crate::{
	error::Result,
	messages::Notification,
	model::{Permission, UserProfile, UserProfileTaskKind},
	node::NodeEvent,
	notify::{
		ContactPeersStep, ElectMasterStep, NotifyProcessContext, RemoveUnreachableLocationsStep,
		SendNotificationsStep, UpdateLocationsStep,
	},
};

mod drain;
mod logout;
mod profile;
mod register;
mod share;

pub use drain::DrainTaskQueueStep;
pub use logout::RemoveOwnLocationStep;
pub use profile::{ProfileChange, UpdateProfileStep};
pub use register::{CreateLocationsStep, CreateProfileStep, PublishPublicKeysStep};
pub use share::EnqueueTaskStep;

fn process(name: &str, context: &NotifyProcessContext) -> SequentialProcess {
	SequentialProcess::named(name)
		.with_async_await_timeout(context.services().config.process.async_await_timeout())
}

/// Claims the user id, then stores the first profile and an empty locations record.
#[must_use]
pub fn register_process(context: &Arc<NotifyProcessContext>) -> SequentialProcess {
	process("RegisterProcess", context)
		.with(PublishPublicKeysStep::new(Arc::clone(context)))
		.with(CreateProfileStep::new(Arc::clone(context)))
		.with(CreateLocationsStep::new(Arc::clone(context)))
}

/// Probes the other devices, updates the locations, elects the master and, on the master,
/// drains the task queue in the background.
#[must_use]
pub fn login_process(
	context: &Arc<NotifyProcessContext>,
	events: broadcast::Sender<NodeEvent>,
) -> SequentialProcess {
	process("LoginProcess", context)
		.with(ContactPeersStep::new(Arc::clone(context)))
		.with(UpdateLocationsStep::new(Arc::clone(context)))
		.with(ElectMasterStep::new(Arc::clone(context)))
		.with(AsyncComponent::new(DrainTaskQueueStep::when_master(
			Arc::clone(context),
			events,
		)))
}

#[must_use]
pub fn logout_process(context: &Arc<NotifyProcessContext>) -> SequentialProcess {
	process("LogoutProcess", context).with(RemoveOwnLocationStep::new(Arc::clone(context)))
}

/// Applies whatever other users queued for this user.
#[must_use]
pub fn drain_task_queue_process(
	context: &Arc<NotifyProcessContext>,
	events: broadcast::Sender<NodeEvent>,
) -> SequentialProcess {
	process("DrainTaskQueueProcess", context)
		.with(DrainTaskQueueStep::new(Arc::clone(context), events))
}

/// Changes the profile and tells the user's other devices about it.
#[must_use]
pub fn update_profile_process(
	context: &Arc<NotifyProcessContext>,
	change: UpdateProfileStep,
) -> SequentialProcess {
	let user_id = context.session().user_id().to_string();

	process("UpdateProfileProcess", context)
		.with(change)
		.with(SendNotificationsStep::new(
			Arc::clone(context),
			Notification::ProfileChanged,
			[user_id],
		))
		.with(RemoveUnreachableLocationsStep::new(Arc::clone(context)))
}

/// Grants `friend` access to `folder`: the permission goes into the own profile, a share task
/// into the friend's queue, then the friend and the own devices are notified.
///
/// A failure before the notifications takes the task back and restores whatever permission
/// the friend had before.
#[must_use]
pub fn share_folder_process(
	context: &Arc<NotifyProcessContext>,
	folder: &str,
	friend: &str,
	permission: Permission,
) -> SequentialProcess {
	let user_id = context.session().user_id().to_string();

	// What the friend had before, put back on rollback
	let previous = Arc::new(Mutex::new(None));

	let share = {
		let (folder, friend) = (folder.to_string(), friend.to_string());
		let previous = Arc::clone(&previous);
		move |profile: &mut UserProfile| {
			*previous.lock() = profile.share_folder(&folder, &friend, permission)?;
			Ok(())
		}
	};
	let restore = {
		let (folder, friend) = (folder.to_string(), friend.to_string());
		move |profile: &mut UserProfile| {
			profile.restore_permission(&folder, &friend, *previous.lock())
		}
	};

	let folder_name = folder
		.trim_matches('/')
		.rsplit('/')
		.next()
		.unwrap_or(folder)
		.to_string();

	process("ShareFolderProcess", context)
		.with(UpdateProfileStep::new(Arc::clone(context), share).with_undo(restore))
		.with(EnqueueTaskStep::new(
			Arc::clone(context),
			friend,
			UserProfileTaskKind::ShareFolder {
				folder_name,
				sharer: user_id.clone(),
				permission,
			},
		))
		.with(SendNotificationsStep::new(
			Arc::clone(context),
			Notification::TaskQueued,
			[friend.to_string()],
		))
		.with(SendNotificationsStep::new(
			Arc::clone(context),
			Notification::ProfileChanged,
			[user_id],
		))
		.with(RemoveUnreachableLocationsStep::new(Arc::clone(context)))
}

/// Runs `process` to completion, bounded by the configured wait timeout. A failure comes back
/// as the typed error of the step that caused it when there is one.
pub async fn run(process: SequentialProcess, context: &NotifyProcessContext) -> Result<()> {
	let timeout = context.services().config.process.wait_timeout();
	let component = process.into_component();
	debug!(process = %component.name(), "Running process");

	component
		.execute_and_wait(timeout)
		.await
		.map_err(|failure| match failure {
			// Whatever a step saw after the cancel, the caller is told about the timeout
			ProcessError::Timeout { .. } => failure.into(),
			failure => context.errors().clone().into_error(failure),
		})
}
