//! Per user mailbox of [`UserProfileTask`]s, stored in the DHT.
//!
//! Anybody can drop a task into a user's queue, only the user can read it: tasks are sealed
//! to the user's public keys. Content keys start with the creation timestamp, so listing the
//! queue yields tasks oldest first.

use std::sync::Arc;

use hv_crypto::{PublicKeys, UserKeyPair};
use hv_dht::{Key, VersionedWrite};
use tracing::{debug, instrument, warn};

use crate::{
	data::DataManager,
	error::{Error, Result},
	model::UserProfileTask,
};

pub const USER_PROFILE_TASK_DOMAIN: &str = "USER_PROFILE_TASK";

#[derive(Debug, Clone)]
pub struct UserProfileTaskQueue {
	data: Arc<DataManager>,
}

impl UserProfileTaskQueue {
	#[must_use]
	pub const fn new(data: Arc<DataManager>) -> Self {
		Self { data }
	}

	fn key(user_id: &str, content_key: impl Into<String>) -> Key {
		Key::new(user_id, USER_PROFILE_TASK_DOMAIN, content_key)
	}

	#[instrument(skip(self, task, recipient), fields(task_id = %task.id), err)]
	pub async fn enqueue(
		&self,
		target_user: &str,
		task: &UserProfileTask,
		recipient: &PublicKeys,
	) -> Result<()> {
		let key = Self::key(target_user, task.content_key());
		let payload = recipient.seal(&rmp_serde::to_vec_named(task)?)?;

		let status = self
			.data
			.put_if_absent(&key, VersionedWrite::unversioned(payload), None)
			.await?;

		if !status.is_ok() {
			return Err(Error::from_status(&key, status));
		}

		debug!("Task queued");
		Ok(())
	}

	/// The oldest task of the queue, left in place until [`UserProfileTaskQueue::remove`].
	///
	/// Entries that don't open with `key_pair` are skipped, they weren't meant for this user.
	pub async fn dequeue_oldest(
		&self,
		user_id: &str,
		key_pair: &UserKeyPair,
	) -> Result<Option<UserProfileTask>> {
		for content_key in self
			.data
			.list_content_keys(user_id, USER_PROFILE_TASK_DOMAIN)
			.await?
		{
			let key = Self::key(user_id, content_key);

			// Removed by another device in the meantime
			let Some(stored) = self.data.get(&key).await? else {
				continue;
			};

			let task = key_pair
				.open(&stored.payload)
				.map_err(Error::from)
				.and_then(|bytes| rmp_serde::from_slice(&bytes).map_err(Error::from));

			match task {
				Ok(task) => return Ok(Some(task)),
				Err(e) => warn!(%key, %e, "Skipping unreadable task"),
			}
		}

		Ok(None)
	}

	pub async fn remove(&self, user_id: &str, task: &UserProfileTask) -> Result<()> {
		let key = Self::key(user_id, task.content_key());
		let status = self.data.remove(&key, None, None).await?;

		if status.is_ok() {
			debug!(%key, "Task removed");
			Ok(())
		} else {
			Err(Error::from_status(&key, status))
		}
	}
}
