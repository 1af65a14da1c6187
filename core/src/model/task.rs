use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::profile::Permission;

/// Something another user or device asked the owner of a queue to do, applied by the owner's
/// master device once it sees the task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfileTask {
	pub id: Uuid,
	/// Milliseconds since the Unix epoch, decides the position in the queue
	pub created_at_ms: u64,
	pub sender: String,
	pub kind: UserProfileTaskKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserProfileTaskKind {
	ShareFolder {
		folder_name: String,
		sharer: String,
		permission: Permission,
	},
	Custom {
		kind: String,
		payload: Vec<u8>,
	},
}

impl UserProfileTask {
	pub fn new(sender: impl Into<String>, created_at_ms: u64, kind: UserProfileTaskKind) -> Self {
		Self {
			id: Uuid::new_v4(),
			created_at_ms,
			sender: sender.into(),
			kind,
		}
	}

	/// Sorts by creation time, the id only breaks ties.
	#[must_use]
	pub fn content_key(&self) -> String {
		format!("{:016x}-{}", self.created_at_ms, self.id.simple())
	}
}
