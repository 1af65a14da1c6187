use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies one device, stable across restarts of that device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(Uuid);

impl PeerId {
	#[must_use]
	pub fn new() -> Self {
		Self(Uuid::new_v4())
	}

	#[must_use]
	pub const fn from_uuid(uuid: Uuid) -> Self {
		Self(uuid)
	}
}

impl Default for PeerId {
	fn default() -> Self {
		Self::new()
	}
}

impl FromStr for PeerId {
	type Err = uuid::Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Ok(Self(Uuid::from_str(s)?))
	}
}

impl fmt::Display for PeerId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Where a peer can be reached.
///
/// Addresses are totally ordered by peer id first, which is the order master election relies
/// on: every peer sorting the same set of addresses agrees on who comes first.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PeerAddress {
	pub peer_id: PeerId,
	pub endpoint: String,
}

impl PeerAddress {
	pub fn new(peer_id: PeerId, endpoint: impl Into<String>) -> Self {
		Self {
			peer_id,
			endpoint: endpoint.into(),
		}
	}

	/// An address inside a [`MemoryNetwork`](crate::MemoryNetwork).
	#[must_use]
	pub fn memory(peer_id: PeerId) -> Self {
		Self::new(peer_id, format!("memory://{peer_id}"))
	}
}

impl fmt::Display for PeerAddress {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}@{}", self.peer_id, self.endpoint)
	}
}
