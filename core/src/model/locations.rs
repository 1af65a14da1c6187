use std::collections::BTreeSet;

use hv_p2p::PeerAddress;
use serde::{Deserialize, Serialize};

/// The devices a user is currently logged in on.
///
/// Addresses are kept sorted, so the first one is the master for anybody reading the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locations {
	pub user_id: String,
	addresses: BTreeSet<PeerAddress>,
}

impl Locations {
	pub fn new(user_id: impl Into<String>) -> Self {
		Self {
			user_id: user_id.into(),
			addresses: BTreeSet::new(),
		}
	}

	/// Returns `false` if the address was already listed.
	pub fn add(&mut self, address: PeerAddress) -> bool {
		self.addresses.insert(address)
	}

	/// Returns `false` if the address wasn't listed.
	pub fn remove(&mut self, address: &PeerAddress) -> bool {
		self.addresses.remove(address)
	}

	#[must_use]
	pub fn contains(&self, address: &PeerAddress) -> bool {
		self.addresses.contains(address)
	}

	pub fn addresses(&self) -> impl Iterator<Item = &PeerAddress> + '_ {
		self.addresses.iter()
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.addresses.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.addresses.is_empty()
	}

	#[must_use]
	pub fn master(&self) -> Option<&PeerAddress> {
		self.addresses.first()
	}
}

#[cfg(test)]
mod tests {
	use hv_p2p::PeerId;
	use uuid::Uuid;

	use super::*;

	fn address(n: u128) -> PeerAddress {
		PeerAddress::memory(PeerId::from_uuid(Uuid::from_u128(n)))
	}

	#[test]
	fn first_address_is_master() {
		let mut locations = Locations::new("alice");
		assert_eq!(locations.master(), None);

		assert!(locations.add(address(3)));
		assert!(locations.add(address(1)));
		assert!(!locations.add(address(1)));
		assert!(locations.add(address(2)));

		assert_eq!(locations.master(), Some(&address(1)));
		assert_eq!(locations.len(), 3);

		assert!(locations.remove(&address(1)));
		assert!(!locations.remove(&address(1)));
		assert_eq!(locations.master(), Some(&address(2)));
	}
}
