use std::sync::Arc;

use hv_crypto::{PublicKeys, SymmetricKey};
use hv_dht::{Key, Protection, SigningKey, VersionKey, VersionedWrite};
use tracing::{debug, instrument};

use super::{manager::DataManager, version::VersionManager};
use crate::{
	error::{Error, Result},
	model::{Locations, UserProfile},
};

pub const USER_PROFILE_DOMAIN: &str = "USER_PROFILE";
pub const LOCATIONS_DOMAIN: &str = "LOCATIONS";
pub const USER_PUBLIC_KEY_DOMAIN: &str = "USER_PUBLIC_KEY";

pub type UserProfileManager = VersionManager<UserProfile>;
pub type LocationsManager = VersionManager<Locations>;

impl VersionManager<UserProfile> {
	/// The profile lives under a location only its owner can compute, encrypted with a key
	/// only its owner can derive. The signing key is only known once the profile was read.
	#[must_use]
	pub fn user_profile(
		data: Arc<DataManager>,
		profile_location_key: &str,
		profile_key: SymmetricKey,
		signing_key: Option<SigningKey>,
	) -> Self {
		let manager = Self::new(
			data,
			Key::new(profile_location_key, USER_PROFILE_DOMAIN, USER_PROFILE_DOMAIN),
		)
		.encrypted_with(profile_key);

		match signing_key {
			Some(signing_key) => manager.protected_by(signing_key),
			None => manager,
		}
	}
}

impl VersionManager<Locations> {
	/// Locations are public so other users can find the devices of a friend, only the owner
	/// can write them. Readers pass no signing key.
	#[must_use]
	pub fn locations(data: Arc<DataManager>, user_id: &str, signing_key: Option<SigningKey>) -> Self {
		let manager = Self::new(data, Key::new(user_id, LOCATIONS_DOMAIN, LOCATIONS_DOMAIN));

		match signing_key {
			Some(signing_key) => manager.protected_by(signing_key),
			None => manager,
		}
	}
}

fn public_key_key(user_id: &str) -> Key {
	Key::new(user_id, USER_PUBLIC_KEY_DOMAIN, USER_PUBLIC_KEY_DOMAIN)
}

/// Publishes the public keys of a user. A user id can only be claimed once, a second
/// registration fails with [`Error::AlreadyRegistered`].
#[instrument(skip(data, keys, signing_key))]
pub async fn publish_public_keys(
	data: &DataManager,
	user_id: &str,
	keys: &PublicKeys,
	signing_key: &SigningKey,
) -> Result<()> {
	let key = public_key_key(user_id);
	let payload = rmp_serde::to_vec_named(keys)?;
	let protection = Protection::sign(signing_key, &key, VersionKey::UNVERSIONED, &payload);

	let status = data
		.put_if_absent(&key, VersionedWrite::unversioned(payload), Some(protection))
		.await?;

	match status {
		hv_dht::PutStatus::Ok => {
			debug!("Published public keys");
			Ok(())
		}
		hv_dht::PutStatus::FailedNotAbsent => Err(Error::AlreadyRegistered(user_id.to_string())),
		status => Err(Error::from_status(&key, status)),
	}
}

/// Undoes [`publish_public_keys`].
pub async fn unpublish_public_keys(
	data: &DataManager,
	user_id: &str,
	signing_key: &SigningKey,
) -> Result<()> {
	let key = public_key_key(user_id);
	let protection = Protection::sign(signing_key, &key, VersionKey::UNVERSIONED, &[]);

	let status = data.remove(&key, None, Some(protection)).await?;
	if status.is_ok() {
		Ok(())
	} else {
		Err(Error::from_status(&key, status))
	}
}

pub async fn fetch_public_keys(data: &DataManager, user_id: &str) -> Result<Option<PublicKeys>> {
	data.get(&public_key_key(user_id))
		.await?
		.map(|stored| rmp_serde::from_slice(&stored.payload).map_err(Into::into))
		.transpose()
}

#[cfg(test)]
mod tests {
	use hv_crypto::UserKeyPair;
	use hv_dht::MemoryStore;
	use tracing_test::traced_test;

	use super::*;
	use crate::config::NetworkConfig;

	fn data() -> Arc<DataManager> {
		Arc::new(DataManager::new(
			Arc::new(MemoryStore::default()),
			Arc::new(hv_dht::SystemTimeSource),
			&NetworkConfig::default(),
		))
	}

	#[tokio::test]
	#[traced_test]
	async fn user_ids_are_claimed_once() {
		let data = data();
		let alice = UserKeyPair::generate();
		let impostor = UserKeyPair::generate();

		assert_eq!(fetch_public_keys(&data, "alice").await.unwrap(), None);

		publish_public_keys(&data, "alice", &alice.public_keys(), alice.signing_key())
			.await
			.unwrap();

		assert!(matches!(
			publish_public_keys(&data, "alice", &impostor.public_keys(), impostor.signing_key())
				.await,
			Err(Error::AlreadyRegistered(user)) if user == "alice"
		));
		assert_eq!(
			fetch_public_keys(&data, "alice").await.unwrap(),
			Some(alice.public_keys())
		);

		assert!(unpublish_public_keys(&data, "alice", impostor.signing_key())
			.await
			.is_err());
		unpublish_public_keys(&data, "alice", alice.signing_key())
			.await
			.unwrap();
		assert_eq!(fetch_public_keys(&data, "alice").await.unwrap(), None);
	}

	#[tokio::test]
	#[traced_test]
	async fn anybody_reads_locations_only_the_owner_writes() {
		let data = data();
		let alice = UserKeyPair::generate();

		let owner = LocationsManager::locations(
			Arc::clone(&data),
			"alice",
			Some(alice.signing_key().clone()),
		);
		owner.ready_to_put(&Locations::new("alice"), None).await.unwrap();

		let reader = LocationsManager::locations(Arc::clone(&data), "alice", None);
		let (locations, token) = reader.get().await.unwrap();
		assert_eq!(locations.user_id, "alice");

		assert!(matches!(
			reader.ready_to_put(&locations, Some(token)).await,
			Err(Error::PutRefused { .. })
		));
	}
}
