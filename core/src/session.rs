use std::{collections::HashMap, sync::Arc};

use hv_crypto::{
	derive_user_keys, DerivedKeys, HashingParams, Protected, PublicKeys, SymmetricKey, UserKeyPair,
};
use hv_dht::Key;
use hv_p2p::PeerAddress;
use parking_lot::Mutex;
use tracing::trace;

use crate::{
	data::{
		fetch_public_keys, DataManager, LocationsManager, UserProfileManager,
		USER_PUBLIC_KEY_DOMAIN,
	},
	error::{Error, Result},
};

/// What a user types to log in. Never leaves the device, only the keys derived from it do.
#[derive(Debug, Clone)]
pub struct UserCredentials {
	pub user_id: String,
	password: Protected<String>,
	pin: Protected<String>,
}

impl UserCredentials {
	pub fn new(
		user_id: impl Into<String>,
		password: impl Into<String>,
		pin: impl Into<String>,
	) -> Self {
		Self {
			user_id: user_id.into(),
			password: Protected::new(password.into()),
			pin: Protected::new(pin.into()),
		}
	}

	pub fn derive_keys(&self, params: HashingParams) -> Result<DerivedKeys> {
		Ok(derive_user_keys(
			&self.user_id,
			&self.password,
			&self.pin,
			params,
		)?)
	}
}

/// Public keys of other users, fetched from the DHT once per session.
#[derive(Debug, Default)]
pub struct PublicKeyCache {
	keys: Mutex<HashMap<String, PublicKeys>>,
}

impl PublicKeyCache {
	pub fn insert(&self, user_id: impl Into<String>, keys: PublicKeys) {
		self.keys.lock().insert(user_id.into(), keys);
	}

	pub async fn get(&self, data: &DataManager, user_id: &str) -> Result<PublicKeys> {
		if let Some(keys) = self.keys.lock().get(user_id) {
			return Ok(*keys);
		}

		let keys = fetch_public_keys(data, user_id).await?.ok_or_else(|| {
			Error::NotFound(Key::new(
				user_id,
				USER_PUBLIC_KEY_DOMAIN,
				USER_PUBLIC_KEY_DOMAIN,
			))
		})?;
		trace!(user_id, "Cached public keys");

		self.insert(user_id, keys);
		Ok(keys)
	}
}

/// A logged in user on this node.
#[derive(Debug)]
pub struct Session {
	user_id: String,
	profile_key: SymmetricKey,
	profile_location_key: String,
	key_pair: UserKeyPair,
	address: PeerAddress,
	public_keys: PublicKeyCache,
}

impl Session {
	#[must_use]
	pub fn new(
		user_id: impl Into<String>,
		keys: DerivedKeys,
		key_pair: UserKeyPair,
		address: PeerAddress,
	) -> Arc<Self> {
		let user_id = user_id.into();
		let public_keys = PublicKeyCache::default();
		public_keys.insert(user_id.clone(), key_pair.public_keys());

		Arc::new(Self {
			user_id,
			profile_key: keys.profile_key,
			profile_location_key: keys.profile_location_key,
			key_pair,
			address,
			public_keys,
		})
	}

	#[must_use]
	pub fn user_id(&self) -> &str {
		&self.user_id
	}

	#[must_use]
	pub const fn key_pair(&self) -> &UserKeyPair {
		&self.key_pair
	}

	/// Address of this device.
	#[must_use]
	pub const fn address(&self) -> &PeerAddress {
		&self.address
	}

	#[must_use]
	pub const fn public_keys(&self) -> &PublicKeyCache {
		&self.public_keys
	}

	#[must_use]
	pub fn profile_manager(&self, data: Arc<DataManager>) -> UserProfileManager {
		UserProfileManager::user_profile(
			data,
			&self.profile_location_key,
			self.profile_key.clone(),
			Some(self.key_pair.signing_key().clone()),
		)
	}

	/// Manager of this user's own locations, able to write them.
	#[must_use]
	pub fn locations_manager(&self, data: Arc<DataManager>) -> LocationsManager {
		LocationsManager::locations(
			data,
			&self.user_id,
			Some(self.key_pair.signing_key().clone()),
		)
	}
}
