//! Everything a user's devices need is derived from their credentials, nothing secret is ever
//! stored or transmitted in clear.
//!
//! Argon2id stretches the password, salted with the user id and pin, into key material. Half of
//! it becomes the symmetric key protecting the user profile, the other half is hashed into the
//! location key under which the profile is stored, so only credential holders can find it.

use argon2::{Algorithm, Argon2, Params, Version};
use zeroize::Zeroize;

use super::{
	error::{Error, Result},
	protected::Protected,
	symmetric::{SymmetricKey, KEY_LEN},
};

const SALT_CONTEXT: &str = "hivesync 2024-06 user profile salt";
const LOCATION_CONTEXT: &str = "hivesync 2024-06 user profile location";

/// Password hashing cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashingParams {
	Standard,
	/// Cheap enough for tests, never use it for real credentials.
	Insecure,
}

impl HashingParams {
	fn argon2_params(self) -> Result<Params> {
		let (memory_kib, iterations) = match self {
			Self::Standard => (65_536, 3),
			Self::Insecure => (64, 1),
		};

		Params::new(memory_kib, iterations, 1, Some(2 * KEY_LEN))
			.map_err(|e| Error::KeyDerivation(e.to_string()))
	}
}

/// Keys derived from a user's credentials.
#[derive(Debug, Clone)]
pub struct DerivedKeys {
	pub profile_key: SymmetricKey,
	/// Hex encoded, usable as a DHT location.
	pub profile_location_key: String,
}

pub fn derive_user_keys(
	user_id: &str,
	password: &Protected<String>,
	pin: &Protected<String>,
	params: HashingParams,
) -> Result<DerivedKeys> {
	let salt = {
		let mut hasher = blake3::Hasher::new_derive_key(SALT_CONTEXT);
		hasher.update(user_id.as_bytes());
		hasher.update(&[0]);
		hasher.update(pin.expose().as_bytes());
		*hasher.finalize().as_bytes()
	};

	let mut material = [0_u8; 2 * KEY_LEN];

	Argon2::new(Algorithm::Argon2id, Version::V0x13, params.argon2_params()?)
		.hash_password_into(password.expose().as_bytes(), &salt, &mut material)
		.map_err(|e| Error::KeyDerivation(e.to_string()))?;

	let output = Protected::new(material);
	material.zeroize();

	let mut profile_key = [0_u8; KEY_LEN];
	profile_key.copy_from_slice(&output.expose()[..KEY_LEN]);

	let profile_location_key = blake3::derive_key(LOCATION_CONTEXT, &output.expose()[KEY_LEN..]);

	let keys = DerivedKeys {
		profile_key: SymmetricKey::new(profile_key),
		profile_location_key: to_hex(&profile_location_key),
	};
	profile_key.zeroize();

	Ok(keys)
}

fn to_hex(bytes: &[u8]) -> String {
	use std::fmt::Write;

	bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, byte| {
		let _ = write!(out, "{byte:02x}");
		out
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	fn derive(user: &str, password: &str, pin: &str) -> DerivedKeys {
		derive_user_keys(
			user,
			&Protected::new(password.to_string()),
			&Protected::new(pin.to_string()),
			HashingParams::Insecure,
		)
		.unwrap()
	}

	#[test]
	fn derivation_is_deterministic() {
		let first = derive("alice", "correct horse", "1234");
		let second = derive("alice", "correct horse", "1234");

		assert_eq!(first.profile_key, second.profile_key);
		assert_eq!(first.profile_location_key, second.profile_location_key);
		assert_eq!(first.profile_location_key.len(), 64);
	}

	#[test]
	fn every_credential_matters() {
		let base = derive("alice", "correct horse", "1234");

		for other in [
			derive("bob", "correct horse", "1234"),
			derive("alice", "battery staple", "1234"),
			derive("alice", "correct horse", "4321"),
		] {
			assert_ne!(base.profile_key, other.profile_key);
			assert_ne!(base.profile_location_key, other.profile_location_key);
		}
	}
}
