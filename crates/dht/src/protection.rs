//! Protection keys: once a logical key was written with a protection, only holders of the
//! matching signing key may write to it or remove it.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};

use super::key::{Key, VersionKey};

const CONTEXT: &str = "hivesync 2024-06 dht record protection";

/// Proof that a write or removal was authorized by the holder of a protection key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Protection {
	pub public_key: VerifyingKey,
	pub signature: Signature,
}

impl Protection {
	/// Signs a write of `payload` as `version_key` to `key`. Removals sign an empty payload.
	#[must_use]
	pub fn sign(signing_key: &SigningKey, key: &Key, version_key: VersionKey, payload: &[u8]) -> Self {
		Self {
			public_key: signing_key.verifying_key(),
			signature: signing_key.sign(&message(key, version_key, payload)),
		}
	}

	#[must_use]
	pub fn verify(&self, key: &Key, version_key: VersionKey, payload: &[u8]) -> bool {
		self.public_key
			.verify(&message(key, version_key, payload), &self.signature)
			.is_ok()
	}
}

fn message(key: &Key, version_key: VersionKey, payload: &[u8]) -> [u8; 32] {
	let mut hasher = blake3::Hasher::new_derive_key(CONTEXT);

	for part in [&key.location, &key.domain, &key.content] {
		hasher.update(&(part.len() as u64).to_le_bytes());
		hasher.update(part.as_bytes());
	}

	hasher.update(&version_key.to_bytes());
	hasher.update(payload);

	*hasher.finalize().as_bytes()
}
