//! Per user key pairs: ed25519 for signatures and x25519 for sealing payloads to a user.
//!
//! Sealed payloads are laid out as `ephemeral public key || symmetric ciphertext`. The
//! symmetric key is derived with blake3 from the Diffie-Hellman shared secret and both public
//! keys, so it is unique per message.

use std::fmt;

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};

use super::{
	error::{Error, Result},
	symmetric::{SymmetricKey, KEY_LEN},
};

const SEAL_CONTEXT: &str = "hivesync 2024-06 sealed payload key";

/// The public half of a [`UserKeyPair`], the form in which keys are published and cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicKeys {
	pub signing: [u8; 32],
	pub encryption: [u8; 32],
}

impl PublicKeys {
	pub fn verifying_key(&self) -> Result<VerifyingKey> {
		VerifyingKey::from_bytes(&self.signing).map_err(|_| Error::InvalidPublicKey)
	}

	/// Encrypts `plaintext` so that only the holder of the matching key pair can read it.
	pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
		let recipient = PublicKey::from(self.encryption);
		let ephemeral = EphemeralSecret::random_from_rng(OsRng);
		let ephemeral_public = PublicKey::from(&ephemeral);

		let shared = ephemeral.diffie_hellman(&recipient);
		let key = seal_key(shared.as_bytes(), &ephemeral_public, &recipient);

		let ciphertext = key.encrypt(plaintext)?;

		let mut out = Vec::with_capacity(KEY_LEN + ciphertext.len());
		out.extend_from_slice(ephemeral_public.as_bytes());
		out.extend_from_slice(&ciphertext);
		Ok(out)
	}

	pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<()> {
		let signature = Signature::from_slice(signature).map_err(|_| Error::BadSignature)?;

		self.verifying_key()?
			.verify(message, &signature)
			.map_err(|_| Error::BadSignature)
	}
}

/// A user's secret keys.
#[derive(Clone)]
pub struct UserKeyPair {
	signing: SigningKey,
	encryption: StaticSecret,
}

impl fmt::Debug for UserKeyPair {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("UserKeyPair")
			.field("public", &self.public_keys())
			.finish_non_exhaustive()
	}
}

impl UserKeyPair {
	#[must_use]
	pub fn generate() -> Self {
		Self {
			signing: SigningKey::generate(&mut OsRng),
			encryption: StaticSecret::random_from_rng(OsRng),
		}
	}

	#[must_use]
	pub fn public_keys(&self) -> PublicKeys {
		PublicKeys {
			signing: self.signing.verifying_key().to_bytes(),
			encryption: PublicKey::from(&self.encryption).to_bytes(),
		}
	}

	/// The ed25519 key, also used to protect DHT records owned by this user.
	#[must_use]
	pub const fn signing_key(&self) -> &SigningKey {
		&self.signing
	}

	#[must_use]
	pub fn sign(&self, message: &[u8]) -> Vec<u8> {
		self.signing.sign(message).to_vec()
	}

	pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>> {
		if sealed.len() < KEY_LEN {
			return Err(Error::Truncated);
		}

		let (ephemeral_public, ciphertext) = sealed.split_at(KEY_LEN);
		let mut ephemeral_bytes = [0; KEY_LEN];
		ephemeral_bytes.copy_from_slice(ephemeral_public);
		let ephemeral_public = PublicKey::from(ephemeral_bytes);

		let own_public = PublicKey::from(&self.encryption);
		let shared = self.encryption.diffie_hellman(&ephemeral_public);

		seal_key(shared.as_bytes(), &ephemeral_public, &own_public).decrypt(ciphertext)
	}

	/// Serializable form, for storing the key pair inside the encrypted user profile.
	#[must_use]
	pub fn to_secret_bytes(&self) -> ([u8; 32], [u8; 32]) {
		(self.signing.to_bytes(), self.encryption.to_bytes())
	}

	#[must_use]
	pub fn from_secret_bytes(signing: [u8; 32], encryption: [u8; 32]) -> Self {
		Self {
			signing: SigningKey::from_bytes(&signing),
			encryption: StaticSecret::from(encryption),
		}
	}
}

fn seal_key(shared: &[u8; 32], ephemeral: &PublicKey, recipient: &PublicKey) -> SymmetricKey {
	let mut hasher = blake3::Hasher::new_derive_key(SEAL_CONTEXT);
	hasher.update(shared);
	hasher.update(ephemeral.as_bytes());
	hasher.update(recipient.as_bytes());

	SymmetricKey::new(*hasher.finalize().as_bytes())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn only_the_recipient_can_open() {
		let recipient = UserKeyPair::generate();
		let stranger = UserKeyPair::generate();

		let sealed = recipient.public_keys().seal(b"folder shared with you").unwrap();

		assert_eq!(recipient.open(&sealed).unwrap(), b"folder shared with you");
		assert_eq!(stranger.open(&sealed), Err(Error::Decrypt));
		assert_eq!(recipient.open(&sealed[..8]), Err(Error::Truncated));
	}

	#[test]
	fn signatures_verify_against_published_keys() {
		let signer = UserKeyPair::generate();
		let signature = signer.sign(b"evidence");

		assert_eq!(signer.public_keys().verify(b"evidence", &signature), Ok(()));
		assert_eq!(
			signer.public_keys().verify(b"tampered", &signature),
			Err(Error::BadSignature)
		);
		assert_eq!(
			UserKeyPair::generate()
				.public_keys()
				.verify(b"evidence", &signature),
			Err(Error::BadSignature)
		);
	}

	#[test]
	fn secret_bytes_roundtrip_keeps_identity() {
		let pair = UserKeyPair::generate();
		let (signing, encryption) = pair.to_secret_bytes();
		let restored = UserKeyPair::from_secret_bytes(signing, encryption);

		assert_eq!(pair.public_keys(), restored.public_keys());
	}

	#[test]
	fn public_keys_serialize() {
		let keys = UserKeyPair::generate().public_keys();
		let bytes = rmp_serde::to_vec(&keys).unwrap();

		assert_eq!(rmp_serde::from_slice::<PublicKeys>(&bytes).unwrap(), keys);
	}
}
