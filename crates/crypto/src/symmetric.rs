//! Authenticated symmetric encryption with XChaCha20-Poly1305.
//!
//! Ciphertexts are laid out as `nonce || sealed`, the random 24 byte nonce makes reusing a
//! key for many payloads safe.

use chacha20poly1305::{
	aead::{Aead, AeadCore, KeyInit, OsRng},
	XChaCha20Poly1305, XNonce,
};
use rand::RngCore;
use zeroize::Zeroize;

use super::{
	error::{Error, Result},
	protected::Protected,
};

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 24;

/// A 256 bit symmetric key.
#[derive(Clone, Debug)]
pub struct SymmetricKey(Protected<[u8; KEY_LEN]>);

impl SymmetricKey {
	#[must_use]
	pub const fn new(bytes: [u8; KEY_LEN]) -> Self {
		Self(Protected::new(bytes))
	}

	#[must_use]
	pub fn generate() -> Self {
		let mut bytes = [0; KEY_LEN];
		rand::rngs::OsRng.fill_bytes(&mut bytes);
		let key = Self::new(bytes);
		bytes.zeroize();
		key
	}

	#[must_use]
	pub const fn expose(&self) -> &[u8; KEY_LEN] {
		self.0.expose()
	}

	pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
		let cipher = XChaCha20Poly1305::new(self.expose().into());
		let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);

		let sealed = cipher.encrypt(&nonce, plaintext).map_err(|_| Error::Encrypt)?;

		let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
		out.extend_from_slice(&nonce);
		out.extend_from_slice(&sealed);
		Ok(out)
	}

	pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
		if ciphertext.len() < NONCE_LEN {
			return Err(Error::Truncated);
		}

		let (nonce, sealed) = ciphertext.split_at(NONCE_LEN);
		let cipher = XChaCha20Poly1305::new(self.expose().into());

		cipher
			.decrypt(XNonce::from_slice(nonce), sealed)
			.map_err(|_| Error::Decrypt)
	}
}

impl PartialEq for SymmetricKey {
	fn eq(&self, other: &Self) -> bool {
		self.expose() == other.expose()
	}
}

impl Eq for SymmetricKey {}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn roundtrip_and_tamper() {
		let key = SymmetricKey::generate();

		let ciphertext = key.encrypt(b"hello").unwrap();
		assert_eq!(key.decrypt(&ciphertext).unwrap(), b"hello");

		let mut tampered = ciphertext.clone();
		if let Some(last) = tampered.last_mut() {
			*last ^= 1;
		}
		assert_eq!(key.decrypt(&tampered), Err(Error::Decrypt));

		let other = SymmetricKey::generate();
		assert_eq!(other.decrypt(&ciphertext), Err(Error::Decrypt));

		assert_eq!(key.decrypt(&ciphertext[..10]), Err(Error::Truncated));
	}

	#[test]
	fn fresh_nonce_per_encryption() {
		let key = SymmetricKey::generate();
		assert_ne!(key.encrypt(b"same").unwrap(), key.encrypt(b"same").unwrap());
	}
}
