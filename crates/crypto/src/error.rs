use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
	#[error("there was an error deriving keys from the credentials: {0}")]
	KeyDerivation(String),
	#[error("error while encrypting")]
	Encrypt,
	#[error("error while decrypting")]
	Decrypt,
	#[error("ciphertext is too short to hold its header")]
	Truncated,
	#[error("invalid public key bytes")]
	InvalidPublicKey,
	#[error("signature does not match")]
	BadSignature,
}

pub type Result<T> = std::result::Result<T, Error>;
