//! Cryptographic primitives behind a small, opaque interface: key derivation from user
//! credentials, symmetric encryption, sealing to a user's public key, and signatures.

#![warn(
	clippy::all,
	clippy::pedantic,
	clippy::correctness,
	clippy::perf,
	clippy::style,
	clippy::suspicious,
	clippy::complexity,
	clippy::nursery,
	clippy::unwrap_used,
	unused_qualifications,
	rust_2018_idioms,
	clippy::expect_used,
	trivial_casts,
	trivial_numeric_casts,
	unused_allocation,
	clippy::dbg_macro
)]
#![forbid(unsafe_code)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]

pub mod asymmetric;
pub mod derivation;
pub mod error;
pub mod protected;
pub mod symmetric;

pub use asymmetric::{PublicKeys, UserKeyPair};
pub use derivation::{derive_user_keys, DerivedKeys, HashingParams};
pub use error::{Error, Result};
pub use protected::Protected;
pub use symmetric::SymmetricKey;

pub use ed25519_dalek::SigningKey;
pub use zeroize::Zeroize;
