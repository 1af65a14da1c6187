//! Versioned record storage.
//!
//! Concurrent writers to a logical key are serialized by an optimistic protocol: a write names
//! the version it extends (its based-on key) and is only accepted when that is still the
//! latest version. Losers get a version conflict status and must re-fetch before retrying.

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
	trivial_casts,
	trivial_numeric_casts,
	unused_allocation,
	clippy::unnecessary_cast,
	clippy::cast_lossless,
	clippy::cast_possible_truncation,
	clippy::cast_possible_wrap,
	clippy::cast_precision_loss,
	clippy::cast_sign_loss,
	clippy::dbg_macro,
	clippy::deprecated_cfg_attr,
	clippy::separated_literal_suffix,
	deprecated
)]
#![forbid(deprecated_in_future)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

mod error;
mod history;
mod key;
mod protection;
mod store;
mod time_source;

pub use error::Error;
pub use history::{
	History, HistoryPolicy, PutStatus, Verdict, VersionedPayload, VersionedWrite,
	MAX_VERSIONS_HISTORY, MIN_VERSION_AGE_BEFORE_REMOVAL_MS,
};
pub use key::{Key, VersionKey};
pub use protection::Protection;
pub use store::{DataStore, MemoryStore};
pub use time_source::{FakeTimeSource, SystemTimeSource, TimeSource};

pub use ed25519_dalek::{SigningKey, VerifyingKey};
