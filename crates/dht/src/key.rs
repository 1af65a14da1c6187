use std::fmt;

use serde::{Deserialize, Serialize};

use super::time_source::TimeSource;

/// Logical key of a record, every location holds domains which hold content entries.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Key {
	pub location: String,
	pub domain: String,
	pub content: String,
}

impl Key {
	pub fn new(
		location: impl Into<String>,
		domain: impl Into<String>,
		content: impl Into<String>,
	) -> Self {
		Self {
			location: location.into(),
			domain: domain.into(),
			content: content.into(),
		}
	}
}

impl fmt::Display for Key {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}/{}/{}", self.location, self.domain, self.content)
	}
}

/// Identifies one version of a record.
///
/// Versions are ordered by timestamp first, the payload derived hash only breaks ties. The
/// all zero key marks a record written without versioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VersionKey {
	pub timestamp_ms: u64,
	pub hash: [u8; 16],
}

impl VersionKey {
	pub const UNVERSIONED: Self = Self {
		timestamp_ms: 0,
		hash: [0; 16],
	};

	/// Generates the key for a write of `payload` extending `based_on`.
	///
	/// The timestamp is never older than the extended version plus one millisecond, so a fast
	/// local retry doesn't collide with the version it extends.
	pub fn generate(
		payload: &[u8],
		based_on: Option<Self>,
		time_source: &(impl TimeSource + ?Sized),
	) -> Self {
		let now = time_source.current_time_ms();
		let timestamp_ms = based_on.map_or(now, |based_on| {
			now.max(based_on.timestamp_ms.saturating_add(1))
		});

		let mut hasher = blake3::Hasher::new();
		if let Some(based_on) = based_on {
			hasher.update(&based_on.to_bytes());
		}
		hasher.update(payload);

		let mut hash = [0; 16];
		hash.copy_from_slice(&hasher.finalize().as_bytes()[..16]);

		Self { timestamp_ms, hash }
	}

	#[must_use]
	pub fn is_unversioned(&self) -> bool {
		*self == Self::UNVERSIONED
	}

	#[must_use]
	pub fn to_bytes(&self) -> [u8; 24] {
		let mut bytes = [0; 24];
		bytes[..8].copy_from_slice(&self.timestamp_ms.to_be_bytes());
		bytes[8..].copy_from_slice(&self.hash);
		bytes
	}
}

impl fmt::Display for VersionKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{:016x}-", self.timestamp_ms)?;
		self.hash.iter().try_for_each(|byte| write!(f, "{byte:02x}"))
	}
}
