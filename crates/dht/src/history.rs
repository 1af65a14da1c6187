use std::{collections::BTreeMap, fmt, time::Duration};

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::key::VersionKey;

/// Maximum number of versions kept per logical key, unless they are too young to be pruned.
pub const MAX_VERSIONS_HISTORY: usize = 5;

/// Versions younger than this are never pruned, even when the history is over its cap.
pub const MIN_VERSION_AGE_BEFORE_REMOVAL_MS: u64 = 5 * 60 * 1000;

/// Outcome of a write, as reported by the storage layer.
///
/// Conflicts are expected outcomes of concurrent writers and are recovered by re-fetching,
/// so they are statuses rather than errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PutStatus {
	Ok,
	FailedNotAbsent,
	FailedSecurity,
	Failed,
	VersionConflict,
	VersionConflictNoVersionKey,
	VersionConflictNoBasedOn,
	VersionConflictOldTimestamp,
}

impl PutStatus {
	#[must_use]
	pub const fn is_ok(self) -> bool {
		matches!(self, Self::Ok)
	}

	#[must_use]
	pub const fn is_version_conflict(self) -> bool {
		matches!(
			self,
			Self::VersionConflict
				| Self::VersionConflictNoVersionKey
				| Self::VersionConflictNoBasedOn
				| Self::VersionConflictOldTimestamp
		)
	}
}

impl fmt::Display for PutStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			Self::Ok => "OK",
			Self::FailedNotAbsent => "FAILED_NOT_ABSENT",
			Self::FailedSecurity => "FAILED_SECURITY",
			Self::Failed => "FAILED",
			Self::VersionConflict => "VERSION_CONFLICT",
			Self::VersionConflictNoVersionKey => "VERSION_CONFLICT_NO_VERSION_KEY",
			Self::VersionConflictNoBasedOn => "VERSION_CONFLICT_NO_BASED_ON",
			Self::VersionConflictOldTimestamp => "VERSION_CONFLICT_OLD_TIMESTAMP",
		};

		f.write_str(name)
	}
}

/// Candidate write to a logical key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionedWrite {
	pub payload: Vec<u8>,
	/// [`VersionKey::UNVERSIONED`] declares an overwrite-only write.
	pub version_key: VersionKey,
	/// The version this write claims to extend, `None` for the first version.
	pub based_on: Option<VersionKey>,
}

impl VersionedWrite {
	#[must_use]
	pub const fn new(payload: Vec<u8>, version_key: VersionKey, based_on: Option<VersionKey>) -> Self {
		Self {
			payload,
			version_key,
			based_on,
		}
	}

	/// An overwrite-only write, for records that never get concurrent writers.
	#[must_use]
	pub const fn unversioned(payload: Vec<u8>) -> Self {
		Self::new(payload, VersionKey::UNVERSIONED, None)
	}
}

/// A stored version of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionedPayload {
	pub payload: Vec<u8>,
	pub version_key: VersionKey,
	pub based_on: Option<VersionKey>,
}

#[derive(Debug, Clone)]
struct Entry {
	payload: Vec<u8>,
	based_on: Option<VersionKey>,
	stored_at_ms: u64,
}

/// How many versions a key keeps, and for how long they are protected from pruning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryPolicy {
	pub max_versions: usize,
	pub min_age_before_removal: Duration,
}

impl Default for HistoryPolicy {
	fn default() -> Self {
		Self {
			max_versions: MAX_VERSIONS_HISTORY,
			min_age_before_removal: Duration::from_millis(MIN_VERSION_AGE_BEFORE_REMOVAL_MS),
		}
	}
}

/// Every version kept for one logical key, ordered by version key.
#[derive(Debug, Clone, Default)]
pub struct History {
	versions: BTreeMap<VersionKey, Entry>,
}

/// What accepting a write would do to the history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
	Accept,
	/// The exact same write is already the latest version, nothing to store again.
	Replay,
	Reject(PutStatus),
}

impl Verdict {
	#[must_use]
	pub const fn status(self) -> PutStatus {
		match self {
			Self::Accept | Self::Replay => PutStatus::Ok,
			Self::Reject(status) => status,
		}
	}
}

impl History {
	#[must_use]
	pub fn len(&self) -> usize {
		self.versions.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.versions.is_empty()
	}

	#[must_use]
	pub fn latest_key(&self) -> Option<VersionKey> {
		self.versions.last_key_value().map(|(key, _)| *key)
	}

	#[must_use]
	pub fn latest(&self) -> Option<VersionedPayload> {
		self.versions
			.last_key_value()
			.map(|(key, entry)| to_payload(*key, entry))
	}

	#[must_use]
	pub fn get(&self, version_key: &VersionKey) -> Option<VersionedPayload> {
		self.versions
			.get(version_key)
			.map(|entry| to_payload(*version_key, entry))
	}

	pub fn keys(&self) -> impl Iterator<Item = VersionKey> + '_ {
		self.versions.keys().copied()
	}

	/// Decides whether `write` may extend this history. Pure function of the current history
	/// and the candidate, so asking twice yields the same verdict.
	#[must_use]
	pub fn validate_version(&self, write: &VersionedWrite) -> Verdict {
		if write.version_key.is_unversioned() {
			let overwrite_only = match self.versions.len() {
				0 => true,
				1 => self.latest_key().is_some_and(|key| key.is_unversioned()),
				_ => false,
			};

			return if overwrite_only {
				Verdict::Accept
			} else {
				Verdict::Reject(PutStatus::VersionConflictNoVersionKey)
			};
		}

		if self.is_replay(write) {
			return Verdict::Replay;
		}

		let Some(based_on) = write.based_on else {
			return if self.is_empty() {
				Verdict::Accept
			} else {
				Verdict::Reject(PutStatus::VersionConflictNoBasedOn)
			};
		};

		if self.latest_key() != Some(based_on) {
			return Verdict::Reject(PutStatus::VersionConflict);
		}

		if write.version_key.timestamp_ms <= based_on.timestamp_ms {
			return Verdict::Reject(PutStatus::VersionConflictOldTimestamp);
		}

		Verdict::Accept
	}

	/// Validates then applies `write`, pruning afterwards.
	pub fn put(&mut self, write: VersionedWrite, now_ms: u64, policy: &HistoryPolicy) -> PutStatus {
		let verdict = self.validate_version(&write);

		if verdict == Verdict::Accept {
			if write.version_key.is_unversioned() {
				self.versions.clear();
			}

			self.versions.insert(
				write.version_key,
				Entry {
					payload: write.payload,
					based_on: write.based_on,
					stored_at_ms: now_ms,
				},
			);

			self.prune(now_ms, policy);
		}

		verdict.status()
	}

	pub fn remove(&mut self, version_key: &VersionKey) -> bool {
		self.versions.remove(version_key).is_some()
	}

	/// Drops the oldest versions while over the cap, stopping at the first one that is too
	/// young to go. The latest version is never pruned.
	pub fn prune(&mut self, now_ms: u64, policy: &HistoryPolicy) {
		let min_age_ms = u64::try_from(policy.min_age_before_removal.as_millis()).unwrap_or(u64::MAX);

		while self.versions.len() > policy.max_versions.max(1) {
			let versions = self.versions.len();
			let Some(oldest) = self.versions.first_entry() else {
				break;
			};

			if now_ms.saturating_sub(oldest.get().stored_at_ms) < min_age_ms {
				trace!(
					version = %oldest.key(),
					versions,
					"Oldest version is too young to be pruned, keeping history over its cap"
				);
				break;
			}

			let version = *oldest.key();
			oldest.remove();
			trace!(%version, "Pruned version from history");
		}
	}

	fn is_replay(&self, write: &VersionedWrite) -> bool {
		self.versions
			.last_key_value()
			.is_some_and(|(key, entry)| {
				*key == write.version_key
					&& entry.based_on == write.based_on
					&& entry.payload == write.payload
			})
	}
}

fn to_payload(version_key: VersionKey, entry: &Entry) -> VersionedPayload {
	VersionedPayload {
		payload: entry.payload.clone(),
		version_key,
		based_on: entry.based_on,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn version(timestamp_ms: u64, tag: u8) -> VersionKey {
		VersionKey {
			timestamp_ms,
			hash: [tag; 16],
		}
	}

	fn write(version_key: VersionKey, based_on: Option<VersionKey>) -> VersionedWrite {
		VersionedWrite::new(vec![version_key.hash[0]], version_key, based_on)
	}

	#[test]
	fn first_version_needs_no_base() {
		let history = History::default();

		assert_eq!(
			history.validate_version(&write(version(10, 1), None)),
			Verdict::Accept
		);
	}

	#[test]
	fn conflicts_are_classified() {
		let policy = HistoryPolicy::default();
		let mut history = History::default();
		let v1 = version(10, 1);
		assert_eq!(history.put(write(v1, None), 0, &policy), PutStatus::Ok);

		assert_eq!(
			history.validate_version(&write(version(20, 2), None)).status(),
			PutStatus::VersionConflictNoBasedOn
		);
		assert_eq!(
			history
				.validate_version(&write(version(20, 2), Some(version(5, 9))))
				.status(),
			PutStatus::VersionConflict
		);
		assert_eq!(
			history.validate_version(&write(version(10, 3), Some(v1))).status(),
			PutStatus::VersionConflictOldTimestamp
		);
		assert_eq!(
			history
				.validate_version(&VersionedWrite::unversioned(vec![1]))
				.status(),
			PutStatus::VersionConflictNoVersionKey
		);
		assert_eq!(
			history.validate_version(&write(version(11, 2), Some(v1))),
			Verdict::Accept
		);
	}

	#[test]
	fn validation_is_deterministic() {
		let policy = HistoryPolicy::default();
		let mut history = History::default();
		let v1 = version(10, 1);
		history.put(write(v1, None), 0, &policy);

		for candidate in [
			write(version(20, 2), Some(v1)),
			write(version(20, 2), None),
			write(version(5, 2), Some(v1)),
			write(version(20, 2), Some(version(1, 1))),
			VersionedWrite::unversioned(vec![]),
		] {
			assert_eq!(
				history.validate_version(&candidate),
				history.validate_version(&candidate)
			);
		}
	}

	#[test]
	fn replaying_the_tip_is_accepted_once() {
		let policy = HistoryPolicy::default();
		let mut history = History::default();
		let v1 = version(10, 1);
		let v2 = version(20, 2);

		history.put(write(v1, None), 0, &policy);
		assert_eq!(history.put(write(v2, Some(v1)), 0, &policy), PutStatus::Ok);
		assert_eq!(history.put(write(v2, Some(v1)), 0, &policy), PutStatus::Ok);
		assert_eq!(history.len(), 2);

		// Same version key with another payload is not a replay
		let mut tampered = write(v2, Some(v1));
		tampered.payload = vec![42];
		assert_eq!(
			history.put(tampered, 0, &policy),
			PutStatus::VersionConflict
		);
	}

	#[test]
	fn overwrite_only_mode() {
		let policy = HistoryPolicy::default();
		let mut history = History::default();

		assert_eq!(
			history.put(VersionedWrite::unversioned(vec![1]), 0, &policy),
			PutStatus::Ok
		);
		assert_eq!(
			history.put(VersionedWrite::unversioned(vec![2]), 0, &policy),
			PutStatus::Ok
		);
		assert_eq!(history.len(), 1);
		assert_eq!(history.latest().map(|latest| latest.payload), Some(vec![2]));

		// A versioned write may take over by extending the unversioned entry
		let v1 = version(10, 1);
		assert_eq!(
			history.put(write(v1, Some(VersionKey::UNVERSIONED)), 0, &policy),
			PutStatus::Ok
		);
		assert_eq!(
			history.put(VersionedWrite::unversioned(vec![3]), 0, &policy),
			PutStatus::VersionConflictNoVersionKey
		);
	}

	#[test]
	fn pruning_respects_cap_and_age() {
		let policy = HistoryPolicy {
			max_versions: 3,
			min_age_before_removal: Duration::from_millis(100),
		};
		let mut history = History::default();

		let mut based_on = None;
		for (i, tag) in (1..=5).enumerate() {
			let key = version(10 * (i as u64 + 1), tag);
			assert_eq!(history.put(write(key, based_on), 0, &policy), PutStatus::Ok);
			based_on = Some(key);
		}

		// Everything is younger than the minimum age
		assert_eq!(history.len(), 5);

		let key = version(100, 6);
		assert_eq!(history.put(write(key, based_on), 100, &policy), PutStatus::Ok);

		assert_eq!(history.len(), 3);
		assert_eq!(history.latest_key(), Some(key));
		assert_eq!(
			history.keys().map(|key| key.timestamp_ms).collect::<Vec<_>>(),
			vec![40, 50, 100]
		);
	}
}
