use std::{
	collections::BTreeMap,
	sync::Arc,
};

use async_trait::async_trait;
use ed25519_dalek::VerifyingKey;
use parking_lot::Mutex;
use tracing::{debug, instrument, trace, warn};

use super::{
	error::Error,
	history::{History, HistoryPolicy, PutStatus, VersionedPayload, VersionedWrite},
	key::{Key, VersionKey},
	protection::Protection,
	time_source::{SystemTimeSource, TimeSource},
};

/// The storage interface the core needs from the DHT.
///
/// Every accepted write to one logical key extends the version chain of that key, so the
/// store is the single arbiter between concurrent writers.
#[async_trait]
pub trait DataStore: Send + Sync + 'static {
	async fn put(
		&self,
		key: &Key,
		write: VersionedWrite,
		protection: Option<Protection>,
	) -> Result<PutStatus, Error>;

	/// Like [`DataStore::put`], but answers [`PutStatus::FailedNotAbsent`] when the key already
	/// holds any version.
	async fn put_if_absent(
		&self,
		key: &Key,
		write: VersionedWrite,
		protection: Option<Protection>,
	) -> Result<PutStatus, Error>;

	/// The latest version of the record.
	async fn get(&self, key: &Key) -> Result<Option<VersionedPayload>, Error>;

	async fn get_version(
		&self,
		key: &Key,
		version_key: VersionKey,
	) -> Result<Option<VersionedPayload>, Error>;

	/// Removes one version, or the whole key when `version_key` is `None`.
	async fn remove(
		&self,
		key: &Key,
		version_key: Option<VersionKey>,
		protection: Option<Protection>,
	) -> Result<PutStatus, Error>;

	/// Content keys stored under a location and domain, in ascending order.
	async fn list_content_keys(&self, location: &str, domain: &str) -> Result<Vec<String>, Error>;
}

#[derive(Debug, Default)]
struct Record {
	history: History,
	protected_by: Option<VerifyingKey>,
}

impl Record {
	fn authorize(
		&self,
		key: &Key,
		version_key: VersionKey,
		payload: &[u8],
		protection: Option<&Protection>,
	) -> bool {
		match (self.protected_by, protection) {
			(None, None) => true,
			(Some(_), None) => false,
			(protected_by, Some(protection)) => {
				protected_by.map_or(true, |protected_by| protected_by == protection.public_key)
					&& protection.verify(key, version_key, payload)
			}
		}
	}
}

/// In process [`DataStore`], standing in for the DHT of a whole network: every peer that
/// shares an instance sees the same records.
pub struct MemoryStore {
	records: Mutex<BTreeMap<Key, Record>>,
	policy: HistoryPolicy,
	time_source: Arc<dyn TimeSource>,
	failures_to_inject: Mutex<usize>,
}

impl Default for MemoryStore {
	fn default() -> Self {
		Self::new(HistoryPolicy::default(), Arc::new(SystemTimeSource))
	}
}

impl MemoryStore {
	#[must_use]
	pub fn new(policy: HistoryPolicy, time_source: Arc<dyn TimeSource>) -> Self {
		Self {
			records: Mutex::new(BTreeMap::new()),
			policy,
			time_source,
			failures_to_inject: Mutex::new(0),
		}
	}

	/// Makes the next `count` operations fail as if the DHT couldn't be reached.
	pub fn fail_next(&self, count: usize) {
		*self.failures_to_inject.lock() = count;
	}

	/// Version keys kept for `key`, oldest first.
	#[must_use]
	pub fn history(&self, key: &Key) -> Vec<VersionKey> {
		self.records
			.lock()
			.get(key)
			.map(|record| record.history.keys().collect())
			.unwrap_or_default()
	}

	fn reachable(&self) -> Result<(), Error> {
		let injected = {
			let mut left = self.failures_to_inject.lock();
			left.checked_sub(1).map(|rest| *left = rest).is_some()
		};

		if injected {
			warn!("Injected storage failure");
			return Err(Error::Unavailable("injected failure".to_string()));
		}

		Ok(())
	}

	fn store(
		&self,
		key: &Key,
		write: VersionedWrite,
		protection: Option<Protection>,
		absent_only: bool,
	) -> PutStatus {
		let now_ms = self.time_source.current_time_ms();
		let mut records = self.records.lock();
		let record = records.entry(key.clone()).or_default();

		if absent_only && !record.history.is_empty() {
			return PutStatus::FailedNotAbsent;
		}

		if !record.authorize(key, write.version_key, &write.payload, protection.as_ref()) {
			warn!(%key, "Write refused, protection does not match");
			if record.history.is_empty() {
				records.remove(key);
			}
			return PutStatus::FailedSecurity;
		}

		let version_key = write.version_key;
		let was_empty = record.history.is_empty();
		let status = record.history.put(write, now_ms, &self.policy);

		if status.is_ok() {
			// Only the creator of a record gets to protect it
			if let (true, Some(protection)) = (was_empty, protection) {
				record.protected_by = Some(protection.public_key);
			}
			trace!(%key, %version_key, versions = record.history.len(), "Write accepted");
		} else {
			debug!(%key, %version_key, %status, "Write rejected");
			if record.history.is_empty() {
				records.remove(key);
			}
		}

		status
	}
}

#[async_trait]
impl DataStore for MemoryStore {
	#[instrument(skip_all, fields(%key, version_key = %write.version_key), err)]
	async fn put(
		&self,
		key: &Key,
		write: VersionedWrite,
		protection: Option<Protection>,
	) -> Result<PutStatus, Error> {
		self.reachable()?;
		Ok(self.store(key, write, protection, false))
	}

	#[instrument(skip_all, fields(%key, version_key = %write.version_key), err)]
	async fn put_if_absent(
		&self,
		key: &Key,
		write: VersionedWrite,
		protection: Option<Protection>,
	) -> Result<PutStatus, Error> {
		self.reachable()?;
		Ok(self.store(key, write, protection, true))
	}

	async fn get(&self, key: &Key) -> Result<Option<VersionedPayload>, Error> {
		self.reachable()?;
		Ok(self
			.records
			.lock()
			.get(key)
			.and_then(|record| record.history.latest()))
	}

	async fn get_version(
		&self,
		key: &Key,
		version_key: VersionKey,
	) -> Result<Option<VersionedPayload>, Error> {
		self.reachable()?;
		Ok(self
			.records
			.lock()
			.get(key)
			.and_then(|record| record.history.get(&version_key)))
	}

	#[instrument(skip_all, fields(%key, ?version_key), err)]
	async fn remove(
		&self,
		key: &Key,
		version_key: Option<VersionKey>,
		protection: Option<Protection>,
	) -> Result<PutStatus, Error> {
		self.reachable()?;

		let mut records = self.records.lock();
		let Some(record) = records.get_mut(key) else {
			trace!("Nothing to remove");
			return Ok(PutStatus::Ok);
		};

		let signed_version = version_key.unwrap_or(VersionKey::UNVERSIONED);
		if !record.authorize(key, signed_version, &[], protection.as_ref()) {
			warn!("Removal refused, protection does not match");
			return Ok(PutStatus::FailedSecurity);
		}

		match version_key {
			Some(version_key) => {
				record.history.remove(&version_key);
				if record.history.is_empty() {
					records.remove(key);
				}
			}
			None => {
				records.remove(key);
			}
		}

		Ok(PutStatus::Ok)
	}

	async fn list_content_keys(&self, location: &str, domain: &str) -> Result<Vec<String>, Error> {
		self.reachable()?;

		// BTreeMap order is (location, domain, content), already ascending
		Ok(self
			.records
			.lock()
			.keys()
			.filter(|key| key.location == location && key.domain == domain)
			.map(|key| key.content.clone())
			.collect())
	}
}
