use std::{fmt, future::Future, sync::Arc, time::Duration};

use hv_dht::{
	DataStore, Key, Protection, PutStatus, TimeSource, VersionKey, VersionedPayload, VersionedWrite,
};
use tracing::{debug, warn};

use crate::{
	config::NetworkConfig,
	error::{Error, Result},
};

/// Front of the DHT for the rest of the core.
///
/// Every operation is bounded by the configured store timeout, and operations that couldn't
/// reach the store are retried a bounded number of times. Rejected writes are not retried,
/// they come back as a [`PutStatus`] for the caller to interpret.
pub struct DataManager {
	store: Arc<dyn DataStore>,
	time_source: Arc<dyn TimeSource>,
	max_attempts: usize,
	retry_delay: Duration,
	timeout: Duration,
}

impl fmt::Debug for DataManager {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("DataManager")
			.field("max_attempts", &self.max_attempts)
			.field("retry_delay", &self.retry_delay)
			.field("timeout", &self.timeout)
			.finish_non_exhaustive()
	}
}

impl DataManager {
	pub fn new(
		store: Arc<dyn DataStore>,
		time_source: Arc<dyn TimeSource>,
		config: &NetworkConfig,
	) -> Self {
		Self {
			store,
			time_source,
			max_attempts: config.max_put_retries.max(1),
			retry_delay: config.put_retry_delay(),
			timeout: config.store_timeout(),
		}
	}

	#[must_use]
	pub const fn time_source(&self) -> &Arc<dyn TimeSource> {
		&self.time_source
	}

	#[must_use]
	pub fn now_ms(&self) -> u64 {
		self.time_source.current_time_ms()
	}

	/// Version key for a write of `payload` extending `based_on`.
	#[must_use]
	pub fn new_version_key(&self, payload: &[u8], based_on: Option<VersionKey>) -> VersionKey {
		VersionKey::generate(payload, based_on, &self.time_source)
	}

	pub async fn put(
		&self,
		key: &Key,
		write: VersionedWrite,
		protection: Option<Protection>,
	) -> Result<PutStatus> {
		self.with_retries("put", key, || {
			self.store.put(key, write.clone(), protection.clone())
		})
		.await
	}

	pub async fn put_if_absent(
		&self,
		key: &Key,
		write: VersionedWrite,
		protection: Option<Protection>,
	) -> Result<PutStatus> {
		self.with_retries("put_if_absent", key, || {
			self.store.put_if_absent(key, write.clone(), protection.clone())
		})
		.await
	}

	pub async fn get(&self, key: &Key) -> Result<Option<VersionedPayload>> {
		self.with_retries("get", key, || self.store.get(key)).await
	}

	pub async fn remove(
		&self,
		key: &Key,
		version_key: Option<VersionKey>,
		protection: Option<Protection>,
	) -> Result<PutStatus> {
		self.with_retries("remove", key, || {
			self.store.remove(key, version_key, protection.clone())
		})
		.await
	}

	pub async fn list_content_keys(&self, location: &str, domain: &str) -> Result<Vec<String>> {
		let key = Key::new(location, domain, "*");

		self.with_retries("list", &key, || {
			self.store.list_content_keys(location, domain)
		})
		.await
	}

	async fn with_retries<T, F, Fut>(&self, operation: &'static str, key: &Key, f: F) -> Result<T>
	where
		F: Fn() -> Fut + Send + Sync,
		Fut: Future<Output = std::result::Result<T, hv_dht::Error>> + Send,
		T: Send,
	{
		let mut attempt = 1;

		loop {
			let res = tokio::time::timeout(self.timeout, f())
				.await
				.unwrap_or(Err(hv_dht::Error::Timeout(self.timeout)));

			match res {
				Ok(value) => return Ok(value),
				Err(e) if attempt < self.max_attempts => {
					debug!(operation, %key, attempt, %e, "Store unreachable, retrying");
					tokio::time::sleep(self.retry_delay).await;
					attempt += 1;
				}
				Err(e) => {
					warn!(operation, %key, attempt, %e, "Store unreachable, giving up");
					return Err(Error::RetriesExhausted {
						attempts: attempt,
						last: Box::new(e.into()),
					});
				}
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use hv_dht::{FakeTimeSource, HistoryPolicy, MemoryStore};
	use tracing_test::traced_test;

	use super::*;

	fn manager(store: Arc<MemoryStore>, max_put_retries: usize) -> DataManager {
		DataManager::new(
			store,
			Arc::new(FakeTimeSource::default()),
			&NetworkConfig {
				max_put_retries,
				put_retry_delay_ms: 1,
				..NetworkConfig::default()
			},
		)
	}

	fn store() -> Arc<MemoryStore> {
		Arc::new(MemoryStore::new(
			HistoryPolicy::default(),
			Arc::new(FakeTimeSource::default()),
		))
	}

	#[tokio::test]
	#[traced_test]
	async fn transient_failures_are_retried() {
		let store = store();
		let data = manager(Arc::clone(&store), 3);
		let key = Key::new("alice", "NOTES", "todo");

		store.fail_next(2);
		let version_key = data.new_version_key(b"milk", None);
		let status = data
			.put(&key, VersionedWrite::new(b"milk".to_vec(), version_key, None), None)
			.await
			.unwrap();

		assert_eq!(status, PutStatus::Ok);
		assert_eq!(data.get(&key).await.unwrap().unwrap().payload, b"milk");
		assert!(logs_contain("Store unreachable, retrying"));
	}

	#[tokio::test]
	#[traced_test]
	async fn retries_are_bounded() {
		let store = store();
		let data = manager(Arc::clone(&store), 2);

		store.fail_next(5);
		let res = data.get(&Key::new("alice", "NOTES", "todo")).await;

		assert!(matches!(
			res,
			Err(Error::RetriesExhausted {
				attempts: 2,
				ref last,
			}) if matches!(**last, Error::Store(hv_dht::Error::Unavailable(_)))
		));
	}

	#[tokio::test]
	#[traced_test]
	async fn conflicts_are_not_retried() {
		let store = store();
		let data = manager(Arc::clone(&store), 3);
		let key = Key::new("alice", "NOTES", "todo");

		let first = data.new_version_key(b"one", None);
		data.put(&key, VersionedWrite::new(b"one".to_vec(), first, None), None)
			.await
			.unwrap();

		let second = data.new_version_key(b"two", None);
		let status = data
			.put(&key, VersionedWrite::new(b"two".to_vec(), second, None), None)
			.await
			.unwrap();

		assert_eq!(status, PutStatus::VersionConflictNoBasedOn);
		assert!(!logs_contain("retrying"));
	}
}
