use std::{fmt, marker::PhantomData, sync::Arc};

use hv_crypto::SymmetricKey;
use hv_dht::{Key, Protection, SigningKey, VersionKey, VersionedWrite};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, instrument, trace};

use super::manager::DataManager;
use crate::error::{Error, Result};

/// Proof of which version a value was read at. Handing it back on write makes the write
/// extend exactly that version, or fail with a conflict if somebody else got there first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadToken {
	pub version_key: VersionKey,
	pub based_on: Option<VersionKey>,
}

/// Read-modify-write cycles of one versioned entity stored at a fixed key.
pub struct VersionManager<T> {
	data: Arc<DataManager>,
	key: Key,
	encryption: Option<SymmetricKey>,
	signing_key: Option<SigningKey>,
	_entity: PhantomData<fn() -> T>,
}

impl<T> fmt::Debug for VersionManager<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("VersionManager")
			.field("key", &self.key)
			.field("encrypted", &self.encryption.is_some())
			.field("protected", &self.signing_key.is_some())
			.finish_non_exhaustive()
	}
}

impl<T> VersionManager<T>
where
	T: Serialize + DeserializeOwned + Send + Sync,
{
	pub const fn new(data: Arc<DataManager>, key: Key) -> Self {
		Self {
			data,
			key,
			encryption: None,
			signing_key: None,
			_entity: PhantomData,
		}
	}

	/// Payloads get encrypted before they leave this node.
	#[must_use]
	pub fn encrypted_with(mut self, key: SymmetricKey) -> Self {
		self.encryption = Some(key);
		self
	}

	/// Writes are signed, the first one makes the record writable by this key only.
	#[must_use]
	pub fn protected_by(mut self, signing_key: SigningKey) -> Self {
		self.signing_key = Some(signing_key);
		self
	}

	#[must_use]
	pub const fn key(&self) -> &Key {
		&self.key
	}

	/// The latest version, `None` if nothing was ever stored.
	pub async fn get_latest(&self) -> Result<Option<(T, ReadToken)>> {
		let Some(stored) = self.data.get(&self.key).await? else {
			return Ok(None);
		};

		let value = self.decode(&stored.payload)?;
		trace!(key = %self.key, version_key = %stored.version_key, "Fetched latest version");

		Ok(Some((
			value,
			ReadToken {
				version_key: stored.version_key,
				based_on: stored.based_on,
			},
		)))
	}

	/// Like [`VersionManager::get_latest`], a missing record is an error.
	pub async fn get(&self) -> Result<(T, ReadToken)> {
		self.get_latest()
			.await?
			.ok_or_else(|| Error::NotFound(self.key.clone()))
	}

	/// Stores `value` as the successor of the version `token` was read at, or as the first
	/// version when there is no token.
	///
	/// A concurrent writer that got there first makes this fail with
	/// [`Error::VersionConflict`]. Nothing is retried, callers re-fetch and decide again.
	#[instrument(skip_all, fields(key = %self.key), err)]
	pub async fn ready_to_put(&self, value: &T, token: Option<ReadToken>) -> Result<ReadToken> {
		let payload = self.encode(value)?;
		let based_on = token.map(|token| token.version_key);
		let version_key = self.data.new_version_key(&payload, based_on);

		let protection = self
			.signing_key
			.as_ref()
			.map(|signing_key| Protection::sign(signing_key, &self.key, version_key, &payload));

		let status = self
			.data
			.put(
				&self.key,
				VersionedWrite::new(payload, version_key, based_on),
				protection,
			)
			.await?;

		if !status.is_ok() {
			return Err(Error::from_status(&self.key, status));
		}

		debug!(%version_key, "Stored new version");

		Ok(ReadToken {
			version_key,
			based_on,
		})
	}

	/// Re-fetches and re-applies `f` until the write goes through or `max_attempts` writes
	/// lost against concurrent writers. `f` gets the current value, `None` when the record
	/// doesn't exist yet.
	pub async fn modify_with_retry<F>(&self, max_attempts: usize, mut f: F) -> Result<T>
	where
		F: FnMut(Option<T>) -> Result<T> + Send,
	{
		let max_attempts = max_attempts.max(1);
		let mut attempt = 1;

		loop {
			let (current, token) = match self.get_latest().await? {
				Some((value, token)) => (Some(value), Some(token)),
				None => (None, None),
			};

			let value = f(current)?;

			match self.ready_to_put(&value, token).await {
				Ok(_) => return Ok(value),
				Err(e) if e.is_version_conflict() && attempt < max_attempts => {
					debug!(key = %self.key, attempt, "Lost the write, re-fetching");
					attempt += 1;
				}
				Err(e) if e.is_version_conflict() => {
					return Err(Error::RetriesExhausted {
						attempts: attempt,
						last: Box::new(e),
					});
				}
				Err(e) => return Err(e),
			}
		}
	}

	/// Removes every version of the record.
	pub async fn remove(&self) -> Result<()> {
		let protection = self.signing_key.as_ref().map(|signing_key| {
			Protection::sign(signing_key, &self.key, VersionKey::UNVERSIONED, &[])
		});

		let status = self.data.remove(&self.key, None, protection).await?;
		if status.is_ok() {
			Ok(())
		} else {
			Err(Error::from_status(&self.key, status))
		}
	}

	fn encode(&self, value: &T) -> Result<Vec<u8>> {
		let bytes = rmp_serde::to_vec_named(value)?;

		match &self.encryption {
			Some(key) => Ok(key.encrypt(&bytes)?),
			None => Ok(bytes),
		}
	}

	fn decode(&self, payload: &[u8]) -> Result<T> {
		match &self.encryption {
			Some(key) => Ok(rmp_serde::from_slice(&key.decrypt(payload)?)?),
			None => Ok(rmp_serde::from_slice(payload)?),
		}
	}
}

#[cfg(test)]
mod tests {
	use hv_dht::{DataStore, FakeTimeSource, HistoryPolicy, MemoryStore, PutStatus};
	use tracing_test::traced_test;

	use super::*;
	use crate::config::NetworkConfig;

	struct Fixture {
		store: Arc<MemoryStore>,
		data: Arc<DataManager>,
		time: FakeTimeSource,
	}

	fn fixture() -> Fixture {
		let time = FakeTimeSource::default();
		let store = Arc::new(MemoryStore::new(
			HistoryPolicy::default(),
			Arc::new(time.clone()),
		));
		let data = Arc::new(DataManager::new(
			Arc::clone(&store) as _,
			Arc::new(time.clone()),
			&NetworkConfig::default(),
		));

		Fixture { store, data, time }
	}

	fn notes(data: &Arc<DataManager>) -> VersionManager<Vec<String>> {
		VersionManager::new(Arc::clone(data), Key::new("alice", "NOTES", "NOTES"))
	}

	#[tokio::test]
	#[traced_test]
	async fn writes_extend_the_version_they_read() {
		let Fixture { data, time, .. } = fixture();
		let manager = notes(&data);

		assert!(manager.get_latest().await.unwrap().is_none());
		assert!(matches!(manager.get().await, Err(Error::NotFound(_))));

		let first = manager
			.ready_to_put(&vec!["milk".to_string()], None)
			.await
			.unwrap();
		assert_eq!(first.based_on, None);

		time.advance(10);
		let (mut value, token) = manager.get().await.unwrap();
		assert_eq!(token, first);

		value.push("eggs".to_string());
		let second = manager.ready_to_put(&value, Some(token)).await.unwrap();

		assert_eq!(second.based_on, Some(first.version_key));
		assert!(second.version_key > first.version_key);
		assert_eq!(manager.get().await.unwrap().0, ["milk", "eggs"]);
	}

	#[tokio::test]
	#[traced_test]
	async fn encrypted_payloads_are_opaque() {
		let Fixture { store, data, .. } = fixture();
		let key = SymmetricKey::generate();
		let manager = notes(&data).encrypted_with(key.clone());

		manager
			.ready_to_put(&vec!["secret plan".to_string()], None)
			.await
			.unwrap();

		let stored = store.get(manager.key()).await.unwrap().unwrap();
		assert!(!String::from_utf8_lossy(&stored.payload).contains("secret plan"));

		let reader = notes(&data).encrypted_with(key);
		assert_eq!(reader.get().await.unwrap().0, ["secret plan"]);

		let stranger = notes(&data).encrypted_with(SymmetricKey::generate());
		assert!(matches!(
			stranger.get().await,
			Err(Error::Crypto(hv_crypto::Error::Decrypt))
		));
	}

	#[tokio::test]
	#[traced_test]
	async fn protected_records_refuse_other_writers() {
		let Fixture { data, .. } = fixture();
		let owner = notes(&data).protected_by(SigningKey::from_bytes(&rand::random()));
		let intruder = notes(&data).protected_by(SigningKey::from_bytes(&rand::random()));

		let token = owner.ready_to_put(&vec![], None).await.unwrap();

		assert!(matches!(
			intruder.ready_to_put(&vec!["spam".to_string()], Some(token)).await,
			Err(Error::PutRefused {
				status: PutStatus::FailedSecurity,
				..
			})
		));
		assert!(matches!(
			notes(&data).remove().await,
			Err(Error::PutRefused {
				status: PutStatus::FailedSecurity,
				..
			})
		));

		owner.remove().await.unwrap();
		assert!(owner.get_latest().await.unwrap().is_none());
	}

	#[tokio::test]
	#[traced_test]
	async fn modify_re_fetches_after_losing_a_write() {
		let Fixture { store, data, time } = fixture();
		let manager = notes(&data);
		let first = manager
			.ready_to_put(&vec!["milk".to_string()], None)
			.await
			.unwrap();

		let mut calls = 0;
		let value = manager
			.modify_with_retry(3, |current| {
				calls += 1;
				if calls == 1 {
					// Another device extends the same version in between
					let payload = rmp_serde::to_vec_named(&vec!["milk", "bread"]).unwrap();
					time.advance(5);
					let version_key = VersionKey::generate(&payload, Some(first.version_key), &time);
					let status = futures::executor::block_on(store.put(
						manager.key(),
						VersionedWrite::new(payload, version_key, Some(first.version_key)),
						None,
					))
					.unwrap();
					assert_eq!(status, PutStatus::Ok);
				}

				let mut value = current.unwrap_or_default();
				value.push("eggs".to_string());
				Ok(value)
			})
			.await
			.unwrap();

		assert_eq!(calls, 2);
		assert_eq!(value, ["milk", "bread", "eggs"]);
		assert_eq!(manager.get().await.unwrap().0, value);
	}

	#[tokio::test]
	#[traced_test]
	async fn modify_creates_missing_records() {
		let Fixture { data, .. } = fixture();
		let manager = notes(&data);

		let value = manager
			.modify_with_retry(1, |current| {
				assert!(current.is_none());
				Ok(vec!["first".to_string()])
			})
			.await
			.unwrap();

		assert_eq!(manager.get().await.unwrap().0, value);
	}
}
