#![allow(dead_code)]

use hv_core::{
	data::DataManager, model::Locations, NodeConfig, NodeServices, PeerNode, UserCredentials,
};
use hv_crypto::HashingParams;
use hv_dht::{
	DataStore, Error, Key, MemoryStore, Protection, PutStatus, SystemTimeSource, VersionKey,
	VersionedPayload, VersionedWrite,
};
use hv_p2p::{MemoryNetwork, PeerAddress, PeerId};

use std::{
	collections::BTreeSet,
	path::PathBuf,
	sync::{
		atomic::{AtomicBool, Ordering},
		Arc,
	},
	time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use uuid::Uuid;

pub const CONTACT_WINDOW: Duration = Duration::from_millis(500);

/// A whole network in one process: one DHT, one message bus, any number of devices.
pub struct TestNetwork {
	pub store: Arc<MemoryStore>,
	pub network: Arc<MemoryNetwork>,
	pub config: NodeConfig,
}

pub fn test_config() -> NodeConfig {
	let mut config = NodeConfig::default_with_dir(PathBuf::from("unused"));
	config.network.contact_peers_await_ms = 500;
	config.network.max_message_send_attempts = 2;
	config.network.send_retry_backoff_ms = 10;
	config.network.put_retry_delay_ms = 10;

	config
}

impl TestNetwork {
	pub fn new() -> Self {
		Self::with_config(test_config())
	}

	pub fn with_config(config: NodeConfig) -> Self {
		Self {
			store: Arc::new(config.store.memory_store(Arc::new(SystemTimeSource))),
			network: MemoryNetwork::new(),
			config,
		}
	}

	pub fn data(&self) -> Arc<DataManager> {
		Arc::new(DataManager::new(
			Arc::clone(&self.store) as _,
			Arc::new(SystemTimeSource),
			&self.config.network,
		))
	}

	/// Services of a node at `address` that is not a [`PeerNode`].
	pub fn services(&self, n: u128) -> NodeServices {
		NodeServices::new(
			Arc::clone(&self.store) as _,
			Arc::new(self.network.join(address(n))),
			Arc::new(SystemTimeSource),
			self.config.clone(),
		)
	}

	/// A device whose address sorts by `n`, lower numbers win master elections.
	pub fn device(&self, n: u128) -> Arc<PeerNode> {
		self.device_with_store(n, Arc::clone(&self.store) as _)
	}

	/// A device reaching the DHT through `store`.
	pub fn device_with_store(&self, n: u128, store: Arc<dyn DataStore>) -> Arc<PeerNode> {
		let messenger = Arc::new(self.network.join(address(n)));

		PeerNode::new(
			NodeServices::new(
				store,
				messenger,
				Arc::new(SystemTimeSource),
				self.config.clone(),
			),
			HashingParams::Insecure,
		)
	}

	/// A view of the shared DHT that can lose `domain` on demand.
	pub fn flaky_store(&self, domain: &str) -> Arc<FlakyStore> {
		Arc::new(FlakyStore {
			inner: Arc::clone(&self.store),
			domain: domain.to_string(),
			failing: AtomicBool::new(false),
			stall: Mutex::new(None),
		})
	}

	pub async fn locations(&self, user_id: &str) -> BTreeSet<PeerAddress> {
		hv_core::data::LocationsManager::locations(self.data(), user_id, None)
			.get()
			.await
			.map(|(locations, _): (Locations, _)| locations.addresses().cloned().collect())
			.unwrap()
	}
}

/// Passes everything through, except that every operation on one domain is a transport error
/// while failing is on, and takes its time while a stall is set.
pub struct FlakyStore {
	inner: Arc<MemoryStore>,
	domain: String,
	failing: AtomicBool,
	stall: Mutex<Option<Duration>>,
}

impl FlakyStore {
	pub fn set_failing(&self, failing: bool) {
		self.failing.store(failing, Ordering::SeqCst);
	}

	pub fn set_stall(&self, stall: Option<Duration>) {
		*self.stall.lock() = stall;
	}

	async fn reach(&self, domain: &str) -> Result<(), Error> {
		if domain != self.domain {
			return Ok(());
		}

		let stall = *self.stall.lock();
		if let Some(stall) = stall {
			tokio::time::sleep(stall).await;
		}

		if self.failing.load(Ordering::SeqCst) {
			Err(Error::Unavailable(format!("{domain} is unreachable")))
		} else {
			Ok(())
		}
	}
}

#[async_trait]
impl DataStore for FlakyStore {
	async fn put(
		&self,
		key: &Key,
		write: VersionedWrite,
		protection: Option<Protection>,
	) -> Result<PutStatus, Error> {
		self.reach(&key.domain).await?;
		self.inner.put(key, write, protection).await
	}

	async fn put_if_absent(
		&self,
		key: &Key,
		write: VersionedWrite,
		protection: Option<Protection>,
	) -> Result<PutStatus, Error> {
		self.reach(&key.domain).await?;
		self.inner.put_if_absent(key, write, protection).await
	}

	async fn get(&self, key: &Key) -> Result<Option<VersionedPayload>, Error> {
		self.reach(&key.domain).await?;
		self.inner.get(key).await
	}

	async fn get_version(
		&self,
		key: &Key,
		version_key: VersionKey,
	) -> Result<Option<VersionedPayload>, Error> {
		self.reach(&key.domain).await?;
		self.inner.get_version(key, version_key).await
	}

	async fn remove(
		&self,
		key: &Key,
		version_key: Option<VersionKey>,
		protection: Option<Protection>,
	) -> Result<PutStatus, Error> {
		self.reach(&key.domain).await?;
		self.inner.remove(key, version_key, protection).await
	}

	async fn list_content_keys(&self, location: &str, domain: &str) -> Result<Vec<String>, Error> {
		self.reach(domain).await?;
		self.inner.list_content_keys(location, domain).await
	}
}

pub fn address(n: u128) -> PeerAddress {
	PeerAddress::memory(PeerId::from_uuid(Uuid::from_u128(n)))
}

pub fn credentials(user_id: &str) -> UserCredentials {
	UserCredentials::new(user_id, format!("{user_id} likes long passwords"), "1234")
}
