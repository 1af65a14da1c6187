//! Node configuration, stored as `hivesync.json` in the node's data directory.

use std::{
	fs,
	path::{Path, PathBuf},
	sync::Arc,
	time::Duration,
};

use anyhow::{anyhow, Result};
use hv_dht::{
	HistoryPolicy, MemoryStore, TimeSource, MAX_VERSIONS_HISTORY, MIN_VERSION_AGE_BEFORE_REMOVAL_MS,
};
use hv_p2p::MAX_MESSAGE_SEND_ATTEMPTS;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const CONFIG_FILE_NAME: &str = "hivesync.json";

/// How long peers get to answer a liveness probe.
pub const CONTACT_PEERS_AWAIT_MS: u64 = 10_000;

const CONFIG_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
	/// Config schema version
	pub version: u32,

	pub data_dir: PathBuf,

	/// Default directives for the log filter, `RUST_LOG` still takes precedence
	pub log_level: String,

	#[serde(default)]
	pub process: ProcessConfig,

	#[serde(default)]
	pub network: NetworkConfig,

	#[serde(default)]
	pub store: StoreConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessConfig {
	/// How long a sequential process waits for each of its async children
	pub async_await_timeout_ms: u64,

	/// Bound for callers waiting on a whole process
	pub wait_timeout_ms: u64,
}

impl Default for ProcessConfig {
	fn default() -> Self {
		Self {
			async_await_timeout_ms: 60_000,
			wait_timeout_ms: 120_000,
		}
	}
}

impl ProcessConfig {
	#[must_use]
	pub const fn async_await_timeout(&self) -> Duration {
		Duration::from_millis(self.async_await_timeout_ms)
	}

	#[must_use]
	pub const fn wait_timeout(&self) -> Duration {
		Duration::from_millis(self.wait_timeout_ms)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
	pub contact_peers_await_ms: u64,
	pub max_message_send_attempts: usize,
	pub send_retry_backoff_ms: u64,

	/// Attempts for a store operation that failed to reach the DHT
	pub max_put_retries: usize,
	pub put_retry_delay_ms: u64,
	pub store_timeout_ms: u64,

	/// Attempts of the locations cleanup when other devices keep winning the write
	pub max_cleanup_attempts: usize,
}

impl Default for NetworkConfig {
	fn default() -> Self {
		Self {
			contact_peers_await_ms: CONTACT_PEERS_AWAIT_MS,
			max_message_send_attempts: MAX_MESSAGE_SEND_ATTEMPTS,
			send_retry_backoff_ms: 100,
			max_put_retries: 3,
			put_retry_delay_ms: 200,
			store_timeout_ms: 10_000,
			max_cleanup_attempts: 5,
		}
	}
}

impl NetworkConfig {
	#[must_use]
	pub const fn contact_peers_await(&self) -> Duration {
		Duration::from_millis(self.contact_peers_await_ms)
	}

	#[must_use]
	pub const fn send_retry_backoff(&self) -> Duration {
		Duration::from_millis(self.send_retry_backoff_ms)
	}

	#[must_use]
	pub const fn put_retry_delay(&self) -> Duration {
		Duration::from_millis(self.put_retry_delay_ms)
	}

	#[must_use]
	pub const fn store_timeout(&self) -> Duration {
		Duration::from_millis(self.store_timeout_ms)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
	pub max_versions_history: usize,
	pub min_version_age_before_removal_ms: u64,
}

impl Default for StoreConfig {
	fn default() -> Self {
		Self {
			max_versions_history: MAX_VERSIONS_HISTORY,
			min_version_age_before_removal_ms: MIN_VERSION_AGE_BEFORE_REMOVAL_MS,
		}
	}
}

impl StoreConfig {
	/// A store hosted by this node, keeping version history as configured.
	#[must_use]
	pub fn memory_store(&self, time_source: Arc<dyn TimeSource>) -> MemoryStore {
		MemoryStore::new((*self).into(), time_source)
	}
}

impl From<StoreConfig> for HistoryPolicy {
	fn from(config: StoreConfig) -> Self {
		Self {
			max_versions: config.max_versions_history,
			min_age_before_removal: Duration::from_millis(config.min_version_age_before_removal_ms),
		}
	}
}

impl NodeConfig {
	/// Loads the configuration of `data_dir`, creating a default one when there is none.
	pub fn load_from(data_dir: impl AsRef<Path>) -> Result<Self> {
		let data_dir = data_dir.as_ref();
		let config_path = data_dir.join(CONFIG_FILE_NAME);

		if !config_path.exists() {
			warn!(?config_path, "No config found, creating default");
			let config = Self::default_with_dir(data_dir.to_path_buf());
			config.save()?;
			return Ok(config);
		}

		info!(?config_path, "Loading config");
		let json = fs::read_to_string(&config_path)?;
		let mut config: Self = serde_json::from_str(&json)?;

		if config.version > CONFIG_VERSION {
			return Err(anyhow!(
				"config version {} is newer than the supported {CONFIG_VERSION}",
				config.version
			));
		}

		if config.version < CONFIG_VERSION {
			info!(
				from = config.version,
				to = CONFIG_VERSION,
				"Migrating config"
			);
			config.migrate()?;
			config.save()?;
		}

		Ok(config)
	}

	#[must_use]
	pub fn default_with_dir(data_dir: PathBuf) -> Self {
		Self {
			version: CONFIG_VERSION,
			data_dir,
			log_level: "info".to_string(),
			process: ProcessConfig::default(),
			network: NetworkConfig::default(),
			store: StoreConfig::default(),
		}
	}

	pub fn save(&self) -> Result<()> {
		fs::create_dir_all(&self.data_dir)?;

		let config_path = self.data_dir.join(CONFIG_FILE_NAME);
		fs::write(&config_path, serde_json::to_string_pretty(self)?)?;
		info!(?config_path, "Saved config");

		Ok(())
	}

	fn migrate(&mut self) -> Result<()> {
		match self.version {
			0 => Err(anyhow!("config version 0 predates versioned configs, delete it")),
			CONFIG_VERSION => Ok(()),
			v => Err(anyhow!("unknown config version: {v}")),
		}
	}
}

#[cfg(test)]
mod tests {
	use tempfile::tempdir;

	use super::*;

	#[test]
	fn creates_default_then_reloads_it() {
		let data_dir = tempdir().unwrap();

		let created = NodeConfig::load_from(data_dir.path()).unwrap();
		assert!(data_dir.path().join(CONFIG_FILE_NAME).exists());
		assert_eq!(created.network.contact_peers_await_ms, CONTACT_PEERS_AWAIT_MS);
		assert_eq!(created.store.max_versions_history, MAX_VERSIONS_HISTORY);

		let mut changed = created.clone();
		changed.network.contact_peers_await_ms = 42;
		changed.save().unwrap();

		let reloaded = NodeConfig::load_from(data_dir.path()).unwrap();
		assert_eq!(reloaded, changed);
	}

	#[test]
	fn missing_sections_take_their_defaults() {
		let data_dir = tempdir().unwrap();
		let json = serde_json::json!({
			"version": CONFIG_VERSION,
			"data_dir": data_dir.path(),
			"log_level": "debug",
		});
		fs::write(
			data_dir.path().join(CONFIG_FILE_NAME),
			serde_json::to_string(&json).unwrap(),
		)
		.unwrap();

		let config = NodeConfig::load_from(data_dir.path()).unwrap();

		assert_eq!(config.log_level, "debug");
		assert_eq!(config.store, StoreConfig::default());
		assert_eq!(config.process, ProcessConfig::default());
	}

	#[test]
	fn refuses_configs_it_does_not_know() {
		for version in [0, CONFIG_VERSION + 1] {
			let data_dir = tempdir().unwrap();
			let mut config = NodeConfig::default_with_dir(data_dir.path().to_path_buf());
			config.version = version;
			config.save().unwrap();

			assert!(NodeConfig::load_from(data_dir.path()).is_err(), "{version}");
		}
	}

	#[test]
	fn store_follows_the_history_settings() {
		let config = StoreConfig {
			max_versions_history: 3,
			min_version_age_before_removal_ms: 0,
		};

		let policy = HistoryPolicy::from(config);
		assert_eq!(policy.max_versions, 3);
		assert_eq!(policy.min_age_before_removal, Duration::ZERO);
	}
}
