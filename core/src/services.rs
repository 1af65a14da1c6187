use std::sync::Arc;

use hv_dht::{DataStore, TimeSource};
use hv_p2p::DirectMessenger;

use crate::{config::NodeConfig, data::DataManager};

/// What every process of a node needs, cheap to clone into steps.
#[derive(Clone)]
pub struct NodeServices {
	pub data: Arc<DataManager>,
	pub messenger: Arc<dyn DirectMessenger>,
	pub config: Arc<NodeConfig>,
}

impl NodeServices {
	pub fn new(
		store: Arc<dyn DataStore>,
		messenger: Arc<dyn DirectMessenger>,
		time_source: Arc<dyn TimeSource>,
		config: NodeConfig,
	) -> Self {
		Self {
			data: Arc::new(DataManager::new(store, time_source, &config.network)),
			messenger,
			config: Arc::new(config),
		}
	}
}
