//! Versioned entities on top of the DHT.

mod entities;
mod manager;
mod version;

pub use entities::{
	fetch_public_keys, publish_public_keys, unpublish_public_keys, LocationsManager,
	UserProfileManager, LOCATIONS_DOMAIN, USER_PROFILE_DOMAIN, USER_PUBLIC_KEY_DOMAIN,
};
pub use manager::DataManager;
pub use version::{ReadToken, VersionManager};
