//! Core of hivesync, a peer to peer encrypted file synchronization platform.
//!
//! Users own a profile stored encrypted in the DHT, log in on any number of devices and share
//! folders with each other. This crate keeps the shared records consistent and the devices
//! informed:
//!
//! - [`data`]: read-modify-write cycles of versioned records, conflicts surface to the caller;
//! - [`notify`]: liveness probes, master election and notification fan-out;
//! - [`queue`]: the per user mailbox of tasks other users or devices leave behind;
//! - [`processes`]: login, logout, registration and sharing as rollbackable processes;
//! - [`PeerNode`]: one device, tying it all together.

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

pub mod config;
pub mod data;
pub mod error;
pub mod logging;
pub mod messages;
pub mod model;
pub mod node;
pub mod notify;
pub mod processes;
pub mod queue;
pub mod services;
pub mod session;

pub use config::NodeConfig;
pub use error::{Error, Result};
pub use node::{NodeEvent, PeerNode};
pub use services::NodeServices;
pub use session::{Session, UserCredentials};
