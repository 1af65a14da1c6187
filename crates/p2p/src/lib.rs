//! Direct peer to peer messaging, as needed by the sync core.
//!
//! Discovery, routing and NAT traversal live below this seam. The core only sends opaque
//! payloads to a [`PeerAddress`] and gets responses routed back by correlation id. The
//! [`MemoryNetwork`] implementation connects devices living in the same process.

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

mod error;
mod memory;
mod messenger;
mod peer;
mod router;

pub use error::Error;
pub use memory::{MemoryMessenger, MemoryNetwork, PeerBehavior};
pub use messenger::{DirectMessenger, MessageHandler, MAX_MESSAGE_SEND_ATTEMPTS};
pub use peer::{PeerAddress, PeerId};
pub use router::{MessageId, ResponseRouter};
