//! Peer liveness and notification coordination.
//!
//! A round probes the other devices of the user, updates the locations with the outcome,
//! elects the master and fans notifications out. Every part is a process step sharing one
//! [`NotifyProcessContext`].

mod cleanup;
mod contact_peers;
mod context;
mod election;
mod latch;
mod send_notifications;

pub use cleanup::{RemoveUnreachableLocationsStep, UpdateLocationsStep};
pub use contact_peers::ContactPeersStep;
pub use context::{NotifyProcessContext, RoundState};
pub use election::{elect_master, ElectMasterStep};
pub use latch::CountDownLatch;
pub use send_notifications::SendNotificationsStep;

pub(crate) use cleanup::update_locations;
