//! Master election among the live devices of a user.
//!
//! There is no election protocol: every device sorts the same set of addresses by their total
//! order and picks the first. Devices seeing the same live set agree without talking, and a
//! new round runs on every login, so a master that went away is replaced at the next probe.

use std::sync::Arc;

use async_trait::async_trait;
use hv_p2p::PeerAddress;
use hv_process::{Interrupter, ProcessError, Step};
use tracing::info;

use super::context::NotifyProcessContext;

pub fn elect_master<'a>(
	candidates: impl IntoIterator<Item = &'a PeerAddress>,
) -> Option<&'a PeerAddress> {
	candidates.into_iter().min()
}

/// Elects the master among the devices the probe found live.
pub struct ElectMasterStep {
	context: Arc<NotifyProcessContext>,
}

impl ElectMasterStep {
	#[must_use]
	pub const fn new(context: Arc<NotifyProcessContext>) -> Self {
		Self { context }
	}
}

#[async_trait]
impl Step for ElectMasterStep {
	fn name(&self) -> &'static str {
		"ElectMasterStep"
	}

	async fn execute(&mut self, _: &Interrupter) -> Result<(), ProcessError> {
		if let Some(master) = self.context.elect() {
			info!(
				%master,
				is_master = self.context.is_master(),
				"Master elected"
			);
		}

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use hv_p2p::PeerId;
	use uuid::Uuid;

	use super::*;

	fn address(n: u128) -> PeerAddress {
		PeerAddress::memory(PeerId::from_uuid(Uuid::from_u128(n)))
	}

	#[test]
	fn smallest_address_wins_regardless_of_order() {
		let addresses = [address(7), address(2), address(9), address(4)];
		let mut reversed = addresses.clone();
		reversed.reverse();

		assert_eq!(elect_master(&addresses), Some(&address(2)));
		assert_eq!(elect_master(&reversed), Some(&address(2)));
		assert_eq!(elect_master(&[]), None);
	}
}
