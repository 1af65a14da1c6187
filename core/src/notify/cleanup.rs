use std::sync::Arc;

use async_trait::async_trait;
use hv_p2p::PeerAddress;
use hv_process::{check_interruption, Interrupter, ProcessError, Step};
use tracing::{debug, instrument, warn};

use super::context::{NotifyProcessContext, RoundState};
use crate::{
	error::{report_error, Result},
	model::Locations,
};

/// Removes `remove` from the user's locations and adds `add`, re-fetching and re-applying the
/// change whenever another device wrote the locations first.
#[instrument(skip(context), fields(user_id = %context.session().user_id()))]
pub(crate) async fn update_locations(
	context: &NotifyProcessContext,
	remove: &[PeerAddress],
	add: Option<&PeerAddress>,
) -> Result<Locations> {
	let services = context.services();
	let session = context.session();

	session
		.locations_manager(Arc::clone(&services.data))
		.modify_with_retry(services.config.network.max_cleanup_attempts, |current| {
			let mut locations = current.unwrap_or_else(|| Locations::new(session.user_id()));

			for address in remove {
				if locations.remove(address) {
					debug!(%address, "Removed device from locations");
				}
			}
			if let Some(address) = add {
				locations.add(address.clone());
			}

			Ok(locations)
		})
		.await
}

/// Brings the user's locations in line with a liveness probe: devices that didn't answer go,
/// this device is added. Undone by removing this device again if it wasn't listed before.
pub struct UpdateLocationsStep {
	context: Arc<NotifyProcessContext>,
	added_self: bool,
}

impl UpdateLocationsStep {
	#[must_use]
	pub const fn new(context: Arc<NotifyProcessContext>) -> Self {
		Self {
			context,
			added_self: false,
		}
	}

	async fn run(&mut self) -> Result<()> {
		let own_address = self.context.session().address().clone();

		let listed_before = self
			.context
			.session()
			.locations_manager(Arc::clone(&self.context.services().data))
			.get_latest()
			.await?
			.is_some_and(|(locations, _)| locations.contains(&own_address));

		update_locations(
			&self.context,
			&self.context.unreachable(),
			Some(&own_address),
		)
		.await?;

		self.added_self = !listed_before;
		self.context.set_state(RoundState::LocationsUpdated);

		Ok(())
	}
}

#[async_trait]
impl Step for UpdateLocationsStep {
	fn name(&self) -> &'static str {
		"UpdateLocationsStep"
	}

	async fn execute(&mut self, interrupter: &Interrupter) -> std::result::Result<(), ProcessError> {
		check_interruption!(interrupter);

		let res = self.run().await;
		self.context.errors().capture(res)
	}

	async fn rollback(&mut self, reason: &ProcessError) -> std::result::Result<(), ProcessError> {
		if !self.added_self {
			return Ok(());
		}

		debug!(%reason, "Removing this device from the locations again");
		let own_address = self.context.session().address().clone();
		update_locations(&self.context, &[own_address], None).await?;
		self.added_self = false;

		Ok(())
	}
}

/// Removes the own devices found unreachable during this process from the user's locations.
///
/// Never fails the process: the locations only drive who gets notified, a stale entry costs
/// a failed delivery at the next round.
pub struct RemoveUnreachableLocationsStep {
	context: Arc<NotifyProcessContext>,
}

impl RemoveUnreachableLocationsStep {
	#[must_use]
	pub const fn new(context: Arc<NotifyProcessContext>) -> Self {
		Self { context }
	}
}

#[async_trait]
impl Step for RemoveUnreachableLocationsStep {
	fn name(&self) -> &'static str {
		"RemoveUnreachableLocationsStep"
	}

	async fn execute(&mut self, interrupter: &Interrupter) -> std::result::Result<(), ProcessError> {
		check_interruption!(interrupter);

		let unreachable = self.context.unreachable();
		if unreachable.is_empty() {
			return Ok(());
		}

		let res = update_locations(&self.context, &unreachable, None).await;
		if res.is_err() {
			warn!(
				unreachable = unreachable.len(),
				"Failed to remove unreachable devices from the locations"
			);
		}
		report_error(&res.map(|_| ()));

		Ok(())
	}
}
