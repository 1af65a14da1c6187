use std::sync::Arc;

use async_trait::async_trait;
use hv_process::{check_interruption, Interrupter, ProcessError, Step};
use tracing::info;

use crate::notify::{update_locations, NotifyProcessContext};

/// Takes this device out of the user's locations, so nobody waits for it anymore.
pub struct RemoveOwnLocationStep {
	context: Arc<NotifyProcessContext>,
}

impl RemoveOwnLocationStep {
	#[must_use]
	pub const fn new(context: Arc<NotifyProcessContext>) -> Self {
		Self { context }
	}
}

#[async_trait]
impl Step for RemoveOwnLocationStep {
	fn name(&self) -> &'static str {
		"RemoveOwnLocationStep"
	}

	async fn execute(&mut self, interrupter: &Interrupter) -> Result<(), ProcessError> {
		check_interruption!(interrupter);

		let own_address = self.context.session().address().clone();

		let res = update_locations(&self.context, &[own_address], None).await;
		let locations = self.context.errors().capture(res)?;

		info!(remaining = locations.len(), "Device logged out");
		Ok(())
	}
}
