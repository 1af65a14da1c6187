use std::sync::Arc;

use async_trait::async_trait;
use hv_process::{check_interruption, Interrupter, ProcessError, Step};
use tracing::debug;

use crate::{
	error::{Error, Result},
	model::UserProfile,
	notify::NotifyProcessContext,
};

pub type ProfileChange = Box<dyn Fn(&mut UserProfile) -> Result<()> + Send + Sync>;

/// Applies `change` to the latest profile, re-fetching if another device of the user wrote the
/// profile first.
pub(crate) async fn modify_profile(
	context: &NotifyProcessContext,
	change: &(dyn Fn(&mut UserProfile) -> Result<()> + Send + Sync),
) -> Result<UserProfile> {
	let manager = context.session().profile_manager(Arc::clone(&context.services().data));
	let key = manager.key().clone();

	manager
		.modify_with_retry(
			context.services().config.network.max_put_retries,
			|current| {
				let mut profile = current.ok_or_else(|| Error::NotFound(key.clone()))?;
				change(&mut profile)?;
				Ok(profile)
			},
		)
		.await
}

/// Changes the user profile, undoing the change with `undo` on rollback.
pub struct UpdateProfileStep {
	context: Arc<NotifyProcessContext>,
	change: ProfileChange,
	undo: Option<ProfileChange>,
	applied: bool,
}

impl UpdateProfileStep {
	#[must_use]
	pub fn new(
		context: Arc<NotifyProcessContext>,
		change: impl Fn(&mut UserProfile) -> Result<()> + Send + Sync + 'static,
	) -> Self {
		Self {
			context,
			change: Box::new(change),
			undo: None,
			applied: false,
		}
	}

	#[must_use]
	pub fn with_undo(
		mut self,
		undo: impl Fn(&mut UserProfile) -> Result<()> + Send + Sync + 'static,
	) -> Self {
		self.undo = Some(Box::new(undo));
		self
	}
}

#[async_trait]
impl Step for UpdateProfileStep {
	fn name(&self) -> &'static str {
		"UpdateProfileStep"
	}

	async fn execute(&mut self, interrupter: &Interrupter) -> std::result::Result<(), ProcessError> {
		check_interruption!(interrupter);

		let res = modify_profile(&self.context, &*self.change).await;
		self.context.errors().capture(res)?;
		self.applied = true;

		Ok(())
	}

	async fn rollback(&mut self, reason: &ProcessError) -> std::result::Result<(), ProcessError> {
		if let (true, Some(undo)) = (self.applied, &self.undo) {
			debug!(%reason, "Undoing profile change");
			modify_profile(&self.context, &**undo).await?;
			self.applied = false;
		}

		Ok(())
	}
}
