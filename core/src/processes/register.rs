use std::sync::Arc;

use async_trait::async_trait;
use hv_process::{check_interruption, Interrupter, ProcessError, Step};
use tracing::{debug, info};

use crate::{
	data::{publish_public_keys, unpublish_public_keys},
	error::Result,
	model::{Locations, UserProfile},
	notify::NotifyProcessContext,
};

/// Claims the user id by publishing the user's public keys.
pub struct PublishPublicKeysStep {
	context: Arc<NotifyProcessContext>,
	published: bool,
}

impl PublishPublicKeysStep {
	#[must_use]
	pub const fn new(context: Arc<NotifyProcessContext>) -> Self {
		Self {
			context,
			published: false,
		}
	}

	async fn run(&mut self) -> Result<()> {
		let session = self.context.session();

		publish_public_keys(
			&self.context.services().data,
			session.user_id(),
			&session.key_pair().public_keys(),
			session.key_pair().signing_key(),
		)
		.await?;
		self.published = true;

		Ok(())
	}
}

#[async_trait]
impl Step for PublishPublicKeysStep {
	fn name(&self) -> &'static str {
		"PublishPublicKeysStep"
	}

	async fn execute(&mut self, interrupter: &Interrupter) -> std::result::Result<(), ProcessError> {
		check_interruption!(interrupter);

		let res = self.run().await;
		self.context.errors().capture(res)
	}

	async fn rollback(&mut self, _: &ProcessError) -> std::result::Result<(), ProcessError> {
		if self.published {
			let session = self.context.session();
			unpublish_public_keys(
				&self.context.services().data,
				session.user_id(),
				session.key_pair().signing_key(),
			)
			.await?;
			self.published = false;
		}

		Ok(())
	}
}

/// Stores the first version of a fresh profile, holding the user's key pair.
pub struct CreateProfileStep {
	context: Arc<NotifyProcessContext>,
	created: bool,
}

impl CreateProfileStep {
	#[must_use]
	pub const fn new(context: Arc<NotifyProcessContext>) -> Self {
		Self {
			context,
			created: false,
		}
	}

	async fn run(&mut self) -> Result<()> {
		let session = self.context.session();
		let profile = UserProfile::new(session.user_id(), session.key_pair());

		session
			.profile_manager(Arc::clone(&self.context.services().data))
			.ready_to_put(&profile, None)
			.await?;
		self.created = true;

		debug!("Created user profile");
		Ok(())
	}
}

#[async_trait]
impl Step for CreateProfileStep {
	fn name(&self) -> &'static str {
		"CreateProfileStep"
	}

	async fn execute(&mut self, interrupter: &Interrupter) -> std::result::Result<(), ProcessError> {
		check_interruption!(interrupter);

		let res = self.run().await;
		self.context.errors().capture(res)
	}

	async fn rollback(&mut self, _: &ProcessError) -> std::result::Result<(), ProcessError> {
		if self.created {
			self.context
				.session()
				.profile_manager(Arc::clone(&self.context.services().data))
				.remove()
				.await?;
			self.created = false;
		}

		Ok(())
	}
}

/// Stores an empty locations record, devices add themselves on login.
pub struct CreateLocationsStep {
	context: Arc<NotifyProcessContext>,
	created: bool,
}

impl CreateLocationsStep {
	#[must_use]
	pub const fn new(context: Arc<NotifyProcessContext>) -> Self {
		Self {
			context,
			created: false,
		}
	}

	async fn run(&mut self) -> Result<()> {
		let session = self.context.session();

		session
			.locations_manager(Arc::clone(&self.context.services().data))
			.ready_to_put(&Locations::new(session.user_id()), None)
			.await?;
		self.created = true;

		info!(user_id = session.user_id(), "User registered");
		Ok(())
	}
}

#[async_trait]
impl Step for CreateLocationsStep {
	fn name(&self) -> &'static str {
		"CreateLocationsStep"
	}

	async fn execute(&mut self, interrupter: &Interrupter) -> std::result::Result<(), ProcessError> {
		check_interruption!(interrupter);

		let res = self.run().await;
		self.context.errors().capture(res)
	}

	async fn rollback(&mut self, _: &ProcessError) -> std::result::Result<(), ProcessError> {
		if self.created {
			self.context
				.session()
				.locations_manager(Arc::clone(&self.context.services().data))
				.remove()
				.await?;
			self.created = false;
		}

		Ok(())
	}
}
