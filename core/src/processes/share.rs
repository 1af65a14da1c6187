use std::sync::Arc;

use async_trait::async_trait;
use hv_process::{check_interruption, Interrupter, ProcessError, Step};
use tracing::debug;

use crate::{
	error::Result,
	model::{UserProfileTask, UserProfileTaskKind},
	notify::NotifyProcessContext,
	queue::UserProfileTaskQueue,
};

/// Drops a task into another user's queue, removing it again on rollback.
pub struct EnqueueTaskStep {
	context: Arc<NotifyProcessContext>,
	target_user: String,
	kind: UserProfileTaskKind,
	queued: Option<UserProfileTask>,
}

impl EnqueueTaskStep {
	pub fn new(
		context: Arc<NotifyProcessContext>,
		target_user: impl Into<String>,
		kind: UserProfileTaskKind,
	) -> Self {
		Self {
			context,
			target_user: target_user.into(),
			kind,
			queued: None,
		}
	}

	fn queue(&self) -> UserProfileTaskQueue {
		UserProfileTaskQueue::new(Arc::clone(&self.context.services().data))
	}

	async fn run(&mut self) -> Result<()> {
		let services = self.context.services();
		let session = self.context.session();

		let recipient = session
			.public_keys()
			.get(&services.data, &self.target_user)
			.await?;

		let task = UserProfileTask::new(
			session.user_id(),
			services.data.now_ms(),
			self.kind.clone(),
		);

		self.queue()
			.enqueue(&self.target_user, &task, &recipient)
			.await?;
		self.queued = Some(task);

		Ok(())
	}
}

#[async_trait]
impl Step for EnqueueTaskStep {
	fn name(&self) -> &'static str {
		"EnqueueTaskStep"
	}

	async fn execute(&mut self, interrupter: &Interrupter) -> std::result::Result<(), ProcessError> {
		check_interruption!(interrupter);

		let res = self.run().await;
		self.context.errors().capture(res)
	}

	async fn rollback(&mut self, reason: &ProcessError) -> std::result::Result<(), ProcessError> {
		if let Some(task) = self.queued.take() {
			debug!(%reason, task_id = %task.id, "Taking the queued task back");
			self.queue().remove(&self.target_user, &task).await?;
		}

		Ok(())
	}
}
