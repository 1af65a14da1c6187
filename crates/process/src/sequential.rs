use std::{sync::Arc, time::Duration};

use tracing::{debug, trace};

use super::{
	component::{Component, IntoComponent},
	error::ProcessError,
	interrupter::Interrupter,
	lifecycle::{Lifecycle, ProcessState},
};

/// How long a sequential container waits for each of its async children once every
/// synchronous child is done.
pub const DEFAULT_ASYNC_AWAIT_TIMEOUT: Duration = Duration::from_secs(60);

/// Runs its children strictly in insertion order.
///
/// When a child fails, no further child is scheduled and the children that already executed
/// are rolled back in reverse order before the container itself reports the failure. Async
/// children are spawned at their position and joined after the last synchronous child.
pub struct SequentialProcess {
	pub(crate) lifecycle: Arc<Lifecycle>,
	children: Vec<Component>,
	executed: Vec<usize>,
	async_await_timeout: Duration,
}

impl Default for SequentialProcess {
	fn default() -> Self {
		Self::new()
	}
}

impl SequentialProcess {
	#[must_use]
	pub fn new() -> Self {
		Self::named("SequentialProcess")
	}

	#[must_use]
	pub fn named(name: impl Into<String>) -> Self {
		Self {
			lifecycle: Lifecycle::new(name),
			children: Vec::new(),
			executed: Vec::new(),
			async_await_timeout: DEFAULT_ASYNC_AWAIT_TIMEOUT,
		}
	}

	#[must_use]
	pub const fn with_async_await_timeout(mut self, timeout: Duration) -> Self {
		self.async_await_timeout = timeout;
		self
	}

	/// Appends a child. Children added after the container started are ignored by the current run.
	pub fn add(&mut self, child: impl IntoComponent) -> &mut Self {
		let child = child.into_component();

		if self.lifecycle.state() != ProcessState::Ready {
			debug!(
				container = %self.lifecycle.name(),
				child = %child.name(),
				"Adding a child to a container that already started"
			);
		}

		child.lifecycle().set_parent(&self.lifecycle);
		self.children.push(child);

		self
	}

	#[must_use]
	pub fn with(mut self, child: impl IntoComponent) -> Self {
		self.add(child);
		self
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.children.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.children.is_empty()
	}

	pub(crate) async fn execute_children(
		&mut self,
		interrupter: &Interrupter,
	) -> Result<(), ProcessError> {
		self.executed.clear();

		let mut failure = None;

		for idx in 0..self.children.len() {
			if let Err(e) = self.checkpoint(interrupter).await {
				failure = Some(e);
				break;
			}

			if let Component::Async(async_child) = &mut self.children[idx] {
				async_child.spawn(interrupter.child());
				self.executed.push(idx);
				continue;
			}

			match self.children[idx].run(interrupter).await {
				Ok(()) => self.executed.push(idx),
				Err(e) => {
					failure = Some(e);
					break;
				}
			}
		}

		if failure.is_none() {
			failure = self.join_async_children().await.err();
		}

		// A cancel that landed during the last child still undoes the whole run
		if failure.is_none() {
			failure = interrupter.check().err();
		}

		let Some(reason) = failure else {
			return Ok(());
		};

		debug!(
			container = %self.lifecycle.name(),
			%reason,
			executed = self.executed.len(),
			"Child failed, rolling back executed children"
		);

		self.lifecycle.begin_rollback();
		self.stop_async_children(&reason).await;
		self.rollback_children(&reason).await;

		Err(reason)
	}

	/// Rolls back every executed child, last executed first.
	pub(crate) async fn rollback_children(&mut self, reason: &ProcessError) {
		while let Some(idx) = self.executed.pop() {
			self.children[idx].rollback(reason).await;
		}
	}

	async fn checkpoint(&self, interrupter: &Interrupter) -> Result<(), ProcessError> {
		interrupter.check()?;

		if interrupter.is_paused() {
			trace!(container = %self.lifecycle.name(), "Paused, parking before next child");
			self.lifecycle.set_paused(true);
			let res = interrupter.wait_while_paused().await;
			self.lifecycle.set_paused(false);
			res?;
		}

		Ok(())
	}

	async fn join_async_children(&mut self) -> Result<(), ProcessError> {
		let timeout = self.async_await_timeout;
		let mut first_failure = None;

		for child in &mut self.children {
			if let Component::Async(async_child) = child {
				if let Err(e) = async_child.join(timeout).await {
					first_failure.get_or_insert(e);
				}
			}
		}

		first_failure.map_or(Ok(()), Err)
	}

	async fn stop_async_children(&mut self, reason: &ProcessError) {
		let timeout = self.async_await_timeout;

		for child in &mut self.children {
			if let Component::Async(async_child) = child {
				async_child.stop(reason, timeout).await;
			}
		}
	}
}
