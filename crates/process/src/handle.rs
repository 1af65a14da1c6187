use std::{sync::Arc, time::Duration};

use tracing::trace;

use super::{
	component::ComponentId,
	error::ProcessError,
	lifecycle::{Lifecycle, ProcessListener, ProcessState},
};

/// A handle to a component, usable before, during and after its execution, to observe it,
/// pause, resume or cancel it, or wait until it gets completed.
#[derive(Debug, Clone)]
pub struct ProcessHandle {
	lifecycle: Arc<Lifecycle>,
}

impl ProcessHandle {
	pub(crate) const fn new(lifecycle: Arc<Lifecycle>) -> Self {
		Self { lifecycle }
	}

	#[must_use]
	pub fn id(&self) -> ComponentId {
		self.lifecycle.id()
	}

	#[must_use]
	pub fn state(&self) -> ProcessState {
		self.lifecycle.state()
	}

	/// The reason the component failed, if it failed by itself.
	#[must_use]
	pub fn failure(&self) -> Option<ProcessError> {
		self.lifecycle.failure()
	}

	pub fn attach_listener(&self, listener: impl ProcessListener) {
		self.lifecycle.attach(Arc::new(listener));
	}

	pub fn attach_shared_listener(&self, listener: Arc<dyn ProcessListener>) {
		self.lifecycle.attach(listener);
	}

	/// Requests a cancel, which is handled exactly as if the component failed by itself: the
	/// containing process rolls back what already executed.
	pub fn cancel(&self, reason: impl Into<String>) {
		self.lifecycle.cancel(ProcessError::canceled(reason));
	}

	/// Gracefully pause the process tree at the next safe point.
	pub fn pause(&self) {
		if let Some(interrupter) = self.lifecycle.interrupter() {
			interrupter.pause();
		} else {
			trace!(id = %self.id(), "Component is not running, will not pause");
		}
	}

	pub fn resume(&self) {
		if let Some(interrupter) = self.lifecycle.interrupter() {
			interrupter.resume();
		} else {
			trace!(id = %self.id(), "Component is not running, will not resume");
		}
	}

	/// Waits at most `timeout` for the component to reach a terminal state.
	pub async fn wait(&self, timeout: Duration) -> Result<(), ProcessError> {
		let mut state_rx = self.lifecycle.subscribe();

		let finished = tokio::time::timeout(timeout, async {
			state_rx.wait_for(|state| state.is_terminal()).await.is_ok()
		})
		.await;

		match finished {
			Ok(true) => self.lifecycle.failure().map_or(Ok(()), Err),
			Ok(false) => Err(ProcessError::Join(self.id())),
			Err(_) => Err(ProcessError::timeout(
				format!("process '{}'", self.lifecycle.name()),
				timeout,
			)),
		}
	}
}
