use std::{mem, sync::Arc, time::Duration};

use tokio::{spawn, task::JoinHandle};
use tracing::{error, trace, warn, Instrument};

use super::{
	component::{Component, IntoComponent},
	error::ProcessError,
	interrupter::Interrupter,
	lifecycle::Lifecycle,
};

type AsyncOutput = (Box<Component>, Result<(), ProcessError>);

enum Slot {
	Idle(Box<Component>),
	InFlight {
		handle: JoinHandle<AsyncOutput>,
		interrupter: Interrupter,
	},
	Finished(Box<Component>),
	Detached,
}

/// Decorator that runs the wrapped component on its own tokio task.
///
/// Inside a [`SequentialProcess`](crate::SequentialProcess) the container moves on to the next
/// sibling right away and joins the wrapped component after its last synchronous child. The
/// decorator shares the wrapped component's lifecycle, so listeners and handles observe the
/// wrapped component directly.
pub struct AsyncComponent {
	pub(crate) lifecycle: Arc<Lifecycle>,
	slot: Slot,
}

impl AsyncComponent {
	pub fn new(component: impl IntoComponent) -> Self {
		let component = component.into_component();

		Self {
			lifecycle: Arc::clone(component.lifecycle()),
			slot: Slot::Idle(Box::new(component)),
		}
	}

	/// Used when the decorator is itself the root of a started process, which already owns a task.
	pub(crate) async fn run_inline(&mut self, interrupter: &Interrupter) -> Result<(), ProcessError> {
		let Slot::Idle(mut component) = mem::replace(&mut self.slot, Slot::Detached) else {
			return Err(ProcessError::AlreadyStarted(self.lifecycle.id()));
		};

		let res = component.run(interrupter).await;
		self.slot = Slot::Finished(component);

		res
	}

	pub(crate) fn spawn(&mut self, interrupter: Interrupter) {
		let Slot::Idle(mut component) = mem::replace(&mut self.slot, Slot::Detached) else {
			warn!(id = %self.lifecycle.id(), "Async component spawned twice, ignoring");
			return;
		};

		let lifecycle = Arc::clone(&self.lifecycle);

		let handle = spawn(
			{
				let interrupter = interrupter.clone();

				async move {
					let res = component.run(&interrupter).await;

					if res.is_ok() && !lifecycle.parent_is_live() {
						// The parent moved on while we were running, our effects must not outlive it
						warn!(
							name = %lifecycle.name(),
							"Async component finished after its parent stopped running, compensating;"
						);
						let reason = ProcessError::canceled("parent process is no longer running");
						component.rollback(&reason).await;
						return (component, Err(reason));
					}

					(component, res)
				}
			}
			.in_current_span(),
		);

		self.slot = Slot::InFlight {
			handle,
			interrupter,
		};
	}

	/// Waits at most `timeout` for the spawned component. Components that were not spawned
	/// report success, there is nothing to wait for.
	pub(crate) async fn join(&mut self, timeout: Duration) -> Result<(), ProcessError> {
		let Slot::InFlight { handle, .. } = &mut self.slot else {
			return Ok(());
		};

		match tokio::time::timeout(timeout, handle).await {
			Ok(Ok((component, res))) => {
				self.slot = Slot::Finished(component);
				res
			}
			Ok(Err(e)) => {
				error!(id = %self.lifecycle.id(), ?e, "Async component task failed to join;");
				self.slot = Slot::Detached;
				let reason = ProcessError::Join(self.lifecycle.id());
				self.lifecycle.fail(reason.clone());
				Err(reason)
			}
			Err(_) => Err(ProcessError::timeout(
				format!("async component '{}'", self.lifecycle.name()),
				timeout,
			)),
		}
	}

	/// Cancels a still running component and collects it for rollback. If it doesn't come back
	/// in time, it is detached and compensated whenever it finishes.
	pub(crate) async fn stop(&mut self, reason: &ProcessError, timeout: Duration) {
		if let Slot::InFlight { interrupter, .. } = &self.slot {
			interrupter.cancel(reason.clone());
		} else {
			return;
		}

		if let Err(e) = self.join(timeout).await {
			trace!(%e, "Stopped async component reported failure");
		}

		if !matches!(self.slot, Slot::InFlight { .. }) {
			return;
		}

		if let Slot::InFlight { handle, .. } = mem::replace(&mut self.slot, Slot::Detached) {
			warn!(
				name = %self.lifecycle.name(),
				"Async component did not stop in time, it will be compensated when it finishes;"
			);

			let reason = reason.clone();
			spawn(
				async move {
					if let Ok((mut component, Ok(()))) = handle.await {
						component.rollback(&reason).await;
					}
				}
				.in_current_span(),
			);
		}
	}

	pub(crate) async fn rollback_inner(&mut self, reason: &ProcessError) {
		match &mut self.slot {
			Slot::Finished(component) => component.rollback(reason).await,
			Slot::Idle(_) => trace!("Async component never ran, nothing to roll back"),
			Slot::InFlight { .. } | Slot::Detached => {
				trace!("Async component is not collected, rollback is up to its own task");
			}
		}
	}
}
