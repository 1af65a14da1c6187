use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use futures::{future::BoxFuture, FutureExt};
use tokio::spawn;
use tracing::{debug, error, trace, trace_span, Instrument};
use uuid::Uuid;

use super::{
	async_component::AsyncComponent,
	error::ProcessError,
	handle::ProcessHandle,
	interrupter::Interrupter,
	lifecycle::{Lifecycle, ProcessListener, ProcessState},
	sequential::SequentialProcess,
};

/// How long a timed out process gets to roll back after being canceled.
pub const CANCEL_GRACE_PERIOD: Duration = Duration::from_secs(30);

/// A unique identifier for a component using the [`uuid`](https://docs.rs/uuid) crate.
pub type ComponentId = Uuid;

/// The unit of work of a process.
///
/// `execute` does the work and `rollback` compensates it after a later failure in the
/// containing process. Rollback is only ever called on a step whose `execute` succeeded, and
/// at most once.
#[async_trait]
pub trait Step: Send + Sync + 'static {
	/// Used in logs and as the default component name.
	fn name(&self) -> &'static str {
		std::any::type_name::<Self>()
	}

	/// The interrupter should be checked at every suspension point, see
	/// [`check_interruption!`](crate::check_interruption).
	async fn execute(&mut self, interrupter: &Interrupter) -> Result<(), ProcessError>;

	/// Compensating action. Failures here are logged and swallowed so the rollback of the
	/// remaining siblings still happens.
	async fn rollback(&mut self, _reason: &ProcessError) -> Result<(), ProcessError> {
		Ok(())
	}
}

/// A leaf of the process tree.
pub struct StepComponent {
	pub(crate) lifecycle: Arc<Lifecycle>,
	step: Box<dyn Step>,
}

impl StepComponent {
	pub fn new(step: impl Step) -> Self {
		Self {
			lifecycle: Lifecycle::new(step.name()),
			step: Box::new(step),
		}
	}
}

/// A node of the process tree, the small closed set of component kinds.
pub enum Component {
	Step(StepComponent),
	Sequential(SequentialProcess),
	Async(AsyncComponent),
}

impl fmt::Debug for Component {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let kind = match self {
			Self::Step(_) => "Step",
			Self::Sequential(_) => "Sequential",
			Self::Async(_) => "Async",
		};

		f.debug_struct("Component")
			.field("kind", &kind)
			.field("lifecycle", self.lifecycle())
			.finish()
	}
}

/// A helper trait to convert steps and containers into a [`Component`].
pub trait IntoComponent: Send {
	fn into_component(self) -> Component;
}

impl<T: Step> IntoComponent for T {
	fn into_component(self) -> Component {
		Component::Step(StepComponent::new(self))
	}
}

impl IntoComponent for Component {
	fn into_component(self) -> Component {
		self
	}
}

impl IntoComponent for SequentialProcess {
	fn into_component(self) -> Component {
		Component::Sequential(self)
	}
}

impl IntoComponent for AsyncComponent {
	fn into_component(self) -> Component {
		Component::Async(self)
	}
}

impl Component {
	pub(crate) const fn lifecycle(&self) -> &Arc<Lifecycle> {
		match self {
			Self::Step(step) => &step.lifecycle,
			Self::Sequential(sequential) => &sequential.lifecycle,
			Self::Async(async_component) => &async_component.lifecycle,
		}
	}

	#[must_use]
	pub fn id(&self) -> ComponentId {
		self.lifecycle().id()
	}

	#[must_use]
	pub fn name(&self) -> &str {
		self.lifecycle().name()
	}

	#[must_use]
	pub fn state(&self) -> ProcessState {
		self.lifecycle().state()
	}

	pub fn attach_listener(&self, listener: impl ProcessListener) {
		self.lifecycle().attach(Arc::new(listener));
	}

	/// A handle that can be taken before the component starts, e.g. to cancel it beforehand.
	#[must_use]
	pub fn handle(&self) -> ProcessHandle {
		ProcessHandle::new(Arc::clone(self.lifecycle()))
	}

	/// Runs the whole tree on the caller's task and returns its outcome.
	pub async fn execute(mut self) -> Result<(), ProcessError> {
		let interrupter = Interrupter::new();
		self.run(&interrupter).await
	}

	/// Runs the whole tree on its own tokio task, returning immediately. The outcome is
	/// observed through listeners or through [`ProcessHandle::wait`].
	pub fn start(self) -> ProcessHandle {
		let handle = self.handle();

		spawn(
			async move {
				let mut component = self;
				let interrupter = Interrupter::new();
				if let Err(e) = component.run(&interrupter).await {
					trace!(%e, "Started process finished with failure");
				}
			}
			.in_current_span(),
		);

		handle
	}

	/// Starts the tree and waits at most `timeout` for it to finish.
	///
	/// A tree still running at the timeout is canceled, and the timeout is only reported once
	/// it rolled back, bounded by [`CANCEL_GRACE_PERIOD`]. A tree that finished by itself
	/// before the cancel landed reports its own outcome.
	pub async fn execute_and_wait(self, timeout: Duration) -> Result<(), ProcessError> {
		let handle = self.start();

		let e = match handle.wait(timeout).await {
			Err(e @ ProcessError::Timeout { .. }) => e,
			res => return res,
		};

		debug!(id = %handle.id(), %e, "Canceling process that outlived its wait");
		handle.cancel(e.to_string());

		match handle.wait(CANCEL_GRACE_PERIOD).await {
			Ok(()) => Ok(()),
			Err(ProcessError::Timeout { .. }) => {
				error!(
					id = %handle.id(),
					grace = ?CANCEL_GRACE_PERIOD,
					"Timed out process did not roll back in time"
				);
				Err(e)
			}
			Err(_) => Err(e),
		}
	}

	/// Drives this component to a terminal state. Containers have already rolled back their
	/// executed children when this returns an error.
	pub(crate) fn run<'a>(
		&'a mut self,
		interrupter: &'a Interrupter,
	) -> BoxFuture<'a, Result<(), ProcessError>> {
		let span = trace_span!("component", name = %self.name(), id = %self.id());

		async move {
			let lifecycle = Arc::clone(self.lifecycle());

			let res = match self {
				Self::Step(step) => {
					lifecycle.try_start(interrupter)?;
					step.step.execute(interrupter).await
				}
				Self::Sequential(sequential) => {
					lifecycle.try_start(interrupter)?;
					sequential.execute_children(interrupter).await
				}
				// The decorator shares the wrapped component's lifecycle, which drives itself
				Self::Async(async_component) => return async_component.run_inline(interrupter).await,
			};

			match &res {
				Ok(()) => lifecycle.succeed(),
				Err(e) => lifecycle.fail(e.clone()),
			}

			res
		}
		.instrument(span)
		.boxed()
	}

	/// Compensates a component that executed successfully. Components that never ran, or that
	/// failed by themselves, are left untouched.
	pub(crate) fn rollback<'a>(&'a mut self, reason: &'a ProcessError) -> BoxFuture<'a, ()> {
		async move {
			let lifecycle = Arc::clone(self.lifecycle());

			if !matches!(self, Self::Async(_)) {
				if lifecycle.state() != ProcessState::Succeeded {
					trace!(
						id = %lifecycle.id(),
						state = %lifecycle.state(),
						"Skipping rollback of component that did not succeed"
					);
					return;
				}

				lifecycle.begin_rollback();
			}

			match self {
				Self::Step(step) => {
					trace!(name = %lifecycle.name(), "Rolling back step");
					if let Err(e) = step.step.rollback(reason).await {
						error!(
							name = %lifecycle.name(),
							?e,
							"Rollback of step failed, continuing with siblings;"
						);
					}
				}
				Self::Sequential(sequential) => sequential.rollback_children(reason).await,
				Self::Async(async_component) => {
					async_component.rollback_inner(reason).await;
					return;
				}
			}

			lifecycle.mark_rolled_back();
		}
		.boxed()
	}
}
