use std::{
	fmt, mem,
	sync::{
		atomic::{AtomicBool, Ordering},
		Arc, Weak,
	},
};

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{trace, warn};

use super::{component::ComponentId, error::ProcessError, interrupter::Interrupter};

/// Lifecycle states shared by every component kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessState {
	Ready,
	Running,
	Paused,
	Succeeded,
	Failed,
}

impl ProcessState {
	#[must_use]
	pub const fn is_terminal(self) -> bool {
		matches!(self, Self::Succeeded | Self::Failed)
	}
}

impl fmt::Display for ProcessState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			Self::Ready => "READY",
			Self::Running => "RUNNING",
			Self::Paused => "PAUSED",
			Self::Succeeded => "SUCCEEDED",
			Self::Failed => "FAILED",
		};

		f.write_str(name)
	}
}

/// Observer of a component outcome.
///
/// Exactly one of `on_succeeded` or `on_failed` is called, always followed by `on_finished`.
/// Callbacks run on whatever task completed the component, so they must not block; anything
/// slow belongs in an [`AsyncComponent`](crate::AsyncComponent) instead.
pub trait ProcessListener: Send + Sync + 'static {
	fn on_succeeded(&self) {}

	fn on_failed(&self, _reason: &ProcessError) {}

	fn on_finished(&self) {}
}

impl<T: ProcessListener + ?Sized> ProcessListener for Arc<T> {
	fn on_succeeded(&self) {
		(**self).on_succeeded();
	}

	fn on_failed(&self, reason: &ProcessError) {
		(**self).on_failed(reason);
	}

	fn on_finished(&self) {
		(**self).on_finished();
	}
}

#[derive(Debug, Clone)]
enum Outcome {
	Succeeded,
	Failed(ProcessError),
}

impl Outcome {
	fn deliver(&self, listener: &dyn ProcessListener) {
		match self {
			Self::Succeeded => listener.on_succeeded(),
			Self::Failed(reason) => listener.on_failed(reason),
		}
		listener.on_finished();
	}
}

struct Inner {
	state: ProcessState,
	outcome: Option<Outcome>,
	listeners: Vec<Arc<dyn ProcessListener>>,
	interrupter: Option<Interrupter>,
	parent: Option<Weak<Lifecycle>>,
}

/// State shared between a component, its parent and every [`ProcessHandle`](crate::ProcessHandle)
/// pointing at it.
pub(crate) struct Lifecycle {
	id: ComponentId,
	name: String,
	inner: Mutex<Inner>,
	rolling_back: AtomicBool,
	state_tx: watch::Sender<ProcessState>,
}

impl fmt::Debug for Lifecycle {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Lifecycle")
			.field("id", &self.id)
			.field("name", &self.name)
			.field("state", &self.state())
			.finish_non_exhaustive()
	}
}

impl Lifecycle {
	pub fn new(name: impl Into<String>) -> Arc<Self> {
		let (state_tx, _state_rx) = watch::channel(ProcessState::Ready);

		Arc::new(Self {
			id: ComponentId::new_v4(),
			name: name.into(),
			inner: Mutex::new(Inner {
				state: ProcessState::Ready,
				outcome: None,
				listeners: Vec::new(),
				interrupter: None,
				parent: None,
			}),
			rolling_back: AtomicBool::new(false),
			state_tx,
		})
	}

	pub const fn id(&self) -> ComponentId {
		self.id
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn state(&self) -> ProcessState {
		self.inner.lock().state
	}

	pub fn failure(&self) -> Option<ProcessError> {
		match &self.inner.lock().outcome {
			Some(Outcome::Failed(reason)) => Some(reason.clone()),
			_ => None,
		}
	}

	pub fn subscribe(&self) -> watch::Receiver<ProcessState> {
		self.state_tx.subscribe()
	}

	pub fn set_parent(&self, parent: &Arc<Self>) {
		self.inner.lock().parent = Some(Arc::downgrade(parent));
	}

	/// A parent is live while it is still running or paused and has not begun rolling back.
	/// Roots have no parent and are always considered live, a dropped parent never is.
	pub fn parent_is_live(&self) -> bool {
		let parent = self.inner.lock().parent.clone();
		parent.map_or(true, |parent| parent.upgrade().is_some_and(|parent| parent.is_live()))
	}

	pub fn is_live(&self) -> bool {
		matches!(self.state(), ProcessState::Running | ProcessState::Paused)
			&& !self.rolling_back.load(Ordering::Acquire)
	}

	pub fn begin_rollback(&self) {
		self.rolling_back.store(true, Ordering::Release);
	}

	pub fn interrupter(&self) -> Option<Interrupter> {
		self.inner.lock().interrupter.clone()
	}

	/// READY -> RUNNING. A component canceled before it started reports its cancellation
	/// reason instead of running.
	pub fn try_start(&self, interrupter: &Interrupter) -> Result<(), ProcessError> {
		let mut inner = self.inner.lock();

		match inner.state {
			ProcessState::Ready => {
				inner.state = ProcessState::Running;
				inner.interrupter = Some(interrupter.clone());
				drop(inner);
				self.state_tx.send_replace(ProcessState::Running);
				trace!(id = %self.id, name = %self.name, "Component started");
				Ok(())
			}
			ProcessState::Failed => Err(match &inner.outcome {
				Some(Outcome::Failed(reason)) => reason.clone(),
				_ => ProcessError::canceled("canceled before start"),
			}),
			_ => Err(ProcessError::AlreadyStarted(self.id)),
		}
	}

	pub fn set_paused(&self, paused: bool) {
		let mut inner = self.inner.lock();
		let new_state = match (inner.state, paused) {
			(ProcessState::Running, true) => ProcessState::Paused,
			(ProcessState::Paused, false) => ProcessState::Running,
			_ => return,
		};
		inner.state = new_state;
		drop(inner);

		self.state_tx.send_replace(new_state);
	}

	pub fn succeed(&self) {
		self.finish(Outcome::Succeeded);
	}

	pub fn fail(&self, reason: ProcessError) {
		self.finish(Outcome::Failed(reason));
	}

	/// A succeeded component whose effects were compensated is no longer succeeded. Listeners
	/// already heard the outcome, so they are not called again.
	pub fn mark_rolled_back(&self) {
		let mut inner = self.inner.lock();
		if inner.state == ProcessState::Succeeded {
			inner.state = ProcessState::Failed;
			drop(inner);
			self.state_tx.send_replace(ProcessState::Failed);
		}
	}

	fn finish(&self, outcome: Outcome) {
		let (listeners, state) = {
			let mut inner = self.inner.lock();

			if inner.outcome.is_some() {
				trace!(id = %self.id, "Component already finished, ignoring new outcome");
				return;
			}

			let state = match &outcome {
				Outcome::Succeeded => ProcessState::Succeeded,
				Outcome::Failed(_) => ProcessState::Failed,
			};

			inner.state = state;
			inner.outcome = Some(outcome.clone());
			inner.interrupter = None;

			// taken under the same lock that records the outcome, late attachments go down the
			// immediate delivery path in `attach`
			(mem::take(&mut inner.listeners), state)
		};

		self.state_tx.send_replace(state);

		match &outcome {
			Outcome::Succeeded => trace!(id = %self.id, name = %self.name, "Component succeeded"),
			Outcome::Failed(reason) => {
				warn!(id = %self.id, name = %self.name, %reason, "Component failed");
			}
		}

		for listener in &listeners {
			outcome.deliver(listener.as_ref());
		}
	}

	/// Attaching to a finished component delivers the outcome immediately, on the caller's task.
	pub fn attach(&self, listener: Arc<dyn ProcessListener>) {
		let outcome = {
			let mut inner = self.inner.lock();
			if let Some(outcome) = inner.outcome.clone() {
				outcome
			} else {
				inner.listeners.push(listener);
				return;
			}
		};

		outcome.deliver(listener.as_ref());
	}

	/// Requests a cancel. A component that did not start yet fails right away and will never run.
	pub fn cancel(&self, reason: ProcessError) {
		let inner = self.inner.lock();

		match inner.state {
			ProcessState::Ready => {
				drop(inner);
				self.fail(reason);
			}
			ProcessState::Running | ProcessState::Paused => {
				let interrupter = inner.interrupter.clone();
				drop(inner);
				if let Some(interrupter) = interrupter {
					interrupter.cancel(reason);
				}
			}
			ProcessState::Succeeded | ProcessState::Failed => {
				trace!(id = %self.id, "Component already finished, ignoring cancel");
			}
		}
	}
}
