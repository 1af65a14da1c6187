use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use super::error::ProcessError;

/// The kind of interruption that can be requested on a running process tree, a pause or a cancel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptionKind {
	Pause,
	Cancel,
}

#[derive(Debug)]
struct CancelState {
	token: CancellationToken,
	reason: Mutex<Option<ProcessError>>,
	parent: Option<Arc<CancelState>>,
}

impl CancelState {
	fn reason(&self) -> Option<ProcessError> {
		self.reason
			.lock()
			.clone()
			.or_else(|| self.parent.as_ref().and_then(|parent| parent.reason()))
	}
}

/// A helper object handed to every executing step, so the step can decide the appropriated
/// moment to pause or to give up after a cancel request. There is no preemption: a step that
/// never checks its interrupter runs until it finishes on its own.
///
/// Interrupters form a tree that mirrors the async boundaries of a process: a cancel request
/// on a parent reaches every child, while canceling a child leaves the parent untouched.
#[derive(Debug, Clone)]
pub struct Interrupter {
	cancel: Arc<CancelState>,
	pause_tx: Arc<watch::Sender<bool>>,
	pause_rx: watch::Receiver<bool>,
}

impl Default for Interrupter {
	fn default() -> Self {
		Self::new()
	}
}

impl Interrupter {
	#[must_use]
	pub fn new() -> Self {
		let (pause_tx, pause_rx) = watch::channel(false);

		Self {
			cancel: Arc::new(CancelState {
				token: CancellationToken::new(),
				reason: Mutex::new(None),
				parent: None,
			}),
			pause_tx: Arc::new(pause_tx),
			pause_rx,
		}
	}

	/// Creates an interrupter for an async subtree. Pause requests are shared with the parent.
	#[must_use]
	pub fn child(&self) -> Self {
		Self {
			cancel: Arc::new(CancelState {
				token: self.cancel.token.child_token(),
				reason: Mutex::new(None),
				parent: Some(Arc::clone(&self.cancel)),
			}),
			pause_tx: Arc::clone(&self.pause_tx),
			pause_rx: self.pause_rx.clone(),
		}
	}

	/// Requests a cancel, the first reason given wins.
	pub fn cancel(&self, reason: ProcessError) {
		{
			let mut current = self.cancel.reason.lock();
			if current.is_none() {
				trace!(%reason, "Cancel requested");
				*current = Some(reason);
			}
		}

		self.cancel.token.cancel();
	}

	pub fn pause(&self) {
		self.pause_tx.send_replace(true);
	}

	pub fn resume(&self) {
		self.pause_tx.send_replace(false);
	}

	#[must_use]
	pub fn is_canceled(&self) -> bool {
		self.cancel.token.is_cancelled()
	}

	#[must_use]
	pub fn is_paused(&self) -> bool {
		*self.pause_rx.borrow()
	}

	/// Check if a pause or a cancel was requested, in a non-blocking manner. Cancel takes
	/// precedence over pause.
	#[must_use]
	pub fn try_check_interrupt(&self) -> Option<InterruptionKind> {
		if self.is_canceled() {
			Some(InterruptionKind::Cancel)
		} else if self.is_paused() {
			Some(InterruptionKind::Pause)
		} else {
			None
		}
	}

	/// The reason of the cancel request that reached this interrupter.
	#[must_use]
	pub fn cancellation(&self) -> ProcessError {
		self.cancel
			.reason()
			.unwrap_or_else(|| ProcessError::canceled("canceled by parent process"))
	}

	/// Fails with the cancellation reason if a cancel was requested.
	pub fn check(&self) -> Result<(), ProcessError> {
		if self.is_canceled() {
			Err(self.cancellation())
		} else {
			Ok(())
		}
	}

	/// Resolves when a cancel is requested.
	pub async fn canceled(&self) {
		self.cancel.token.cancelled().await;
	}

	/// Parks the caller while the tree is paused. A cancel request while parked ends the wait
	/// with the cancellation reason.
	pub async fn wait_while_paused(&self) -> Result<(), ProcessError> {
		let mut pause_rx = self.pause_rx.clone();

		tokio::select! {
			res = pause_rx.wait_for(|paused| !*paused) => {
				// The sender lives as long as any interrupter of this tree, so this never errors
				drop(res);
				self.check()
			}
			() = self.cancel.token.cancelled() => Err(self.cancellation()),
		}
	}
}

/// Early returns from a step's `execute` when the process was canceled, and parks it while
/// the process is paused. The cancellation reason is converted into the caller's error type.
#[macro_export]
macro_rules! check_interruption {
	($interrupter:expr) => {
		let interrupter: &$crate::Interrupter = $interrupter;

		match interrupter.try_check_interrupt() {
			Some($crate::InterruptionKind::Cancel) => {
				::tracing::trace!("Step was canceled");
				return Err(interrupter.cancellation().into());
			}
			Some($crate::InterruptionKind::Pause) => {
				::tracing::trace!("Step parked while the process is paused");
				interrupter.wait_while_paused().await?;
			}
			None => { /* Everything is Awesome! */ }
		}
	};
}
