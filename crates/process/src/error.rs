use std::{fmt::Display, time::Duration};

use thiserror::Error;

use super::component::ComponentId;

/// Everything that can make a process component fail.
///
/// The error is also the rollback reason handed to every already executed component and to
/// listeners, so it is cheap to clone and carries only human readable context.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProcessError {
	#[error("execution failed: {0}")]
	Execution(String),
	#[error("canceled: {0}")]
	Canceled(String),
	#[error("timed out after {timeout:?} waiting for {what}")]
	Timeout { what: String, timeout: Duration },
	#[error("component <id='{0}'> was already started")]
	AlreadyStarted(ComponentId),
	#[error("async component <id='{0}'> panicked or was aborted")]
	Join(ComponentId),
}

impl ProcessError {
	/// Wraps any displayable error as an execution failure.
	pub fn execution(e: impl Display) -> Self {
		Self::Execution(e.to_string())
	}

	pub fn canceled(reason: impl Into<String>) -> Self {
		Self::Canceled(reason.into())
	}

	pub fn timeout(what: impl Into<String>, timeout: Duration) -> Self {
		Self::Timeout {
			what: what.into(),
			timeout,
		}
	}

	#[must_use]
	pub const fn is_cancellation(&self) -> bool {
		matches!(self, Self::Canceled(_))
	}
}
