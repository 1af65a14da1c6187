use std::{fmt::Display, sync::Arc};

use hv_dht::{Key, PutStatus};
use hv_process::ProcessError;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum Error {
	#[error(transparent)]
	Store(#[from] hv_dht::Error),
	#[error(transparent)]
	Network(#[from] hv_p2p::Error),
	#[error(transparent)]
	Crypto(#[from] hv_crypto::Error),
	#[error(transparent)]
	Process(#[from] ProcessError),

	#[error("failed to encode: {0}")]
	Encode(#[from] rmp_serde::encode::Error),
	#[error("failed to decode: {0}")]
	Decode(#[from] rmp_serde::decode::Error),

	/// Another writer got there first, re-fetch before retrying.
	#[error("version conflict writing <key='{key}'>: {status}")]
	VersionConflict { key: Key, status: PutStatus },
	#[error("write to <key='{key}'> refused: {status}")]
	PutRefused { key: Key, status: PutStatus },
	#[error("nothing stored at <key='{0}'>")]
	NotFound(Key),
	#[error("gave up after {attempts} attempts: {last}")]
	RetriesExhausted { attempts: usize, last: Box<Self> },

	#[error("no user is logged in on this node")]
	NotLoggedIn,
	#[error("user '{0}' is already logged in on this node")]
	AlreadyLoggedIn(String),
	#[error("user '{0}' is already registered")]
	AlreadyRegistered(String),
	#[error("unexpected message: {0}")]
	UnexpectedMessage(String),
	#[error("folder '{0}' does not exist in the user profile")]
	FolderNotFound(String),
}

impl Error {
	#[must_use]
	pub const fn is_version_conflict(&self) -> bool {
		matches!(self, Self::VersionConflict { .. })
	}

	/// Classifies a non ok [`PutStatus`] for `key`.
	#[must_use]
	pub fn from_status(key: &Key, status: PutStatus) -> Self {
		if status.is_version_conflict() {
			Self::VersionConflict {
				key: key.clone(),
				status,
			}
		} else {
			Self::PutRefused {
				key: key.clone(),
				status,
			}
		}
	}
}

impl From<Error> for ProcessError {
	fn from(e: Error) -> Self {
		process_error(&e)
	}
}

fn process_error(e: &Error) -> ProcessError {
	match e {
		Error::Process(e) => e.clone(),
		e => ProcessError::execution(e),
	}
}

pub type Result<T> = std::result::Result<T, Error>;

/// Keeps the first typed error of a process run, the process tree itself only carries its
/// message. Clones share the slot.
#[derive(Debug, Clone, Default)]
pub struct ErrorSlot(Arc<Mutex<Option<Error>>>);

impl ErrorSlot {
	/// Converts a step outcome for the process tree, keeping the typed error if it's the first.
	pub fn capture<T>(&self, res: Result<T>) -> std::result::Result<T, ProcessError> {
		res.map_err(|e| {
			let reason = process_error(&e);
			self.0.lock().get_or_insert(e);
			reason
		})
	}

	/// The captured error, or the process failure itself if no step captured one.
	pub fn into_error(self, failure: ProcessError) -> Error {
		self.0.lock().take().unwrap_or(Error::Process(failure))
	}
}

/// Logs the error of a result nobody else is going to look at.
pub fn report_error(res: &std::result::Result<(), impl Display>) {
	if let Err(e) = res {
		error!("{e:#}");
	}
}
