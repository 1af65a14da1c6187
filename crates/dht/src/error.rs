use std::time::Duration;

use thiserror::Error;

/// Failures to reach the storage layer at all. Rejected writes are not errors, they are
/// reported as a [`PutStatus`](crate::PutStatus).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
	#[error("storage is unavailable: {0}")]
	Unavailable(String),
	#[error("storage operation timed out after {0:?}")]
	Timeout(Duration),
}
