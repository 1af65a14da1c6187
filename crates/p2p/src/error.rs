use std::time::Duration;

use thiserror::Error;

use super::peer::PeerId;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
	#[error("peer <id='{0}'> is unreachable")]
	Unreachable(PeerId),
	#[error("peer <id='{peer}'> didn't answer within {timeout:?}")]
	Timeout { peer: PeerId, timeout: Duration },
	#[error("gave up sending to peer <id='{peer}'> after {attempts} attempts")]
	SendAttemptsExhausted { peer: PeerId, attempts: usize },
	#[error("the local messenger shut down before the response arrived")]
	Closed,
}
