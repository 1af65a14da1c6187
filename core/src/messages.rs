//! Direct messages between devices. Every message is sealed to the public keys of the user
//! owning the receiving device, so relays never see more than ciphertext.

use hv_crypto::{PublicKeys, UserKeyPair};
use hv_p2p::PeerAddress;
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
	/// Liveness probe between devices of one user, answered with a signature over the
	/// challenge as evidence the responder holds the user's keys.
	ContactPeer { challenge: [u8; 32] },
	ContactPeerResponse { evidence: Vec<u8> },
	Notification(Notification),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Notification {
	/// Another device of the same user changed the profile.
	ProfileChanged,
	/// Somebody queued a task for the receiving user.
	TaskQueued,
}

#[derive(Serialize, Deserialize)]
struct Sealed {
	sender: String,
	message: Message,
}

impl Message {
	pub fn seal(&self, sender: &str, recipient: &PublicKeys) -> Result<Vec<u8>> {
		let bytes = rmp_serde::to_vec_named(&Sealed {
			sender: sender.to_string(),
			message: self.clone(),
		})?;

		Ok(recipient.seal(&bytes)?)
	}

	/// Returns the claimed sender user and the message.
	pub fn open(sealed: &[u8], key_pair: &UserKeyPair) -> Result<(String, Self)> {
		let Sealed { sender, message } = rmp_serde::from_slice(&key_pair.open(sealed)?)?;
		Ok((sender, message))
	}
}

/// The bytes a device signs to answer a liveness probe, binding the evidence to the device
/// that answered.
#[must_use]
pub fn contact_evidence_message(challenge: &[u8; 32], responder: &PeerAddress) -> Vec<u8> {
	let mut message = Vec::with_capacity(challenge.len() + responder.endpoint.len() + 36);
	message.extend_from_slice(challenge);
	message.extend_from_slice(responder.peer_id.to_string().as_bytes());
	message.extend_from_slice(responder.endpoint.as_bytes());
	message
}
