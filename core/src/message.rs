//! Domain message handed to consumers
//!
//! A [`Message`] carries a one-shot settlement channel back to the delivery
//! loop that produced it. `ack` and `nack` consume the message, so a consumer
//! settles it at most once; dropping an unsettled message counts as a nack.

use std::collections::HashMap;

use bytes::Bytes;
use tokio::sync::oneshot;

/// Metadata attached to a message
pub type Metadata = HashMap<String, String>;

/// Consumer verdict on a delivered message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
	/// Processed successfully; the broker may forget the message
	Ack,
	/// Not processed; the broker should redeliver it
	Nack,
}

/// Message delivered from a subscription
#[derive(Debug)]
pub struct Message {
	uuid: String,
	payload: Bytes,
	metadata: Metadata,
	settlement: Option<oneshot::Sender<Settlement>>,
}

impl Message {
	/// Creates a message not yet tracked by any delivery loop.
	pub fn new(uuid: impl Into<String>, payload: impl Into<Bytes>) -> Self {
		Self {
			uuid: uuid.into(),
			payload: payload.into(),
			metadata: Metadata::new(),
			settlement: None,
		}
	}

	/// Creates a message with a fresh random UUID.
	pub fn with_random_uuid(payload: impl Into<Bytes>) -> Self {
		Self::new(uuid::Uuid::new_v4().to_string(), payload)
	}

	/// Replaces the metadata.
	pub fn with_metadata(mut self, metadata: Metadata) -> Self {
		self.metadata = metadata;
		self
	}

	/// Unique message identifier.
	pub fn uuid(&self) -> &str {
		&self.uuid
	}

	/// Message body.
	pub fn payload(&self) -> &Bytes {
		&self.payload
	}

	/// Message metadata.
	pub fn metadata(&self) -> &Metadata {
		&self.metadata
	}

	/// Mutable access to the metadata.
	pub fn metadata_mut(&mut self) -> &mut Metadata {
		&mut self.metadata
	}

	/// Acknowledges the message.
	///
	/// Returns `false` when nobody is waiting for the verdict any more, e.g.
	/// the subscription closed and already nacked the message.
	pub fn ack(self) -> bool {
		self.settle(Settlement::Ack)
	}

	/// Negatively acknowledges the message so the broker redelivers it.
	///
	/// Returns `false` when nobody is waiting for the verdict any more.
	pub fn nack(self) -> bool {
		self.settle(Settlement::Nack)
	}

	fn settle(mut self, verdict: Settlement) -> bool {
		match self.settlement.take() {
			| Some(tx) => tx.send(verdict).is_ok(),
			| None => false,
		}
	}

	/// Attaches a settlement channel and returns its receiving half.
	///
	/// Any previously attached channel is dropped, which its owner observes
	/// as a nack.
	pub(crate) fn track(&mut self) -> oneshot::Receiver<Settlement> {
		let (tx, rx) = oneshot::channel();
		self.settlement = Some(tx);
		rx
	}
}
