//! Conversion between broker-native and domain messages.

use thiserror::Error;

use crate::broker::{OutgoingMessage, RawMessage};
use crate::message::Message;

/// Attribute carrying the domain message UUID
pub const UUID_ATTRIBUTE: &str = "_message_uuid";

/// Errors raised while converting messages
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
	/// The broker message carries no UUID attribute
	#[error("broker message {message_id} has no `{attribute}` attribute")]
	MissingUuid {
		/// Broker-assigned message id
		message_id: String,
		/// Attribute that was expected
		attribute: String,
	},

	/// Message metadata uses a key reserved by the codec
	#[error("metadata key `{0}` is reserved")]
	ReservedAttribute(String),

	/// Codec-specific failure
	#[error("{0}")]
	Invalid(String),
}

/// Converts raw broker messages into domain messages and back.
///
/// Implement this trait to use a custom attribute layout or payload envelope.
pub trait MessageCodec: Send + Sync + 'static {
	/// Builds a domain message from a broker delivery.
	fn decode(&self, raw: &RawMessage) -> Result<Message, CodecError>;

	/// Builds the broker-native form of a domain message.
	fn encode(&self, message: &Message) -> Result<OutgoingMessage, CodecError>;
}

/// Default codec
///
/// Payload maps to the message data, the UUID travels in a reserved
/// attribute and every other attribute becomes metadata.
#[derive(Debug, Clone)]
pub struct DefaultCodec {
	uuid_attribute: String,
	require_uuid: bool,
}

impl Default for DefaultCodec {
	fn default() -> Self {
		Self {
			uuid_attribute: UUID_ATTRIBUTE.to_string(),
			require_uuid: false,
		}
	}
}

impl DefaultCodec {
	/// Creates a codec using [`UUID_ATTRIBUTE`].
	pub fn new() -> Self {
		Self::default()
	}

	/// Stores the UUID under a different attribute.
	pub fn with_uuid_attribute(mut self, attribute: impl Into<String>) -> Self {
		self.uuid_attribute = attribute.into();
		self
	}

	/// Rejects deliveries without a UUID instead of falling back to the
	/// broker message id.
	pub fn require_uuid(mut self, require: bool) -> Self {
		self.require_uuid = require;
		self
	}

	/// Attribute holding the UUID.
	pub fn uuid_attribute(&self) -> &str {
		&self.uuid_attribute
	}
}

impl MessageCodec for DefaultCodec {
	fn decode(&self, raw: &RawMessage) -> Result<Message, CodecError> {
		let uuid = match raw.attributes.get(&self.uuid_attribute) {
			| Some(uuid) if !uuid.is_empty() => uuid.clone(),
			| _ if self.require_uuid => {
				return Err(CodecError::MissingUuid {
					message_id: raw.id.to_string(),
					attribute: self.uuid_attribute.clone(),
				});
			}
			| _ => raw.id.to_string(),
		};

		let metadata = raw
			.attributes
			.iter()
			.filter(|(key, _)| **key != self.uuid_attribute)
			.map(|(key, value)| (key.clone(), value.clone()))
			.collect();

		Ok(Message::new(uuid, raw.data.clone()).with_metadata(metadata))
	}

	fn encode(&self, message: &Message) -> Result<OutgoingMessage, CodecError> {
		if message.metadata().contains_key(&self.uuid_attribute) {
			return Err(CodecError::ReservedAttribute(
				self.uuid_attribute.clone(),
			));
		}
		let mut attributes = message.metadata().clone();
		attributes.insert(self.uuid_attribute.clone(), message.uuid().to_string());
		Ok(OutgoingMessage {
			data: message.payload().clone(),
			attributes,
			ordering_key: None,
		})
	}
}

#[cfg(test)]
mod tests {
	use std::collections::HashMap;

	use bytes::Bytes;

	use super::*;

	fn raw_with(attributes: &[(&str, &str)]) -> RawMessage {
		let attributes = attributes
			.iter()
			.map(|(k, v)| (k.to_string(), v.to_string()))
			.collect::<HashMap<_, _>>();
		RawMessage::new("broker-1", "ack-1", Bytes::from_static(b"body"), attributes)
	}

	#[test]
	fn test_decode_splits_uuid_from_metadata() {
		let raw = raw_with(&[(UUID_ATTRIBUTE, "uuid-1"), ("tenant", "acme")]);

		let message = DefaultCodec::new().decode(&raw).unwrap();

		assert_eq!(message.uuid(), "uuid-1");
		assert_eq!(message.payload(), &Bytes::from_static(b"body"));
		assert_eq!(message.metadata().len(), 1);
		assert_eq!(message.metadata()["tenant"], "acme");
	}

	#[test]
	fn test_decode_falls_back_to_broker_id() {
		let raw = raw_with(&[("tenant", "acme")]);

		let message = DefaultCodec::new().decode(&raw).unwrap();

		assert_eq!(message.uuid(), "broker-1");
	}

	#[test]
	fn test_decode_rejects_missing_uuid_when_required() {
		let raw = raw_with(&[(UUID_ATTRIBUTE, "")]);

		let err = DefaultCodec::new().require_uuid(true).decode(&raw).unwrap_err();

		assert_eq!(err, CodecError::MissingUuid {
			message_id: "broker-1".to_string(),
			attribute: UUID_ATTRIBUTE.to_string(),
		});
	}

	#[test]
	fn test_encode_puts_uuid_in_attribute() {
		let mut message = Message::new("uuid-7", Bytes::from_static(b"x"));
		message.metadata_mut().insert("k".to_string(), "v".to_string());

		let outgoing = DefaultCodec::new().encode(&message).unwrap();

		assert_eq!(outgoing.attributes[UUID_ATTRIBUTE], "uuid-7");
		assert_eq!(outgoing.attributes["k"], "v");
		assert_eq!(outgoing.data, Bytes::from_static(b"x"));
	}

	#[test]
	fn test_encode_rejects_reserved_metadata() {
		let codec = DefaultCodec::new().with_uuid_attribute("id");
		let mut message = Message::new("uuid-7", Bytes::new());
		message.metadata_mut().insert("id".to_string(), "clash".to_string());

		assert_eq!(
			codec.encode(&message).unwrap_err(),
			CodecError::ReservedAttribute("id".to_string())
		);
	}
}
