use std::collections::HashMap;
use std::time::SystemTime;

use arcstr::ArcStr;
use bytes::Bytes;

/// Message as delivered by the broker, before decoding
///
/// Owned by the delivery loop until it is handed back to the gateway through
/// `ack` or `nack`, both of which take it by value.
#[derive(Debug)]
pub struct RawMessage {
	/// Broker-assigned message id
	pub id: ArcStr,
	/// Token the broker uses to match the settlement to this delivery
	pub ack_id: ArcStr,
	/// Message body
	pub data: Bytes,
	/// Broker attributes
	pub attributes: HashMap<String, String>,
	/// When the broker accepted the message
	pub publish_time: Option<SystemTime>,
	/// Delivery attempt, if the subscription tracks it
	pub delivery_attempt: Option<u32>,
}

impl RawMessage {
	/// Creates a first-attempt message without publish time.
	pub fn new(
		id: impl Into<ArcStr>,
		ack_id: impl Into<ArcStr>,
		data: impl Into<Bytes>,
		attributes: HashMap<String, String>,
	) -> Self {
		Self {
			id: id.into(),
			ack_id: ack_id.into(),
			data: data.into(),
			attributes,
			publish_time: None,
			delivery_attempt: None,
		}
	}
}

/// Broker-native shape a domain message encodes into
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OutgoingMessage {
	/// Message body
	pub data: Bytes,
	/// Broker attributes
	pub attributes: HashMap<String, String>,
	/// Optional ordering key
	pub ordering_key: Option<String>,
}
