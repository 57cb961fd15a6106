use thiserror::Error;

use crate::broker::BrokerError;
use crate::codec::CodecError;

/// Failures inside a delivery loop
///
/// Never returned to consumers: decode failures are nacked and skipped,
/// receive failures end the subscription's delivery and close its queue.
#[derive(Debug, Error)]
pub enum DeliveryError {
	/// A broker message could not be decoded
	#[error("could not decode message {message_id}: {source}")]
	DecodeFailed {
		/// Broker-assigned message id
		message_id: String,
		/// Codec failure
		#[source]
		source: CodecError,
	},

	/// The receive session terminated abnormally
	#[error("receive failed for subscription {subscription}: {source}")]
	ReceiveFailed {
		/// Subscription name
		subscription: String,
		/// Broker failure
		#[source]
		source: BrokerError,
	},
}
