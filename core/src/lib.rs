//! # Pub/Sub Subscriber
//!
//! Subscription lifecycle and message delivery on top of a managed
//! publish/subscribe broker that has its own topics and durable
//! subscriptions.
//!
//! ## Features
//!
//! - **Subscription provisioning**: Resolves the subscription behind a topic
//!   and creates it (and the topic) on first use when policy allows
//! - **At-most-once provisioning per name**: Concurrent first subscribers
//!   share a single provisioning pass
//! - **Ack-aware delivery**: Each message is acked or nacked to the broker
//!   exactly once, after the consumer decides
//! - **Drain-complete shutdown**: `close` returns only after every delivery
//!   loop has exited and every in-flight message is settled
//! - **Pluggable broker and codec**: Implement [`BrokerGateway`] for your
//!   broker client and [`MessageCodec`] for your attribute layout
//!
//! ## Quick Start
//!
//! ```rust
//! use pubsub_subscriber_core::{
//!     DefaultCodec, InMemoryBroker, Message, MessageCodec, Subscriber,
//!     SubscriberConfig,
//! };
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let broker = InMemoryBroker::new();
//! let subscriber = Subscriber::new(SubscriberConfig::new("demo"), broker.clone())?;
//!
//! // Creates topic "orders" and subscription "orders" on first use
//! let mut orders = subscriber.subscribe("orders").await?;
//!
//! let outgoing = DefaultCodec::new().encode(&Message::with_random_uuid("hello"))?;
//! broker.publish("orders", outgoing)?;
//!
//! if let Some(message) = orders.recv().await {
//!     println!("received {:?}", message.payload());
//!     message.ack();
//! }
//!
//! subscriber.close().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Custom Codec
//!
//! ```rust
//! use pubsub_subscriber_core::{
//!     CodecError, Message, MessageCodec, OutgoingMessage, RawMessage,
//! };
//!
//! struct PayloadOnly;
//!
//! impl MessageCodec for PayloadOnly {
//!     fn decode(&self, raw: &RawMessage) -> Result<Message, CodecError> {
//!         Ok(Message::new(raw.id.to_string(), raw.data.clone()))
//!     }
//!
//!     fn encode(&self, message: &Message) -> Result<OutgoingMessage, CodecError> {
//!         Ok(OutgoingMessage {
//!             data: message.payload().clone(),
//!             ..OutgoingMessage::default()
//!         })
//!     }
//! }
//! ```

#![warn(missing_docs)]

// Core modules
pub mod broker;
pub mod codec;
pub mod delivery;
pub mod message;
pub mod shutdown;
pub mod subscriber;

/// Value of the `provider` field on every log event
pub const PROVIDER: &str = "managed_pubsub";

// === Core Public API ===
pub use subscriber::{
	ConnectionSettings, Subscriber, SubscriberConfig, SubscriberError,
	SubscriberSettings, SubscriptionNameFn, SubscriptionOptions,
};
pub use delivery::MessageStream;
pub use message::{Message, Metadata, Settlement};
// Broker boundary
pub use broker::{
	BrokerError, BrokerGateway, InMemoryBroker, OutgoingMessage, RawMessage,
	ReceiveSession, RpcCode, SubscriptionHandle, TopicRef,
};
// Message conversion
pub use codec::{CodecError, DefaultCodec, MessageCodec};

/// Result type alias for operations that may fail with SubscriberError
pub type Result<T> = std::result::Result<T, SubscriberError>;

/// Prelude module for convenient imports
///
/// ```rust
/// use pubsub_subscriber_core::prelude::*;
/// ```
pub mod prelude {
	pub use crate::{
		BrokerGateway, DefaultCodec, Message, MessageCodec, MessageStream,
		Result, Subscriber, SubscriberConfig, SubscriberError,
		SubscriptionNameFn, SubscriptionOptions,
	};
}

/// Error types used throughout the library
///
/// ```rust
/// use pubsub_subscriber_core::errors::*;
/// ```
pub mod errors {
	pub use crate::broker::{BrokerError, RpcCode};
	pub use crate::codec::CodecError;
	pub use crate::delivery::DeliveryError;
	pub use crate::subscriber::{
		ConnectionEstablishmentError, ProvisioningStep, SubscriberError,
	};
}
