//! # Pub/Sub Subscriber
//!
//! Subscription lifecycle and ack-aware message delivery on top of a managed
//! publish/subscribe broker.
//!
//! ## Features
//!
//! - **Automatic Provisioning**: Missing topics and subscriptions are created
//!   on first use unless disabled
//! - **Single Provisioning per Subscription**: Concurrent first subscribers
//!   wait for one shared check-and-create pass
//! - **Explicit Acknowledgement**: Consumers ack or nack every message; the
//!   broker sees exactly one verdict
//! - **Graceful Shutdown**: `close` drains every delivery loop and nacks
//!   messages nobody settled
//! - **Pluggable Broker**: Implement [`BrokerGateway`] over your broker client
//!
//! ## Quick Start
//!
//! ```rust
//! use pubsub_subscriber::prelude::*;
//! use pubsub_subscriber::InMemoryBroker;
//!
//! #[tokio::main]
//! async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
//!     let broker = InMemoryBroker::new();
//!     let config = SubscriberConfig::new("shop")
//!         .with_subscription_name(SubscriptionNameFn::with_suffix("-billing"));
//!     let subscriber = Subscriber::new(config, broker.clone())?;
//!
//!     let mut orders = subscriber.subscribe("orders").await?;
//!     broker.publish(
//!         "orders",
//!         DefaultCodec::new().encode(&Message::new("order-1", "two apples"))?,
//!     )?;
//!
//!     if let Some(message) = orders.recv().await {
//!         println!("{}: {:?}", message.uuid(), message.payload());
//!         message.ack();
//!     }
//!
//!     subscriber.close().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

pub use pubsub_subscriber_core::*;

/// Prelude module for convenient imports
///
/// ```rust
/// use pubsub_subscriber::prelude::*;
/// ```
pub mod prelude {
	//! Essential types for most subscriber applications

	pub use pubsub_subscriber_core::prelude::*;
}

/// Types for implementing a broker gateway or a custom codec
///
/// ```rust
/// use pubsub_subscriber::advanced::*;
/// ```
pub mod advanced {
	//! Broker boundary and provisioning internals

	pub use pubsub_subscriber_core::broker::{
		BrokerCall, BrokerOperation, OutgoingMessage, RawMessage,
		ReceiveSession, SubscriptionHandle, TopicRef,
	};
	pub use pubsub_subscriber_core::codec::UUID_ATTRIBUTE;
	pub use pubsub_subscriber_core::shutdown::ShutdownCoordinator;
	pub use pubsub_subscriber_core::subscriber::config::EMULATOR_HOST_ENV;
	pub use pubsub_subscriber_core::subscriber::{
		ProvisioningPolicy, SubscriptionProvisioner, SubscriptionRegistry,
	};
}
