//! Broker gateway boundary
//!
//! The subscriber never talks to a transport directly. Everything it needs
//! from the managed broker (existence checks, creation, streaming receive,
//! acknowledgement and connection release) goes through [`BrokerGateway`].

/// Broker-side error type
pub mod error;
/// In-process broker used by tests and local development
pub mod in_memory;
/// Broker-native message representation
pub mod raw_message;

use arcstr::ArcStr;
use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;

pub use error::{BrokerError, RpcCode};
pub use in_memory::{BrokerCall, BrokerOperation, InMemoryBroker};
pub use raw_message::{OutgoingMessage, RawMessage};

use crate::subscriber::config::SubscriptionOptions;

/// Stream of raw messages produced by an open receive session.
///
/// The stream ends when the session is cancelled or the transport gives up;
/// a terminal transport failure is yielded as the last `Err` item.
pub type ReceiveSession = BoxStream<'static, Result<RawMessage, BrokerError>>;

/// Reference to a topic known to exist on the broker
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicRef {
	name: ArcStr,
}

impl TopicRef {
	/// Wraps a topic name the caller knows to exist.
	pub fn new(name: impl Into<ArcStr>) -> Self {
		Self { name: name.into() }
	}

	/// Broker-side topic name.
	pub fn name(&self) -> &ArcStr {
		&self.name
	}
}

/// Provisioned subscription bound to one topic.
///
/// Handles are cheap to clone and compare; the subscriber caches exactly one
/// per derived subscription name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
	name: ArcStr,
	topic: ArcStr,
}

impl SubscriptionHandle {
	/// Creates a handle for subscription `name` consuming from `topic`.
	pub fn new(name: impl Into<ArcStr>, topic: impl Into<ArcStr>) -> Self {
		Self {
			name: name.into(),
			topic: topic.into(),
		}
	}

	/// Subscription name as known to the broker.
	pub fn name(&self) -> &ArcStr {
		&self.name
	}

	/// Topic the subscription consumes from.
	pub fn topic(&self) -> &ArcStr {
		&self.topic
	}
}

/// Operations the subscriber needs from a managed publish/subscribe broker.
///
/// Implementations are shared read-only between every delivery loop, so all
/// methods take `&self`. `ack` and `nack` consume the message: a raw message
/// can be settled only once.
#[async_trait]
pub trait BrokerGateway: Send + Sync + 'static {
	/// Returns whether `name` exists as a topic.
	async fn topic_exists(&self, name: &str) -> Result<bool, BrokerError>;

	/// Returns whether `name` exists as a subscription.
	async fn subscription_exists(
		&self,
		name: &str,
	) -> Result<bool, BrokerError>;

	/// Creates topic `name`.
	async fn create_topic(&self, name: &str) -> Result<TopicRef, BrokerError>;

	/// Creates subscription `name` on `topic` with the given options.
	async fn create_subscription(
		&self,
		name: &str,
		topic: &TopicRef,
		options: &SubscriptionOptions,
	) -> Result<SubscriptionHandle, BrokerError>;

	/// Opens a streaming receive session.
	///
	/// The session must end once `cancel` fires.
	async fn receive(
		&self,
		subscription: &SubscriptionHandle,
		cancel: CancellationToken,
	) -> Result<ReceiveSession, BrokerError>;

	/// Acknowledges a message; the broker will not redeliver it.
	fn ack(&self, message: RawMessage);

	/// Negatively acknowledges a message; the broker redelivers it later.
	fn nack(&self, message: RawMessage);

	/// Releases the connection. Called once, after every loop has exited.
	async fn close(&self) -> Result<(), BrokerError>;
}
