//! Subscriber facade
//!
//! [`Subscriber`] is the only entry point callers need: `subscribe` resolves
//! (and if allowed provisions) the subscription behind a topic and starts its
//! delivery loop, `close` drains every loop and releases the broker
//! connection.

pub mod config;
/// Subscriber error types
pub mod error;
pub mod provisioner;
pub mod registry;

#[cfg(test)]
mod subscriber_tests;

use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info};

pub use config::{
	ConnectionSettings, SubscriberConfig, SubscriberSettings,
	SubscriptionNameFn, SubscriptionOptions,
};
pub use error::{ConnectionEstablishmentError, ProvisioningStep, SubscriberError};
pub use provisioner::{ProvisioningPolicy, SubscriptionProvisioner};
pub use registry::SubscriptionRegistry;

use crate::PROVIDER;
use crate::broker::{BrokerError, BrokerGateway, SubscriptionHandle};
use crate::codec::{DefaultCodec, MessageCodec};
use crate::delivery::{DeliveryLoop, MessageStream};
use crate::shutdown::ShutdownCoordinator;

/// Subscribes to broker topics and delivers acknowledgeable messages.
///
/// Cheap to clone; clones share the broker connection, the subscription
/// cache and the shutdown state. Call [`close`](Self::close) and await it
/// before dropping the last clone.
pub struct Subscriber<G, C = DefaultCodec> {
	inner: Arc<SubscriberInner<G, C>>,
}

struct SubscriberInner<G, C> {
	project_id: String,
	gateway: Arc<G>,
	codec: Arc<C>,
	registry: SubscriptionRegistry,
	shutdown: ShutdownCoordinator,
	settings: SubscriberSettings,
}

impl<G, C> Clone for Subscriber<G, C> {
	fn clone(&self) -> Self {
		Self {
			inner: Arc::clone(&self.inner),
		}
	}
}

impl<G, C> Subscriber<G, C>
where
	G: BrokerGateway,
	C: MessageCodec,
{
	/// Creates a subscriber on top of an established broker connection.
	///
	/// # Errors
	/// Returns `SubscriberError::ConfigurationValue` if the config is invalid.
	pub fn new(
		config: SubscriberConfig<C>,
		gateway: G,
	) -> Result<Self, SubscriberError> {
		config.validate()?;
		let policy = ProvisioningPolicy {
			do_not_create_subscription_if_missing: config
				.do_not_create_subscription_if_missing,
			do_not_create_topic_if_missing: config
				.do_not_create_topic_if_missing,
			subscription: config.subscription,
		};
		Ok(Self {
			inner: Arc::new(SubscriberInner {
				project_id: config.project_id,
				gateway: Arc::new(gateway),
				codec: Arc::new(config.codec),
				registry: SubscriptionRegistry::new(
					config.subscription_name,
					policy,
				),
				shutdown: ShutdownCoordinator::new(),
				settings: config.settings,
			}),
		})
	}

	/// Validates the config, then establishes the broker connection with
	/// `connector` under the configured connect timeout.
	///
	/// `connector` receives the project id and the connection settings.
	pub async fn connect<F, Fut>(
		config: SubscriberConfig<C>,
		connector: F,
	) -> Result<Self, SubscriberError>
	where
		F: FnOnce(String, ConnectionSettings) -> Fut,
		Fut: Future<Output = Result<G, BrokerError>>,
	{
		config.validate()?;
		let timeout_millis = config.connection.connect_timeout_millis;
		let gateway = tokio::time::timeout(
			config.connection.connect_timeout(),
			connector(config.project_id.clone(), config.connection.clone()),
		)
		.await
		.map_err(|_| ConnectionEstablishmentError::Timeout { timeout_millis })?
		.map_err(ConnectionEstablishmentError::Broker)?;
		debug!(
			provider = PROVIDER,
			project_id = %config.project_id,
			"Broker connection established"
		);
		Self::new(config, gateway)
	}

	/// Subscribes to `topic` and returns its live message queue.
	///
	/// The subscription is resolved (and provisioned if missing and allowed)
	/// before this returns, so provisioning errors are returned here rather
	/// than surfacing as a closed queue. Messages then stream concurrently
	/// until the subscriber closes. Repeated calls for the same topic share
	/// one subscription and compete for its messages.
	///
	/// # Errors
	/// `SubscriberClosed` after [`close`](Self::close), or any provisioning
	/// error.
	pub async fn subscribe(
		&self,
		topic: &str,
	) -> Result<MessageStream, SubscriberError> {
		let inner = &self.inner;
		if inner.shutdown.is_closed() {
			return Err(SubscriberError::SubscriberClosed);
		}

		let subscription_name = inner.registry.subscription_name(topic);
		info!(
			provider = PROVIDER,
			project_id = %inner.project_id,
			topic = %topic,
			subscription_name = %subscription_name,
			"Subscribing to topic"
		);

		let subscription = inner
			.registry
			.resolve(inner.gateway.as_ref(), topic)
			.await
			.inspect_err(|err| {
				error!(
					provider = PROVIDER,
					topic = %topic,
					subscription_name = %subscription_name,
					error = %err,
					"Could not obtain subscription"
				);
			})?;

		let (output, queue) = mpsc::channel(inner.settings.output_buffer);
		let closing = inner.shutdown.child_token();
		let delivery = DeliveryLoop::new(
			Arc::clone(&inner.gateway),
			Arc::clone(&inner.codec),
			subscription.clone(),
			output,
			closing.clone(),
			inner.settings.max_outstanding_messages,
		);
		inner
			.shutdown
			.spawn(async move {
				if let Err(err) = delivery.run().await {
					debug!(provider = PROVIDER, error = %err, "Delivery loop stopped");
				}
			})
			.ok_or(SubscriberError::SubscriberClosed)?;

		Ok(MessageStream::new(queue, subscription, closing))
	}

	/// Stops every delivery loop, waits until all have exited and releases
	/// the broker connection.
	///
	/// Idempotent: later calls return `Ok(())` immediately.
	///
	/// # Errors
	/// `ConnectionRelease` if the broker connection could not be released.
	pub async fn close(&self) -> Result<(), SubscriberError> {
		if !self.inner.shutdown.close().await {
			return Ok(());
		}

		self.inner
			.gateway
			.close()
			.await
			.map_err(SubscriberError::ConnectionRelease)?;
		info!(provider = PROVIDER, "Subscriber closed");
		Ok(())
	}

	/// True once [`close`](Self::close) has been called.
	pub fn is_closed(&self) -> bool {
		self.inner.shutdown.is_closed()
	}

	/// Number of delivery loops still running.
	pub fn active_subscriptions(&self) -> usize {
		self.inner.shutdown.active()
	}

	/// Cached subscription for `topic`, if it has been resolved.
	pub async fn subscription(&self, topic: &str) -> Option<SubscriptionHandle> {
		self.inner.registry.cached(topic).await
	}

	/// Broker gateway the subscriber was built on.
	pub fn gateway(&self) -> &G {
		&self.inner.gateway
	}
}

impl<G, C> Drop for SubscriberInner<G, C> {
	fn drop(&mut self) {
		if !self.shutdown.is_closed() && self.shutdown.active() > 0 {
			error!(
				provider = PROVIDER,
				active_subscriptions = self.shutdown.active(),
				"Subscriber dropped without calling close(). Please call \
				 close() and await its completion before dropping."
			);
			self.shutdown.abort();
		}
	}
}
