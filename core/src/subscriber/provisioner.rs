//! Subscription provisioning against the broker

use tracing::{debug, info};

use super::error::{ProvisioningStep, SubscriberError};
use crate::PROVIDER;
use crate::broker::{BrokerGateway, SubscriptionHandle, TopicRef};
use crate::subscriber::config::SubscriptionOptions;

/// Creation policy applied when a subscription or topic is missing
#[derive(Debug, Clone, Default)]
pub struct ProvisioningPolicy {
	/// Fail instead of creating a missing subscription
	pub do_not_create_subscription_if_missing: bool,
	/// Fail instead of creating a missing topic
	pub do_not_create_topic_if_missing: bool,
	/// Options for created subscriptions
	pub subscription: SubscriptionOptions,
}

/// Ensures a subscription exists on the broker, creating it (and its topic)
/// when the policy allows.
///
/// A single pass, never retried: a failing RPC surfaces to the caller.
pub struct SubscriptionProvisioner<'a, G> {
	gateway: &'a G,
	policy: &'a ProvisioningPolicy,
}

impl<'a, G> SubscriptionProvisioner<'a, G>
where G: BrokerGateway
{
	/// Provisioner issuing RPCs through `gateway`.
	pub fn new(gateway: &'a G, policy: &'a ProvisioningPolicy) -> Self {
		Self { gateway, policy }
	}

	/// Returns the handle of subscription `name` on `topic`, creating the
	/// topic and subscription as the policy allows.
	pub async fn provision(
		&self,
		name: &str,
		topic: &str,
	) -> Result<SubscriptionHandle, SubscriberError> {
		let exists = self
			.gateway
			.subscription_exists(name)
			.await
			.map_err(|err| {
				SubscriberError::provisioning(
					ProvisioningStep::CheckSubscription,
					name,
					err,
				)
			})?;
		if exists {
			debug!(
				provider = PROVIDER,
				subscription_name = %name,
				topic = %topic,
				"Subscription already exists"
			);
			return Ok(SubscriptionHandle::new(name, topic));
		}

		if self.policy.do_not_create_subscription_if_missing {
			return Err(SubscriberError::SubscriptionMissing {
				subscription: name.to_string(),
			});
		}

		let topic_ref = self.ensure_topic(topic).await?;

		match self
			.gateway
			.create_subscription(name, &topic_ref, &self.policy.subscription)
			.await
		{
			| Ok(handle) => {
				info!(
					provider = PROVIDER,
					subscription_name = %name,
					topic = %topic,
					"Created subscription"
				);
				Ok(handle)
			}
			| Err(err) if err.is_already_exists() => {
				debug!(
					provider = PROVIDER,
					subscription_name = %name,
					"Subscription created concurrently by another client"
				);
				Ok(SubscriptionHandle::new(name, topic))
			}
			| Err(err) => Err(SubscriberError::provisioning(
				ProvisioningStep::CreateSubscription,
				name,
				err,
			)),
		}
	}

	async fn ensure_topic(&self, topic: &str) -> Result<TopicRef, SubscriberError> {
		let exists = self.gateway.topic_exists(topic).await.map_err(|err| {
			SubscriberError::provisioning(ProvisioningStep::CheckTopic, topic, err)
		})?;
		if exists {
			return Ok(TopicRef::new(topic));
		}

		if self.policy.do_not_create_topic_if_missing {
			return Err(SubscriberError::TopicMissing {
				topic: topic.to_string(),
			});
		}

		match self.gateway.create_topic(topic).await {
			| Ok(topic_ref) => {
				info!(provider = PROVIDER, topic = %topic, "Created topic");
				Ok(topic_ref)
			}
			| Err(err) if err.is_already_exists() => Ok(TopicRef::new(topic)),
			| Err(err) => Err(SubscriberError::provisioning(
				ProvisioningStep::CreateTopic,
				topic,
				err,
			)),
		}
	}
}
