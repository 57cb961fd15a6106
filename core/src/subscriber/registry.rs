//! Cache of resolved subscriptions

use std::collections::HashMap;

use tokio::sync::RwLock;

use super::config::SubscriptionNameFn;
use super::error::SubscriberError;
use super::provisioner::{ProvisioningPolicy, SubscriptionProvisioner};
use crate::broker::{BrokerGateway, SubscriptionHandle};

/// Cache of provisioned subscriptions keyed by derived subscription name
///
/// Lookups take the read lock. A miss takes the write lock, checks again
/// and provisions while still holding it, so concurrent first calls for a
/// name trigger exactly one provisioning pass. Failures are not cached.
pub struct SubscriptionRegistry {
	naming: SubscriptionNameFn,
	policy: ProvisioningPolicy,
	handles: RwLock<HashMap<String, SubscriptionHandle>>,
}

impl SubscriptionRegistry {
	/// Empty registry.
	pub fn new(naming: SubscriptionNameFn, policy: ProvisioningPolicy) -> Self {
		Self {
			naming,
			policy,
			handles: RwLock::new(HashMap::new()),
		}
	}

	/// Subscription name `topic` maps to.
	pub fn subscription_name(&self, topic: &str) -> String {
		self.naming.derive(topic)
	}

	/// Cached handle for `topic`, provisioning it on the first call.
	pub async fn resolve<G>(
		&self,
		gateway: &G,
		topic: &str,
	) -> Result<SubscriptionHandle, SubscriberError>
	where
		G: BrokerGateway,
	{
		let name = self.subscription_name(topic);

		if let Some(handle) = self.handles.read().await.get(&name) {
			return Ok(handle.clone());
		}

		let mut handles = self.handles.write().await;
		if let Some(handle) = handles.get(&name) {
			return Ok(handle.clone());
		}

		let handle = SubscriptionProvisioner::new(gateway, &self.policy)
			.provision(&name, topic)
			.await?;
		handles.insert(name, handle.clone());
		Ok(handle)
	}

	/// Number of cached handles.
	pub async fn cached_count(&self) -> usize {
		self.handles.read().await.len()
	}

	/// Cached handle for `topic`, without provisioning.
	pub async fn cached(&self, topic: &str) -> Option<SubscriptionHandle> {
		let name = self.subscription_name(topic);
		self.handles.read().await.get(&name).cloned()
	}
}
