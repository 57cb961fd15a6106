use thiserror::Error;

use crate::broker::BrokerError;

/// Broker RPC the provisioner was running when it failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisioningStep {
	/// Checking whether the subscription exists
	CheckSubscription,
	/// Checking whether the topic exists
	CheckTopic,
	/// Creating the topic
	CreateTopic,
	/// Creating the subscription
	CreateSubscription,
}

impl std::fmt::Display for ProvisioningStep {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let step = match self {
			| ProvisioningStep::CheckSubscription => {
				"check if subscription exists"
			}
			| ProvisioningStep::CheckTopic => "check if topic exists",
			| ProvisioningStep::CreateTopic => "create topic",
			| ProvisioningStep::CreateSubscription => "create subscription",
		};
		f.write_str(step)
	}
}

/// Why `Subscriber::connect` could not produce a broker connection
#[derive(Debug, Error)]
pub enum ConnectionEstablishmentError {
	/// The connector itself failed
	#[error("Broker connection failed: {0}")]
	Broker(#[from] BrokerError),

	/// The connector did not finish within the connect timeout
	#[error("Connection establishment timed out after {timeout_millis}ms")]
	Timeout {
		/// Configured connect timeout
		timeout_millis: u64,
	},
}

/// Errors returned by subscriber operations
#[derive(Debug, Error)]
pub enum SubscriberError {
	/// `subscribe` was called after `close`
	#[error("subscriber is closed")]
	SubscriberClosed,

	/// The subscription does not exist and creating it is disabled
	#[error("subscription {subscription} does not exist")]
	SubscriptionMissing {
		/// Derived subscription name
		subscription: String,
	},

	/// The topic does not exist and creating it is disabled
	#[error("topic {topic} does not exist")]
	TopicMissing {
		/// Topic name
		topic: String,
	},

	/// A broker RPC failed while checking or creating resources
	#[error("could not {step} {name}: {source}")]
	ProvisioningFailed {
		/// RPC that failed
		step: ProvisioningStep,
		/// Topic or subscription name the RPC targeted
		name: String,
		/// Broker error, unchanged
		#[source]
		source: BrokerError,
	},

	/// Invalid configuration parameter values
	#[error("Invalid configuration value: {0}")]
	ConfigurationValue(String),

	/// Connection establishment failed
	#[error("Failed to establish connection: {0}")]
	ConnectionEstablishment(#[from] ConnectionEstablishmentError),

	/// Releasing the broker connection failed during close
	#[error("Failed to release broker connection: {0}")]
	ConnectionRelease(#[source] BrokerError),
}

impl SubscriberError {
	/// Create a ConfigurationValue error
	pub fn configuration(reason: impl Into<String>) -> Self {
		SubscriberError::ConfigurationValue(reason.into())
	}

	/// Create a ProvisioningFailed error
	pub fn provisioning(
		step: ProvisioningStep,
		name: impl Into<String>,
		source: BrokerError,
	) -> Self {
		SubscriberError::ProvisioningFailed {
			step,
			name: name.into(),
			source,
		}
	}

	/// True for errors that cannot go away by retrying the same call
	pub fn is_permanent(&self) -> bool {
		matches!(
			self,
			SubscriberError::SubscriberClosed
				| SubscriberError::SubscriptionMissing { .. }
				| SubscriberError::TopicMissing { .. }
				| SubscriberError::ConfigurationValue(_)
		)
	}
}
