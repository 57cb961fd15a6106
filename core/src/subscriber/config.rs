//! Configuration for subscriber construction

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::SubscriberError;
use crate::codec::DefaultCodec;

/// Environment variable pointing the subscriber at a local emulator
pub const EMULATOR_HOST_ENV: &str = "PUBSUB_EMULATOR_HOST";

const MIN_ACK_DEADLINE: Duration = Duration::from_secs(10);
const MAX_ACK_DEADLINE: Duration = Duration::from_secs(600);
const MIN_RETENTION: Duration = Duration::from_secs(10 * 60);
const MAX_RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Derives the subscription name for a topic
///
/// Defaults to identity: the subscription is named after its topic.
#[derive(Clone)]
pub struct SubscriptionNameFn(Arc<dyn Fn(&str) -> String + Send + Sync>);

impl SubscriptionNameFn {
	/// Subscription name equals the topic name.
	pub fn identity() -> Self {
		Self::from_fn(str::to_string)
	}

	/// Subscription name is the topic name followed by `suffix`.
	pub fn with_suffix(suffix: impl Into<String>) -> Self {
		let suffix = suffix.into();
		Self::from_fn(move |topic| format!("{topic}{suffix}"))
	}

	/// Arbitrary naming function.
	pub fn from_fn(f: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
		Self(Arc::new(f))
	}

	/// Applies the naming function.
	pub fn derive(&self, topic: &str) -> String {
		(self.0)(topic)
	}
}

impl Default for SubscriptionNameFn {
	fn default() -> Self {
		Self::identity()
	}
}

impl fmt::Debug for SubscriptionNameFn {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("SubscriptionNameFn(..)")
	}
}

/// Broker-side options for subscriptions created by the subscriber
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionOptions {
	/// Time a consumer has to settle a message before redelivery
	pub ack_deadline: Duration,
	/// How long unacknowledged messages are kept; broker default if unset
	pub retention_duration: Option<Duration>,
	/// Keep acknowledged messages for the retention window
	pub retain_acked_messages: bool,
	/// Deliver messages with the same ordering key in order
	pub enable_message_ordering: bool,
	/// Broker-side attribute filter expression
	pub filter: Option<String>,
	/// Labels attached to the subscription
	pub labels: HashMap<String, String>,
}

impl Default for SubscriptionOptions {
	fn default() -> Self {
		Self {
			ack_deadline: MIN_ACK_DEADLINE,
			retention_duration: None,
			retain_acked_messages: false,
			enable_message_ordering: false,
			filter: None,
			labels: HashMap::new(),
		}
	}
}

/// Transport-level connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
	/// Endpoint override, e.g. an emulator; the broker default if unset
	pub endpoint: Option<String>,
	/// Upper bound on establishing the connection, in milliseconds
	pub connect_timeout_millis: u64,
	/// Client-reported user agent
	pub user_agent: Option<String>,
}

impl Default for ConnectionSettings {
	fn default() -> Self {
		Self {
			endpoint: None,
			connect_timeout_millis: 10_000,
			user_agent: None,
		}
	}
}

impl ConnectionSettings {
	/// Default settings with the endpoint taken from
	/// [`EMULATOR_HOST_ENV`] when it is set.
	pub fn from_env() -> Self {
		Self {
			endpoint: std::env::var(EMULATOR_HOST_ENV)
				.ok()
				.filter(|host| !host.is_empty()),
			..Self::default()
		}
	}

	/// Connect timeout as a `Duration`.
	pub fn connect_timeout(&self) -> Duration {
		Duration::from_millis(self.connect_timeout_millis)
	}
}

/// Local delivery behaviour of each subscription
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriberSettings {
	/// Capacity of each output queue (must be > 0)
	pub output_buffer: usize,
	/// Accepted-but-unsettled messages per subscription before the delivery
	/// loop stops pulling (must be > 0)
	pub max_outstanding_messages: usize,
}

impl Default for SubscriberSettings {
	fn default() -> Self {
		Self {
			output_buffer: 1,
			max_outstanding_messages: 1000,
		}
	}
}

/// Configuration for [`Subscriber`](super::Subscriber) creation
#[derive(Debug, Clone)]
pub struct SubscriberConfig<C = DefaultCodec> {
	/// Project owning the topics and subscriptions
	pub project_id: String,
	/// Topic to subscription name mapping
	pub subscription_name: SubscriptionNameFn,
	/// Fail with `SubscriptionMissing` instead of creating subscriptions
	pub do_not_create_subscription_if_missing: bool,
	/// Fail with `TopicMissing` instead of creating topics
	pub do_not_create_topic_if_missing: bool,
	/// Options for subscriptions created by the subscriber
	pub subscription: SubscriptionOptions,
	/// Transport-level settings
	pub connection: ConnectionSettings,
	/// Local delivery settings
	pub settings: SubscriberSettings,
	/// Codec turning broker messages into domain messages
	pub codec: C,
}

impl SubscriberConfig<DefaultCodec> {
	/// Config with default settings and the default codec.
	pub fn new(project_id: impl Into<String>) -> Self {
		Self::with_codec(project_id, DefaultCodec::default())
	}
}

impl<C> SubscriberConfig<C> {
	/// Config with default settings and a custom codec.
	pub fn with_codec(project_id: impl Into<String>, codec: C) -> Self {
		Self {
			project_id: project_id.into(),
			subscription_name: SubscriptionNameFn::default(),
			do_not_create_subscription_if_missing: false,
			do_not_create_topic_if_missing: false,
			subscription: SubscriptionOptions::default(),
			connection: ConnectionSettings::default(),
			settings: SubscriberSettings::default(),
			codec,
		}
	}

	/// Sets the naming function.
	pub fn with_subscription_name(mut self, naming: SubscriptionNameFn) -> Self {
		self.subscription_name = naming;
		self
	}

	/// Disables creation of missing subscriptions.
	pub fn do_not_create_subscription_if_missing(mut self) -> Self {
		self.do_not_create_subscription_if_missing = true;
		self
	}

	/// Disables creation of missing topics.
	pub fn do_not_create_topic_if_missing(mut self) -> Self {
		self.do_not_create_topic_if_missing = true;
		self
	}

	/// Sets options for created subscriptions.
	pub fn with_subscription_options(mut self, options: SubscriptionOptions) -> Self {
		self.subscription = options;
		self
	}

	/// Sets the connection settings.
	pub fn with_connection(mut self, connection: ConnectionSettings) -> Self {
		self.connection = connection;
		self
	}

	/// Sets the local delivery settings.
	pub fn with_settings(mut self, settings: SubscriberSettings) -> Self {
		self.settings = settings;
		self
	}

	/// Checks every value the subscriber relies on.
	///
	/// # Errors
	/// Returns `SubscriberError::ConfigurationValue` naming the first
	/// offending field.
	pub fn validate(&self) -> Result<(), SubscriberError> {
		if self.project_id.trim().is_empty() {
			return Err(SubscriberError::configuration(
				"project_id must not be empty",
			));
		}

		let ack_deadline = self.subscription.ack_deadline;
		if !(MIN_ACK_DEADLINE ..= MAX_ACK_DEADLINE).contains(&ack_deadline) {
			return Err(SubscriberError::configuration(format!(
				"ack_deadline must be between {MIN_ACK_DEADLINE:?} and \
				 {MAX_ACK_DEADLINE:?}, got {ack_deadline:?}"
			)));
		}

		if let Some(retention) = self.subscription.retention_duration {
			if !(MIN_RETENTION ..= MAX_RETENTION).contains(&retention) {
				return Err(SubscriberError::configuration(format!(
					"retention_duration must be between {MIN_RETENTION:?} \
					 and {MAX_RETENTION:?}, got {retention:?}"
				)));
			}
		}

		if self.settings.output_buffer == 0 {
			return Err(SubscriberError::configuration(
				"output_buffer must be greater than 0",
			));
		}
		if self.settings.max_outstanding_messages == 0 {
			return Err(SubscriberError::configuration(
				"max_outstanding_messages must be greater than 0",
			));
		}
		if self.connection.connect_timeout_millis == 0 {
			return Err(SubscriberError::configuration(
				"connect_timeout_millis must be greater than 0",
			));
		}
		Ok(())
	}
}
