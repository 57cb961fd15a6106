//! Tests for the Subscriber facade

use std::time::Duration;

use tokio::time::timeout;

use super::config::{ConnectionSettings, SubscriberConfig, SubscriberSettings};
use super::error::{ConnectionEstablishmentError, SubscriberError};
use super::Subscriber;
use crate::broker::{
	BrokerCall, BrokerError, BrokerOperation, InMemoryBroker, OutgoingMessage,
	RpcCode,
};

const WAIT: Duration = Duration::from_secs(2);

fn subscriber(broker: &InMemoryBroker) -> Subscriber<InMemoryBroker> {
	Subscriber::new(SubscriberConfig::new("shop"), broker.clone())
		.expect("Config should be valid")
}

#[test]
fn test_new_rejects_invalid_config() {
	let err = Subscriber::new(SubscriberConfig::new("  "), InMemoryBroker::new())
		.err()
		.expect("Empty project id should be rejected");
	assert!(matches!(err, SubscriberError::ConfigurationValue(_)));

	let config = SubscriberConfig::new("shop").with_settings(SubscriberSettings {
		output_buffer: 0,
		..SubscriberSettings::default()
	});
	let err = Subscriber::new(config, InMemoryBroker::new())
		.err()
		.expect("Zero output buffer should be rejected");
	assert!(err.is_permanent());
}

#[tokio::test]
async fn test_subscribe_starts_one_loop_per_call() {
	let broker = InMemoryBroker::new();
	let subscriber = subscriber(&broker);

	let first = subscriber.subscribe("orders").await.unwrap();
	let second = subscriber.subscribe("orders").await.unwrap();

	assert_eq!(first.subscription(), second.subscription());
	assert_eq!(subscriber.active_subscriptions(), 2);
	assert_eq!(
		subscriber.subscription("orders").await,
		Some(first.subscription().clone())
	);
	timeout(WAIT, async {
		while broker.count_calls(|call| matches!(call, BrokerCall::Receive(_))) < 2 {
			tokio::time::sleep(Duration::from_millis(5)).await;
		}
	})
	.await
	.expect("Both loops should open a receive session");

	subscriber.close().await.unwrap();
	assert_eq!(subscriber.active_subscriptions(), 0);
}

#[tokio::test]
async fn test_provisioning_error_starts_no_loop() {
	let broker = InMemoryBroker::new();
	let config = SubscriberConfig::new("shop").do_not_create_subscription_if_missing();
	let subscriber = Subscriber::new(config, broker.clone()).unwrap();

	let err = subscriber.subscribe("orders").await.unwrap_err();

	assert!(matches!(err, SubscriberError::SubscriptionMissing { .. }));
	assert_eq!(subscriber.active_subscriptions(), 0);
	assert_eq!(subscriber.subscription("orders").await, None);
}

#[tokio::test]
async fn test_close_ends_every_stream() {
	let broker = InMemoryBroker::new();
	let subscriber = subscriber(&broker);
	let mut orders = subscriber.subscribe("orders").await.unwrap();
	let mut invoices = subscriber.subscribe("invoices").await.unwrap();

	subscriber.close().await.unwrap();

	assert!(orders.recv().await.is_none());
	assert!(invoices.recv().await.is_none());
	assert!(broker.is_closed());
}

#[tokio::test]
async fn test_subscribe_after_close_fails() {
	let broker = InMemoryBroker::new();
	let subscriber = subscriber(&broker);
	subscriber.close().await.unwrap();

	let err = subscriber.subscribe("orders").await.unwrap_err();

	assert!(matches!(err, SubscriberError::SubscriberClosed));
	assert_eq!(broker.journal(), vec![BrokerCall::Close]);
}

#[tokio::test]
async fn test_close_is_idempotent() {
	let broker = InMemoryBroker::new();
	let subscriber = subscriber(&broker);
	let clone = subscriber.clone();

	subscriber.close().await.unwrap();
	clone.close().await.unwrap();
	subscriber.close().await.unwrap();

	assert!(clone.is_closed());
	assert_eq!(broker.count_calls(|call| *call == BrokerCall::Close), 1);
}

#[tokio::test]
async fn test_close_reports_release_failure() {
	let broker = InMemoryBroker::new();
	broker.fail_next(BrokerOperation::Close, RpcCode::Unavailable);
	let subscriber = subscriber(&broker);

	let err = subscriber.close().await.unwrap_err();

	assert!(matches!(err, SubscriberError::ConnectionRelease(_)));
	assert!(subscriber.is_closed());
	// Closing was initiated; the retry is a no-op.
	subscriber.close().await.unwrap();
}

#[tokio::test]
async fn test_drop_without_close_stops_delivery() {
	let broker = InMemoryBroker::new();
	let subscriber = subscriber(&broker);
	let mut orders = subscriber.subscribe("orders").await.unwrap();

	drop(subscriber);

	let ended = timeout(WAIT, orders.recv()).await.unwrap();
	assert!(ended.is_none());
	assert!(!broker.is_closed());
}

#[tokio::test]
async fn test_connect_passes_project_and_settings() {
	let connection = ConnectionSettings {
		endpoint: Some("localhost:8085".to_string()),
		..ConnectionSettings::default()
	};
	let config = SubscriberConfig::new("shop").with_connection(connection.clone());

	let subscriber = Subscriber::connect(config, |project_id, settings| async move {
		assert_eq!(project_id, "shop");
		assert_eq!(settings, connection);
		Ok(InMemoryBroker::new())
	})
	.await
	.unwrap();

	assert!(!subscriber.is_closed());
}

#[tokio::test(start_paused = true)]
async fn test_connect_times_out() {
	let config = SubscriberConfig::new("shop").with_connection(ConnectionSettings {
		connect_timeout_millis: 50,
		..ConnectionSettings::default()
	});

	let err = Subscriber::connect(config, |_, _| async {
		tokio::time::sleep(Duration::from_secs(60)).await;
		Ok(InMemoryBroker::new())
	})
	.await
	.err()
	.expect("Slow connector should time out");

	assert!(matches!(
		err,
		SubscriberError::ConnectionEstablishment(ConnectionEstablishmentError::Timeout {
			timeout_millis: 50
		})
	));
}

#[tokio::test]
async fn test_connect_propagates_connector_failure() {
	let err = Subscriber::<InMemoryBroker>::connect(
		SubscriberConfig::new("shop"),
		|_, _| async { Err(BrokerError::transport("dns lookup failed")) },
	)
	.await
	.err()
	.expect("Failing connector should fail connect");

	assert!(matches!(
		err,
		SubscriberError::ConnectionEstablishment(ConnectionEstablishmentError::Broker(_))
	));
}

#[tokio::test]
async fn test_subscribed_message_is_acked() {
	let broker = InMemoryBroker::new();
	let subscriber = subscriber(&broker);
	let mut orders = subscriber.subscribe("orders").await.unwrap();

	let id = broker
		.publish("orders", OutgoingMessage {
			data: "order #1".into(),
			..OutgoingMessage::default()
		})
		.unwrap();
	let message = timeout(WAIT, orders.recv()).await.unwrap().unwrap();
	// Without a UUID attribute the broker message id is used.
	assert_eq!(message.uuid(), id.as_str());
	assert!(message.ack());

	subscriber.close().await.unwrap();
	assert_eq!(broker.acked(), vec![id.to_string()]);
}
