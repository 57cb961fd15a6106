//! End-to-end subscriber behaviour against the in-memory broker
//!
//! Covers provisioning order, concurrent first subscribers, decode failures
//! and drain-complete shutdown through the public API only.

use std::collections::HashMap;
use std::time::Duration;

use futures::StreamExt;
use pubsub_subscriber_core::broker::{BrokerCall, InMemoryBroker};
use pubsub_subscriber_core::codec::UUID_ATTRIBUTE;
use pubsub_subscriber_core::{
	DefaultCodec, Message, MessageCodec, OutgoingMessage, Subscriber,
	SubscriberConfig, SubscriberError, SubscriberSettings, SubscriptionNameFn,
	SubscriptionOptions,
};
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(2);

fn init_tracing() {
	let _ = tracing_subscriber::fmt()
		.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
		.with_test_writer()
		.try_init();
}

fn encoded(uuid: &str, body: &'static str) -> OutgoingMessage {
	DefaultCodec::new()
		.encode(&Message::new(uuid, body))
		.expect("Message should encode")
}

#[tokio::test]
async fn test_missing_topic_and_subscription_are_created_in_order() {
	init_tracing();
	let broker = InMemoryBroker::new();
	let subscriber =
		Subscriber::new(SubscriberConfig::new("shop"), broker.clone()).unwrap();

	let mut orders = subscriber.subscribe("orders").await.unwrap();

	let provisioning = broker
		.journal()
		.into_iter()
		.filter(|call| {
			matches!(
				call,
				BrokerCall::CreateTopic(_) | BrokerCall::CreateSubscription { .. }
			)
		})
		.collect::<Vec<_>>();
	assert_eq!(provisioning, vec![
		BrokerCall::CreateTopic("orders".to_string()),
		BrokerCall::CreateSubscription {
			name: "orders".to_string(),
			topic: "orders".to_string(),
		},
	]);

	let id = broker.publish("orders", encoded("order-1", "two apples")).unwrap();
	let message = timeout(WAIT, orders.next()).await.unwrap().unwrap();
	assert_eq!(message.uuid(), "order-1");
	assert_eq!(message.payload().as_ref(), b"two apples");
	assert!(message.metadata().is_empty());
	assert!(message.ack());

	subscriber.close().await.unwrap();
	assert_eq!(broker.acked(), vec![id.to_string()]);
}

#[tokio::test]
async fn test_missing_subscription_without_creation_issues_no_create_rpcs() {
	init_tracing();
	let broker = InMemoryBroker::new();
	let config = SubscriberConfig::new("shop").do_not_create_subscription_if_missing();
	let subscriber = Subscriber::new(config, broker.clone()).unwrap();

	let err = subscriber.subscribe("orders").await.unwrap_err();

	assert!(matches!(err, SubscriberError::SubscriptionMissing { .. }));
	assert_eq!(
		broker.count_calls(|call| {
			matches!(
				call,
				BrokerCall::CreateTopic(_) | BrokerCall::CreateSubscription { .. }
			)
		}),
		0
	);
	subscriber.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_subscribers_share_one_subscription() {
	init_tracing();
	let broker =
		InMemoryBroker::new().with_rpc_delay(Duration::from_millis(20));
	let subscriber =
		Subscriber::new(SubscriberConfig::new("shop"), broker.clone()).unwrap();

	let (first, second) = tokio::join!(
		subscriber.subscribe("orders"),
		subscriber.subscribe("orders"),
	);
	let mut first = first.unwrap();
	let mut second = second.unwrap();

	assert_eq!(first.subscription(), second.subscription());
	assert_eq!(
		broker.count_calls(|call| matches!(call, BrokerCall::SubscriptionExists(_))),
		1
	);

	// Both queues are live and compete for the same subscription.
	broker.publish("orders", encoded("order-1", "a")).unwrap();
	broker.publish("orders", encoded("order-2", "b")).unwrap();
	let mut received = Vec::new();
	while received.len() < 2 {
		let message = tokio::select! {
			Some(message) = first.recv() => message,
			Some(message) = second.recv() => message,
			_ = tokio::time::sleep(WAIT) => panic!("Messages should arrive in time"),
		};
		received.push(message.uuid().to_string());
		assert!(message.ack());
	}
	received.sort();
	assert_eq!(received, vec!["order-1", "order-2"]);

	subscriber.close().await.unwrap();
}

#[tokio::test]
async fn test_undecodable_message_is_nacked_and_never_delivered() {
	init_tracing();
	let broker = InMemoryBroker::new().with_redelivery(false);
	let config = SubscriberConfig::with_codec(
		"shop",
		DefaultCodec::new().require_uuid(true),
	);
	let subscriber = Subscriber::new(config, broker.clone()).unwrap();
	let mut orders = subscriber.subscribe("orders").await.unwrap();

	let poison = broker
		.publish("orders", OutgoingMessage {
			data: "no uuid".into(),
			..OutgoingMessage::default()
		})
		.unwrap();
	broker.publish("orders", encoded("order-2", "fine")).unwrap();

	let message = timeout(WAIT, orders.recv()).await.unwrap().unwrap();
	assert_eq!(message.uuid(), "order-2");
	assert!(message.ack());

	subscriber.close().await.unwrap();
	assert_eq!(broker.nacked(), vec![poison.to_string()]);
}

#[tokio::test]
async fn test_close_waits_for_in_flight_message_and_nacks_it() {
	init_tracing();
	let broker = InMemoryBroker::new().with_redelivery(false);
	let subscriber =
		Subscriber::new(SubscriberConfig::new("shop"), broker.clone()).unwrap();
	let mut orders = subscriber.subscribe("orders").await.unwrap();

	let id = broker.publish("orders", encoded("order-1", "held")).unwrap();
	let held = timeout(WAIT, orders.recv()).await.unwrap().unwrap();

	timeout(WAIT, subscriber.close()).await.unwrap().unwrap();

	// Settled before close returned.
	assert_eq!(broker.nacked(), vec![id.to_string()]);
	assert_eq!(broker.outstanding(), 0);
	assert_eq!(subscriber.active_subscriptions(), 0);
	assert!(!held.ack());
	assert!(orders.recv().await.is_none());
	assert!(matches!(
		subscriber.subscribe("orders").await,
		Err(SubscriberError::SubscriberClosed)
	));
}

#[tokio::test]
async fn test_message_never_received_is_not_handed_out_after_close() {
	init_tracing();
	let broker = InMemoryBroker::new().with_redelivery(false);
	let subscriber =
		Subscriber::new(SubscriberConfig::new("shop"), broker.clone()).unwrap();
	let mut orders = subscriber.subscribe("orders").await.unwrap();

	let id = broker.publish("orders", encoded("order-1", "queued")).unwrap();
	timeout(WAIT, async {
		while broker.outstanding() == 0 {
			tokio::time::sleep(Duration::from_millis(5)).await;
		}
	})
	.await
	.unwrap();

	subscriber.close().await.unwrap();

	assert_eq!(broker.nacked(), vec![id.to_string()]);
	assert!(orders.recv().await.is_none());
	assert!(orders.next().await.is_none());
}

#[tokio::test]
async fn test_suffix_naming_and_options_reach_broker() {
	init_tracing();
	let broker = InMemoryBroker::new();
	let options = SubscriptionOptions {
		ack_deadline: Duration::from_secs(60),
		filter: Some("attributes.region = \"eu\"".to_string()),
		..SubscriptionOptions::default()
	};
	let config = SubscriberConfig::new("shop")
		.with_subscription_name(SubscriptionNameFn::with_suffix("-billing"))
		.with_subscription_options(options.clone());
	let subscriber = Subscriber::new(config, broker.clone()).unwrap();

	let orders = subscriber.subscribe("orders").await.unwrap();

	assert_eq!(orders.subscription().name().as_str(), "orders-billing");
	assert_eq!(broker.subscription_options("orders-billing"), Some(options));
	subscriber.close().await.unwrap();
}

#[tokio::test]
async fn test_metadata_survives_delivery() {
	init_tracing();
	let broker = InMemoryBroker::new();
	let subscriber =
		Subscriber::new(SubscriberConfig::new("shop"), broker.clone()).unwrap();
	let mut orders = subscriber.subscribe("orders").await.unwrap();

	let metadata = HashMap::from([("region".to_string(), "eu".to_string())]);
	let outgoing = DefaultCodec::new()
		.encode(&Message::new("order-1", "body").with_metadata(metadata.clone()))
		.unwrap();
	assert_eq!(outgoing.attributes.get(UUID_ATTRIBUTE).unwrap(), "order-1");
	broker.publish("orders", outgoing).unwrap();

	let message = timeout(WAIT, orders.recv()).await.unwrap().unwrap();
	assert_eq!(message.metadata(), &metadata);
	message.ack();
	subscriber.close().await.unwrap();
}

#[test]
fn test_settings_load_from_json() {
	let settings: SubscriberSettings =
		serde_json::from_str(r#"{ "output_buffer": 16 }"#).unwrap();
	assert_eq!(settings.output_buffer, 16);
	assert_eq!(
		settings.max_outstanding_messages,
		SubscriberSettings::default().max_outstanding_messages
	);

	let options: SubscriptionOptions = serde_json::from_str(
		r#"{ "ack_deadline": { "secs": 30, "nanos": 0 }, "enable_message_ordering": true }"#,
	)
	.unwrap();
	assert_eq!(options.ack_deadline, Duration::from_secs(30));
	assert!(options.enable_message_ordering);
	assert!(options.labels.is_empty());
}
