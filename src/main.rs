use std::time::Duration;

use pubsub_subscriber::prelude::*;
use pubsub_subscriber::InMemoryBroker;
use tokio::time;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const TOPIC: &str = "orders";

async fn run() -> std::result::Result<(), Box<dyn std::error::Error>> {
	let broker = InMemoryBroker::new();
	let config = SubscriberConfig::new("demo")
		.with_subscription_name(SubscriptionNameFn::with_suffix("-demo"));
	let subscriber = Subscriber::new(config, broker.clone())?;
	let mut orders = subscriber.subscribe(TOPIC).await?;

	let publisher = broker.clone();
	tokio::spawn(async move {
		let codec = DefaultCodec::new();
		for i in 0 .. 10u32 {
			let message = Message::with_random_uuid(format!("order #{i}"));
			let published = codec
				.encode(&message)
				.map_err(|err| err.to_string())
				.and_then(|outgoing| {
					publisher.publish(TOPIC, outgoing).map_err(|err| err.to_string())
				});
			if let Err(err) = published {
				warn!(error = %err, "Publish failed");
			}
			time::sleep(Duration::from_millis(100)).await;
		}
	});

	let mut count = 0;
	while let Some(message) = orders.recv().await {
		count += 1;
		// Every third message is rejected and comes back as a redelivery.
		if count % 3 == 0 {
			info!(uuid = %message.uuid(), "Rejecting message");
			message.nack();
		} else {
			info!(uuid = %message.uuid(), payload = ?message.payload(), "Received message");
			message.ack();
		}
		if count == 12 {
			break;
		}
	}

	subscriber.close().await?;
	info!(
		acked = broker.acked().len(),
		nacked = broker.nacked().len(),
		"Demo finished"
	);
	Ok(())
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
	tracing_subscriber::fmt()
		.with_env_filter(
			EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| EnvFilter::new("info")),
		)
		.init();
	run().await
}
