//! In-process broker
//!
//! Implements [`BrokerGateway`] on top of per-subscription unbounded queues.
//! Published messages fan out to every subscription of the topic, nacked
//! messages are requeued with an incremented delivery attempt, and every
//! gateway call is recorded in a journal so callers can assert on the exact
//! sequence of broker operations.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use arcstr::ArcStr;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{
	BrokerError, BrokerGateway, OutgoingMessage, RawMessage, ReceiveSession,
	RpcCode, SubscriptionHandle, TopicRef,
};
use crate::subscriber::config::SubscriptionOptions;

/// Gateway operations that accept injected failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BrokerOperation {
	/// `topic_exists`
	TopicExists,
	/// `subscription_exists`
	SubscriptionExists,
	/// `create_topic`
	CreateTopic,
	/// `create_subscription`
	CreateSubscription,
	/// `receive`
	Receive,
	/// `close`
	Close,
}

/// One recorded gateway call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerCall {
	/// Topic existence check
	TopicExists(String),
	/// Subscription existence check
	SubscriptionExists(String),
	/// Topic creation
	CreateTopic(String),
	/// Subscription creation
	CreateSubscription {
		/// Subscription name
		name: String,
		/// Topic it was bound to
		topic: String,
	},
	/// Receive session opened
	Receive(String),
	/// Message acknowledged, by message id
	Ack(String),
	/// Message negatively acknowledged, by message id
	Nack(String),
	/// Connection released
	Close,
}

#[derive(Debug, Clone)]
struct StoredMessage {
	id: ArcStr,
	data: Bytes,
	attributes: HashMap<String, String>,
	publish_time: SystemTime,
	attempt: u32,
}

#[derive(Debug)]
enum QueueItem {
	Message(StoredMessage),
	Failure(String),
}

#[derive(Debug)]
struct SubscriptionQueue {
	topic: ArcStr,
	tx: mpsc::UnboundedSender<QueueItem>,
	rx: Arc<AsyncMutex<mpsc::UnboundedReceiver<QueueItem>>>,
	options: SubscriptionOptions,
}

#[derive(Debug)]
struct Lease {
	subscription: ArcStr,
	message: StoredMessage,
}

#[derive(Debug, Default)]
struct BrokerState {
	topics: HashSet<String>,
	subscriptions: HashMap<String, SubscriptionQueue>,
	leases: HashMap<ArcStr, Lease>,
	journal: Vec<BrokerCall>,
	failures: HashMap<BrokerOperation, VecDeque<(RpcCode, String)>>,
	next_message: u64,
	next_ack: u64,
	closed: bool,
	rpc_delay: Option<Duration>,
	redeliver: bool,
}

/// Broker living entirely in the current process
///
/// Cloning yields another handle to the same broker, so a test can keep one
/// handle for publishing and inspection while the subscriber owns another.
#[derive(Debug, Clone)]
pub struct InMemoryBroker {
	state: Arc<Mutex<BrokerState>>,
}

impl Default for InMemoryBroker {
	fn default() -> Self {
		Self::new()
	}
}

impl InMemoryBroker {
	/// Creates an empty broker that redelivers nacked messages.
	pub fn new() -> Self {
		Self {
			state: Arc::new(Mutex::new(BrokerState {
				redeliver: true,
				..BrokerState::default()
			})),
		}
	}

	/// Delays every provisioning RPC, widening race windows.
	pub fn with_rpc_delay(self, delay: Duration) -> Self {
		self.state.lock().rpc_delay = Some(delay);
		self
	}

	/// Controls whether nacked messages are put back on the queue.
	pub fn with_redelivery(self, redeliver: bool) -> Self {
		self.state.lock().redeliver = redeliver;
		self
	}

	/// Creates a topic directly, bypassing the journal.
	pub fn create_topic_unrecorded(&self, name: &str) {
		self.state.lock().topics.insert(name.to_string());
	}

	/// Creates a subscription directly, bypassing the journal.
	///
	/// The topic is created as well if missing.
	pub fn create_subscription_unrecorded(&self, name: &str, topic: &str) {
		let mut state = self.state.lock();
		state.topics.insert(topic.to_string());
		state
			.subscriptions
			.entry(name.to_string())
			.or_insert_with(|| {
				SubscriptionQueue::new(topic, SubscriptionOptions::default())
			});
	}

	/// Publishes a message to every subscription bound to `topic`.
	///
	/// Returns the broker-assigned message id.
	pub fn publish(
		&self,
		topic: &str,
		message: OutgoingMessage,
	) -> Result<ArcStr, BrokerError> {
		let mut state = self.state.lock();
		if !state.topics.contains(topic) {
			return Err(BrokerError::rpc(
				RpcCode::NotFound,
				format!("topic {topic} not found"),
			));
		}
		state.next_message += 1;
		let stored = StoredMessage {
			id: arcstr::format!("msg-{}", state.next_message),
			data: message.data,
			attributes: message.attributes,
			publish_time: SystemTime::now(),
			attempt: 0,
		};
		for queue in state
			.subscriptions
			.values()
			.filter(|queue| queue.topic.as_str() == topic)
		{
			// The receiver half lives as long as the queue entry.
			let _ = queue.tx.send(QueueItem::Message(stored.clone()));
		}
		debug!(topic = %topic, message_id = %stored.id, "Published in-memory message");
		Ok(stored.id)
	}

	/// Makes the next receive on `subscription` yield a transport failure.
	pub fn inject_receive_failure(
		&self,
		subscription: &str,
		reason: impl Into<String>,
	) -> Result<(), BrokerError> {
		let state = self.state.lock();
		let queue = state.subscriptions.get(subscription).ok_or_else(|| {
			BrokerError::rpc(
				RpcCode::NotFound,
				format!("subscription {subscription} not found"),
			)
		})?;
		let _ = queue.tx.send(QueueItem::Failure(reason.into()));
		Ok(())
	}

	/// Makes the next call of `operation` fail with `code`.
	pub fn fail_next(&self, operation: BrokerOperation, code: RpcCode) {
		self.state
			.lock()
			.failures
			.entry(operation)
			.or_default()
			.push_back((code, format!("injected {operation:?} failure")));
	}

	/// Every call recorded so far, in order.
	pub fn journal(&self) -> Vec<BrokerCall> {
		self.state.lock().journal.clone()
	}

	/// Number of recorded calls matching `predicate`.
	pub fn count_calls(&self, predicate: impl Fn(&BrokerCall) -> bool) -> usize {
		self.state
			.lock()
			.journal
			.iter()
			.filter(|call| predicate(call))
			.count()
	}

	/// Ids of acknowledged messages, in order.
	pub fn acked(&self) -> Vec<String> {
		self.settled(|call| match call {
			| BrokerCall::Ack(id) => Some(id.clone()),
			| _ => None,
		})
	}

	/// Ids of negatively acknowledged messages, in order.
	pub fn nacked(&self) -> Vec<String> {
		self.settled(|call| match call {
			| BrokerCall::Nack(id) => Some(id.clone()),
			| _ => None,
		})
	}

	/// Messages handed out and not yet settled.
	pub fn outstanding(&self) -> usize {
		self.state.lock().leases.len()
	}

	/// True once `close` succeeded.
	pub fn is_closed(&self) -> bool {
		self.state.lock().closed
	}

	/// Options a subscription was created with.
	pub fn subscription_options(
		&self,
		subscription: &str,
	) -> Option<SubscriptionOptions> {
		self.state
			.lock()
			.subscriptions
			.get(subscription)
			.map(|queue| queue.options.clone())
	}

	fn settled(&self, pick: impl Fn(&BrokerCall) -> Option<String>) -> Vec<String> {
		self.state.lock().journal.iter().filter_map(pick).collect()
	}

	/// Records the call, waits out the configured delay and applies any
	/// injected failure.
	async fn rpc(
		&self,
		operation: BrokerOperation,
		call: BrokerCall,
	) -> Result<(), BrokerError> {
		let delay = self.state.lock().rpc_delay;
		if let Some(delay) = delay {
			tokio::time::sleep(delay).await;
		}
		let mut state = self.state.lock();
		state.journal.push(call);
		if state.closed {
			return Err(BrokerError::ConnectionClosed);
		}
		if let Some((code, message)) = state
			.failures
			.get_mut(&operation)
			.and_then(VecDeque::pop_front)
		{
			return Err(BrokerError::rpc(code, message));
		}
		Ok(())
	}

	fn lease(&self, subscription: &ArcStr, mut message: StoredMessage) -> RawMessage {
		let mut state = self.state.lock();
		state.next_ack += 1;
		let ack_id = arcstr::format!("{}-ack-{}", subscription, state.next_ack);
		message.attempt += 1;
		let raw = RawMessage {
			id: message.id.clone(),
			ack_id: ack_id.clone(),
			data: message.data.clone(),
			attributes: message.attributes.clone(),
			publish_time: Some(message.publish_time),
			delivery_attempt: Some(message.attempt),
		};
		state.leases.insert(ack_id, Lease {
			subscription: subscription.clone(),
			message,
		});
		raw
	}
}

impl SubscriptionQueue {
	fn new(topic: &str, options: SubscriptionOptions) -> Self {
		let (tx, rx) = mpsc::unbounded_channel();
		Self {
			topic: ArcStr::from(topic),
			tx,
			rx: Arc::new(AsyncMutex::new(rx)),
			options,
		}
	}
}

#[async_trait]
impl BrokerGateway for InMemoryBroker {
	async fn topic_exists(&self, name: &str) -> Result<bool, BrokerError> {
		self.rpc(
			BrokerOperation::TopicExists,
			BrokerCall::TopicExists(name.to_string()),
		)
		.await?;
		Ok(self.state.lock().topics.contains(name))
	}

	async fn subscription_exists(
		&self,
		name: &str,
	) -> Result<bool, BrokerError> {
		self.rpc(
			BrokerOperation::SubscriptionExists,
			BrokerCall::SubscriptionExists(name.to_string()),
		)
		.await?;
		Ok(self.state.lock().subscriptions.contains_key(name))
	}

	async fn create_topic(&self, name: &str) -> Result<TopicRef, BrokerError> {
		self.rpc(
			BrokerOperation::CreateTopic,
			BrokerCall::CreateTopic(name.to_string()),
		)
		.await?;
		if !self.state.lock().topics.insert(name.to_string()) {
			return Err(BrokerError::rpc(
				RpcCode::AlreadyExists,
				format!("topic {name} already exists"),
			));
		}
		Ok(TopicRef::new(name))
	}

	async fn create_subscription(
		&self,
		name: &str,
		topic: &TopicRef,
		options: &SubscriptionOptions,
	) -> Result<SubscriptionHandle, BrokerError> {
		self.rpc(
			BrokerOperation::CreateSubscription,
			BrokerCall::CreateSubscription {
				name: name.to_string(),
				topic: topic.name().to_string(),
			},
		)
		.await?;
		let mut state = self.state.lock();
		if !state.topics.contains(topic.name().as_str()) {
			return Err(BrokerError::rpc(
				RpcCode::NotFound,
				format!("topic {} not found", topic.name()),
			));
		}
		if state.subscriptions.contains_key(name) {
			return Err(BrokerError::rpc(
				RpcCode::AlreadyExists,
				format!("subscription {name} already exists"),
			));
		}
		state.subscriptions.insert(
			name.to_string(),
			SubscriptionQueue::new(topic.name(), options.clone()),
		);
		Ok(SubscriptionHandle::new(name, topic.name().clone()))
	}

	async fn receive(
		&self,
		subscription: &SubscriptionHandle,
		cancel: CancellationToken,
	) -> Result<ReceiveSession, BrokerError> {
		self.rpc(
			BrokerOperation::Receive,
			BrokerCall::Receive(subscription.name().to_string()),
		)
		.await?;
		let rx = {
			let state = self.state.lock();
			let queue = state
				.subscriptions
				.get(subscription.name().as_str())
				.ok_or_else(|| {
					BrokerError::rpc(
						RpcCode::NotFound,
						format!("subscription {} not found", subscription.name()),
					)
				})?;
			Arc::clone(&queue.rx)
		};
		let broker = self.clone();
		let name = subscription.name().clone();

		let session = futures::stream::unfold(
			(broker, name, rx, cancel),
			|(broker, name, rx, cancel)| async move {
				let item = {
					let mut queue = tokio::select! {
						_ = cancel.cancelled() => return None,
						queue = rx.lock() => queue,
					};
					tokio::select! {
						_ = cancel.cancelled() => return None,
						item = queue.recv() => item?,
					}
				};
				let next = match item {
					| QueueItem::Message(message) => {
						Ok(broker.lease(&name, message))
					}
					| QueueItem::Failure(reason) => {
						Err(BrokerError::transport(reason))
					}
				};
				Some((next, (broker, name, rx, cancel)))
			},
		);
		Ok(session.boxed())
	}

	fn ack(&self, message: RawMessage) {
		let mut state = self.state.lock();
		if state.leases.remove(&message.ack_id).is_some() {
			state.journal.push(BrokerCall::Ack(message.id.to_string()));
		}
	}

	fn nack(&self, message: RawMessage) {
		let mut state = self.state.lock();
		let Some(lease) = state.leases.remove(&message.ack_id) else {
			return;
		};
		state.journal.push(BrokerCall::Nack(message.id.to_string()));
		if !state.redeliver {
			return;
		}
		if let Some(queue) = state.subscriptions.get(lease.subscription.as_str()) {
			let _ = queue.tx.send(QueueItem::Message(lease.message));
		}
	}

	async fn close(&self) -> Result<(), BrokerError> {
		self.rpc(BrokerOperation::Close, BrokerCall::Close).await?;
		self.state.lock().closed = true;
		Ok(())
	}
}
