use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::error::DeliveryError;
use crate::PROVIDER;
use crate::broker::{BrokerError, BrokerGateway, RawMessage, SubscriptionHandle};
use crate::codec::MessageCodec;
use crate::message::{Message, Settlement};

type PendingSettlements = FuturesUnordered<BoxFuture<'static, ()>>;

/// What happened to a message offered on the output queue
enum Offer {
	/// A consumer holds the message; its settlement is pending
	Accepted(BoxFuture<'static, ()>),
	/// Decoding failed; the message was nacked
	Skipped,
	/// Closing fired first; the message was nacked
	Closing,
	/// The consumer dropped its stream; the message was nacked
	ConsumerGone,
}

/// Streams one subscription into its output queue.
///
/// Messages are offered strictly in session order. Once a consumer accepts a
/// message, its settlement is awaited alongside later deliveries, so up to
/// `max_outstanding` messages can be in the consumer's hands at once. Every
/// wait races `closing`; closing nacks whatever is still unsettled.
pub(crate) struct DeliveryLoop<G, C> {
	gateway: Arc<G>,
	codec: Arc<C>,
	subscription: SubscriptionHandle,
	output: mpsc::Sender<Message>,
	closing: CancellationToken,
	max_outstanding: usize,
}

impl<G, C> DeliveryLoop<G, C>
where
	G: BrokerGateway,
	C: MessageCodec,
{
	pub(crate) fn new(
		gateway: Arc<G>,
		codec: Arc<C>,
		subscription: SubscriptionHandle,
		output: mpsc::Sender<Message>,
		closing: CancellationToken,
		max_outstanding: usize,
	) -> Self {
		Self {
			gateway,
			codec,
			subscription,
			output,
			closing,
			max_outstanding: max_outstanding.max(1),
		}
	}

	/// Runs until the receive session ends or closing fires.
	///
	/// The output queue is closed as soon as no more messages can be
	/// offered; the loop then waits for every pending settlement before it
	/// returns. A receive failure is returned only when closing had not been
	/// requested.
	pub(crate) async fn run(self) -> Result<(), DeliveryError> {
		let mut pending = PendingSettlements::new();
		let outcome = self.pump(&mut pending).await;

		drop(self.output);
		debug!(
			provider = PROVIDER,
			subscription_name = %self.subscription.name(),
			pending = pending.len(),
			"Output queue closed, waiting for pending settlements"
		);
		while pending.next().await.is_some() {}

		match outcome {
			| Err(err) if !self.closing.is_cancelled() => Err(err),
			| Err(err) => {
				debug!(
					provider = PROVIDER,
					subscription_name = %self.subscription.name(),
					error = %err,
					"Receive error after closing, ignored"
				);
				Ok(())
			}
			| Ok(()) => Ok(()),
		}
	}

	async fn pump(
		&self,
		pending: &mut PendingSettlements,
	) -> Result<(), DeliveryError> {
		let mut session = tokio::select! {
			biased;
			_ = self.closing.cancelled() => return Ok(()),
			session = self.gateway.receive(&self.subscription, self.closing.clone()) => {
				session.map_err(|source| self.receive_failed(source))?
			}
		};

		loop {
			if pending.len() >= self.max_outstanding {
				tokio::select! {
					biased;
					_ = self.closing.cancelled() => return Ok(()),
					_ = pending.next() => continue,
				}
			}

			let raw = tokio::select! {
				biased;
				_ = self.closing.cancelled() => return Ok(()),
				Some(()) = pending.next(), if !pending.is_empty() => continue,
				next = session.next() => match next {
					| Some(Ok(raw)) => raw,
					| Some(Err(source)) => return Err(self.receive_failed(source)),
					| None => {
						info!(
							provider = PROVIDER,
							subscription_name = %self.subscription.name(),
							"Receive session ended"
						);
						return Ok(());
					}
				},
			};

			match self.offer(raw, pending).await {
				| Offer::Accepted(settlement) => pending.push(settlement),
				| Offer::Skipped => {}
				| Offer::Closing => return Ok(()),
				| Offer::ConsumerGone => {
					info!(
						provider = PROVIDER,
						subscription_name = %self.subscription.name(),
						"Consumer dropped the message stream, stopping delivery"
					);
					return Ok(());
				}
			}
		}
	}

	/// Decodes `raw` and offers it on the output queue.
	///
	/// Pending settlements keep being driven while the offer blocks, so acks
	/// for earlier messages are not held back by a slow consumer.
	async fn offer(&self, raw: RawMessage, pending: &mut PendingSettlements) -> Offer {
		let mut message = match self.codec.decode(&raw) {
			| Ok(message) => message,
			| Err(source) => {
				let err = DeliveryError::DecodeFailed {
					message_id: raw.id.to_string(),
					source,
				};
				warn!(
					provider = PROVIDER,
					subscription_name = %self.subscription.name(),
					error = %err,
					"Could not decode message, nacking"
				);
				self.gateway.nack(raw);
				return Offer::Skipped;
			}
		};
		let verdict = message.track();
		let uuid = message.uuid().to_string();

		let send = self.output.send(message);
		tokio::pin!(send);
		loop {
			tokio::select! {
				biased;
				_ = self.closing.cancelled() => {
					info!(
						provider = PROVIDER,
						subscription_name = %self.subscription.name(),
						message_uuid = %uuid,
						"Message not consumed, subscriber is closing"
					);
					self.gateway.nack(raw);
					return Offer::Closing;
				}
				sent = &mut send => {
					if sent.is_err() {
						self.gateway.nack(raw);
						return Offer::ConsumerGone;
					}
					debug!(
						provider = PROVIDER,
						subscription_name = %self.subscription.name(),
						message_uuid = %uuid,
						"Message handed to consumer"
					);
					return Offer::Accepted(self.settlement(raw, verdict));
				}
				Some(()) = pending.next(), if !pending.is_empty() => {}
			}
		}
	}

	/// Waits for the consumer verdict or closing, then settles with the broker.
	fn settlement(
		&self,
		raw: RawMessage,
		verdict: oneshot::Receiver<Settlement>,
	) -> BoxFuture<'static, ()> {
		let gateway = Arc::clone(&self.gateway);
		let closing = self.closing.clone();
		let subscription = self.subscription.name().clone();
		async move {
			let settlement = tokio::select! {
				biased;
				// A dropped message counts as a nack.
				verdict = verdict => verdict.unwrap_or(Settlement::Nack),
				_ = closing.cancelled() => Settlement::Nack,
			};
			debug!(
				provider = PROVIDER,
				subscription_name = %subscription,
				message_id = %raw.id,
				settlement = ?settlement,
				"Settling message"
			);
			match settlement {
				| Settlement::Ack => gateway.ack(raw),
				| Settlement::Nack => gateway.nack(raw),
			}
		}
		.boxed()
	}

	fn receive_failed(&self, source: BrokerError) -> DeliveryError {
		if !self.closing.is_cancelled() {
			error!(
				provider = PROVIDER,
				subscription_name = %self.subscription.name(),
				error = %source,
				"Receive failed"
			);
		}
		DeliveryError::ReceiveFailed {
			subscription: self.subscription.name().to_string(),
			source,
		}
	}
}
