use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::broker::SubscriptionHandle;
use crate::message::Message;

/// Output queue of one subscription
///
/// Yields messages in the order the broker delivered them and ends once the
/// subscriber closes or the subscription's receive session fails. Dropping
/// the stream stops delivery for this subscription; messages that were not
/// handed out are nacked.
#[derive(Debug)]
pub struct MessageStream {
	receiver: mpsc::Receiver<Message>,
	subscription: SubscriptionHandle,
	closing: CancellationToken,
}

impl MessageStream {
	pub(crate) fn new(
		receiver: mpsc::Receiver<Message>,
		subscription: SubscriptionHandle,
		closing: CancellationToken,
	) -> Self {
		Self {
			receiver,
			subscription,
			closing,
		}
	}

	/// Receives the next message.
	///
	/// Returns `None` when the queue is closed. Once the subscriber starts
	/// closing, buffered messages are discarded: the broker already got a
	/// nack for each of them.
	pub async fn recv(&mut self) -> Option<Message> {
		if self.closing.is_cancelled() {
			self.discard();
			return None;
		}
		tokio::select! {
			biased;
			_ = self.closing.cancelled() => {
				self.discard();
				None
			}
			message = self.receiver.recv() => message,
		}
	}

	/// Subscription backing this stream.
	pub fn subscription(&self) -> &SubscriptionHandle {
		&self.subscription
	}

	fn discard(&mut self) {
		self.receiver.close();
		while self.receiver.try_recv().is_ok() {}
	}
}

impl Stream for MessageStream {
	type Item = Message;

	fn poll_next(
		mut self: Pin<&mut Self>,
		cx: &mut Context<'_>,
	) -> Poll<Option<Self::Item>> {
		if self.closing.is_cancelled() {
			self.discard();
			return Poll::Ready(None);
		}
		// Closing always ends the delivery loop, which closes the channel and
		// wakes this task.
		self.receiver.poll_recv(cx)
	}
}
