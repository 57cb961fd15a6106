//! Drain-complete shutdown of delivery loops
//!
//! One root [`CancellationToken`] fans out to every delivery loop through
//! child tokens; a [`TaskTracker`] is the completion barrier `close` waits
//! on. Spawning and closing share a lock, so no loop can start after the
//! barrier began draining.

use std::future::Future;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

use crate::PROVIDER;

/// Broadcasts closing to every delivery loop and joins them
#[derive(Debug)]
pub struct ShutdownCoordinator {
	closed: Mutex<bool>,
	root: CancellationToken,
	tracker: TaskTracker,
}

impl Default for ShutdownCoordinator {
	fn default() -> Self {
		Self::new()
	}
}

impl ShutdownCoordinator {
	/// Coordinator with no loops.
	pub fn new() -> Self {
		Self {
			closed: Mutex::new(false),
			root: CancellationToken::new(),
			tracker: TaskTracker::new(),
		}
	}

	/// True once `close` has been called.
	pub fn is_closed(&self) -> bool {
		*self.closed.lock()
	}

	/// Number of delivery loops still running.
	pub fn active(&self) -> usize {
		self.tracker.len()
	}

	/// Per-subscription cancellation scope.
	///
	/// Cancelled with the root, and cancellable on its own.
	pub fn child_token(&self) -> CancellationToken {
		self.root.child_token()
	}

	/// Spawns `task` under the completion barrier.
	///
	/// Returns `None` without spawning once closing has begun.
	pub fn spawn<F>(&self, task: F) -> Option<JoinHandle<F::Output>>
	where
		F: Future + Send + 'static,
		F::Output: Send + 'static,
	{
		let closed = self.closed.lock();
		if *closed {
			return None;
		}
		Some(self.tracker.spawn(task))
	}

	/// Cancels every loop and waits until all of them have exited.
	///
	/// Returns `false` without waiting when closing was already initiated.
	pub async fn close(&self) -> bool {
		{
			let mut closed = self.closed.lock();
			if *closed {
				debug!(provider = PROVIDER, "Subscriber already closed");
				return false;
			}
			*closed = true;
			self.root.cancel();
			self.tracker.close();
		}

		info!(
			provider = PROVIDER,
			active_subscriptions = self.tracker.len(),
			"Closing subscriber, waiting for delivery loops"
		);
		self.tracker.wait().await;
		true
	}

	/// Cancels every loop without waiting.
	///
	/// Used when the owner is dropped without `close`.
	pub(crate) fn abort(&self) {
		let mut closed = self.closed.lock();
		*closed = true;
		self.root.cancel();
		self.tracker.close();
	}
}
