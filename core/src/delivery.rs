//! Per-subscription delivery
//!
//! A [`DeliveryLoop`] streams one subscription into its output queue and
//! relays each consumer verdict back to the broker. The consumer side of the
//! queue is a [`MessageStream`].

/// Delivery loop implementation
pub mod delivery_loop;
/// Delivery error types
pub mod error;
/// Consumer-facing output queue
pub mod stream;


pub use error::DeliveryError;
pub use stream::MessageStream;

pub(crate) use delivery_loop::DeliveryLoop;
