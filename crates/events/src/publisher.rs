//! Publication abstraction (mechanics only).
//!
//! The repository hands every committed event to a [`Publisher`] after the
//! commit has been appended. What happens next (routing, fan-out, retries) is
//! the publisher's business.
//!
//! ## Delivery guarantees
//!
//! Events are **stored first** and **published second**, with no transaction
//! spanning the two steps. A crash or failure in between leaves a commit that is
//! persisted but not (fully) published, so delivery downstream is
//! at-least-once at best and consumers must be idempotent.

use std::sync::Arc;

/// Fire-and-forget publication of messages of type `M`.
///
/// `publish` takes the message by reference: the repository keeps ownership of
/// its committed events and publishes them one at a time, in commit order.
///
/// Implementations must be `Send + Sync`; several writers publish concurrently.
pub trait Publisher<M>: Send + Sync {
    type Error: core::fmt::Debug + core::fmt::Display + Send + Sync + 'static;

    fn publish(&self, message: &M) -> Result<(), Self::Error>;
}

impl<M, P> Publisher<M> for Arc<P>
where
    P: Publisher<M> + ?Sized,
{
    type Error = P::Error;

    fn publish(&self, message: &M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }
}
