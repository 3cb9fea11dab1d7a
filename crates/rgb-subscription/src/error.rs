//! Subscription error types.

use thiserror::Error;

use crate::{
    component::ComponentId, composition::EntityId, listener::ListenerError,
    manager::SubscriptionId,
};

/// Aspect configuration error.
#[derive(Debug, Error)]
pub enum AspectError {
    /// A component is both required and excluded; nothing can ever match.
    #[error("component {0:?} is both required and excluded")]
    Contradictory(ComponentId),
}

/// Subscription error type.
#[derive(Debug, Error)]
pub enum SubscriptionError {
    /// Invalid aspect.
    #[error(transparent)]
    Aspect(#[from] AspectError),

    /// A change set or identity event referenced an entity the world does not know.
    #[error("entity {0} is not known to the world")]
    UnknownEntity(EntityId),

    /// Subscription handle does not belong to this manager.
    #[error("unknown subscription {0:?}")]
    UnknownSubscription(SubscriptionId),

    /// An observer or listener failed during dispatch.
    #[error("listener on subscription {subscription:?} failed: {source}")]
    Listener {
        /// Subscription whose callback failed.
        subscription: SubscriptionId,
        /// Error returned by the callback.
        #[source]
        source: ListenerError,
    },
}

/// Result type for subscription operations.
pub type SubscriptionResult<T> = Result<T, SubscriptionError>;
