//! Tick driver error types.

use rgb_subscription::{EntityId, SubscriptionError};
use thiserror::Error;

/// Tick driver error type.
#[derive(Debug, Error)]
pub enum TickError {
    /// The entity was never spawned or has been despawned.
    #[error("entity {0} is not alive")]
    DeadEntity(EntityId),

    /// Component type was never registered with this world.
    #[error("component {0} is not registered")]
    UnknownComponent(&'static str),

    /// The requested bit already belongs to another component type.
    #[error("component bit {bit} is taken by {owner}")]
    BitTaken {
        /// Requested bit.
        bit: u32,
        /// Type currently holding it.
        owner: &'static str,
    },

    /// The requested bit was vacated by an earlier reassignment.
    #[error("component bit {0} is retired")]
    BitRetired(u32),

    /// Error raised by the subscription core.
    #[error(transparent)]
    Subscription(#[from] SubscriptionError),
}

/// Result type for tick driver operations.
pub type TickResult<T> = Result<T, TickError>;
