//! Tick driver for aspect subscriptions.
//!
//! # Tick Execution Model
//!
//! ```text
//! Tick N:
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Phase 1: spawn / insert / remove / despawn                 │
//! │           (compositions change now, ids go to change set)   │
//! │  Phase 2: tick()                                            │
//! │           validate change set                               │
//! │           reserved subscription: full diff + inform         │
//! │           other subscriptions, creation order:              │
//! │             incremental diff + inform                       │
//! │  Phase 3: ids despawned during tick N become reusable       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Component bit reassignment is handled outside the tick: affected
//! subscriptions are re-evaluated and informed immediately.

mod error;
mod world;

pub use error::{TickError, TickResult};
pub use rgb_subscription::{
    Aspect, AspectBuilder, ComponentId, EntityId, EntityObserver, ListenerResult, Snapshot,
    SubscriptionId, SubscriptionListener, listener_fn,
};
pub use world::World;
