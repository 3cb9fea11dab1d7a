//! RGB Subscription - live entity sets per aspect
//!
//! Maintains, for every registered [`Aspect`], the set of entities whose
//! component composition matches it, and notifies observers when entities
//! enter or leave that set.
//!
//! # Key Concepts
//!
//! - **Aspect**: immutable filter over component bits (`all`, `one`, `exclude`)
//! - **Subscription**: live matching set for one aspect, plus its callbacks
//! - **SubscriptionManager**: owns all subscriptions, commits one change set per tick
//! - **ChangeSet**: added/changed/deleted entity bits recorded during a tick
//!
//! # Example
//!
//! ```ignore
//! let mut manager = SubscriptionManager::new();
//! let moving = manager.subscribe(&Aspect::builder().all([position, velocity]), &world)?;
//!
//! manager.subscription_mut(moving)?.add_listener(
//!     listener_fn(|ids| { spawned(ids); Ok(()) }, |ids| { despawned(ids); Ok(()) }),
//!     Snapshot::Replay,
//! )?;
//!
//! // during the tick
//! manager.changes_mut().mark_added(entity);
//!
//! // end of tick
//! manager.process_tick(&world)?;
//! ```

pub mod bits;

mod aspect;
mod component;
mod composition;
mod error;
mod listener;
mod manager;
mod subscription;

pub use aspect::{Aspect, AspectBuilder};
pub use component::{ComponentId, ComponentRegistry};
pub use composition::{CompositionSource, Compositions, EntityId};
pub use error::{AspectError, SubscriptionError, SubscriptionResult};
pub use fixedbitset::FixedBitSet;
pub use listener::{
    EntityObserver, FnListener, ListenerError, ListenerResult, Snapshot, SubscriptionListener,
    listener_fn,
};
pub use manager::{ChangeSet, SubscriptionId, SubscriptionManager};
pub use subscription::{Subscription, SyncState};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        Aspect, AspectBuilder, ComponentId, CompositionSource, EntityId, EntityObserver, Snapshot,
        SubscriptionId, SubscriptionListener, SubscriptionManager, listener_fn,
    };
}
