//! Subscription registry and per-tick dispatch.
//!
//! # Tick Commit
//!
//! ```text
//! process_tick:
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Phase 1: Validate change set against live entities         │
//! │  Phase 2: Drop added/changed bits of deleted entities       │
//! │  Phase 3: Bitsets -> ordered id lists (once per tick)       │
//! │  Phase 4: ALL subscription: full diff + notify              │
//! │  Phase 5: Other subscriptions, creation order:              │
//! │           incremental diff + notify                         │
//! │  Phase 6: Change set cleared                                │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! A rejected change set (phase 1) leaves every subscription untouched. A
//! failing callback stops further notifications for the tick, but every
//! subscription still applies its membership changes. The same holds if the
//! composition source loses an entity between validation and dispatch: the
//! first error is returned once every subscription has been processed.

use core::fmt;

use fixedbitset::FixedBitSet;
use hashbrown::HashMap;
use rustc_hash::FxBuildHasher;
use tracing::{debug, trace, warn};

use crate::{
    aspect::{Aspect, AspectBuilder},
    bits,
    composition::{CompositionSource, EntityId},
    error::{SubscriptionError, SubscriptionResult},
    subscription::Subscription,
};

/// Handle to a subscription owned by a [`SubscriptionManager`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u32);

impl SubscriptionId {
    /// The reserved subscription matching every live entity.
    pub const ALL: Self = Self(0);

    /// Create a subscription ID from a raw value.
    #[must_use]
    pub const fn from_raw(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw ID value.
    #[must_use]
    pub const fn as_raw(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriptionId({})", self.0)
    }
}

// ============================================================================
// ChangeSet
// ============================================================================

/// Entities whose membership may have changed during the current tick.
///
/// Filled by the world while the tick runs, consumed and cleared by
/// [`SubscriptionManager::process`]. Nothing survives into the next tick.
#[derive(Clone, Default)]
pub struct ChangeSet {
    added: FixedBitSet,
    changed: FixedBitSet,
    deleted: FixedBitSet,
}

impl ChangeSet {
    /// Create an empty change set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a change set with room for `entity_capacity` entity ids.
    #[must_use]
    pub fn with_capacity(entity_capacity: usize) -> Self {
        Self {
            added: FixedBitSet::with_capacity(entity_capacity),
            changed: FixedBitSet::with_capacity(entity_capacity),
            deleted: FixedBitSet::with_capacity(entity_capacity),
        }
    }

    /// Record a newly created entity.
    pub fn mark_added(&mut self, entity: EntityId) {
        bits::insert_grow(&mut self.added, entity as usize);
    }

    /// Record a composition change.
    pub fn mark_changed(&mut self, entity: EntityId) {
        bits::insert_grow(&mut self.changed, entity as usize);
    }

    /// Record a deleted entity.
    ///
    /// Deletion wins over any add or change of the same id in this tick, so
    /// the id must not be handed out again before the tick commits.
    pub fn mark_deleted(&mut self, entity: EntityId) {
        bits::insert_grow(&mut self.deleted, entity as usize);
    }

    /// Entities created this tick.
    #[must_use]
    pub const fn added(&self) -> &FixedBitSet {
        &self.added
    }

    /// Entities whose composition changed this tick.
    #[must_use]
    pub const fn changed(&self) -> &FixedBitSet {
        &self.changed
    }

    /// Entities deleted this tick.
    #[must_use]
    pub const fn deleted(&self) -> &FixedBitSet {
        &self.deleted
    }

    /// Check if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_clear() && self.changed.is_clear() && self.deleted.is_clear()
    }

    /// Forget every recorded entity. Capacity is kept.
    pub fn clear(&mut self) {
        self.added.clear();
        self.changed.clear();
        self.deleted.clear();
    }
}

impl fmt::Debug for ChangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeSet")
            .field("added", &self.added.count_ones(..))
            .field("changed", &self.changed.count_ones(..))
            .field("deleted", &self.deleted.count_ones(..))
            .finish()
    }
}

// ============================================================================
// SubscriptionManager
// ============================================================================

/// Owns every subscription of a world and drives them once per tick.
pub struct SubscriptionManager {
    /// All subscriptions in creation order. Index 0 is [`SubscriptionId::ALL`].
    subscriptions: Vec<Subscription>,
    /// Map from aspect to its subscription.
    by_aspect: HashMap<Aspect, SubscriptionId, FxBuildHasher>,
    /// Change set filled by the world during the tick.
    changes: ChangeSet,
    /// Ordered ids of the tick being processed.
    added_ids: Vec<EntityId>,
    changed_ids: Vec<EntityId>,
    deleted_ids: Vec<EntityId>,
    entity_capacity: usize,
}

impl Default for SubscriptionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriptionManager {
    /// Create a manager holding only the reserved subscription.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create a manager with bitsets pre-sized for `entity_capacity` entities.
    #[must_use]
    pub fn with_capacity(entity_capacity: usize) -> Self {
        let mut all = Subscription::new(SubscriptionId::ALL, Aspect::everything(), entity_capacity);
        all.mark_synced();

        let mut by_aspect = HashMap::with_hasher(FxBuildHasher);
        by_aspect.insert(Aspect::everything(), SubscriptionId::ALL);

        Self {
            subscriptions: vec![all],
            by_aspect,
            changes: ChangeSet::with_capacity(entity_capacity),
            added_ids: Vec::new(),
            changed_ids: Vec::new(),
            deleted_ids: Vec::new(),
            entity_capacity,
        }
    }

    // ==================== Registry ====================

    /// Get the subscription for an aspect, creating it if needed.
    ///
    /// A new subscription is synchronized against every live entity before this
    /// returns, so its membership is immediately consistent.
    pub fn get_or_create<S: CompositionSource + ?Sized>(
        &mut self,
        aspect: Aspect,
        source: &S,
    ) -> SubscriptionResult<SubscriptionId> {
        if let Some(&id) = self.by_aspect.get(&aspect) {
            return Ok(id);
        }

        let id = SubscriptionId::from_raw(self.subscriptions.len() as u32);
        let mut subscription = Subscription::new(id, aspect.clone(), self.entity_capacity);
        subscription.synchronize(self.entities().entities(), self.changes.deleted(), source)?;

        debug!(subscription = ?id, aspect = ?aspect, "created subscription");

        self.subscriptions.push(subscription);
        self.by_aspect.insert(aspect, id);

        Ok(id)
    }

    /// Build an aspect and get or create its subscription.
    pub fn subscribe<S: CompositionSource + ?Sized>(
        &mut self,
        builder: &AspectBuilder,
        source: &S,
    ) -> SubscriptionResult<SubscriptionId> {
        let aspect = builder.build()?;
        self.get_or_create(aspect, source)
    }

    /// Find the subscription for an aspect without creating it.
    #[must_use]
    pub fn find(&self, aspect: &Aspect) -> Option<SubscriptionId> {
        self.by_aspect.get(aspect).copied()
    }

    /// Get a subscription by ID.
    pub fn subscription(&self, id: SubscriptionId) -> SubscriptionResult<&Subscription> {
        self.subscriptions
            .get(id.as_raw() as usize)
            .ok_or(SubscriptionError::UnknownSubscription(id))
    }

    /// Get a mutable subscription by ID, e.g. to register callbacks.
    pub fn subscription_mut(
        &mut self,
        id: SubscriptionId,
    ) -> SubscriptionResult<&mut Subscription> {
        self.subscriptions
            .get_mut(id.as_raw() as usize)
            .ok_or(SubscriptionError::UnknownSubscription(id))
    }

    /// The reserved subscription: every live entity.
    #[must_use]
    pub fn entities(&self) -> &Subscription {
        &self.subscriptions[SubscriptionId::ALL.as_raw() as usize]
    }

    /// Number of subscriptions, including the reserved one.
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    /// Check if only the reserved subscription exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscriptions.len() <= 1
    }

    /// Iterate over subscriptions in dispatch order.
    pub fn iter(&self) -> impl Iterator<Item = &Subscription> {
        self.subscriptions.iter()
    }

    /// The pending change set.
    #[must_use]
    pub const fn changes(&self) -> &ChangeSet {
        &self.changes
    }

    /// The pending change set, for the world to record into.
    pub fn changes_mut(&mut self) -> &mut ChangeSet {
        &mut self.changes
    }

    // ==================== Dispatch ====================

    /// Commit the manager's own change set. See [`SubscriptionManager::process`].
    pub fn process_tick<S: CompositionSource + ?Sized>(
        &mut self,
        source: &S,
    ) -> SubscriptionResult<()> {
        let mut changes = core::mem::take(&mut self.changes);
        let result = self.process(&mut changes, source);
        self.changes = changes;
        result
    }

    /// Commit a change set to every subscription.
    ///
    /// `changes` is always left empty, including when the tick is rejected.
    pub fn process<S: CompositionSource + ?Sized>(
        &mut self,
        changes: &mut ChangeSet,
        source: &S,
    ) -> SubscriptionResult<()> {
        if let Err(err) = self.validate(changes, source) {
            warn!(error = %err, ?changes, "rejected tick");
            changes.clear();
            return Err(err);
        }

        // An entity created and destroyed within the tick was never observed.
        changes.added.difference_with(&changes.deleted);
        changes.changed.difference_with(&changes.deleted);

        bits::collect_ids(&changes.added, &mut self.added_ids);
        bits::collect_ids(&changes.changed, &mut self.changed_ids);
        bits::collect_ids(&changes.deleted, &mut self.deleted_ids);
        changes.clear();

        trace!(
            added = self.added_ids.len(),
            changed = self.changed_ids.len(),
            deleted = self.deleted_ids.len(),
            subscriptions = self.subscriptions.len(),
            "processing tick"
        );

        let Self {
            subscriptions,
            added_ids,
            changed_ids,
            deleted_ids,
            ..
        } = self;
        let (added_ids, changed_ids, deleted_ids): (&[EntityId], &[EntityId], &[EntityId]) =
            (added_ids, changed_ids, deleted_ids);

        let Some((all, rest)) = subscriptions.split_first_mut() else {
            return Ok(());
        };

        let mut failure = None;

        all.process_all(added_ids, changed_ids, deleted_ids);
        deliver(all, &mut failure);

        for subscription in rest {
            if let Err(err) = subscription.process(added_ids, changed_ids, deleted_ids, source) {
                if failure.is_none() {
                    warn!(
                        subscription = ?subscription.id(),
                        error = %err,
                        "composition vanished during dispatch"
                    );
                    failure = Some(err);
                }
            }
            deliver(subscription, &mut failure);
        }

        failure.map_or(Ok(()), Err)
    }

    /// Re-evaluate one entity after component types were given new bits.
    ///
    /// `composition` is the entity's composition in the new encoding. Every
    /// subscription whose membership flips delivers a synthetic insert or remove.
    pub fn process_component_identity(
        &mut self,
        entity: EntityId,
        composition: &FixedBitSet,
    ) -> SubscriptionResult<()> {
        if !self.entities().contains(entity) {
            return Err(SubscriptionError::UnknownEntity(entity));
        }

        let mut failure = None;
        self.reevaluate(entity, composition, &mut failure);

        if failure.is_none() {
            debug!(entity, "component identity re-evaluated");
        }

        failure.map_or(Ok(()), Err)
    }

    /// Re-evaluate several entities after component types were given new bits.
    ///
    /// Every entity is checked before any subscription changes. Once a callback
    /// fails, the remaining notifications are dropped as in
    /// [`SubscriptionManager::process`], but membership is still updated for
    /// every entity.
    pub fn process_component_identities<S: CompositionSource + ?Sized>(
        &mut self,
        entities: &[EntityId],
        source: &S,
    ) -> SubscriptionResult<()> {
        for &entity in entities {
            if !self.entities().contains(entity) || source.composition(entity).is_none() {
                return Err(SubscriptionError::UnknownEntity(entity));
            }
        }

        let mut failure = None;
        for &entity in entities {
            if let Some(composition) = source.composition(entity) {
                self.reevaluate(entity, composition, &mut failure);
            }
        }

        debug!(
            entities = entities.len(),
            failed = failure.is_some(),
            "component identities re-evaluated"
        );

        failure.map_or(Ok(()), Err)
    }

    fn reevaluate(
        &mut self,
        entity: EntityId,
        composition: &FixedBitSet,
        failure: &mut Option<SubscriptionError>,
    ) {
        for subscription in &mut self.subscriptions {
            subscription.process_component_identity(entity, composition);
            deliver(subscription, failure);
        }
    }

    fn validate<S: CompositionSource + ?Sized>(
        &self,
        changes: &ChangeSet,
        source: &S,
    ) -> SubscriptionResult<()> {
        let live = self.entities().active();

        for bit in changes.added.ones() {
            if changes.deleted.contains(bit) {
                continue;
            }
            if source.composition(bit as EntityId).is_none() {
                return Err(SubscriptionError::UnknownEntity(bit as EntityId));
            }
        }

        for bit in changes.changed.ones() {
            if changes.deleted.contains(bit) {
                continue;
            }
            let known = live.contains(bit) || changes.added.contains(bit);
            if !known || source.composition(bit as EntityId).is_none() {
                return Err(SubscriptionError::UnknownEntity(bit as EntityId));
            }
        }

        for bit in changes.deleted.ones() {
            if !live.contains(bit) && !changes.added.contains(bit) {
                return Err(SubscriptionError::UnknownEntity(bit as EntityId));
            }
        }

        Ok(())
    }
}

/// Notify one subscription unless an earlier callback already failed this tick.
fn deliver(subscription: &mut Subscription, failure: &mut Option<SubscriptionError>) {
    if failure.is_some() {
        subscription.discard_pending();
        return;
    }

    if let Err(err) = subscription.inform() {
        warn!(
            subscription = ?subscription.id(),
            error = %err,
            "listener failed, skipping remaining notifications"
        );
        *failure = Some(err);
    }
}

impl fmt::Debug for SubscriptionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionManager")
            .field("subscriptions", &self.subscriptions)
            .field("changes", &self.changes)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
