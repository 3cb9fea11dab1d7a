//! Per-aspect subscription state.
//!
//! A subscription tracks which entities currently match one [`Aspect`] and tells
//! its observers and listeners about entities entering or leaving that set.
//!
//! # Batches
//!
//! Each tick a subscription consumes the ordered added/changed/deleted id lists
//! in three steps:
//!
//! ```text
//! 1. diff    deleted -> changed -> added, membership bitset updated in place,
//!            deltas recorded in per-subscription scratch
//! 2. commit  deltas sorted, member cache rebuilt once
//! 3. inform  observers: inserted, removed
//!            listeners: inserted, removed
//! ```
//!
//! Nothing outside the subscription sees the intermediate state, so a batch is
//! atomic for every observer. Empty deltas are never delivered.

use core::fmt;

use fixedbitset::FixedBitSet;
use smallvec::SmallVec;
use tracing::debug;

use crate::{
    aspect::Aspect,
    bits,
    composition::{CompositionSource, EntityId},
    error::{SubscriptionError, SubscriptionResult},
    listener::{EntityObserver, ListenerError, Snapshot, SubscriptionListener},
    manager::SubscriptionId,
};

/// Lifecycle of a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncState {
    /// Created, membership not yet computed.
    Uninitialized,
    /// Membership reflects every committed tick.
    Synced,
}

/// The live set of entities matching one aspect, plus its callbacks.
pub struct Subscription {
    id: SubscriptionId,
    aspect: Aspect,
    state: SyncState,
    /// Membership bitset indexed by entity id.
    active: FixedBitSet,
    /// Members in ascending id order, rebuilt after every non-empty batch.
    entities: Vec<EntityId>,
    /// Pending deltas of the current batch.
    inserted: Vec<EntityId>,
    removed: Vec<EntityId>,
    observers: SmallVec<[Box<dyn EntityObserver>; 2]>,
    listeners: SmallVec<[Box<dyn SubscriptionListener>; 2]>,
}

impl Subscription {
    pub(crate) fn new(id: SubscriptionId, aspect: Aspect, entity_capacity: usize) -> Self {
        Self {
            id,
            aspect,
            state: SyncState::Uninitialized,
            active: FixedBitSet::with_capacity(entity_capacity),
            entities: Vec::new(),
            inserted: Vec::new(),
            removed: Vec::new(),
            observers: SmallVec::new(),
            listeners: SmallVec::new(),
        }
    }

    // ==================== Accessors ====================

    /// Handle of this subscription.
    #[must_use]
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// The filter this subscription maintains.
    #[must_use]
    pub const fn aspect(&self) -> &Aspect {
        &self.aspect
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> SyncState {
        self.state
    }

    /// Whether the initial membership has been computed.
    #[must_use]
    pub fn is_synced(&self) -> bool {
        self.state == SyncState::Synced
    }

    /// Matching entities in ascending id order.
    ///
    /// Valid between ticks; the next processed tick replaces the contents.
    #[must_use]
    pub fn entities(&self) -> &[EntityId] {
        &self.entities
    }

    /// Membership bitset indexed by entity id.
    #[must_use]
    pub const fn active(&self) -> &FixedBitSet {
        &self.active
    }

    /// Check if an entity currently matches.
    #[must_use]
    pub fn contains(&self, entity: EntityId) -> bool {
        self.active.contains(entity as usize)
    }

    /// Number of matching entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Check if no entity matches.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Number of registered observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    // ==================== Registration ====================

    /// Register a full-membership observer.
    ///
    /// With [`Snapshot::Replay`] the observer first receives the current members
    /// as one `inserted` batch. If that call fails the observer is not kept.
    pub fn add_observer<O: EntityObserver>(
        &mut self,
        observer: O,
        snapshot: Snapshot,
    ) -> SubscriptionResult<()> {
        let mut observer: Box<dyn EntityObserver> = Box::new(observer);

        if snapshot == Snapshot::Replay && !self.entities.is_empty() {
            observer
                .inserted(&self.entities, &self.entities)
                .map_err(|source| self.listener_error(source))?;
        }

        self.observers.push(observer);
        Ok(())
    }

    /// Register a delta listener.
    ///
    /// With [`Snapshot::Replay`] the listener first receives the current members
    /// as one `inserted` batch. If that call fails the listener is not kept.
    pub fn add_listener<L: SubscriptionListener>(
        &mut self,
        listener: L,
        snapshot: Snapshot,
    ) -> SubscriptionResult<()> {
        let mut listener: Box<dyn SubscriptionListener> = Box::new(listener);

        if snapshot == Snapshot::Replay && !self.entities.is_empty() {
            listener
                .inserted(&self.entities)
                .map_err(|source| self.listener_error(source))?;
        }

        self.listeners.push(listener);
        Ok(())
    }

    // ==================== Diffing ====================

    /// Compute the initial membership from every existing entity.
    ///
    /// Entities already marked for deletion in the open tick are skipped; the
    /// world may have dropped their composition.
    pub(crate) fn synchronize<S: CompositionSource + ?Sized>(
        &mut self,
        existing: &[EntityId],
        pending_deleted: &FixedBitSet,
        source: &S,
    ) -> SubscriptionResult<()> {
        for &entity in existing {
            if pending_deleted.contains(entity as usize) {
                continue;
            }
            let composition = source
                .composition(entity)
                .ok_or(SubscriptionError::UnknownEntity(entity))?;
            if self.aspect.matches(composition) {
                bits::insert_grow(&mut self.active, entity as usize);
            }
        }

        bits::collect_ids(&self.active, &mut self.entities);
        self.state = SyncState::Synced;

        debug!(
            subscription = ?self.id,
            aspect = ?self.aspect,
            members = self.entities.len(),
            "subscription synchronized"
        );

        Ok(())
    }

    /// Mark a subscription with no prior entities as synced.
    pub(crate) fn mark_synced(&mut self) {
        self.state = SyncState::Synced;
    }

    /// Full diff for the match-everything subscription.
    ///
    /// Membership equals the set of live entities, so no composition is read:
    /// every added or changed id is a member and every deleted id is not.
    pub(crate) fn process_all(
        &mut self,
        added: &[EntityId],
        changed: &[EntityId],
        deleted: &[EntityId],
    ) {
        debug_assert!(self.aspect.is_everything());

        for &entity in deleted {
            self.remove(entity);
        }
        for &entity in changed.iter().chain(added) {
            self.insert(entity);
        }

        self.commit();
    }

    /// Incremental diff against the aspect.
    pub(crate) fn process<S: CompositionSource + ?Sized>(
        &mut self,
        added: &[EntityId],
        changed: &[EntityId],
        deleted: &[EntityId],
        source: &S,
    ) -> SubscriptionResult<()> {
        for &entity in deleted {
            self.remove(entity);
        }
        let mut missing = None;
        for &entity in changed.iter().chain(added) {
            match source.composition(entity) {
                Some(composition) => self.check(entity, composition),
                None if missing.is_none() => missing = Some(entity),
                None => {}
            }
        }

        // Entities that could be evaluated are committed either way.
        self.commit();
        missing.map_or(Ok(()), |entity| Err(SubscriptionError::UnknownEntity(entity)))
    }

    /// Re-evaluate one entity after its component bits were renumbered.
    pub(crate) fn process_component_identity(&mut self, entity: EntityId, composition: &FixedBitSet) {
        self.check(entity, composition);
        self.commit();
    }

    fn check(&mut self, entity: EntityId, composition: &FixedBitSet) {
        let interested = self.aspect.matches(composition);
        let member = self.contains(entity);

        if interested && !member {
            self.insert(entity);
        } else if !interested && member {
            self.remove(entity);
        }
    }

    fn insert(&mut self, entity: EntityId) {
        if !self.contains(entity) {
            bits::insert_grow(&mut self.active, entity as usize);
            self.inserted.push(entity);
        }
    }

    fn remove(&mut self, entity: EntityId) {
        if bits::remove(&mut self.active, entity as usize) {
            self.removed.push(entity);
        }
    }

    /// Rebuild the member cache if the batch changed anything.
    fn commit(&mut self) {
        if self.inserted.is_empty() && self.removed.is_empty() {
            return;
        }
        self.inserted.sort_unstable();
        self.removed.sort_unstable();
        bits::collect_ids(&self.active, &mut self.entities);
    }

    /// Whether the last diff produced deltas not yet delivered.
    #[must_use]
    pub(crate) fn has_pending(&self) -> bool {
        !self.inserted.is_empty() || !self.removed.is_empty()
    }

    // ==================== Dispatch ====================

    /// Deliver the pending batch: observers first, then listeners.
    ///
    /// The batch is dropped afterwards whether or not a callback failed.
    pub(crate) fn inform(&mut self) -> SubscriptionResult<()> {
        if !self.has_pending() {
            return Ok(());
        }
        let result = self.notify();
        self.discard_pending();
        result
    }

    /// Drop the pending batch without delivering it. Membership is kept.
    pub(crate) fn discard_pending(&mut self) {
        self.inserted.clear();
        self.removed.clear();
    }

    fn notify(&mut self) -> SubscriptionResult<()> {
        let Self {
            id,
            entities,
            inserted,
            removed,
            observers,
            listeners,
            ..
        } = self;
        let id = *id;
        let entities: &[EntityId] = entities;
        let inserted: &[EntityId] = inserted;
        let removed: &[EntityId] = removed;
        let fail = |source: ListenerError| SubscriptionError::Listener {
            subscription: id,
            source,
        };

        for observer in observers.iter_mut() {
            if !inserted.is_empty() {
                observer.inserted(inserted, entities).map_err(fail)?;
            }
            if !removed.is_empty() {
                observer.removed(removed, entities).map_err(fail)?;
            }
        }

        for listener in listeners.iter_mut() {
            if !inserted.is_empty() {
                listener.inserted(inserted).map_err(fail)?;
            }
            if !removed.is_empty() {
                listener.removed(removed).map_err(fail)?;
            }
        }

        Ok(())
    }

    fn listener_error(&self, source: ListenerError) -> SubscriptionError {
        SubscriptionError::Listener {
            subscription: self.id,
            source,
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("aspect", &self.aspect)
            .field("state", &self.state)
            .field("members", &self.entities.len())
            .field("observers", &self.observers.len())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
