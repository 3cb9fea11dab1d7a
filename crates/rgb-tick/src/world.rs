//! World - entities, their compositions, and the subscriptions watching them.
//!
//! Structural edits (`spawn`, `insert`, `remove`, `despawn`) take effect on
//! compositions immediately and are recorded in the subscription manager's
//! change set. Subscriptions only see them when [`World::tick`] commits.

use std::any::type_name;

use rgb_subscription::{
    AspectBuilder, ComponentId, ComponentRegistry, CompositionSource, Compositions, EntityId,
    Subscription, SubscriptionId, SubscriptionManager,
};
use tracing::{debug, trace};

use crate::error::{TickError, TickResult};

/// The tick-driven world.
pub struct World {
    /// Component type registry.
    components: ComponentRegistry,
    /// Component bits per live entity.
    compositions: Compositions,
    /// Subscriptions and the open change set.
    subscriptions: SubscriptionManager,
    /// Ids free for reuse.
    free_list: Vec<EntityId>,
    /// Ids despawned in the open tick. Reusable once the tick commits.
    pending_free: Vec<EntityId>,
    /// Next never-used id.
    next_id: EntityId,
    /// Number of committed ticks.
    tick: u64,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    /// Create an empty world.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create a world with pre-allocated capacity.
    #[must_use]
    pub fn with_capacity(entity_capacity: usize) -> Self {
        Self {
            components: ComponentRegistry::new(),
            compositions: Compositions::with_capacity(entity_capacity),
            subscriptions: SubscriptionManager::with_capacity(entity_capacity),
            free_list: Vec::with_capacity(entity_capacity / 4),
            pending_free: Vec::new(),
            next_id: 0,
            tick: 0,
        }
    }

    // ==================== Entity Operations ====================

    /// Spawn a new entity with no components.
    ///
    /// The entity joins subscriptions at the next tick.
    pub fn spawn(&mut self) -> EntityId {
        let entity = self.free_list.pop().unwrap_or_else(|| {
            let id = self.next_id;
            self.next_id += 1;
            id
        });

        self.compositions.insert_entity(entity);
        self.subscriptions.changes_mut().mark_added(entity);
        entity
    }

    /// Despawn an entity. Its id is reused only after the next tick.
    pub fn despawn(&mut self, entity: EntityId) -> TickResult<()> {
        self.compositions
            .remove_entity(entity)
            .ok_or(TickError::DeadEntity(entity))?;

        self.subscriptions.changes_mut().mark_deleted(entity);
        self.pending_free.push(entity);
        Ok(())
    }

    /// Check if an entity is alive.
    #[must_use]
    pub fn is_alive(&self, entity: EntityId) -> bool {
        self.compositions.contains(entity)
    }

    /// Number of live entities, including ones not yet committed.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.compositions.len()
    }

    // ==================== Component Operations ====================

    /// Register a component type and return its bit.
    pub fn register<T: 'static>(&mut self) -> ComponentId {
        self.components.register::<T>()
    }

    /// Get the bit of a registered component type.
    #[must_use]
    pub fn component_id<T: 'static>(&self) -> Option<ComponentId> {
        self.components.get_id::<T>()
    }

    /// Add component `T` to an entity, registering the type if needed.
    ///
    /// Returns `false` if the entity already had it.
    pub fn insert<T: 'static>(&mut self, entity: EntityId) -> TickResult<bool> {
        if !self.is_alive(entity) {
            return Err(TickError::DeadEntity(entity));
        }

        let component = self.components.register::<T>();
        let added = self.compositions.add(entity, component);
        if added {
            self.subscriptions.changes_mut().mark_changed(entity);
        }
        Ok(added)
    }

    /// Remove component `T` from an entity.
    ///
    /// Returns `false` if the entity did not have it.
    pub fn remove<T: 'static>(&mut self, entity: EntityId) -> TickResult<bool> {
        if !self.is_alive(entity) {
            return Err(TickError::DeadEntity(entity));
        }

        let Some(component) = self.components.get_id::<T>() else {
            return Ok(false);
        };
        let removed = self.compositions.remove(entity, component);
        if removed {
            self.subscriptions.changes_mut().mark_changed(entity);
        }
        Ok(removed)
    }

    /// Check if an entity has component `T`.
    #[must_use]
    pub fn has<T: 'static>(&self, entity: EntityId) -> bool {
        self.components.get_id::<T>().is_some_and(|component| {
            self.compositions
                .composition(entity)
                .is_some_and(|bits| bits.contains(component.index()))
        })
    }

    /// Move component type `T` to bit `new` and re-evaluate every entity
    /// holding it.
    ///
    /// Committed entities without structural edits in the open tick are
    /// re-evaluated right away, and subscriptions whose membership flips are
    /// informed. Entities spawned or edited in the open tick are left to the
    /// next [`World::tick`], which sees their compositions in the new encoding.
    /// Aspects are not rewritten: they keep matching on the bits they were
    /// built with. The vacated bit is never given to another type. Returns the
    /// previous bit.
    pub fn reassign_component<T: 'static>(&mut self, new: ComponentId) -> TickResult<ComponentId> {
        let old = self
            .components
            .get_id::<T>()
            .ok_or(TickError::UnknownComponent(type_name::<T>()))?;
        if old == new {
            return Ok(old);
        }
        if let Some(owner) = self.components.name(new) {
            return Err(TickError::BitTaken {
                bit: new.as_raw(),
                owner,
            });
        }
        if self.components.is_retired(new) {
            return Err(TickError::BitRetired(new.as_raw()));
        }
        self.components
            .reassign::<T>(new)
            .ok_or(TickError::UnknownComponent(type_name::<T>()))?;

        let affected: Vec<EntityId> = self
            .compositions
            .iter()
            .filter(|(_, bits)| bits.contains(old.index()))
            .map(|(entity, _)| entity)
            .collect();
        for &entity in &affected {
            self.compositions.remove(entity, old);
            self.compositions.add(entity, new);
        }

        let committed = self.subscriptions.entities();
        let pending = self.subscriptions.changes().changed();
        let immediate: Vec<EntityId> = affected
            .iter()
            .copied()
            .filter(|&entity| committed.contains(entity) && !pending.contains(entity as usize))
            .collect();

        debug!(
            component = type_name::<T>(),
            ?old,
            ?new,
            entities = affected.len(),
            deferred = affected.len() - immediate.len(),
            "component bit reassigned"
        );

        self.subscriptions
            .process_component_identities(&immediate, &self.compositions)?;
        Ok(old)
    }

    /// Component registry.
    #[must_use]
    pub fn components(&self) -> &ComponentRegistry {
        &self.components
    }

    // ==================== Subscriptions ====================

    /// Get or create the subscription for an aspect.
    ///
    /// A new subscription already contains every committed matching entity.
    pub fn subscribe(&mut self, builder: &AspectBuilder) -> TickResult<SubscriptionId> {
        Ok(self.subscriptions.subscribe(builder, &self.compositions)?)
    }

    /// Get a subscription by ID.
    pub fn subscription(&self, id: SubscriptionId) -> TickResult<&Subscription> {
        Ok(self.subscriptions.subscription(id)?)
    }

    /// Get a mutable subscription by ID, e.g. to register callbacks.
    pub fn subscription_mut(&mut self, id: SubscriptionId) -> TickResult<&mut Subscription> {
        Ok(self.subscriptions.subscription_mut(id)?)
    }

    /// Committed entities, ascending.
    #[must_use]
    pub fn entities(&self) -> &[EntityId] {
        self.subscriptions.entities().entities()
    }

    /// Subscription manager.
    #[must_use]
    pub fn subscriptions(&self) -> &SubscriptionManager {
        &self.subscriptions
    }

    // ==================== Tick ====================

    /// Commit every change recorded since the last tick.
    ///
    /// If a callback fails, membership is still committed and the first error
    /// is returned.
    pub fn tick(&mut self) -> TickResult<()> {
        let result = self.subscriptions.process_tick(&self.compositions);

        let committed = self.subscriptions.entities();
        let free_list = &mut self.free_list;
        self.pending_free.retain(|&entity| {
            if committed.contains(entity) {
                true
            } else {
                free_list.push(entity);
                false
            }
        });

        self.tick += 1;
        trace!(
            tick = self.tick,
            entities = self.entities().len(),
            free = self.free_list.len(),
            "tick committed"
        );

        Ok(result?)
    }

    /// Number of committed ticks.
    #[must_use]
    pub const fn tick_count(&self) -> u64 {
        self.tick
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("tick", &self.tick)
            .field("entities", &self.compositions.len())
            .field("components", &self.components.len())
            .field("subscriptions", &self.subscriptions.len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    struct Position;
    struct Velocity;

    #[test]
    fn test_spawn_is_visible_after_tick() {
        let mut world = World::new();
        let e = world.spawn();

        assert!(world.is_alive(e));
        assert!(world.entities().is_empty());

        world.tick().unwrap();
        assert_eq!(world.entities(), &[e]);
        assert_eq!(world.tick_count(), 1);
    }

    #[test]
    fn test_insert_and_remove() {
        let mut world = World::new();
        let e = world.spawn();

        assert!(world.insert::<Position>(e).unwrap());
        assert!(!world.insert::<Position>(e).unwrap());
        assert!(world.has::<Position>(e));
        assert!(!world.has::<Velocity>(e));

        assert!(!world.remove::<Velocity>(e).unwrap());
        assert!(world.remove::<Position>(e).unwrap());
        assert!(!world.has::<Position>(e));
    }

    #[test]
    fn test_dead_entity_rejected() {
        let mut world = World::new();
        let e = world.spawn();
        world.despawn(e).unwrap();

        assert!(matches!(world.despawn(e), Err(TickError::DeadEntity(id)) if id == e));
        assert!(matches!(
            world.insert::<Position>(e),
            Err(TickError::DeadEntity(_))
        ));
        assert!(matches!(
            world.remove::<Position>(e),
            Err(TickError::DeadEntity(_))
        ));
    }

    #[test]
    fn test_ids_recycled_only_after_tick() {
        let mut world = World::new();
        let a = world.spawn();
        world.tick().unwrap();

        world.despawn(a).unwrap();
        let b = world.spawn();
        assert_ne!(a, b);

        world.tick().unwrap();
        let c = world.spawn();
        assert_eq!(c, a);
    }

    #[test]
    fn test_reassign_unknown_component() {
        let mut world = World::new();

        let err = world
            .reassign_component::<Position>(ComponentId::from_raw(3))
            .unwrap_err();
        assert!(matches!(err, TickError::UnknownComponent(_)));
    }

    #[test]
    fn test_reassign_onto_taken_bit() {
        let mut world = World::new();
        world.register::<Position>();
        let velocity = world.register::<Velocity>();

        let err = world.reassign_component::<Position>(velocity).unwrap_err();
        assert!(matches!(err, TickError::BitTaken { bit, .. } if bit == velocity.as_raw()));
    }

    #[test]
    fn test_reassign_onto_retired_bit() {
        let mut world = World::new();
        let position = world.register::<Position>();
        world.register::<Velocity>();

        let moved = world.components().next_free();
        world.reassign_component::<Position>(moved).unwrap();

        let err = world.reassign_component::<Velocity>(position).unwrap_err();
        assert!(matches!(err, TickError::BitRetired(bit) if bit == position.as_raw()));
    }

    #[test]
    fn test_reassign_moves_bits() {
        let mut world = World::new();
        let e = world.spawn();
        world.insert::<Position>(e).unwrap();
        world.tick().unwrap();

        let old = world.component_id::<Position>().unwrap();
        let new = ComponentId::from_raw(9);
        assert_eq!(world.reassign_component::<Position>(new).unwrap(), old);

        assert_eq!(world.component_id::<Position>(), Some(new));
        assert!(world.has::<Position>(e));
    }
}
