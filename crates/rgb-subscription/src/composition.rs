//! Entity compositions as seen by the subscription core.
//!
//! The world owns component storage; the core only ever asks which component
//! bits an entity currently holds.

use fixedbitset::FixedBitSet;

use crate::{bits, component::ComponentId};

/// Raw entity index.
pub type EntityId = u32;

/// Read access to per-entity composition bitsets.
pub trait CompositionSource {
    /// Component bits of a live entity, `None` if the entity is unknown.
    fn composition(&self, entity: EntityId) -> Option<&FixedBitSet>;
}

/// Dense composition table indexed by entity id.
#[derive(Debug, Default, Clone)]
pub struct Compositions {
    slots: Vec<Option<FixedBitSet>>,
}

impl Compositions {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table with room for `capacity` entities.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
        }
    }

    /// Register an entity with an empty composition.
    ///
    /// An existing composition for the same id is reset.
    pub fn insert_entity(&mut self, entity: EntityId) {
        let idx = entity as usize;
        if idx >= self.slots.len() {
            self.slots.resize(idx + 1, None);
        }
        self.slots[idx] = Some(FixedBitSet::new());
    }

    /// Forget an entity. Returns its last composition.
    pub fn remove_entity(&mut self, entity: EntityId) -> Option<FixedBitSet> {
        self.slots.get_mut(entity as usize).and_then(Option::take)
    }

    /// Check if an entity is present.
    #[must_use]
    pub fn contains(&self, entity: EntityId) -> bool {
        self.composition(entity).is_some()
    }

    /// Set a component bit. Returns `false` if the entity is unknown or
    /// already had the component.
    pub fn add(&mut self, entity: EntityId, component: ComponentId) -> bool {
        match self.get_mut(entity) {
            Some(composition) if !composition.contains(component.index()) => {
                bits::insert_grow(composition, component.index());
                true
            }
            _ => false,
        }
    }

    /// Clear a component bit. Returns `false` if the entity is unknown or
    /// did not have the component.
    pub fn remove(&mut self, entity: EntityId, component: ComponentId) -> bool {
        self.get_mut(entity)
            .is_some_and(|composition| bits::remove(composition, component.index()))
    }

    /// Mutable composition of a live entity.
    pub fn get_mut(&mut self, entity: EntityId) -> Option<&mut FixedBitSet> {
        self.slots.get_mut(entity as usize).and_then(Option::as_mut)
    }

    /// Iterate over live entities and their compositions, in id order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &FixedBitSet)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(idx, slot)| slot.as_ref().map(|bits| (idx as EntityId, bits)))
    }

    /// Number of live entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Check if no entity is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }
}

impl CompositionSource for Compositions {
    fn composition(&self, entity: EntityId) -> Option<&FixedBitSet> {
        self.slots.get(entity as usize).and_then(Option::as_ref)
    }
}
