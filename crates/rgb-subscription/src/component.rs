//! Component type identifiers.
//!
//! Every component kind is assigned a small, dense bit index. Aspects and
//! composition bitsets are both expressed in terms of these indices, so the
//! registry is the single place where Rust types meet bits.

use std::{any::TypeId, fmt};

use fixedbitset::FixedBitSet;
use hashbrown::HashMap;

use crate::bits;

/// Bit index of a component type.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(u32);

impl ComponentId {
    /// Create a component ID from a raw value.
    #[must_use]
    pub const fn from_raw(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw ID value.
    #[must_use]
    pub const fn as_raw(self) -> u32 {
        self.0
    }

    /// Bit position inside a composition bitset.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentId({})", self.0)
    }
}

/// Registry mapping Rust types to component bits.
///
/// Ids are handed out densely starting at zero, per registry. A type keeps its
/// bit until [`ComponentRegistry::reassign`] moves it. A bit vacated by a move
/// is retired and never given to another type, since aspects built against it
/// would otherwise start matching the newcomer.
#[derive(Default)]
pub struct ComponentRegistry {
    type_to_id: HashMap<TypeId, ComponentId>,
    /// Type name indexed by bit, `None` for unused bits.
    names: Vec<Option<&'static str>>,
    /// Bits vacated by [`ComponentRegistry::reassign`].
    retired: FixedBitSet,
}

impl ComponentRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component type and return its bit.
    ///
    /// If the type is already registered, returns the existing bit.
    pub fn register<T: 'static>(&mut self) -> ComponentId {
        let type_id = TypeId::of::<T>();

        if let Some(&id) = self.type_to_id.get(&type_id) {
            return id;
        }

        let id = ComponentId(self.names.len() as u32);
        self.names.push(Some(std::any::type_name::<T>()));
        self.type_to_id.insert(type_id, id);

        id
    }

    /// Get the bit for a type, if registered.
    #[must_use]
    pub fn get_id<T: 'static>(&self) -> Option<ComponentId> {
        self.type_to_id.get(&TypeId::of::<T>()).copied()
    }

    /// Type name registered at a bit.
    #[must_use]
    pub fn name(&self, id: ComponentId) -> Option<&'static str> {
        self.names.get(id.index()).copied().flatten()
    }

    /// Whether a bit was vacated by a reassignment.
    #[must_use]
    pub fn is_retired(&self, id: ComponentId) -> bool {
        self.retired.contains(id.index())
    }

    /// Whether `id` can take a reassigned type: neither owned nor retired.
    #[must_use]
    pub fn is_vacant(&self, id: ComponentId) -> bool {
        self.name(id).is_none() && !self.is_retired(id)
    }

    /// Move a registered type to a different bit.
    ///
    /// Returns the previous bit, or `None` when `T` is not registered or the
    /// target bit is owned or retired. Moving a type onto its own bit is a
    /// no-op that returns that bit. The previous bit is retired.
    pub fn reassign<T: 'static>(&mut self, new: ComponentId) -> Option<ComponentId> {
        let old = self.get_id::<T>()?;
        if old == new {
            return Some(old);
        }
        if !self.is_vacant(new) {
            return None;
        }

        if new.index() >= self.names.len() {
            self.names.resize(new.index() + 1, None);
        }
        self.names[new.index()] = self.names[old.index()].take();
        bits::insert_grow(&mut self.retired, old.index());
        self.type_to_id.insert(TypeId::of::<T>(), new);

        Some(old)
    }

    /// Get the number of registered components.
    #[must_use]
    pub fn len(&self) -> usize {
        self.type_to_id.len()
    }

    /// Check if the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.type_to_id.is_empty()
    }

    /// Highest bit in use plus one; the width a composition bitset needs.
    #[must_use]
    pub fn bit_width(&self) -> usize {
        self.names
            .iter()
            .rposition(Option::is_some)
            .map_or(0, |idx| idx + 1)
    }

    /// First bit that has never been owned; always vacant.
    #[must_use]
    pub fn next_free(&self) -> ComponentId {
        ComponentId(self.names.len() as u32)
    }
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("count", &self.len())
            .field("names", &self.names)
            .finish()
    }
}
