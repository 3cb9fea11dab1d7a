//! Aspects - boolean filters over component composition.
//!
//! An aspect is built once from a declarative description and never changes
//! afterwards, which makes it usable as a map key:
//!
//! ```ignore
//! let moving = Aspect::builder()
//!     .all([position, velocity])
//!     .exclude([frozen])
//!     .build()?;
//!
//! assert!(moving.matches(&composition));
//! ```
//!
//! # Terms
//!
//! - `.all(..)` - entity must have every listed component
//! - `.one(..)` - entity must have at least one listed component (ignored when empty)
//! - `.exclude(..)` - entity must have none of the listed components

use std::{
    fmt,
    hash::{Hash, Hasher},
};

use fixedbitset::FixedBitSet;
use smallvec::SmallVec;

use crate::{bits, component::ComponentId, error::AspectError};

type ComponentList = SmallVec<[ComponentId; 8]>;

// ============================================================================
// AspectBuilder
// ============================================================================

/// Fluent description of an [`Aspect`].
///
/// Builders are plain values; building the same description twice yields equal
/// aspects.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct AspectBuilder {
    all: ComponentList,
    one: ComponentList,
    exclude: ComponentList,
}

impl AspectBuilder {
    /// Start an empty description (matches every entity).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Require every component in `components`.
    #[must_use]
    pub fn all(mut self, components: impl IntoIterator<Item = ComponentId>) -> Self {
        self.all.extend(components);
        self
    }

    /// Require at least one component in `components`.
    #[must_use]
    pub fn one(mut self, components: impl IntoIterator<Item = ComponentId>) -> Self {
        self.one.extend(components);
        self
    }

    /// Reject entities holding any component in `components`.
    #[must_use]
    pub fn exclude(mut self, components: impl IntoIterator<Item = ComponentId>) -> Self {
        self.exclude.extend(components);
        self
    }

    /// Normalize the description and compile its bitsets.
    ///
    /// Fails if a component is both required and excluded.
    pub fn build(&self) -> Result<Aspect, AspectError> {
        let all = normalize(&self.all);
        let one = normalize(&self.one);
        let exclude = normalize(&self.exclude);

        if let Some(&component) = all.iter().find(|id| exclude.binary_search(id).is_ok()) {
            return Err(AspectError::Contradictory(component));
        }

        Ok(Aspect {
            all_bits: to_bits(&all),
            one_bits: to_bits(&one),
            exclude_bits: to_bits(&exclude),
            all,
            one,
            exclude,
        })
    }
}

impl fmt::Debug for AspectBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AspectBuilder")
            .field("all", &self.all)
            .field("one", &self.one)
            .field("exclude", &self.exclude)
            .finish()
    }
}

fn normalize(components: &[ComponentId]) -> ComponentList {
    let mut list: ComponentList = components.iter().copied().collect();
    list.sort_unstable();
    list.dedup();
    list
}

fn to_bits(components: &[ComponentId]) -> FixedBitSet {
    bits::from_indices(components.iter().map(|id| id.index()))
}

// ============================================================================
// Aspect
// ============================================================================

/// Immutable component filter.
///
/// Equality and hashing only look at the normalized component lists, so two
/// aspects built independently from the same sets compare equal.
#[derive(Clone)]
pub struct Aspect {
    all: ComponentList,
    one: ComponentList,
    exclude: ComponentList,
    all_bits: FixedBitSet,
    one_bits: FixedBitSet,
    exclude_bits: FixedBitSet,
}

impl Aspect {
    /// Start building an aspect.
    #[must_use]
    pub fn builder() -> AspectBuilder {
        AspectBuilder::new()
    }

    /// The aspect matching every entity.
    #[must_use]
    pub fn everything() -> Self {
        Self {
            all: ComponentList::new(),
            one: ComponentList::new(),
            exclude: ComponentList::new(),
            all_bits: FixedBitSet::new(),
            one_bits: FixedBitSet::new(),
            exclude_bits: FixedBitSet::new(),
        }
    }

    /// Check a composition against this aspect.
    #[must_use]
    pub fn matches(&self, composition: &FixedBitSet) -> bool {
        if !self.all_bits.is_subset(composition) {
            return false;
        }
        if !self.exclude_bits.is_disjoint(composition) {
            return false;
        }
        self.one.is_empty() || !self.one_bits.is_disjoint(composition)
    }

    /// Whether this aspect accepts every composition.
    #[must_use]
    pub fn is_everything(&self) -> bool {
        self.all.is_empty() && self.one.is_empty() && self.exclude.is_empty()
    }

    /// Required components, sorted.
    #[must_use]
    pub fn all(&self) -> &[ComponentId] {
        &self.all
    }

    /// "At least one of" components, sorted.
    #[must_use]
    pub fn one(&self) -> &[ComponentId] {
        &self.one
    }

    /// Excluded components, sorted.
    #[must_use]
    pub fn exclude(&self) -> &[ComponentId] {
        &self.exclude
    }

    /// A builder reproducing this aspect, for deriving variants.
    #[must_use]
    pub fn to_builder(&self) -> AspectBuilder {
        AspectBuilder {
            all: self.all.clone(),
            one: self.one.clone(),
            exclude: self.exclude.clone(),
        }
    }
}

impl Default for Aspect {
    fn default() -> Self {
        Self::everything()
    }
}

impl PartialEq for Aspect {
    fn eq(&self, other: &Self) -> bool {
        self.all == other.all && self.one == other.one && self.exclude == other.exclude
    }
}

impl Eq for Aspect {}

impl Hash for Aspect {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.all.hash(state);
        self.one.hash(state);
        self.exclude.hash(state);
    }
}

impl fmt::Debug for Aspect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Aspect")
            .field("all", &self.all)
            .field("one", &self.one)
            .field("exclude", &self.exclude)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::hash::BuildHasher;

    use rustc_hash::FxBuildHasher;

    use super::*;

    const A: ComponentId = ComponentId::from_raw(0);
    const B: ComponentId = ComponentId::from_raw(1);
    const C: ComponentId = ComponentId::from_raw(2);
    const D: ComponentId = ComponentId::from_raw(70);

    fn composition(ids: &[ComponentId]) -> FixedBitSet {
        bits::from_indices(ids.iter().map(|id| id.index()))
    }

    #[test]
    fn test_all() {
        let aspect = Aspect::builder().all([A, B]).build().unwrap();

        assert!(aspect.matches(&composition(&[A, B])));
        assert!(aspect.matches(&composition(&[A, B, C])));
        assert!(!aspect.matches(&composition(&[A])));
        assert!(!aspect.matches(&composition(&[])));
    }

    #[test]
    fn test_one() {
        let aspect = Aspect::builder().one([B, D]).build().unwrap();

        assert!(aspect.matches(&composition(&[D])));
        assert!(aspect.matches(&composition(&[A, B])));
        assert!(!aspect.matches(&composition(&[A, C])));
        // Shorter composition than the one-set still evaluates.
        assert!(!aspect.matches(&composition(&[A])));
    }

    #[test]
    fn test_exclude() {
        let aspect = Aspect::builder().all([A]).exclude([D]).build().unwrap();

        assert!(aspect.matches(&composition(&[A, C])));
        assert!(!aspect.matches(&composition(&[A, D])));
    }

    #[test]
    fn test_combined_terms() {
        let aspect = Aspect::builder()
            .all([A])
            .one([B, C])
            .exclude([D])
            .build()
            .unwrap();

        assert!(aspect.matches(&composition(&[A, C])));
        assert!(!aspect.matches(&composition(&[A])));
        assert!(!aspect.matches(&composition(&[A, B, D])));
        assert!(!aspect.matches(&composition(&[B, C])));
    }

    #[test]
    fn test_everything_matches_anything() {
        let aspect = Aspect::everything();

        assert!(aspect.is_everything());
        assert!(aspect.matches(&composition(&[])));
        assert!(aspect.matches(&composition(&[A, D])));
        assert_eq!(Aspect::builder().build().unwrap(), aspect);
    }

    #[test]
    fn test_contradiction_rejected() {
        let err = Aspect::builder()
            .all([A, B])
            .exclude([C, B])
            .build()
            .unwrap_err();

        assert!(matches!(err, AspectError::Contradictory(id) if id == B));
    }

    #[test]
    fn test_matches_is_pure() {
        let aspect = Aspect::builder().all([A]).exclude([B]).build().unwrap();
        let bits = composition(&[A, C]);

        let first = aspect.matches(&bits);
        let second = aspect.matches(&bits);

        assert_eq!(first, second);
        assert!(first);
    }

    #[test]
    fn test_structural_equality() {
        let left = Aspect::builder()
            .all([B, A, A])
            .exclude([C])
            .build()
            .unwrap();
        let right = Aspect::builder()
            .exclude([C])
            .all([A])
            .all([B])
            .build()
            .unwrap();

        assert_eq!(left, right);
        assert_eq!(FxBuildHasher.hash_one(&left), FxBuildHasher.hash_one(&right));

        let other = Aspect::builder().one([A, B]).exclude([C]).build().unwrap();
        assert_ne!(left, other);
    }

    #[test]
    fn test_to_builder_roundtrip() {
        let aspect = Aspect::builder().all([A]).one([C, D]).build().unwrap();
        let widened = aspect.to_builder().exclude([B]).build().unwrap();

        assert_eq!(aspect.to_builder().build().unwrap(), aspect);
        assert_eq!(widened.exclude(), &[B]);
        assert_eq!(widened.one(), &[C, D]);
    }
}
