//! Bitset helpers.
//!
//! `FixedBitSet` panics on out-of-range writes, while entity ids and component
//! bits grow over the lifetime of a world. All writes go through these helpers.

use fixedbitset::FixedBitSet;

use crate::composition::EntityId;

/// Set `bit`, growing the set when needed.
pub fn insert_grow(bits: &mut FixedBitSet, bit: usize) {
    if bit >= bits.len() {
        bits.grow(bit + 1);
    }
    bits.insert(bit);
}

/// Clear `bit`. Returns whether it was set.
pub fn remove(bits: &mut FixedBitSet, bit: usize) -> bool {
    if bits.contains(bit) {
        bits.set(bit, false);
        true
    } else {
        false
    }
}

/// Collect the set bits of `bits` into `out` as entity ids.
///
/// `out` is cleared first; ids come out in ascending order, each once.
pub fn collect_ids(bits: &FixedBitSet, out: &mut Vec<EntityId>) {
    out.clear();
    out.extend(bits.ones().map(|bit| bit as EntityId));
}

/// Build a bitset from a list of bit positions.
pub fn from_indices(indices: impl IntoIterator<Item = usize>) -> FixedBitSet {
    let mut bits = FixedBitSet::new();
    for bit in indices {
        insert_grow(&mut bits, bit);
    }
    bits
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_ids_ordered() {
        let bits = from_indices([70, 3, 64, 3, 0]);
        let mut out = vec![99, 98];

        collect_ids(&bits, &mut out);

        assert_eq!(out, vec![0, 3, 64, 70]);
    }

    #[test]
    fn test_collect_ids_empty() {
        let mut out = vec![1];
        collect_ids(&FixedBitSet::new(), &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_insert_grow_and_remove() {
        let mut bits = FixedBitSet::new();
        insert_grow(&mut bits, 200);

        assert!(bits.contains(200));
        assert!(remove(&mut bits, 200));
        assert!(!remove(&mut bits, 200));
        // Out of range removal is a no-op.
        assert!(!remove(&mut bits, 10_000));
    }
}
