//! Pool-indexed bit-sets.
//!
//! A `PoolSet` is a dense bit-set keyed by a variable's serial in the
//! method's variable pool. Each pool rebuild (pruning dead variables
//! renumbers the survivors) bumps a generation counter; using a set whose
//! generation no longer matches the pool is a fatal error rather than a
//! silent misinterpretation.

use alloc::vec::Vec;

/// A plain growable bit-vector. Also backs live-range coverage, which is
/// keyed by instruction index and needs no generation tag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BitVec {
    words: Vec<u64>,
}

impl BitVec {
    pub fn new() -> Self {
        Self { words: Vec::new() }
    }

    pub fn with_len(bits: usize) -> Self {
        Self {
            words: alloc::vec![0; bits.div_ceil(64)],
        }
    }

    pub fn contains(&self, bit: usize) -> bool {
        self.words
            .get(bit / 64)
            .is_some_and(|&w| w & (1u64 << (bit % 64)) != 0)
    }

    pub fn insert(&mut self, bit: usize) {
        let word = bit / 64;
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1 << (bit % 64);
    }

    pub fn remove(&mut self, bit: usize) {
        if let Some(w) = self.words.get_mut(bit / 64) {
            *w &= !(1 << (bit % 64));
        }
    }

    /// Bitwise OR of `other` into `self`.
    pub fn union_with(&mut self, other: &BitVec) {
        if other.words.len() > self.words.len() {
            self.words.resize(other.words.len(), 0);
        }
        for (w, o) in self.words.iter_mut().zip(other.words.iter()) {
            *w |= o;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Iterate set bit indices in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(wi, &w)| {
            (0..64usize)
                .filter(move |&b| w & (1u64 << b) != 0)
                .map(move |b| wi * 64 + b)
        })
    }

    /// Equality that ignores trailing zero words.
    pub fn same_bits(&self, other: &BitVec) -> bool {
        let max = self.words.len().max(other.words.len());
        (0..max).all(|i| {
            self.words.get(i).copied().unwrap_or(0) == other.words.get(i).copied().unwrap_or(0)
        })
    }
}

/// A bit-set over variable serials, tagged with the pool generation it was
/// created against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSet {
    generation: u32,
    bits: BitVec,
}

impl PoolSet {
    /// Create an empty set for the given pool generation.
    pub fn empty(generation: u32) -> Self {
        Self {
            generation,
            bits: BitVec::new(),
        }
    }

    /// The pool generation this set was created against.
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Abort if this set refers to a renumbered pool.
    pub fn check_generation(&self, current: u32) {
        assert!(
            self.generation == current,
            "pool set from generation {} used against pool generation {}",
            self.generation,
            current
        );
    }

    pub fn insert(&mut self, serial: u32) {
        self.bits.insert(serial as usize);
    }

    pub fn remove(&mut self, serial: u32) {
        self.bits.remove(serial as usize);
    }

    pub fn contains(&self, serial: u32) -> bool {
        self.bits.contains(serial as usize)
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.bits.count()
    }

    /// Union another set into this one. Both must share a generation.
    pub fn union_with(&mut self, other: &PoolSet) {
        other.check_generation(self.generation);
        self.bits.union_with(&other.bits);
    }

    /// Iterate member serials in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.bits.iter().map(|b| b as u32)
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;

    use super::*;

    #[test]
    fn test_bitvec_basic() {
        let mut bits = BitVec::new();
        assert!(!bits.contains(3));
        bits.insert(3);
        bits.insert(64);
        bits.insert(130);
        assert!(bits.contains(3));
        assert!(bits.contains(64));
        assert!(!bits.contains(65));
        assert_eq!(bits.count(), 3);
        let set: Vec<_> = bits.iter().collect();
        assert_eq!(set, [3, 64, 130]);
        bits.remove(64);
        assert!(!bits.contains(64));
    }

    #[test]
    fn test_bitvec_union() {
        let mut a = BitVec::new();
        a.insert(1);
        let mut b = BitVec::new();
        b.insert(100);
        a.union_with(&b);
        assert!(a.contains(1));
        assert!(a.contains(100));
    }

    #[test]
    fn test_bitvec_same_bits_ignores_capacity() {
        let mut a = BitVec::new();
        a.insert(200);
        a.remove(200);
        let b = BitVec::new();
        assert!(a.same_bits(&b));
        assert_ne!(a, b); // structural equality sees the extra words
    }

    #[test]
    fn test_pool_set_membership() {
        let mut set = PoolSet::empty(0);
        set.insert(5);
        set.insert(70);
        assert!(set.contains(5));
        assert!(!set.contains(6));
        assert_eq!(set.len(), 2);
        assert_eq!(set.iter().collect::<Vec<_>>(), [5, 70]);
    }

    #[test]
    #[should_panic(expected = "pool set from generation")]
    fn test_pool_set_stale_generation() {
        let set = PoolSet::empty(0);
        set.check_generation(1);
    }

    #[test]
    #[should_panic(expected = "pool set from generation")]
    fn test_pool_set_union_generation_mismatch() {
        let mut a = PoolSet::empty(0);
        let b = PoolSet::empty(1);
        a.union_with(&b);
    }
}
