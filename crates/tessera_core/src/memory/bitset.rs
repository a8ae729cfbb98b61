//! # Fixed-Width Bit Sets
//!
//! 256-bit signatures over component ids. Archetype signatures and query
//! include/exclude masks are all `BitSet`s, so matching an archetype against
//! a query is four AND/compare pairs.

use bytemuck::{Pod, Zeroable};

/// Number of 64-bit words in a [`BitSet`].
const WORDS: usize = 4;

/// A fixed 256-bit vector.
///
/// # Example
///
/// ```rust
/// use tessera_core::BitSet;
///
/// let mut signature = BitSet::new();
/// signature.set_all(&[0, 3, 200]);
///
/// let required = BitSet::from_bits(&[0, 200]);
/// assert!(signature.has_all(&required));
/// assert_eq!(signature.first_clear_bit(), 1);
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Pod, Zeroable)]
#[repr(transparent)]
pub struct BitSet {
    words: [u64; WORDS],
}

impl BitSet {
    /// Number of addressable bits.
    pub const CAPACITY: usize = WORDS * 64;

    /// Creates an empty set.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self { words: [0; WORDS] }
    }

    /// Creates a set with the given bits set.
    #[must_use]
    pub fn from_bits(bits: &[usize]) -> Self {
        let mut set = Self::new();
        set.set_all(bits);
        set
    }

    #[inline]
    fn locate(bit: usize) -> (usize, u64) {
        assert!(bit < Self::CAPACITY, "bit {bit} out of range (capacity {})", Self::CAPACITY);
        (bit / 64, 1u64 << (bit % 64))
    }

    /// Sets `bit`.
    ///
    /// # Panics
    ///
    /// Panics if `bit >= CAPACITY`.
    #[inline]
    pub fn set(&mut self, bit: usize) {
        let (word, mask) = Self::locate(bit);
        self.words[word] |= mask;
    }

    /// Sets every bit in `bits`.
    pub fn set_all(&mut self, bits: &[usize]) {
        for &bit in bits {
            self.set(bit);
        }
    }

    /// Clears `bit`.
    #[inline]
    pub fn clear(&mut self, bit: usize) {
        let (word, mask) = Self::locate(bit);
        self.words[word] &= !mask;
    }

    /// Checks membership of `bit`.
    #[inline]
    #[must_use]
    pub fn has(&self, bit: usize) -> bool {
        let (word, mask) = Self::locate(bit);
        self.words[word] & mask != 0
    }

    /// True iff every bit of `other` is set in `self`.
    #[inline]
    #[must_use]
    pub fn has_all(&self, other: &Self) -> bool {
        self.words
            .iter()
            .zip(other.words.iter())
            .all(|(a, b)| a & b == *b)
    }

    /// True iff `self` and `other` share at least one bit.
    #[inline]
    #[must_use]
    pub fn has_any(&self, other: &Self) -> bool {
        self.words
            .iter()
            .zip(other.words.iter())
            .any(|(a, b)| a & b != 0)
    }

    /// Lowest bit that is not set, or [`BitSet::CAPACITY`] if the set is full.
    #[must_use]
    pub fn first_clear_bit(&self) -> usize {
        for (index, word) in self.words.iter().enumerate() {
            if *word != u64::MAX {
                return index * 64 + word.trailing_ones() as usize;
            }
        }
        Self::CAPACITY
    }

    /// Number of set bits.
    #[inline]
    #[must_use]
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Checks if no bit is set.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Number of set bits strictly below `bit`.
    ///
    /// For a member bit this is its position among the set bits, which is
    /// how archetypes map a component id to its column.
    #[inline]
    #[must_use]
    pub fn rank(&self, bit: usize) -> usize {
        let (word, mask) = Self::locate(bit);
        let below: usize = self.words[..word].iter().map(|w| w.count_ones() as usize).sum();
        below + (self.words[word] & (mask - 1)).count_ones() as usize
    }

    /// Bits set in either set.
    #[inline]
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        let mut out = *self;
        for (a, b) in out.words.iter_mut().zip(other.words.iter()) {
            *a |= b;
        }
        out
    }

    /// Bits set in `self` but not in `other`.
    #[inline]
    #[must_use]
    pub fn difference(&self, other: &Self) -> Self {
        let mut out = *self;
        for (a, b) in out.words.iter_mut().zip(other.words.iter()) {
            *a &= !b;
        }
        out
    }

    /// Iterates the set bits in ascending order.
    #[must_use]
    pub fn iter(&self) -> BitIter<'_> {
        BitIter {
            words: &self.words,
            word_idx: 0,
            current_word: self.words[0],
        }
    }
}

/// Iterator over the set bits of a [`BitSet`].
pub struct BitIter<'a> {
    words: &'a [u64; WORDS],
    word_idx: usize,
    current_word: u64,
}

impl Iterator for BitIter<'_> {
    type Item = usize;

    #[inline]
    fn next(&mut self) -> Option<usize> {
        loop {
            if self.current_word != 0 {
                let bit = self.current_word.trailing_zeros() as usize;
                self.current_word &= self.current_word - 1;
                return Some(self.word_idx * 64 + bit);
            }

            self.word_idx += 1;
            if self.word_idx >= WORDS {
                return None;
            }
            self.current_word = self.words[self.word_idx];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_has_word_boundaries() {
        let mut set = BitSet::new();
        for bit in [0, 64, 128, 192] {
            set.set(bit);
            assert!(set.has(bit));
        }
        assert!(!set.has(1));
        assert!(!set.has(255));
        assert_eq!(set.count(), 4);
    }

    #[test]
    fn test_has_all() {
        let set = BitSet::from_bits(&[1, 2, 3, 100]);
        assert!(set.has_all(&BitSet::from_bits(&[1, 100])));
        assert!(set.has_all(&BitSet::new()));
        assert!(!set.has_all(&BitSet::from_bits(&[1, 4])));
    }

    #[test]
    fn test_has_any() {
        let set = BitSet::from_bits(&[5, 70]);
        assert!(set.has_any(&BitSet::from_bits(&[70, 200])));
        assert!(!set.has_any(&BitSet::from_bits(&[6, 200])));
        assert!(!set.has_any(&BitSet::new()));
    }

    #[test]
    fn test_first_clear_bit() {
        let mut set = BitSet::new();
        set.set_all(&[0, 1, 2, 3, 4, 5]);
        for bit in 7..=15 {
            set.set(bit);
        }
        assert_eq!(set.first_clear_bit(), 6);

        let mut full = BitSet::new();
        for bit in 0..BitSet::CAPACITY {
            full.set(bit);
        }
        assert_eq!(full.first_clear_bit(), BitSet::CAPACITY);

        full.clear(130);
        assert_eq!(full.first_clear_bit(), 130);
    }

    #[test]
    fn test_rank_and_iter() {
        let set = BitSet::from_bits(&[3, 9, 64, 250]);
        assert_eq!(set.rank(3), 0);
        assert_eq!(set.rank(9), 1);
        assert_eq!(set.rank(64), 2);
        assert_eq!(set.rank(250), 3);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![3, 9, 64, 250]);
    }

    #[test]
    fn test_union_difference() {
        let a = BitSet::from_bits(&[1, 2]);
        let b = BitSet::from_bits(&[2, 3]);
        assert_eq!(a.union(&b), BitSet::from_bits(&[1, 2, 3]));
        assert_eq!(a.difference(&b), BitSet::from_bits(&[1]));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_out_of_range_bit_panics() {
        let mut set = BitSet::new();
        set.set(256);
    }
}
