use core::fmt;

use smallvec::SmallVec;

const WORD_BITS: usize = u64::BITS as usize;

/// A growable bit vector representing a set of [`ComponentType`] indices.
///
/// Classifying entities through index bits instead of type-switch chains is
/// what makes family matching O(words): `all` is a `contains_all`, `one` an
/// `intersects`, `exclude` a negated `intersects`.
///
/// Trailing zero words are trimmed eagerly so that structurally equal sets
/// compare and hash equal regardless of their mutation history, which lets
/// families key interning caches on their bit triples.
///
/// [`ComponentType`]: crate::ComponentType
#[derive(Default, Clone, PartialEq, Eq, Hash)]
pub struct Bits {
    words: SmallVec<[u64; 2]>,
}

impl Bits {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the bit at `index`, growing the word storage as needed.
    pub fn set(&mut self, index: usize) {
        let word = index / WORD_BITS;
        if self.words.len() <= word {
            self.words.resize(word + 1, 0);
        }

        self.words[word] |= 1 << (index % WORD_BITS);
    }

    /// Clears the bit at `index`. Out of range indices are already clear.
    pub fn clear(&mut self, index: usize) {
        let word = index / WORD_BITS;
        if let Some(w) = self.words.get_mut(word) {
            *w &= !(1 << (index % WORD_BITS));
        }

        self.trim();
    }

    pub fn get(&self, index: usize) -> bool {
        let word = index / WORD_BITS;
        self.words
            .get(word)
            .is_some_and(|w| w & (1 << (index % WORD_BITS)) != 0)
    }

    pub fn clear_all(&mut self) {
        self.words.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Returns true if every bit set in `other` is also set in `self`.
    ///
    /// Trivially true for an empty `other`.
    pub fn contains_all(&self, other: &Self) -> bool {
        other
            .words
            .iter()
            .enumerate()
            .all(|(i, &w)| self.words.get(i).copied().unwrap_or(0) & w == w)
    }

    /// Returns true if any bit is set in both `self` and `other`.
    pub fn intersects(&self, other: &Self) -> bool {
        self.words
            .iter()
            .zip(&other.words)
            .any(|(&a, &b)| a & b != 0)
    }

    /// Iterates the indices of all set bits in ascending order.
    pub fn ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(i, &word)| {
            (0..WORD_BITS)
                .filter(move |bit| word & (1 << bit) != 0)
                .map(move |bit| i * WORD_BITS + bit)
        })
    }

    fn trim(&mut self) {
        while self.words.last() == Some(&0) {
            self.words.pop();
        }
    }
}

impl fmt::Debug for Bits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.ones()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_clear() {
        let mut bits = Bits::new();
        assert!(bits.is_empty());
        assert!(!bits.get(3));

        bits.set(3);
        bits.set(70);
        assert!(bits.get(3));
        assert!(bits.get(70));
        assert!(!bits.get(4));
        assert_eq!(bits.ones().collect::<Vec<_>>(), vec![3, 70]);

        bits.clear(70);
        assert!(!bits.get(70));
        bits.clear(200);
        assert_eq!(bits.ones().collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn equality_ignores_history() {
        let mut a = Bits::new();
        a.set(1);
        a.set(130);
        a.clear(130);

        let mut b = Bits::new();
        b.set(1);

        assert_eq!(a, b);
    }

    #[test]
    fn containment_and_intersection() {
        let mut a = Bits::new();
        a.set(1);
        a.set(2);
        a.set(65);

        let mut sub = Bits::new();
        sub.set(2);
        sub.set(65);

        let mut other = Bits::new();
        other.set(3);

        assert!(a.contains_all(&sub));
        assert!(!sub.contains_all(&a));
        assert!(a.contains_all(&Bits::new()));
        assert!(a.intersects(&sub));
        assert!(!a.intersects(&other));
        assert!(!a.intersects(&Bits::new()));
    }
}
