//! Packed head/tail control word
//!
//! Head and tail live in one lock-free atomic so both indices move in a
//! single compare-and-swap. The widest lock-free integer of the target is
//! used: 64 bits split 32/32 where 64-bit atomics exist, 32 bits split 16/16
//! otherwise. Head occupies the high half, tail the low half.
//!
//! Both indices are monotonic counters; the physical slot is
//! `index % capacity`. Once the tail gets within `capacity` of the top of the
//! index range, both counters are shifted down by [`rebase_step`], a fixed
//! multiple of the capacity, so slot positions and the head/tail distance are
//! preserved.

#[cfg(target_has_atomic = "64")]
mod word {
    pub type AtomicWord = std::sync::atomic::AtomicU64;
    pub type Word = u64;
    pub type Index = u32;
}

#[cfg(not(target_has_atomic = "64"))]
mod word {
    pub type AtomicWord = std::sync::atomic::AtomicU32;
    pub type Word = u32;
    pub type Index = u16;
}

pub use word::{AtomicWord, Index, Word};

/// Largest representable head/tail value
pub const INDEX_MAX: Index = Index::MAX;

const INDEX_BITS: u32 = Index::BITS;

const HALF_RANGE: Index = INDEX_MAX / 2 + 1;

/// Largest slot count the control word can rebase safely
pub const MAX_CAPACITY: usize = (INDEX_MAX / 4) as usize;

/// Amount both counters are shifted down by when they near [`INDEX_MAX`].
///
/// The largest multiple of `capacity` not above half the index range.
pub const fn rebase_step(capacity: Index) -> Index {
    (HALF_RANGE / capacity) * capacity
}

/// Decoded control word
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeadTail {
    /// Oldest occupied logical slot
    pub head: Index,
    /// One past the newest occupied logical slot
    pub tail: Index,
}

impl HeadTail {
    pub const fn new(head: Index, tail: Index) -> Self {
        Self { head, tail }
    }

    pub const fn from_word(word: Word) -> Self {
        Self {
            head: (word >> INDEX_BITS) as Index,
            tail: word as Index,
        }
    }

    pub const fn to_word(self) -> Word {
        ((self.head as Word) << INDEX_BITS) | self.tail as Word
    }

    /// Number of occupied slots
    pub const fn len(self) -> Index {
        self.tail.wrapping_sub(self.head)
    }

    pub const fn is_empty(self) -> bool {
        self.head == self.tail
    }

    /// `head > tail` can only come from memory corruption or a protocol violation.
    pub const fn is_corrupt(self) -> bool {
        self.head > self.tail
    }

    pub const fn needs_rebase(self, capacity: Index) -> bool {
        self.tail > INDEX_MAX - capacity
    }

    /// Shift both counters down by [`rebase_step`] if the tail nears the top of the range.
    pub const fn rebased(self, capacity: Index) -> Self {
        if self.needs_rebase(capacity) {
            let step = rebase_step(capacity);
            Self {
                head: self.head - step,
                tail: self.tail - step,
            }
        } else {
            self
        }
    }
}

/// Distance a head counter moved from `last` to `current`, accounting for one
/// rebase in between.
///
/// Exact as long as at most one rebase happened between the two observations,
/// i.e. fewer than [`rebase_step`] records were written meanwhile. That is
/// about 2^31 records with 32-bit halves but only about 2^15 with 16-bit
/// halves; a consumer idle for longer gets a wrong count.
pub const fn head_advance(last: Index, current: Index, capacity: Index) -> Index {
    if current >= last {
        current - last
    } else {
        current.wrapping_add(rebase_step(capacity)).wrapping_sub(last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_round_trip() {
        let ht = HeadTail::new(7, 42);
        let decoded = HeadTail::from_word(ht.to_word());
        assert_eq!(decoded, ht);
        assert_eq!(decoded.len(), 35);

        let top = HeadTail::new(INDEX_MAX - 1, INDEX_MAX);
        assert_eq!(HeadTail::from_word(top.to_word()), top);
    }

    #[test]
    fn test_zero_word_is_empty() {
        let ht = HeadTail::from_word(0);
        assert!(ht.is_empty());
        assert!(!ht.is_corrupt());
        assert_eq!(ht.len(), 0);
    }

    #[test]
    fn test_corruption_detected() {
        assert!(HeadTail::new(5, 4).is_corrupt());
        assert!(!HeadTail::new(4, 4).is_corrupt());
    }

    #[test]
    fn test_no_rebase_below_threshold() {
        let ht = HeadTail::new(100, 104);
        assert_eq!(ht.rebased(4), ht);

        let edge = HeadTail::new(INDEX_MAX - 8, INDEX_MAX - 4);
        assert_eq!(edge.rebased(4), edge);
    }

    #[test]
    fn test_rebase_preserves_distance_and_slot() {
        for capacity in [1 as Index, 3, 4, 7, 1000] {
            let tail = INDEX_MAX - capacity + 1;
            let ht = HeadTail::new(tail - capacity, tail);
            let rebased = ht.rebased(capacity);

            assert!(rebased.tail < ht.tail);
            assert_eq!(rebased.len(), ht.len());
            assert_eq!(rebased.head % capacity, ht.head % capacity);
            assert_eq!(rebased.tail % capacity, ht.tail % capacity);
            assert!(!rebased.needs_rebase(capacity));
        }
    }

    #[test]
    fn test_rebase_step_fits_max_capacity() {
        let capacity = MAX_CAPACITY as Index;
        let step = rebase_step(capacity);
        assert_eq!(step % capacity, 0);

        // Worst case: full buffer right at the threshold.
        let tail = INDEX_MAX - capacity + 1;
        let ht = HeadTail::new(tail - capacity, tail);
        assert!(ht.head >= step);
        let rebased = ht.rebased(capacity);
        assert_eq!(rebased.len(), capacity);
    }

    #[test]
    fn test_head_advance() {
        assert_eq!(head_advance(10, 10, 4), 0);
        assert_eq!(head_advance(10, 16, 4), 6);

        let step = rebase_step(4);
        // Last observed just before a rebase, current just after.
        let last = step + 10;
        let current = 13;
        assert_eq!(head_advance(last, current, 4), 3);

        // Longest distance still counted exactly: one step minus one record.
        let last = INDEX_MAX - 4;
        assert_eq!(head_advance(last, last - 1, 4), step - 1);
    }
}
