//! Adaptive queue: the recency-biased codeword dictionary.
//!
//! A fixed list of [`QUEUE_LENGTH`] distinct codewords. A hit moves the
//! codeword part of the way toward the front; a miss inserts it in the
//! middle and the tail entry falls off. Both moves are scaled by a key
//! nibble, so the queue evolves differently under different keys even for
//! identical input.
//!
//! Encoder and decoder must apply exactly the same sequence of
//! [`promote`](AdaptiveQueue::promote) / [`insert`](AdaptiveQueue::insert)
//! calls to stay synchronized.

use comcrypt_core::bits::BitSet;

use crate::key::KeySchedule;

/// Number of queue slots; a slot index fits in one byte code.
pub const QUEUE_LENGTH: usize = 256;

/// Largest allowed hit promotion rate (keeps the target ahead of the hit).
pub const MAX_PROMOTION_RATE_HIT: u8 = 16;

/// Largest allowed miss promotion rate (keeps the target inside the queue).
pub const MAX_PROMOTION_RATE_MISS: u8 = 14;

const CODEWORD_SPACE: usize = 1 << 16;

/// Saved queue contents, see [`AdaptiveQueue::snapshot`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSnapshot {
    entries: [u16; QUEUE_LENGTH],
}

/// Fixed-capacity codeword queue with an optional membership bitmap.
#[derive(Debug, Clone)]
pub struct AdaptiveQueue {
    /// Codewords, front first.
    entries: [u16; QUEUE_LENGTH],
    /// Mirrors the set of entries when lookahead is enabled.
    lookahead: Option<BitSet>,
}

impl AdaptiveQueue {
    /// Initial queue for recursion level `level`.
    ///
    /// Entries follow `a * i + b (mod 2^16)` with `a` odd, which is
    /// injective on `0..256`, so the queue starts without duplicates.
    pub fn new(keys: &KeySchedule, level: usize, lookahead: bool) -> Self {
        let level = level as u32;
        let a = (keys.hash(2 * level) as u16) | 1;
        let b = keys.hash(2 * level + 1) as u16;

        let mut entries = [0u16; QUEUE_LENGTH];
        for (i, entry) in entries.iter_mut().enumerate() {
            *entry = a.wrapping_mul(i as u16).wrapping_add(b);
        }

        let lookahead = lookahead.then(|| {
            let mut set = BitSet::new(CODEWORD_SPACE);
            for &entry in &entries {
                set.insert(entry as usize);
            }
            set
        });

        Self { entries, lookahead }
    }

    /// Codeword in slot `position`.
    #[inline]
    pub fn get(&self, position: usize) -> u16 {
        self.entries[position]
    }

    /// All entries, front first.
    pub fn entries(&self) -> &[u16; QUEUE_LENGTH] {
        &self.entries
    }

    /// Slot of `codeword`, or `None` on a miss.
    #[inline]
    pub fn probe(&self, codeword: u16) -> Option<usize> {
        if self
            .lookahead
            .as_ref()
            .is_some_and(|set| !set.contains(codeword as usize))
        {
            return None;
        }
        self.entries.iter().position(|&entry| entry == codeword)
    }

    /// Move the entry at `position` toward the front after a hit.
    ///
    /// The new slot is `(rate * position * (16 + nibble)) >> 9`; the entries
    /// in between shift one slot toward the tail. A hit at the front is left
    /// in place.
    pub fn promote(&mut self, position: usize, nibble: u8, rate: u8) {
        debug_assert!(position < QUEUE_LENGTH);
        debug_assert!(nibble < 16);
        debug_assert!(rate <= MAX_PROMOTION_RATE_HIT);
        if position == 0 {
            return;
        }
        let target = (rate as usize * position * (16 + nibble as usize)) >> 9;
        debug_assert!(target < position);
        let codeword = self.entries[position];
        self.entries.copy_within(target..position, target + 1);
        self.entries[target] = codeword;
    }

    /// Insert a missed `codeword`, evicting the tail entry.
    ///
    /// The new slot is `((rate * QUEUE_LENGTH) >> 4) + nibble`.
    ///
    /// # Returns
    ///
    /// The evicted codeword.
    pub fn insert(&mut self, codeword: u16, nibble: u8, rate: u8) -> u16 {
        debug_assert!(nibble < 16);
        debug_assert!(rate <= MAX_PROMOTION_RATE_MISS);
        debug_assert!(self.probe(codeword).is_none(), "duplicate queue entry");
        let target = ((rate as usize * QUEUE_LENGTH) >> 4) + nibble as usize;
        let evicted = self.entries[QUEUE_LENGTH - 1];
        self.entries.copy_within(target..QUEUE_LENGTH - 1, target + 1);
        self.entries[target] = codeword;

        if let Some(set) = self.lookahead.as_mut() {
            set.remove(evicted as usize);
            set.insert(codeword as usize);
        }
        evicted
    }

    /// Copy out the current entries.
    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            entries: self.entries,
        }
    }

    /// Return to a previously taken [`snapshot`](Self::snapshot).
    pub fn restore(&mut self, snapshot: &QueueSnapshot) {
        if let Some(set) = self.lookahead.as_mut() {
            set.clear();
            for &entry in &snapshot.entries {
                set.insert(entry as usize);
            }
            debug_assert_eq!(set.count(), QUEUE_LENGTH, "duplicate queue entry");
        }
        self.entries = snapshot.entries;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> KeySchedule {
        KeySchedule::new(b"queue test key").unwrap()
    }

    fn assert_distinct(queue: &AdaptiveQueue) {
        let mut seen = BitSet::new(CODEWORD_SPACE);
        for &entry in queue.entries() {
            assert!(!seen.contains(entry as usize), "duplicate {entry:#06x}");
            seen.insert(entry as usize);
        }
    }

    #[test]
    fn test_initial_queue_distinct_and_deterministic() {
        let keys = keys();
        let a = AdaptiveQueue::new(&keys, 0, false);
        let b = AdaptiveQueue::new(&keys, 0, true);
        assert_eq!(a.entries(), b.entries());
        assert_distinct(&a);
        assert!(a.entries().iter().any(|&e| e != 0));

        let nested = AdaptiveQueue::new(&keys, 1, false);
        assert_ne!(a.entries(), nested.entries());
    }

    #[test]
    fn test_probe_with_and_without_lookahead() {
        let keys = keys();
        for lookahead in [false, true] {
            let queue = AdaptiveQueue::new(&keys, 0, lookahead);
            let cw = queue.get(37);
            assert_eq!(queue.probe(cw), Some(37));
            let missing = (0..=u16::MAX).find(|c| !queue.entries().contains(c)).unwrap();
            assert_eq!(queue.probe(missing), None);
        }
    }

    #[test]
    fn test_promote_moves_toward_front() {
        let mut queue = AdaptiveQueue::new(&keys(), 0, false);
        let before = *queue.entries();
        // rate 8, nibble 0: target = 8 * 100 * 16 >> 9 = 25
        queue.promote(100, 0, 8);
        assert_eq!(queue.get(25), before[100]);
        assert_eq!(queue.get(26), before[25]);
        assert_eq!(queue.get(100), before[99]);
        assert_eq!(queue.get(24), before[24]);
        assert_eq!(queue.get(101), before[101]);
        assert_distinct(&queue);
    }

    #[test]
    fn test_promote_front_is_noop() {
        let mut queue = AdaptiveQueue::new(&keys(), 0, false);
        let before = *queue.entries();
        queue.promote(0, 15, 16);
        assert_eq!(queue.entries(), &before);
    }

    #[test]
    fn test_promote_max_rate_stays_behind() {
        let mut queue = AdaptiveQueue::new(&keys(), 0, false);
        for position in 1..QUEUE_LENGTH {
            queue.promote(position, 15, MAX_PROMOTION_RATE_HIT);
        }
        assert_distinct(&queue);
    }

    #[test]
    fn test_insert_evicts_tail() {
        let keys = keys();
        let mut queue = AdaptiveQueue::new(&keys, 0, true);
        let before = *queue.entries();
        let fresh = (0..=u16::MAX).find(|c| !before.contains(c)).unwrap();

        // rate 8, nibble 3: target = 128 + 3
        let evicted = queue.insert(fresh, 3, 8);
        assert_eq!(evicted, before[QUEUE_LENGTH - 1]);
        assert_eq!(queue.get(131), fresh);
        assert_eq!(queue.get(132), before[131]);
        assert_eq!(queue.get(130), before[130]);
        assert_eq!(queue.probe(fresh), Some(131));
        assert_eq!(queue.probe(evicted), None);
        assert_distinct(&queue);
    }

    #[test]
    fn test_snapshot_restore_rebuilds_lookahead() {
        let mut queue = AdaptiveQueue::new(&keys(), 0, true);
        let snapshot = queue.snapshot();
        let fresh = (0..=u16::MAX).find(|c| !queue.entries().contains(c)).unwrap();
        let evicted = queue.insert(fresh, 0, 8);
        queue.promote(200, 5, 8);

        queue.restore(&snapshot);
        assert_eq!(queue.snapshot(), snapshot);
        assert_eq!(queue.probe(fresh), None);
        assert_eq!(queue.probe(evicted), Some(QUEUE_LENGTH - 1));
    }
}
