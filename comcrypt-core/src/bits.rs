//! Bit-level containers.
//!
//! - [`TokenBits`]: an append-only, MSB-first packed bit array. Bit `i` lives
//!   in byte `i / 8` under mask `0x80 >> (i % 8)`, and unused trailing bits of
//!   the last byte are always zero.
//! - [`BitSet`]: a fixed-size membership set backed by `u64` words.

/// Append-only MSB-first packed bits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenBits {
    /// Packed bytes.
    bytes: Vec<u8>,
    /// Number of valid bits.
    len: usize,
}

impl TokenBits {
    /// Create an empty array able to hold `bits` bits without reallocating.
    pub fn with_capacity(bits: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(bits.div_ceil(8)),
            len: 0,
        }
    }

    /// Number of bits pushed.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether no bits have been pushed.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Drop all bits, keeping the allocation.
    pub fn clear(&mut self) {
        self.bytes.clear();
        self.len = 0;
    }

    /// Append one bit.
    #[inline]
    pub fn push(&mut self, bit: bool) {
        if self.len % 8 == 0 {
            self.bytes.push(0);
        }
        if bit {
            let last = self.bytes.len() - 1;
            self.bytes[last] |= 0x80 >> (self.len % 8);
        }
        self.len += 1;
    }

    /// Read bit `index`.
    pub fn get(&self, index: usize) -> bool {
        debug_assert!(index < self.len, "bit index out of range");
        bit_at(&self.bytes, index)
    }

    /// The packed bytes (`ceil(len / 8)` of them).
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Read bit `index` from MSB-first packed `bytes`.
#[inline]
pub fn bit_at(bytes: &[u8], index: usize) -> bool {
    bytes[index / 8] & (0x80 >> (index % 8)) != 0
}

/// Count set bits among the first `len` bits of `bytes`.
pub fn count_ones(bytes: &[u8], len: usize) -> usize {
    let full = len / 8;
    let mut count: usize = bytes[..full].iter().map(|b| b.count_ones() as usize).sum();
    let rest = len % 8;
    if rest != 0 {
        let mask = 0xFFu8 << (8 - rest);
        count += (bytes[full] & mask).count_ones() as usize;
    }
    count
}

/// Whether every bit after the first `len` bits of the final byte is zero.
pub fn padding_is_clear(bytes: &[u8], len: usize) -> bool {
    let rest = len % 8;
    if rest == 0 {
        return true;
    }
    match bytes.get(len / 8) {
        Some(last) => last & (0xFFu8 >> rest) == 0,
        None => true,
    }
}

/// Fixed-size membership set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitSet {
    /// Backing words.
    words: Vec<u64>,
}

impl BitSet {
    /// Create an empty set for values `0..bits`.
    pub fn new(bits: usize) -> Self {
        Self {
            words: vec![0; bits.div_ceil(64)],
        }
    }

    /// Add `value`.
    #[inline]
    pub fn insert(&mut self, value: usize) {
        self.words[value / 64] |= 1 << (value % 64);
    }

    /// Remove `value`.
    #[inline]
    pub fn remove(&mut self, value: usize) {
        self.words[value / 64] &= !(1 << (value % 64));
    }

    /// Whether `value` is present.
    #[inline]
    pub fn contains(&self, value: usize) -> bool {
        self.words[value / 64] & (1 << (value % 64)) != 0
    }

    /// Remove everything.
    pub fn clear(&mut self) {
        self.words.fill(0);
    }

    /// Number of values present.
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_bits_msb_first() {
        let mut bits = TokenBits::with_capacity(16);
        for bit in [true, false, true, true, false, false, false, false, true] {
            bits.push(bit);
        }
        assert_eq!(bits.len(), 9);
        assert_eq!(bits.as_bytes(), &[0b1011_0000, 0b1000_0000]);
        assert!(bits.get(0));
        assert!(!bits.get(1));
        assert!(bits.get(8));

        bits.clear();
        assert!(bits.is_empty());
        assert!(bits.as_bytes().is_empty());
    }

    #[test]
    fn test_count_ones_ignores_padding() {
        let bytes = [0b1111_0000, 0b1100_0011];
        assert_eq!(count_ones(&bytes, 8), 4);
        assert_eq!(count_ones(&bytes, 10), 6);
        assert_eq!(count_ones(&bytes, 16), 8);
    }

    #[test]
    fn test_padding_is_clear() {
        assert!(padding_is_clear(&[0b1010_0000], 3));
        assert!(!padding_is_clear(&[0b1010_0001], 3));
        assert!(padding_is_clear(&[0xFF], 8));
        assert!(padding_is_clear(&[], 0));
    }

    #[test]
    fn test_bitset() {
        let mut set = BitSet::new(65536);
        set.insert(0);
        set.insert(65535);
        set.insert(1234);
        assert!(set.contains(1234));
        assert_eq!(set.count(), 3);
        set.remove(1234);
        assert!(!set.contains(1234));
        assert!(set.contains(65535));
        set.clear();
        assert_eq!(set.count(), 0);
    }
}
