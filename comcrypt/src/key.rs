//! Key scheduler.
//!
//! Derives everything key-dependent the codec needs:
//!
//! - a byte substitution permutation and its inverse (key-weighted
//!   Fisher-Yates shuffle seeded by the sum of the key bytes),
//! - the nibble sequence, which cycles through the key's nibbles,
//! - the hash sequence, a multiplicative hash modulo the Mersenne prime
//!   `2^31 - 1`.

use comcrypt_core::error::{ComcryptError, Result};

/// Longest key that is used; extra bytes are ignored.
pub const MAX_KEY_LENGTH: usize = 64;

/// Modulus of the hash and signature sequences (`2^31 - 1`).
pub const HASH_PRIME: u32 = 0x7FFF_FFFF;

/// Multiplier of the hash sequence.
pub const HASH_MULTIPLIER: u32 = 16807;

/// Key-derived tables and sequences.
#[derive(Clone)]
pub struct KeySchedule {
    /// Key bytes, at most `MAX_KEY_LENGTH`.
    key: Vec<u8>,
    /// Plaintext byte -> substituted byte.
    substitute: [u8; 256],
    /// Substituted byte -> plaintext byte.
    inverse: [u8; 256],
    /// Hash sequence seed, in `1..HASH_PRIME`.
    seed: u32,
}

// Key material stays out of debug output.
impl std::fmt::Debug for KeySchedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeySchedule")
            .field("key_len", &self.key.len())
            .finish_non_exhaustive()
    }
}

impl KeySchedule {
    /// Build the schedule for `key`.
    ///
    /// Fails only on an empty key. Keys longer than [`MAX_KEY_LENGTH`] are
    /// truncated.
    pub fn new(key: &[u8]) -> Result<Self> {
        if key.is_empty() {
            return Err(ComcryptError::invalid_key("key must not be empty"));
        }
        if key.len() > MAX_KEY_LENGTH {
            tracing::debug!(
                len = key.len(),
                max = MAX_KEY_LENGTH,
                "truncating comcrypt key"
            );
        }
        let key = key[..key.len().min(MAX_KEY_LENGTH)].to_vec();

        let mut substitute = [0u8; 256];
        for (i, slot) in substitute.iter_mut().enumerate() {
            *slot = i as u8;
        }

        let mut state = key.iter().map(|&b| b as u64).sum::<u64>() % HASH_PRIME as u64;
        for i in (1..256usize).rev() {
            let weight = key[i % key.len()] as u64;
            state = (state * HASH_MULTIPLIER as u64 + weight + 1) % HASH_PRIME as u64;
            let j = (state % (i as u64 + 1)) as usize;
            substitute.swap(i, j);
        }

        let mut inverse = [0u8; 256];
        for (i, &s) in substitute.iter().enumerate() {
            inverse[s as usize] = i as u8;
        }

        let seed = key.iter().fold(1u64, |h, &b| {
            (h * 257 + b as u64 + 1) % HASH_PRIME as u64
        }) as u32;
        let seed = seed.max(1);

        Ok(Self {
            key,
            substitute,
            inverse,
            seed,
        })
    }

    /// Effective key length after truncation.
    pub fn key_len(&self) -> usize {
        self.key.len()
    }

    /// Substitute one plaintext byte.
    #[inline]
    pub fn substitute(&self, byte: u8) -> u8 {
        self.substitute[byte as usize]
    }

    /// Undo [`substitute`](Self::substitute).
    #[inline]
    pub fn invert(&self, byte: u8) -> u8 {
        self.inverse[byte as usize]
    }

    /// Codeword for one unit: a byte pair, or a single trailing byte whose
    /// low half is left zero.
    #[inline]
    pub fn codeword(&self, unit: &[u8]) -> u16 {
        debug_assert!(!unit.is_empty() && unit.len() <= 2);
        let high = (self.substitute(unit[0]) as u16) << 8;
        match unit.get(1) {
            Some(&low) => high | self.substitute(low) as u16,
            None => high,
        }
    }

    /// The `index`-th key nibble, low nibble of each byte first.
    #[inline]
    pub fn nibble(&self, index: usize) -> u8 {
        let byte = self.key[(index / 2) % self.key.len()];
        (byte >> (4 * (index % 2))) & 0x0F
    }

    /// Length of one full cycle of [`nibble`](Self::nibble).
    pub fn nibble_period(&self) -> usize {
        2 * self.key.len()
    }

    /// The `index`-th hash value, in `1..HASH_PRIME`.
    pub fn hash(&self, index: u32) -> u32 {
        let mut x = (self.seed as u64 + index as u64) % HASH_PRIME as u64;
        if x == 0 {
            x = 1;
        }
        (x * HASH_MULTIPLIER as u64 % HASH_PRIME as u64) as u32
    }
}
