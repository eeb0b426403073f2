//! Signature sequence generator.
//!
//! One running value per unit of a block:
//!
//! ```text
//! values[i + 1] = values[i] * (nibble + offset) mod HASH_PRIME
//! ```
//!
//! where `offset` is [`HIT_OFFSET`] or [`MISS_OFFSET`] depending on the
//! unit's outcome. The low bits of `values[i + 1]` are XORed into the code
//! emitted for unit `i` of a single-level block. After a single-level block
//! the final value seeds the next block.

use crate::format::MAX_TOKENS;
use crate::key::{HASH_PRIME, KeySchedule};

/// Multiplier offset applied after a hit.
pub const HIT_OFFSET: u32 = 3;

/// Multiplier offset applied after a miss.
pub const MISS_OFFSET: u32 = 7;

/// Hash index of the level-0 seed; level `L` uses `SEED_INDEX + L`.
pub const SEED_INDEX: u32 = 0x100;

/// Outcome of one queue probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Codeword found; a byte code was emitted.
    Hit,
    /// Codeword missing; a long code was emitted.
    Miss,
}

/// Per-block signature values, primed across blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureSequence {
    values: [u32; MAX_TOKENS + 1],
}

impl SignatureSequence {
    /// Sequence for recursion level `level`, seeded from the key.
    pub fn new(keys: &KeySchedule, level: usize) -> Self {
        let mut values = [0u32; MAX_TOKENS + 1];
        values[0] = keys.hash(SEED_INDEX + level as u32);
        Self { values }
    }

    /// Current seed (the value the next block starts from).
    pub fn seed(&self) -> u32 {
        self.values[0]
    }

    /// Overwrite the seed, used when rolling a level back.
    pub fn set_seed(&mut self, seed: u32) {
        self.values[0] = seed;
    }

    /// Compute the value for `unit` from the previous one.
    #[inline]
    pub fn advance(&mut self, unit: usize, nibble: u8, outcome: Outcome) {
        let offset = match outcome {
            Outcome::Hit => HIT_OFFSET,
            Outcome::Miss => MISS_OFFSET,
        };
        let factor = nibble as u64 + offset as u64;
        self.values[unit + 1] =
            (self.values[unit] as u64 * factor % HASH_PRIME as u64) as u32;
    }

    /// Value computed for `unit`.
    #[inline]
    pub fn value(&self, unit: usize) -> u32 {
        self.values[unit + 1]
    }

    /// Mask for a byte code emitted by `unit`.
    #[inline]
    pub fn byte_mask(&self, unit: usize) -> u8 {
        self.value(unit) as u8
    }

    /// Mask for a long code emitted by `unit`.
    #[inline]
    pub fn long_mask(&self, unit: usize) -> u16 {
        self.value(unit) as u16
    }

    /// Carry the final value of a `tokens`-unit block into the next block.
    pub fn prime(&mut self, tokens: usize) {
        self.values[0] = self.values[tokens];
    }
}
