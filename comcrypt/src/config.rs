//! Session configuration: optimization hint, feature flags, codec parameters.
//!
//! Encoder and decoder must be configured identically; only the lookahead
//! flag may differ, since it changes speed and memory but not the output.

use std::sync::Arc;

use comcrypt_core::error::{ComcryptError, Result};

use crate::alloc::{ScratchAllocator, SystemAllocator};
use crate::format::MAX_TOKENS;
use crate::queue::{MAX_PROMOTION_RATE_HIT, MAX_PROMOTION_RATE_MISS};

/// What the caller wants the codec to favour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Optimization {
    /// All features on.
    #[default]
    Default,
    /// Two-level comcryption and signature on, no lookahead bitmap.
    Size,
    /// Single level, no signature, lookahead bitmap on.
    Time,
    /// All features on, with wider promotion spread.
    Security,
}

/// Feature switches derived from an [`Optimization`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureFlags {
    /// Recursively comcrypt byte codes when statistics favour it.
    pub two_level: bool,
    /// XOR the signature sequence into single-level blocks.
    pub signature: bool,
    /// Keep a membership bitmap next to each queue.
    pub lookahead: bool,
}

impl Optimization {
    /// Feature flags for this hint.
    pub fn features(self) -> FeatureFlags {
        match self {
            Self::Default | Self::Security => FeatureFlags {
                two_level: true,
                signature: true,
                lookahead: true,
            },
            Self::Size => FeatureFlags {
                two_level: true,
                signature: true,
                lookahead: false,
            },
            Self::Time => FeatureFlags {
                two_level: false,
                signature: false,
                lookahead: true,
            },
        }
    }

    /// Default codec parameters for this hint.
    pub fn params(self) -> CodecParams {
        match self {
            Self::Security => CodecParams {
                promotion_rate_hit: 12,
                promotion_rate_miss: 6,
                ..CodecParams::default()
            },
            _ => CodecParams::default(),
        }
    }
}

/// Tunable queue and recursion parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CodecParams {
    /// Hit promotion rate, `1..=16`.
    pub promotion_rate_hit: u8,
    /// Miss insertion rate, `0..=14`.
    pub promotion_rate_miss: u8,
    /// Largest average hit slot for which two-level comcryption is tried.
    pub quality_threshold: u8,
    /// Fewest byte codes for which two-level comcryption is tried, `1..=128`.
    pub min_byte_codes: u8,
}

impl Default for CodecParams {
    fn default() -> Self {
        Self {
            promotion_rate_hit: 8,
            promotion_rate_miss: 8,
            quality_threshold: 24,
            min_byte_codes: 32,
        }
    }
}

impl CodecParams {
    /// Check every field against its allowed range.
    pub fn validate(&self) -> Result<()> {
        check(
            "promotion_rate_hit",
            self.promotion_rate_hit,
            1,
            MAX_PROMOTION_RATE_HIT,
        )?;
        check(
            "promotion_rate_miss",
            self.promotion_rate_miss,
            0,
            MAX_PROMOTION_RATE_MISS,
        )?;
        check("min_byte_codes", self.min_byte_codes, 1, MAX_TOKENS as u8)?;
        Ok(())
    }
}

fn check(name: &'static str, value: u8, min: u8, max: u8) -> Result<()> {
    if value < min || value > max {
        return Err(ComcryptError::invalid_parameter(
            name,
            value as u32,
            min as u32,
            max as u32,
        ));
    }
    Ok(())
}

/// Everything a [`Session`](crate::Session) is built from besides the key.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Optimization hint.
    pub optimization: Optimization,
    /// Codec parameters; defaults to `optimization.params()`.
    pub params: CodecParams,
    /// Source of scratch buffers.
    pub allocator: Arc<dyn ScratchAllocator>,
}

impl SessionConfig {
    /// Configuration for `optimization` with its default parameters.
    pub fn new(optimization: Optimization) -> Self {
        Self {
            optimization,
            params: optimization.params(),
            allocator: Arc::new(SystemAllocator),
        }
    }

    /// Override the codec parameters.
    pub fn with_params(mut self, params: CodecParams) -> Self {
        self.params = params;
        self
    }

    /// Use `allocator` for scratch buffers.
    pub fn with_allocator(mut self, allocator: Arc<dyn ScratchAllocator>) -> Self {
        self.allocator = allocator;
        self
    }

    /// Feature flags implied by the optimization hint.
    pub fn features(&self) -> FeatureFlags {
        self.optimization.features()
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new(Optimization::Default)
    }
}
