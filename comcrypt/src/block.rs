//! Block codec.
//!
//! A [`CodecState`] encodes or decodes one block of at most
//! [`BLOCK_SIZE`] plaintext bytes at a time. Each unit (a byte pair, or the
//! odd trailing byte) is substituted into a codeword and probed in the
//! adaptive queue:
//!
//! - **hit**: token bit 0, one byte code (the slot), promote
//! - **miss**: token bit 1, one long code (the codeword), insert
//!
//! When the hits cluster near the front of the queue, the top level hands
//! its byte codes to a nested [`CodecState`] and stores the nested record
//! instead (two-level comcryption). Otherwise both code arrays are XORed
//! with the signature sequence.
//!
//! # Synchronization
//!
//! The decoder replays exactly the encoder's queue, nibble and signature
//! updates. Nothing is mutated until a block is known to be complete and the
//! output has room for it, so an incomplete block can simply be retried with
//! more input.

use comcrypt_core::bits::{self, TokenBits};
use comcrypt_core::cursor::ByteWriter;
use comcrypt_core::error::{ComcryptError, Result};

use crate::alloc::ScratchAllocator;
use crate::config::{CodecParams, FeatureFlags};
use crate::format::{BLOCK_SIZE, BlockDescriptor, BlockLayout, MAX_BLOCK_BYTES, MAX_TOKENS};
use crate::key::KeySchedule;
use crate::queue::{AdaptiveQueue, QueueSnapshot};
use crate::signature::{Outcome, SignatureSequence};

/// Recursion depth cap: the top level plus one nested level.
pub const MAX_LEVELS: usize = 2;

/// Persistent state of one level (and its nested level), see
/// [`CodecState::checkpoint`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelCheckpoint {
    queue: QueueSnapshot,
    signature_seed: u32,
    nibble_index: usize,
    nested: Option<Box<LevelCheckpoint>>,
}

/// Codec state for one recursion level.
#[derive(Debug)]
pub struct CodecState {
    /// Recursion depth, `0..MAX_LEVELS`.
    depth: usize,
    /// Promotion and recursion parameters.
    params: CodecParams,
    /// Codeword dictionary.
    queue: AdaptiveQueue,
    /// Signature values of the current block.
    signature: SignatureSequence,
    /// Position in the key nibble cycle.
    nibble_index: usize,
    /// Token bits of the block being encoded.
    tokens: TokenBits,
    /// Byte codes of the current block.
    byte_codes: Vec<u8>,
    /// Long codes of the current block, big-endian pairs.
    long_codes: Vec<u8>,
    /// Encoded nested record.
    nested_out: Vec<u8>,
    /// Next level down, present only when it may be used.
    nested: Option<Box<CodecState>>,
}

impl CodecState {
    /// Top-level state; builds the nested level when two-level comcryption
    /// is enabled.
    pub fn new(
        keys: &KeySchedule,
        features: FeatureFlags,
        params: CodecParams,
        allocator: &dyn ScratchAllocator,
    ) -> Self {
        Self::at_depth(keys, features, params, allocator, 0)
    }

    fn at_depth(
        keys: &KeySchedule,
        features: FeatureFlags,
        params: CodecParams,
        allocator: &dyn ScratchAllocator,
        depth: usize,
    ) -> Self {
        debug_assert!(depth < MAX_LEVELS);
        let nested = (features.two_level && depth + 1 < MAX_LEVELS).then(|| {
            Box::new(Self::at_depth(keys, features, params, allocator, depth + 1))
        });
        let nested_out = if nested.is_some() {
            allocator.allocate(MAX_BLOCK_BYTES)
        } else {
            Vec::new()
        };

        Self {
            depth,
            params,
            queue: AdaptiveQueue::new(keys, depth, features.lookahead),
            signature: SignatureSequence::new(keys, depth),
            nibble_index: 0,
            tokens: TokenBits::with_capacity(MAX_TOKENS),
            byte_codes: allocator.allocate(MAX_TOKENS),
            long_codes: allocator.allocate(2 * MAX_TOKENS),
            nested_out,
            nested,
        }
    }

    /// The adaptive queue of this level.
    pub fn queue(&self) -> &AdaptiveQueue {
        &self.queue
    }

    /// The nested level, if two-level comcryption is enabled.
    pub fn nested(&self) -> Option<&CodecState> {
        self.nested.as_deref()
    }

    /// Hand every scratch buffer back to `allocator`.
    pub fn release_buffers(&mut self, allocator: &dyn ScratchAllocator) {
        if let Some(nested) = self.nested.as_deref_mut() {
            nested.release_buffers(allocator);
        }
        for buffer in [
            std::mem::take(&mut self.byte_codes),
            std::mem::take(&mut self.long_codes),
            std::mem::take(&mut self.nested_out),
        ] {
            if buffer.capacity() != 0 {
                allocator.release(buffer);
            }
        }
    }

    /// Save the state that persists between blocks.
    pub fn checkpoint(&self) -> LevelCheckpoint {
        LevelCheckpoint {
            queue: self.queue.snapshot(),
            signature_seed: self.signature.seed(),
            nibble_index: self.nibble_index,
            nested: self.nested.as_ref().map(|n| Box::new(n.checkpoint())),
        }
    }

    /// Return to a [`checkpoint`](Self::checkpoint) taken on this state.
    pub fn restore(&mut self, checkpoint: &LevelCheckpoint) {
        self.queue.restore(&checkpoint.queue);
        self.signature.set_seed(checkpoint.signature_seed);
        self.nibble_index = checkpoint.nibble_index;
        if let (Some(nested), Some(saved)) = (self.nested.as_deref_mut(), &checkpoint.nested) {
            nested.restore(saved);
        }
    }

    #[inline]
    fn next_nibble(&mut self, keys: &KeySchedule) -> u8 {
        let nibble = keys.nibble(self.nibble_index);
        self.nibble_index = (self.nibble_index + 1) % keys.nibble_period();
        nibble
    }

    /// Encode one block of `1..=BLOCK_SIZE` plaintext bytes into `out`.
    ///
    /// Fails with [`ComcryptError::BufferTooSmall`] when `out` runs out of
    /// room. The queue has already moved on by then, so the caller must roll
    /// back to a checkpoint before retrying.
    pub fn encode_block(
        &mut self,
        keys: &KeySchedule,
        features: FeatureFlags,
        plain: &[u8],
        out: &mut ByteWriter<'_>,
    ) -> Result<()> {
        debug_assert!(!plain.is_empty() && plain.len() <= BLOCK_SIZE);
        let tokens = plain.len().div_ceil(2);
        let rate_hit = self.params.promotion_rate_hit;
        let rate_miss = self.params.promotion_rate_miss;

        self.tokens.clear();
        let mut byte_count = 0;
        let mut long_count = 0;
        let mut index_sum = 0;

        for (unit, pair) in plain.chunks(2).enumerate() {
            let codeword = keys.codeword(pair);
            let nibble = self.next_nibble(keys);
            let outcome = match self.queue.probe(codeword) {
                Some(position) => {
                    self.byte_codes[byte_count] = position as u8;
                    byte_count += 1;
                    index_sum += position;
                    self.queue.promote(position, nibble, rate_hit);
                    Outcome::Hit
                }
                None => {
                    self.long_codes[2 * long_count..2 * long_count + 2]
                        .copy_from_slice(&codeword.to_be_bytes());
                    long_count += 1;
                    self.queue.insert(codeword, nibble, rate_miss);
                    Outcome::Miss
                }
            };
            self.tokens.push(outcome == Outcome::Miss);
            if features.signature {
                self.signature.advance(unit, nibble, outcome);
            }
        }

        let nested_len = self.encode_nested(keys, features, byte_count, index_sum)?;
        let single_level = nested_len.is_none();
        if single_level && features.signature {
            self.mask_codes(tokens);
        }

        let descriptor = BlockDescriptor {
            double_level: !single_level,
            odd: plain.len() % 2 == 1,
            full: plain.len() == BLOCK_SIZE,
        };
        out.put_u8(descriptor.to_byte())?;
        out.put_u8(long_count as u8)?;
        if !descriptor.full {
            out.put_u8(tokens as u8)?;
        }
        out.put_slice(self.tokens.as_bytes())?;
        out.put_slice(&self.long_codes[..2 * long_count])?;
        match nested_len {
            Some(len) => {
                out.put_u8(len as u8)?;
                out.put_slice(&self.nested_out[..len])?;
            }
            None => out.put_slice(&self.byte_codes[..byte_count])?,
        }

        if single_level && features.signature {
            self.signature.prime(tokens);
        }

        tracing::trace!(
            depth = self.depth,
            tokens,
            long_count,
            double_level = !single_level,
            "encoded block"
        );
        Ok(())
    }

    /// Try two-level comcryption of the current byte codes.
    ///
    /// Returns the nested record length when it was kept. A nested record
    /// that is not shorter than the raw byte codes is discarded and the
    /// nested level rolled back.
    fn encode_nested(
        &mut self,
        keys: &KeySchedule,
        features: FeatureFlags,
        byte_count: usize,
        index_sum: usize,
    ) -> Result<Option<usize>> {
        let Some(nested) = self.nested.as_deref_mut() else {
            return Ok(None);
        };
        if byte_count == 0
            || byte_count < self.params.min_byte_codes as usize
            || index_sum / byte_count > self.params.quality_threshold as usize
        {
            return Ok(None);
        }

        let checkpoint = nested.checkpoint();
        let mut writer = ByteWriter::new(&mut self.nested_out);
        nested.encode_block(keys, features, &self.byte_codes[..byte_count], &mut writer)?;
        let len = writer.position();
        if len < byte_count {
            Ok(Some(len))
        } else {
            nested.restore(&checkpoint);
            Ok(None)
        }
    }

    /// XOR the signature into both code arrays.
    fn mask_codes(&mut self, tokens: usize) {
        let mut hits = 0;
        let mut misses = 0;
        for unit in 0..tokens {
            if self.tokens.get(unit) {
                let mask = self.signature.long_mask(unit).to_be_bytes();
                self.long_codes[2 * misses] ^= mask[0];
                self.long_codes[2 * misses + 1] ^= mask[1];
                misses += 1;
            } else {
                self.byte_codes[hits] ^= self.signature.byte_mask(unit);
                hits += 1;
            }
        }
    }

    /// Decode the block record at the start of `input` into `out`.
    ///
    /// # Returns
    ///
    /// The number of input bytes the record occupied.
    ///
    /// # Errors
    ///
    /// - [`ComcryptError::IncompleteBlock`] if `input` ends inside the record
    /// - [`ComcryptError::BufferTooSmall`] if `out` cannot take the whole block
    /// - [`ComcryptError::MalformedBlock`] for any inconsistency
    ///
    /// The first two leave the state untouched.
    pub fn decode_block(
        &mut self,
        keys: &KeySchedule,
        features: FeatureFlags,
        input: &[u8],
        out: &mut ByteWriter<'_>,
    ) -> Result<usize> {
        let layout = BlockLayout::parse(input)?;
        out.ensure(layout.plain_len())?;

        let token_bits = &input[layout.token_bits.clone()];
        let long_codes = &input[layout.long_codes.clone()];
        let payload = &input[layout.payload.clone()];
        let byte_count = layout.byte_count();
        let double_level = layout.descriptor.double_level;

        if double_level {
            self.decode_nested(keys, features, &layout, payload)?;
        } else {
            self.byte_codes[..byte_count].copy_from_slice(payload);
        }

        let masked = features.signature && !double_level;
        let rate_hit = self.params.promotion_rate_hit;
        let rate_miss = self.params.promotion_rate_miss;
        let mut hits = 0;
        let mut misses = 0;

        for unit in 0..layout.tokens {
            let nibble = self.next_nibble(keys);
            let miss = bits::bit_at(token_bits, unit);
            let outcome = if miss { Outcome::Miss } else { Outcome::Hit };
            if features.signature {
                self.signature.advance(unit, nibble, outcome);
            }

            let codeword = if miss {
                let offset = 2 * misses;
                let mut codeword = u16::from_be_bytes([long_codes[offset], long_codes[offset + 1]]);
                if masked {
                    codeword ^= self.signature.long_mask(unit);
                }
                misses += 1;
                if self.queue.probe(codeword).is_some() {
                    return Err(ComcryptError::malformed(
                        layout.long_codes.start + offset,
                        format!("long code {codeword:#06x} is already queued"),
                    ));
                }
                self.queue.insert(codeword, nibble, rate_miss);
                codeword
            } else {
                let mut position = self.byte_codes[hits];
                if masked {
                    position ^= self.signature.byte_mask(unit);
                }
                hits += 1;
                let codeword = self.queue.get(position as usize);
                self.queue.promote(position as usize, nibble, rate_hit);
                codeword
            };

            let [high, low] = codeword.to_be_bytes();
            out.put_u8(keys.invert(high))?;
            if layout.descriptor.odd && unit + 1 == layout.tokens {
                if low != 0 {
                    return Err(ComcryptError::malformed(
                        layout.token_bits.start,
                        "odd trailing unit carries a second byte",
                    ));
                }
            } else {
                out.put_u8(keys.invert(low))?;
            }
        }

        if masked {
            self.signature.prime(layout.tokens);
        }

        tracing::trace!(
            depth = self.depth,
            tokens = layout.tokens,
            long_count = layout.long_count,
            double_level,
            "decoded block"
        );
        Ok(layout.len)
    }

    /// Decode a nested record into this level's byte codes.
    fn decode_nested(
        &mut self,
        keys: &KeySchedule,
        features: FeatureFlags,
        layout: &BlockLayout,
        payload: &[u8],
    ) -> Result<()> {
        let offset = layout.payload.start;
        let Some(nested) = self.nested.as_deref_mut() else {
            return Err(ComcryptError::malformed(
                offset - 1,
                format!("two-level block not supported at depth {}", self.depth),
            ));
        };

        let byte_count = layout.byte_count();
        let mut writer = ByteWriter::new(&mut self.byte_codes);
        let consumed = nested
            .decode_block(keys, features, payload, &mut writer)
            .map_err(|err| match err {
                ComcryptError::MalformedBlock { .. } => err,
                other => ComcryptError::malformed(offset, format!("nested block: {other}")),
            })?;
        if consumed != payload.len() || writer.position() != byte_count {
            return Err(ComcryptError::malformed(
                offset,
                format!(
                    "nested block decoded {} of {} bytes into {} byte codes, expected {}",
                    consumed,
                    payload.len(),
                    writer.position(),
                    byte_count
                ),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::SystemAllocator;
    use crate::config::Optimization;

    fn pair(opt: Optimization) -> (KeySchedule, FeatureFlags, CodecState, CodecState) {
        let keys = KeySchedule::new(b"block codec key").unwrap();
        let features = opt.features();
        let params = opt.params();
        let encoder = CodecState::new(&keys, features, params, &SystemAllocator);
        let decoder = CodecState::new(&keys, features, params, &SystemAllocator);
        (keys, features, encoder, decoder)
    }

    fn encode(
        state: &mut CodecState,
        keys: &KeySchedule,
        features: FeatureFlags,
        plain: &[u8],
    ) -> Vec<u8> {
        let mut buf = vec![0u8; MAX_BLOCK_BYTES];
        let mut writer = ByteWriter::new(&mut buf);
        state.encode_block(keys, features, plain, &mut writer).unwrap();
        let len = writer.position();
        buf.truncate(len);
        buf
    }

    fn decode(
        state: &mut CodecState,
        keys: &KeySchedule,
        features: FeatureFlags,
        block: &[u8],
    ) -> Vec<u8> {
        let mut buf = vec![0u8; BLOCK_SIZE];
        let mut writer = ByteWriter::new(&mut buf);
        let consumed = state.decode_block(keys, features, block, &mut writer).unwrap();
        assert_eq!(consumed, block.len());
        let len = writer.position();
        buf.truncate(len);
        buf
    }

    #[test]
    fn test_block_roundtrip_all_optimizations() {
        let text = b"The quick brown fox jumps over the lazy dog. The quick brown fox!";
        for opt in [
            Optimization::Default,
            Optimization::Size,
            Optimization::Time,
            Optimization::Security,
        ] {
            let (keys, features, mut enc, mut dec) = pair(opt);
            for _ in 0..5 {
                let block = encode(&mut enc, &keys, features, text);
                assert_eq!(decode(&mut dec, &keys, features, &block), text);
            }
            assert_eq!(enc.queue().entries(), dec.queue().entries());
        }
    }

    #[test]
    fn test_repetitive_block_goes_two_level() {
        let (keys, features, mut enc, mut dec) = pair(Optimization::Default);
        let plain = b"ab".repeat(BLOCK_SIZE / 2);
        let block = encode(&mut enc, &keys, features, &plain);

        let layout = BlockLayout::parse(&block).unwrap();
        assert!(layout.descriptor.double_level);
        assert!(layout.descriptor.full);
        assert!(layout.payload.len() < layout.byte_count());
        assert!(block.len() < plain.len());

        assert_eq!(decode(&mut dec, &keys, features, &block), plain);
    }

    #[test]
    fn test_time_never_goes_two_level() {
        let (keys, features, mut enc, _) = pair(Optimization::Time);
        assert!(enc.nested().is_none());
        let plain = b"ab".repeat(BLOCK_SIZE / 2);
        let block = encode(&mut enc, &keys, features, &plain);
        assert!(!BlockLayout::parse(&block).unwrap().descriptor.double_level);
    }

    #[test]
    fn test_unprofitable_nested_is_rolled_back() {
        let keys = KeySchedule::new(b"block codec key").unwrap();
        let features = Optimization::Default.features();
        let params = CodecParams {
            quality_threshold: 255,
            min_byte_codes: 1,
            ..CodecParams::default()
        };
        let mut enc = CodecState::new(&keys, features, params, &SystemAllocator);
        let fresh = enc.nested().unwrap().checkpoint();

        // One or two byte codes never compress into a shorter nested record.
        let block = encode(&mut enc, &keys, features, b"abab");
        assert!(!BlockLayout::parse(&block).unwrap().descriptor.double_level);
        assert_eq!(enc.nested().unwrap().checkpoint(), fresh);
    }

    #[test]
    fn test_odd_block() {
        let (keys, features, mut enc, mut dec) = pair(Optimization::Default);
        let block = encode(&mut enc, &keys, features, b"xyz");
        let layout = BlockLayout::parse(&block).unwrap();
        assert!(layout.descriptor.odd);
        assert!(!layout.descriptor.full);
        assert_eq!(layout.tokens, 2);
        assert_eq!(decode(&mut dec, &keys, features, &block), b"xyz");
    }

    #[test]
    fn test_encode_output_too_small() {
        let (keys, features, mut enc, _) = pair(Optimization::Default);
        let mut buf = [0u8; 4];
        let mut writer = ByteWriter::new(&mut buf);
        let err = enc
            .encode_block(&keys, features, b"hello world", &mut writer)
            .unwrap_err();
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_decode_output_too_small_leaves_state() {
        let (keys, features, mut enc, mut dec) = pair(Optimization::Default);
        let block = encode(&mut enc, &keys, features, b"hello world");
        let before = dec.checkpoint();

        let mut buf = [0u8; 10];
        let mut writer = ByteWriter::new(&mut buf);
        let err = dec.decode_block(&keys, features, &block, &mut writer).unwrap_err();
        assert!(err.is_recoverable());
        assert_eq!(dec.checkpoint(), before);

        assert_eq!(decode(&mut dec, &keys, features, &block), b"hello world");
    }

    #[test]
    fn test_decode_incomplete_leaves_state() {
        let (keys, features, mut enc, mut dec) = pair(Optimization::Default);
        let block = encode(&mut enc, &keys, features, b"partial block input");
        let before = dec.checkpoint();

        let mut buf = [0u8; BLOCK_SIZE];
        let mut writer = ByteWriter::new(&mut buf);
        let err = dec
            .decode_block(&keys, features, &block[..block.len() - 1], &mut writer)
            .unwrap_err();
        assert!(err.is_incomplete());
        assert_eq!(dec.checkpoint(), before);
    }

    #[test]
    fn test_two_level_rejected_without_nested_state() {
        let (keys, features, mut enc, _) = pair(Optimization::Default);
        let plain = b"ab".repeat(BLOCK_SIZE / 2);
        let block = encode(&mut enc, &keys, features, &plain);

        let time = Optimization::Time.features();
        let mut dec = CodecState::new(&keys, time, CodecParams::default(), &SystemAllocator);
        let mut buf = [0u8; BLOCK_SIZE];
        let mut writer = ByteWriter::new(&mut buf);
        assert!(matches!(
            dec.decode_block(&keys, time, &block, &mut writer),
            Err(ComcryptError::MalformedBlock { .. })
        ));
    }

    #[test]
    fn test_duplicate_long_code_rejected() {
        let keys = KeySchedule::new(b"block codec key").unwrap();
        let features = Optimization::Time.features();
        let mut dec = CodecState::new(&keys, features, CodecParams::default(), &SystemAllocator);
        let queued = dec.queue().get(0).to_be_bytes();
        // One miss whose long code is already in the queue.
        let block = [0xC0, 1, 1, 0x80, queued[0], queued[1]];
        let mut buf = [0u8; BLOCK_SIZE];
        let mut writer = ByteWriter::new(&mut buf);
        assert!(matches!(
            dec.decode_block(&keys, features, &block, &mut writer),
            Err(ComcryptError::MalformedBlock { .. })
        ));
    }

    #[test]
    fn test_odd_unit_with_low_byte_rejected() {
        let keys = KeySchedule::new(b"block codec key").unwrap();
        let features = Optimization::Time.features();
        let mut dec = CodecState::new(&keys, features, CodecParams::default(), &SystemAllocator);
        let codeword = (0..=u16::MAX)
            .find(|c| c & 0xFF != 0 && dec.queue().probe(*c).is_none())
            .unwrap()
            .to_be_bytes();
        let block = [0xC2, 1, 1, 0x80, codeword[0], codeword[1]];
        let mut buf = [0u8; BLOCK_SIZE];
        let mut writer = ByteWriter::new(&mut buf);
        assert!(dec.decode_block(&keys, features, &block, &mut writer).is_err());
    }

    #[test]
    fn test_release_buffers() {
        let (_, _, mut enc, _) = pair(Optimization::Default);
        enc.release_buffers(&SystemAllocator);
        assert!(enc.byte_codes.is_empty());
        assert!(enc.nested().unwrap().long_codes.is_empty());
    }
}
