//! Session and stream driver.
//!
//! A [`Session`] holds everything one direction of a logical stream needs:
//! the key schedule, the codec state, the header counter and, when
//! decoding, the carry-over buffer for a block split across calls.
//!
//! Use one session to encode and a separately initialised one, with the same
//! key and configuration, to decode.

use comcrypt_core::cursor::ByteWriter;
use comcrypt_core::error::{ComcryptError, Result};
use comcrypt_core::traits::{BufferCodec, Direction};

use crate::block::{CodecState, LevelCheckpoint};
use crate::capacity;
use crate::config::{FeatureFlags, Optimization, SessionConfig};
use crate::format::{BLOCK_SIZE, MAX_BLOCK_BYTES, STREAM_HEADER_LEN, StreamHeader};
use crate::key::KeySchedule;

/// Session state saved on entry to every call.
#[derive(Debug)]
struct SessionCheckpoint {
    state: LevelCheckpoint,
    header_written: bool,
    header_consumed: usize,
    header_buf: [u8; STREAM_HEADER_LEN],
    carry: Vec<u8>,
}

/// A comcryption session.
///
/// # Example
///
/// ```rust
/// use comcrypt::{Optimization, Session};
///
/// let mut encoder = Session::new(b"shared key", Optimization::Default).unwrap();
/// let mut decoder = Session::new(b"shared key", Optimization::Default).unwrap();
///
/// let plain = b"hello hello hello hello";
/// let mut cipher = vec![0u8; encoder.max_out_buf_size(plain.len(), comcrypt::Direction::Encode)];
/// let n = encoder.encode(plain, &mut cipher, true).unwrap();
///
/// let mut out = vec![0u8; decoder.max_out_buf_size(n, comcrypt::Direction::Decode)];
/// let m = decoder.decode(&cipher[..n], &mut out, true).unwrap();
/// assert_eq!(&out[..m], plain);
/// ```
#[derive(Debug)]
pub struct Session {
    config: SessionConfig,
    features: FeatureFlags,
    keys: KeySchedule,
    state: CodecState,
    /// Encode side: header already emitted.
    header_written: bool,
    /// Decode side: header bytes received so far.
    header_consumed: usize,
    header_buf: [u8; STREAM_HEADER_LEN],
    /// Decode side: bytes of an incomplete block.
    carry: Vec<u8>,
    carry_len: usize,
}

impl Session {
    /// Create a session for `key` with the default settings of
    /// `optimization`.
    pub fn new(key: &[u8], optimization: Optimization) -> Result<Self> {
        Self::with_config(key, SessionConfig::new(optimization))
    }

    /// Create a session for `key` with an explicit configuration.
    ///
    /// # Errors
    ///
    /// [`ComcryptError::InvalidKey`] for an empty key and
    /// [`ComcryptError::InvalidParameter`] for out-of-range codec parameters.
    pub fn with_config(key: &[u8], config: SessionConfig) -> Result<Self> {
        config.params.validate()?;
        let keys = KeySchedule::new(key)?;
        let features = config.features();
        let state = CodecState::new(&keys, features, config.params, config.allocator.as_ref());
        let carry = config.allocator.allocate(MAX_BLOCK_BYTES);

        tracing::debug!(
            key_len = keys.key_len(),
            optimization = ?config.optimization,
            two_level = features.two_level,
            signature = features.signature,
            lookahead = features.lookahead,
            "comcrypt session initialised"
        );

        Ok(Self {
            config,
            features,
            keys,
            state,
            header_written: false,
            header_consumed: 0,
            header_buf: [0; STREAM_HEADER_LEN],
            carry,
            carry_len: 0,
        })
    }

    /// Re-initialise for a new stream with a new key and hint.
    ///
    /// Codec parameters are kept when `optimization` is unchanged and
    /// otherwise return to the defaults of `optimization`. On error the
    /// session is left unchanged.
    pub fn reset(&mut self, key: &[u8], optimization: Optimization) -> Result<()> {
        let params = if optimization == self.config.optimization {
            self.config.params
        } else {
            optimization.params()
        };
        let config = SessionConfig {
            optimization,
            params,
            allocator: self.config.allocator.clone(),
        };
        self.reset_with_config(key, config)
    }

    /// Re-initialise for a new stream with a new key and configuration.
    ///
    /// Scratch buffers go back to the previous allocator and are taken
    /// afresh from `config.allocator`. On error the session is left
    /// unchanged.
    pub fn reset_with_config(&mut self, key: &[u8], config: SessionConfig) -> Result<()> {
        config.params.validate()?;
        let keys = KeySchedule::new(key)?;
        let features = config.features();
        let state = CodecState::new(&keys, features, config.params, config.allocator.as_ref());
        let carry = config.allocator.allocate(MAX_BLOCK_BYTES);

        let previous = std::mem::replace(&mut self.config.allocator, config.allocator.clone());
        let mut old = std::mem::replace(&mut self.state, state);
        old.release_buffers(previous.as_ref());
        previous.release(std::mem::replace(&mut self.carry, carry));

        self.config = config;
        self.features = features;
        self.keys = keys;
        self.header_written = false;
        self.header_consumed = 0;
        self.carry_len = 0;

        tracing::debug!(
            key_len = self.keys.key_len(),
            optimization = ?self.config.optimization,
            "comcrypt session reset"
        );
        Ok(())
    }

    /// The configuration this session was built with.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Active feature flags.
    pub fn features(&self) -> FeatureFlags {
        self.features
    }

    /// Bytes of an incomplete block buffered by the last `decode` call.
    pub fn pending(&self) -> usize {
        self.carry_len
    }

    fn checkpoint(&self) -> SessionCheckpoint {
        SessionCheckpoint {
            state: self.state.checkpoint(),
            header_written: self.header_written,
            header_consumed: self.header_consumed,
            header_buf: self.header_buf,
            carry: self.carry[..self.carry_len].to_vec(),
        }
    }

    fn restore(&mut self, checkpoint: SessionCheckpoint) {
        self.state.restore(&checkpoint.state);
        self.header_written = checkpoint.header_written;
        self.header_consumed = checkpoint.header_consumed;
        self.header_buf = checkpoint.header_buf;
        self.carry[..checkpoint.carry.len()].copy_from_slice(&checkpoint.carry);
        self.carry_len = checkpoint.carry.len();
    }

    /// Encode `input` into `output`, writing the stream header on the first
    /// call.
    ///
    /// `end_of_stream` is accepted for symmetry with [`decode`](Self::decode)
    /// and has no effect: every call emits complete blocks.
    ///
    /// # Returns
    ///
    /// Bytes written to `output`.
    ///
    /// # Errors
    ///
    /// [`ComcryptError::BufferTooSmall`] if `output` cannot hold the result.
    /// The session is rolled back, so the same call can be retried with a
    /// larger buffer.
    pub fn encode(&mut self, input: &[u8], output: &mut [u8], _end_of_stream: bool) -> Result<usize> {
        let checkpoint = self.checkpoint();
        let result = self.encode_blocks(input, output);
        if result.is_err() {
            self.restore(checkpoint);
        }
        result
    }

    fn encode_blocks(&mut self, input: &[u8], output: &mut [u8]) -> Result<usize> {
        let mut out = ByteWriter::new(output);
        if !self.header_written {
            StreamHeader::write(&mut out)?;
            self.header_written = true;
        }
        for chunk in input.chunks(BLOCK_SIZE) {
            self.state
                .encode_block(&self.keys, self.features, chunk, &mut out)?;
        }
        Ok(out.position())
    }

    /// Decode `input` into `output`.
    ///
    /// The stream header may arrive split across calls, and a trailing
    /// partial block is buffered until the next call completes it.
    ///
    /// # Returns
    ///
    /// Plaintext bytes written to `output`.
    ///
    /// # Errors
    ///
    /// - [`ComcryptError::BufferTooSmall`]: retry with a larger `output`
    /// - [`ComcryptError::UnsupportedVersion`], [`ComcryptError::MalformedBlock`]:
    ///   the stream is corrupt
    /// - [`ComcryptError::UnexpectedEndOfStream`]: `end_of_stream` was set
    ///   while a header or block was still incomplete
    ///
    /// On any error the session is rolled back to its state before the call.
    pub fn decode(&mut self, input: &[u8], output: &mut [u8], end_of_stream: bool) -> Result<usize> {
        let checkpoint = self.checkpoint();
        let result = self.decode_blocks(input, output, end_of_stream);
        if let Err(err) = &result {
            if !err.is_recoverable() {
                tracing::debug!(error = %err, "comcrypt stream rejected");
            }
            self.restore(checkpoint);
        }
        result
    }

    fn decode_blocks(&mut self, input: &[u8], output: &mut [u8], end_of_stream: bool) -> Result<usize> {
        let mut pos = self.consume_header(input)?;
        let mut out = ByteWriter::new(output);

        loop {
            if self.carry_len > 0 {
                let before = self.carry_len;
                let take = (MAX_BLOCK_BYTES - before).min(input.len() - pos);
                self.carry[before..before + take].copy_from_slice(&input[pos..pos + take]);
                self.carry_len += take;

                match self.state.decode_block(
                    &self.keys,
                    self.features,
                    &self.carry[..self.carry_len],
                    &mut out,
                ) {
                    Ok(used) => {
                        debug_assert!(used > before, "carried bytes form an incomplete block");
                        pos += used - before;
                        self.carry_len = 0;
                    }
                    Err(err) if err.is_incomplete() => {
                        if self.carry_len == MAX_BLOCK_BYTES {
                            return Err(oversized_block());
                        }
                        pos += take;
                        break;
                    }
                    Err(err) => return Err(err),
                }
            } else {
                if pos == input.len() {
                    break;
                }
                match self
                    .state
                    .decode_block(&self.keys, self.features, &input[pos..], &mut out)
                {
                    Ok(used) => pos += used,
                    Err(err) if err.is_incomplete() => {
                        let rest = &input[pos..];
                        if rest.len() >= MAX_BLOCK_BYTES {
                            return Err(oversized_block());
                        }
                        self.carry[..rest.len()].copy_from_slice(rest);
                        self.carry_len = rest.len();
                        pos = input.len();
                        break;
                    }
                    Err(err) => return Err(err),
                }
            }
        }
        debug_assert_eq!(pos, input.len());

        if end_of_stream {
            let partial_header = self.header_consumed % STREAM_HEADER_LEN;
            let pending = self.carry_len + partial_header;
            if pending > 0 {
                return Err(ComcryptError::unexpected_end_of_stream(pending));
            }
        }
        Ok(out.position())
    }

    /// Take header bytes from the front of `input`.
    ///
    /// # Returns
    ///
    /// How many bytes of `input` were header bytes.
    fn consume_header(&mut self, input: &[u8]) -> Result<usize> {
        if self.header_consumed == STREAM_HEADER_LEN {
            return Ok(0);
        }
        let start = self.header_consumed;
        let take = (STREAM_HEADER_LEN - start).min(input.len());
        self.header_buf[start..start + take].copy_from_slice(&input[..take]);
        self.header_consumed += take;
        if self.header_consumed == STREAM_HEADER_LEN {
            StreamHeader::parse(&self.header_buf)?;
        }
        Ok(take)
    }

    /// See [`capacity::max_out_buf_size`].
    pub fn max_out_buf_size(&self, input_len: usize, direction: Direction) -> usize {
        capacity::max_out_buf_size(input_len, direction)
    }

    /// See [`capacity::max_in_buf_size`].
    pub fn max_in_buf_size(&self, output_len: usize, direction: Direction) -> usize {
        capacity::max_in_buf_size(output_len, direction)
    }
}

fn oversized_block() -> ComcryptError {
    ComcryptError::malformed(0, format!("block record exceeds {MAX_BLOCK_BYTES} bytes"))
}

impl BufferCodec for Session {
    fn encode(&mut self, input: &[u8], output: &mut [u8], end_of_stream: bool) -> Result<usize> {
        Session::encode(self, input, output, end_of_stream)
    }

    fn decode(&mut self, input: &[u8], output: &mut [u8], end_of_stream: bool) -> Result<usize> {
        Session::decode(self, input, output, end_of_stream)
    }

    fn max_out_buf_size(&self, input_len: usize, direction: Direction) -> usize {
        capacity::max_out_buf_size(input_len, direction)
    }

    fn max_in_buf_size(&self, output_len: usize, direction: Direction) -> usize {
        capacity::max_in_buf_size(output_len, direction)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let allocator = self.config.allocator.clone();
        self.state.release_buffers(allocator.as_ref());
        allocator.release(std::mem::take(&mut self.carry));
    }
}
