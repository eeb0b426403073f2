//! Core traits for buffer-to-buffer codecs.
//!
//! A [`BufferCodec`] writes into caller-owned output slices and never grows
//! them. Callers size buffers up front with
//! [`BufferCodec::max_out_buf_size`] / [`BufferCodec::max_in_buf_size`].

use crate::error::Result;

/// Which way data flows through a codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Plaintext in, ciphertext out.
    Encode,
    /// Ciphertext in, plaintext out.
    Decode,
}

/// A stateful codec over caller-owned buffers.
///
/// Both `encode` and `decode` may be called repeatedly on the same stream.
/// On error the codec state is left as it was before the call, so a
/// [`BufferTooSmall`](crate::error::ComcryptError::BufferTooSmall) call may be
/// retried with a larger output buffer.
pub trait BufferCodec {
    /// Encode `input` into `output`.
    ///
    /// # Returns
    ///
    /// The number of bytes written to `output`.
    fn encode(&mut self, input: &[u8], output: &mut [u8], end_of_stream: bool) -> Result<usize>;

    /// Decode `input` into `output`, buffering any trailing partial record.
    ///
    /// # Returns
    ///
    /// The number of bytes written to `output`.
    fn decode(&mut self, input: &[u8], output: &mut [u8], end_of_stream: bool) -> Result<usize>;

    /// Smallest output capacity guaranteed to hold the result of one call
    /// with `input_len` bytes of input.
    fn max_out_buf_size(&self, input_len: usize, direction: Direction) -> usize;

    /// Largest input for which `output_len` bytes of output are guaranteed
    /// to suffice in one call.
    fn max_in_buf_size(&self, output_len: usize, direction: Direction) -> usize;

    /// Encode all of `input` in one call (convenience method).
    fn encode_all(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = vec![0u8; self.max_out_buf_size(input.len(), Direction::Encode)];
        let written = self.encode(input, &mut output, true)?;
        output.truncate(written);
        Ok(output)
    }

    /// Decode all of `input` in one call (convenience method).
    fn decode_all(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = vec![0u8; self.max_out_buf_size(input.len(), Direction::Decode)];
        let written = self.decode(input, &mut output, true)?;
        output.truncate(written);
        Ok(output)
    }
}
