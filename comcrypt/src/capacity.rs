//! Buffer sizing.
//!
//! Worst-case sizes for one `encode` or `decode` call. These are advisory:
//! the codec checks the real capacity on every write regardless.
//!
//! Encoding assumes every unit misses (two-level blocks are never larger
//! than their single-level form) and always counts the stream header.
//! Decoding assumes at most 4:1 expansion, plus one block completed from
//! bytes buffered by the previous call.

use comcrypt_core::traits::Direction;

use crate::format::{BLOCK_SIZE, STREAM_HEADER_LEN};

/// Worst-case record length for a block of `plain_len` bytes
/// (`0..=BLOCK_SIZE`); zero for an empty block.
pub const fn block_wire_size(plain_len: usize) -> usize {
    if plain_len == 0 {
        return 0;
    }
    let tokens = plain_len.div_ceil(2);
    let prefix = if plain_len == BLOCK_SIZE { 2 } else { 3 };
    prefix + tokens.div_ceil(8) + 2 * tokens
}

/// Worst-case record length of a full block.
pub const FULL_BLOCK_WIRE_SIZE: usize = block_wire_size(BLOCK_SIZE);

/// Worst-case plaintext expansion factor when decoding.
pub const DECODE_EXPANSION: usize = 4;

/// Worst-case output of one call with `input_len` input bytes.
pub const fn max_out_buf_size(input_len: usize, direction: Direction) -> usize {
    match direction {
        Direction::Encode => {
            STREAM_HEADER_LEN
                + (input_len / BLOCK_SIZE) * FULL_BLOCK_WIRE_SIZE
                + block_wire_size(input_len % BLOCK_SIZE)
        }
        Direction::Decode => input_len * DECODE_EXPANSION + BLOCK_SIZE,
    }
}

/// Largest input for which `output_len` bytes suffice in one call.
pub const fn max_in_buf_size(output_len: usize, direction: Direction) -> usize {
    match direction {
        Direction::Encode => {
            if output_len < STREAM_HEADER_LEN {
                return 0;
            }
            let available = output_len - STREAM_HEADER_LEN;
            let full_blocks = available / FULL_BLOCK_WIRE_SIZE;
            let rest = available % FULL_BLOCK_WIRE_SIZE;
            // Largest partial block fitting in `rest`; the size is monotonic.
            let mut partial = BLOCK_SIZE - 1;
            while partial > 0 && block_wire_size(partial) > rest {
                partial -= 1;
            }
            full_blocks * BLOCK_SIZE + partial
        }
        Direction::Decode => output_len.saturating_sub(BLOCK_SIZE) / DECODE_EXPANSION,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::MAX_BLOCK_BYTES;

    #[test]
    fn test_block_wire_size() {
        assert_eq!(block_wire_size(0), 0);
        assert_eq!(block_wire_size(1), 3 + 1 + 2);
        assert_eq!(block_wire_size(2), 3 + 1 + 2);
        assert_eq!(block_wire_size(17), 3 + 2 + 18);
        assert_eq!(block_wire_size(255), MAX_BLOCK_BYTES);
        assert_eq!(FULL_BLOCK_WIRE_SIZE, 274);
    }

    #[test]
    fn test_encode_sizes() {
        assert_eq!(max_out_buf_size(0, Direction::Encode), STREAM_HEADER_LEN);
        assert_eq!(max_out_buf_size(256, Direction::Encode), 8 + 274);
        assert_eq!(max_out_buf_size(257, Direction::Encode), 8 + 274 + 6);
    }

    #[test]
    fn test_encode_inverse() {
        for len in 0..2000 {
            let out = max_out_buf_size(len, Direction::Encode);
            let back = max_in_buf_size(out, Direction::Encode);
            assert!(back >= len, "len {len} -> out {out} -> {back}");
            assert!(max_out_buf_size(back, Direction::Encode) <= out);
        }
        assert_eq!(max_in_buf_size(7, Direction::Encode), 0);
        assert_eq!(max_in_buf_size(13, Direction::Encode), 0);
        assert_eq!(max_in_buf_size(14, Direction::Encode), 2);
    }

    #[test]
    fn test_decode_sizes() {
        assert_eq!(max_out_buf_size(100, Direction::Decode), 656);
        assert_eq!(max_in_buf_size(656, Direction::Decode), 100);
        assert_eq!(max_in_buf_size(100, Direction::Decode), 0);
    }
}
