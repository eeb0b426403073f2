//! Wire format: stream header, block descriptor, and block layout.
//!
//! ```text
//! header  := version (u32 BE) · reserved (4 bytes, zero)
//! block   := descriptor · longCount · [tokenCount iff !full]
//!            · tokenBits · longCodes (u16 BE each)
//!            · byteCodes                    (single-level)
//!            | nestedLen · nestedBlock      (double-level)
//! ```
//!
//! Descriptor byte:
//!
//! | bit  | meaning                         |
//! |------|---------------------------------|
//! | 0    | double-level (nested byte codes)|
//! | 1    | odd trailing plaintext byte     |
//! | 2    | full block (token count implied)|
//! | 3    | reserved, must be zero          |
//! | 4..7 | magic `0xC`                     |

use std::ops::Range;

use comcrypt_core::bits;
use comcrypt_core::cursor::{ByteReader, ByteWriter};
use comcrypt_core::error::{ComcryptError, Result};

/// Stream magic/version, written big-endian at the start of every stream.
pub const STREAM_VERSION: u32 = 0x4343_0003;

/// Stream header length (version plus reserved bytes).
pub const STREAM_HEADER_LEN: usize = 8;

/// Plaintext bytes per block.
pub const BLOCK_SIZE: usize = 256;

/// Units (pairs) per full block.
pub const MAX_TOKENS: usize = BLOCK_SIZE / 2;

/// Packed token bytes of a full block.
pub const TOKEN_BYTES: usize = MAX_TOKENS / 8;

/// Largest block record a valid encoder emits: a 255-byte block of misses.
pub const MAX_BLOCK_BYTES: usize = 3 + TOKEN_BYTES + 2 * MAX_TOKENS;

/// Top nibble of every descriptor.
pub const DESCRIPTOR_MAGIC: u8 = 0xC0;

const MAGIC_MASK: u8 = 0xF0;
const FLAG_DOUBLE: u8 = 0x01;
const FLAG_ODD: u8 = 0x02;
const FLAG_FULL: u8 = 0x04;
const FLAG_RESERVED: u8 = 0x08;

/// Decoded descriptor byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockDescriptor {
    /// Byte codes are stored as a nested block record.
    pub double_level: bool,
    /// The last unit holds a single plaintext byte.
    pub odd: bool,
    /// The block holds `BLOCK_SIZE` plaintext bytes; token count omitted.
    pub full: bool,
}

impl BlockDescriptor {
    /// Encode as a descriptor byte.
    pub fn to_byte(self) -> u8 {
        let mut byte = DESCRIPTOR_MAGIC;
        if self.double_level {
            byte |= FLAG_DOUBLE;
        }
        if self.odd {
            byte |= FLAG_ODD;
        }
        if self.full {
            byte |= FLAG_FULL;
        }
        byte
    }

    /// Decode a descriptor byte.
    pub fn from_byte(byte: u8) -> Result<Self> {
        if byte & MAGIC_MASK != DESCRIPTOR_MAGIC {
            return Err(ComcryptError::malformed(
                0,
                format!("bad descriptor magic {:#04x}", byte & MAGIC_MASK),
            ));
        }
        if byte & FLAG_RESERVED != 0 {
            return Err(ComcryptError::malformed(0, "reserved descriptor bit set"));
        }
        let descriptor = Self {
            double_level: byte & FLAG_DOUBLE != 0,
            odd: byte & FLAG_ODD != 0,
            full: byte & FLAG_FULL != 0,
        };
        if descriptor.full && descriptor.odd {
            return Err(ComcryptError::malformed(0, "full block cannot be odd"));
        }
        Ok(descriptor)
    }
}

/// Field positions of one block record, found without decoding it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockLayout {
    /// Parsed descriptor.
    pub descriptor: BlockDescriptor,
    /// Number of units (tokens).
    pub tokens: usize,
    /// Number of misses (long codes).
    pub long_count: usize,
    /// Packed token bits.
    pub token_bits: Range<usize>,
    /// Long codes, two bytes each.
    pub long_codes: Range<usize>,
    /// Byte codes, or the nested block record when double-level.
    pub payload: Range<usize>,
    /// Total record length.
    pub len: usize,
}

impl BlockLayout {
    /// Walk the block record at the start of `input`.
    ///
    /// Returns [`ComcryptError::IncompleteBlock`] if `input` ends inside the
    /// record and [`ComcryptError::MalformedBlock`] if its header fields are
    /// inconsistent. Bytes after the record are ignored.
    pub fn parse(input: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(input);
        let descriptor = BlockDescriptor::from_byte(reader.read_u8()?)?;
        let long_count = reader.read_u8()? as usize;
        let tokens = if descriptor.full {
            MAX_TOKENS
        } else {
            let offset = reader.position();
            let tokens = reader.read_u8()? as usize;
            if tokens == 0 || tokens > MAX_TOKENS {
                return Err(ComcryptError::malformed(
                    offset,
                    format!("token count {tokens} outside 1..={MAX_TOKENS}"),
                ));
            }
            tokens
        };
        if long_count > tokens {
            return Err(ComcryptError::malformed(
                1,
                format!("long code count {long_count} exceeds token count {tokens}"),
            ));
        }

        let start = reader.position();
        let token_bytes = reader.read_slice(tokens.div_ceil(8))?;
        if bits::count_ones(token_bytes, tokens) != long_count {
            return Err(ComcryptError::malformed(
                start,
                "token bits disagree with long code count",
            ));
        }
        if !bits::padding_is_clear(token_bytes, tokens) {
            return Err(ComcryptError::malformed(start, "token padding bits set"));
        }
        let token_bits = start..reader.position();

        let start = reader.position();
        reader.read_slice(2 * long_count)?;
        let long_codes = start..reader.position();

        let byte_count = tokens - long_count;
        let payload_len = if descriptor.double_level {
            let offset = reader.position();
            let nested_len = reader.read_u8()? as usize;
            if nested_len == 0 || byte_count == 0 {
                return Err(ComcryptError::malformed(offset, "empty nested block"));
            }
            nested_len
        } else {
            byte_count
        };
        let start = reader.position();
        reader.read_slice(payload_len)?;
        let payload = start..reader.position();

        Ok(Self {
            descriptor,
            tokens,
            long_count,
            token_bits,
            long_codes,
            payload,
            len: reader.position(),
        })
    }

    /// Number of hits (byte codes).
    pub fn byte_count(&self) -> usize {
        self.tokens - self.long_count
    }

    /// Plaintext bytes this block decodes to.
    pub fn plain_len(&self) -> usize {
        2 * self.tokens - usize::from(self.descriptor.odd)
    }
}

/// The once-per-stream header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamHeader;

impl StreamHeader {
    /// Write the header.
    pub fn write(out: &mut ByteWriter<'_>) -> Result<()> {
        out.ensure(STREAM_HEADER_LEN)?;
        out.put_u32(STREAM_VERSION)?;
        out.put_slice(&[0u8; STREAM_HEADER_LEN - 4])
    }

    /// Validate a complete header. Reserved bytes are not checked.
    pub fn parse(bytes: &[u8; STREAM_HEADER_LEN]) -> Result<()> {
        let found = ByteReader::new(bytes).read_u32()?;
        if found != STREAM_VERSION {
            return Err(ComcryptError::unsupported_version(STREAM_VERSION, found));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_byte() {
        let descriptor = BlockDescriptor {
            double_level: true,
            odd: false,
            full: true,
        };
        assert_eq!(descriptor.to_byte(), 0xC5);
        assert_eq!(BlockDescriptor::from_byte(0xC5).unwrap(), descriptor);
        assert_eq!(
            BlockDescriptor::from_byte(0xC2).unwrap(),
            BlockDescriptor {
                double_level: false,
                odd: true,
                full: false,
            }
        );
    }

    #[test]
    fn test_descriptor_rejects_bad_magic() {
        assert!(matches!(
            BlockDescriptor::from_byte(0x35),
            Err(ComcryptError::MalformedBlock { .. })
        ));
        assert!(BlockDescriptor::from_byte(0xC8).is_err());
        assert!(BlockDescriptor::from_byte(0xC6).is_err());
    }

    #[test]
    fn test_layout_single_level() {
        // 3 tokens, second is a miss; 2 byte codes.
        let block = [0xC0, 1, 3, 0b0100_0000, 0xAB, 0xCD, 7, 9, 0xFF];
        let layout = BlockLayout::parse(&block).unwrap();
        assert_eq!(layout.tokens, 3);
        assert_eq!(layout.long_count, 1);
        assert_eq!(layout.token_bits, 3..4);
        assert_eq!(layout.long_codes, 4..6);
        assert_eq!(layout.payload, 6..8);
        assert_eq!(layout.len, 8);
        assert_eq!(layout.plain_len(), 6);
    }

    #[test]
    fn test_layout_full_block_omits_count() {
        let mut block = vec![0xC4, 0];
        block.extend_from_slice(&[0u8; TOKEN_BYTES]);
        block.extend_from_slice(&[1u8; MAX_TOKENS]);
        let layout = BlockLayout::parse(&block).unwrap();
        assert_eq!(layout.tokens, MAX_TOKENS);
        assert_eq!(layout.len, 2 + TOKEN_BYTES + MAX_TOKENS);
        assert_eq!(layout.plain_len(), BLOCK_SIZE);
    }

    #[test]
    fn test_layout_incomplete() {
        let block = [0xC0, 1, 3, 0b0100_0000, 0xAB];
        assert!(matches!(
            BlockLayout::parse(&block),
            Err(ComcryptError::IncompleteBlock { .. })
        ));
        assert!(BlockLayout::parse(&[]).unwrap_err().is_incomplete());
    }

    #[test]
    fn test_layout_inconsistent_counts() {
        // Popcount 2 but long count 1.
        let block = [0xC0, 1, 3, 0b0110_0000, 0, 0, 0];
        assert!(matches!(
            BlockLayout::parse(&block),
            Err(ComcryptError::MalformedBlock { .. })
        ));
        // Padding bit set.
        let block = [0xC0, 0, 3, 0b0000_0001, 1, 2, 3];
        assert!(BlockLayout::parse(&block).is_err());
        // Token count out of range.
        assert!(BlockLayout::parse(&[0xC0, 0, 200]).is_err());
        assert!(BlockLayout::parse(&[0xC0, 0, 0]).is_err());
        // More long codes than tokens.
        assert!(BlockLayout::parse(&[0xC0, 5, 2, 0xC0]).is_err());
    }

    #[test]
    fn test_stream_header() {
        let mut buf = [0xFFu8; STREAM_HEADER_LEN];
        let mut writer = ByteWriter::new(&mut buf);
        StreamHeader::write(&mut writer).unwrap();
        assert_eq!(buf, [0x43, 0x43, 0x00, 0x03, 0, 0, 0, 0]);
        StreamHeader::parse(&buf).unwrap();

        buf[3] = 0x02;
        assert!(matches!(
            StreamHeader::parse(&buf),
            Err(ComcryptError::UnsupportedVersion { found: 0x4343_0002, .. })
        ));
    }

    #[test]
    fn test_header_needs_full_space() {
        let mut buf = [0u8; 5];
        let mut writer = ByteWriter::new(&mut buf);
        assert!(StreamHeader::write(&mut writer).is_err());
        assert_eq!(writer.position(), 0);
    }
}
