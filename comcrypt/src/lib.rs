//! # comcrypt: Pure Rust Comcryption
//!
//! Comcryption folds an adaptive-dictionary compressor and a key-dependent
//! scrambler into a single pass. Byte pairs are looked up in a 256-entry
//! move-toward-front queue whose initial order, promotion distances and
//! output masking all derive from the key.
//!
//! **Not encryption.** The scrambling is obfuscation only and offers no
//! cryptographic guarantees.
//!
//! ## Features
//!
//! - **Pure Rust**: no C dependencies, 100% safe Rust
//! - **Streaming**: any chunking of input on either side gives the same
//!   result; partial blocks are buffered between `decode` calls
//! - **Two-level**: well-compressing blocks are comcrypted a second time
//! - **Caller-owned buffers**: nothing grows behind your back, see
//!   [`capacity`] for worst-case sizes
//!
//! ## Stream format
//!
//! - 8-byte header: `0x43430003` big-endian, then 4 reserved zero bytes
//! - One record per 256-byte plaintext block (the last may be shorter)
//! - Each record: descriptor, long-code count, token count unless full,
//!   packed token bits, long codes, then byte codes or a nested record
//!
//! ## Example
//!
//! ```rust
//! use comcrypt::{decrypt, encrypt};
//!
//! let original = b"TOBEORNOTTOBEORTOBEORNOT";
//! let key = b"correct horse";
//!
//! let scrambled = encrypt(key, original).unwrap();
//! assert_ne!(&scrambled[8..], &original[..]);
//!
//! let restored = decrypt(key, &scrambled).unwrap();
//! assert_eq!(restored, original);
//! ```
//!
//! ## Streaming
//!
//! ```rust
//! use comcrypt::{BufferCodec, Direction, Optimization, Session};
//!
//! let data = b"stream me in pieces ".repeat(40);
//! let mut encoder = Session::new(b"k", Optimization::Size).unwrap();
//! let mut decoder = Session::new(b"k", Optimization::Size).unwrap();
//!
//! let mut cipher = Vec::new();
//! for piece in data.chunks(100) {
//!     cipher.extend(encoder.encode_all(piece).unwrap());
//! }
//!
//! let mut plain = Vec::new();
//! let mut buf = vec![0u8; decoder.max_out_buf_size(7, Direction::Decode)];
//! let pieces: Vec<&[u8]> = cipher.chunks(7).collect();
//! for (i, piece) in pieces.iter().enumerate() {
//!     let last = i + 1 == pieces.len();
//!     let n = decoder.decode(piece, &mut buf, last).unwrap();
//!     plain.extend_from_slice(&buf[..n]);
//! }
//! assert_eq!(plain, data);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![forbid(unsafe_code)]

pub mod alloc;
pub mod block;
pub mod capacity;
pub mod config;
pub mod format;
pub mod key;
pub mod queue;
pub mod session;
pub mod signature;

pub use alloc::{ScratchAllocator, SystemAllocator};
pub use comcrypt_core::{BufferCodec, ComcryptError, Direction, Result};
pub use config::{CodecParams, FeatureFlags, Optimization, SessionConfig};
pub use format::{BLOCK_SIZE, MAX_BLOCK_BYTES, STREAM_HEADER_LEN, STREAM_VERSION};
pub use key::MAX_KEY_LENGTH;
pub use session::Session;

/// Comcrypt `data` as one complete stream with the default optimization.
///
/// # Example
///
/// ```rust
/// use comcrypt::encrypt;
///
/// let stream = encrypt(b"key", b"").unwrap();
/// assert_eq!(stream, [0x43, 0x43, 0x00, 0x03, 0, 0, 0, 0]);
/// ```
pub fn encrypt(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut session = Session::new(key, Optimization::Default)?;
    session.encode_all(data)
}

/// Decode one complete stream produced by [`encrypt`].
///
/// # Errors
///
/// Fails if the stream is corrupt or truncated, including
/// [`ComcryptError::UnexpectedEndOfStream`] when it stops mid-block.
pub fn decrypt(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut session = Session::new(key, Optimization::Default)?;
    session.decode_all(data)
}
