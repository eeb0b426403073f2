//! # comcrypt Core
//!
//! Core components shared by the comcrypt codec crates.
//!
//! This crate provides the fundamental building blocks:
//!
//! - [`cursor`]: Bounds-checked byte readers and writers over caller slices
//! - [`bits`]: MSB-first packed token bits and a fixed-size bit set
//! - [`traits`]: The [`BufferCodec`] trait and [`Direction`]
//! - [`error`]: Error types
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ L3: Session                                             │
//! │     stream header, chunking, partial-block carry-over  │
//! ├─────────────────────────────────────────────────────────┤
//! │ L2: Block codec                                         │
//! │     adaptive queue, signature sequence, key schedule   │
//! ├─────────────────────────────────────────────────────────┤
//! │ L1: Primitives (this crate)                             │
//! │     ByteReader/ByteWriter, TokenBits, BitSet, errors   │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use comcrypt_core::bits::TokenBits;
//! use comcrypt_core::cursor::ByteWriter;
//!
//! let mut tokens = TokenBits::with_capacity(8);
//! tokens.push(true);
//! tokens.push(false);
//!
//! let mut buf = [0u8; 2];
//! let mut writer = ByteWriter::new(&mut buf);
//! writer.put_slice(tokens.as_bytes()).unwrap();
//! assert_eq!(buf[0], 0b1000_0000);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![forbid(unsafe_code)]
#![allow(clippy::module_name_repetitions)]

pub mod bits;
pub mod cursor;
pub mod error;
pub mod traits;

// Re-exports for convenience
pub use bits::{BitSet, TokenBits};
pub use cursor::{ByteReader, ByteWriter};
pub use error::{ComcryptError, Result};
pub use traits::{BufferCodec, Direction};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::cursor::{ByteReader, ByteWriter};
    pub use crate::error::{ComcryptError, Result};
    pub use crate::traits::{BufferCodec, Direction};
}
