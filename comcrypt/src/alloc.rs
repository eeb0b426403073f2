//! Pluggable scratch buffer allocation.
//!
//! A session takes all of its working buffers (byte-code, long-code and
//! nested-block scratch per level, and the decode carry-over buffer) from a
//! [`ScratchAllocator`] chosen when the session is configured, and hands
//! them back when it is dropped.

use std::fmt;

/// Source of zero-filled scratch buffers.
pub trait ScratchAllocator: fmt::Debug + Send + Sync {
    /// A zero-filled buffer of exactly `len` bytes.
    fn allocate(&self, len: usize) -> Vec<u8>;

    /// Take back a buffer previously returned by `allocate`.
    fn release(&self, buffer: Vec<u8>) {
        drop(buffer);
    }
}

/// Allocates from the global heap.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemAllocator;

impl ScratchAllocator for SystemAllocator {
    fn allocate(&self, len: usize) -> Vec<u8> {
        vec![0; len]
    }
}
