//! Bitmap Module
//!
//! Packed bit storage for the active chunk of the shared checkbox bitmap.
//!
//! ## Responsibilities
//! - O(1) get/set of individual bits
//! - Incrementally maintained population count
//! - Change notification with the affected bit range
//!
//! ## Geometry
//! ```text
//! global bit space: [0, BITMAP_SIZE)
//! ┌──────────────┬──────────────┬─────┬──────────────┐
//! │   chunk 0    │   chunk 1    │ ... │ chunk N - 1  │   N = CHUNK_COUNT
//! └──────────────┴──────────────┴─────┴──────────────┘
//!   CHUNK_SIZE bits each, CHUNK_SIZE_BYTES packed bytes each
//! ```
//!
//! Bit `i` of a plane lives at `bytes[i >> 3]`, mask `1 << (i & 7)`.

mod plane;
mod popcount;

pub use plane::{BitPlane, ChangeCallback, SubscriptionId};
pub use popcount::{count_ones, POPCOUNT_TABLE};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

/// The size of a single chunk in bits
pub const CHUNK_SIZE: u32 = 64 * 64 * 64;
/// The size of a single chunk in bytes
pub const CHUNK_SIZE_BYTES: u32 = CHUNK_SIZE / 8;
/// The number of chunks
pub const CHUNK_COUNT: u32 = 64 * 64;
/// The size of the entire bitmap in bits
pub const BITMAP_SIZE: u64 = CHUNK_SIZE as u64 * CHUNK_COUNT as u64;

/// Partitioning of the global bit space into chunks.
///
/// Defaults to [`CHUNK_SIZE`] x [`CHUNK_COUNT`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Geometry {
    /// Bits per chunk (non-zero multiple of 8)
    pub chunk_size: u32,

    /// Number of chunks
    pub chunk_count: u32,
}

impl Default for Geometry {
    fn default() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
            chunk_count: CHUNK_COUNT,
        }
    }
}

impl Geometry {
    pub const fn new(chunk_size: u32, chunk_count: u32) -> Self {
        Self {
            chunk_size,
            chunk_count,
        }
    }

    /// Bytes per chunk
    pub const fn chunk_size_bytes(&self) -> u32 {
        self.chunk_size / 8
    }

    /// Total addressable bits
    pub const fn bitmap_size(&self) -> u64 {
        self.chunk_size as u64 * self.chunk_count as u64
    }

    /// Chunk containing a global bit index
    pub const fn chunk_of(&self, global_index: u32) -> u32 {
        global_index / self.chunk_size
    }

    /// Bit index within its chunk
    pub const fn local_index(&self, global_index: u32) -> u32 {
        global_index % self.chunk_size
    }

    /// Chunk containing a global byte offset
    pub const fn chunk_of_byte(&self, global_byte_offset: u32) -> u32 {
        global_byte_offset / self.chunk_size_bytes()
    }

    /// Byte offset within its chunk
    pub const fn local_byte_offset(&self, global_byte_offset: u32) -> u32 {
        global_byte_offset % self.chunk_size_bytes()
    }

    /// Check the geometry can be addressed by the wire protocol
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 || self.chunk_size % 8 != 0 {
            return Err(SyncError::Config(format!(
                "chunk_size must be a non-zero multiple of 8, got {}",
                self.chunk_size
            )));
        }

        // chunk indices travel as u16
        if self.chunk_count == 0 || self.chunk_count > u16::MAX as u32 + 1 {
            return Err(SyncError::Config(format!(
                "chunk_count must be in 1..=65536, got {}",
                self.chunk_count
            )));
        }

        // global bit indices travel as u32
        if self.bitmap_size() > u32::MAX as u64 + 1 {
            return Err(SyncError::Config(format!(
                "bitmap of {} bits is not addressable with 32-bit indices",
                self.bitmap_size()
            )));
        }

        Ok(())
    }
}
