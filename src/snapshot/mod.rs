//! Snapshot Module
//!
//! Export and import of the active chunk's bits to a checksummed file.
//!
//! ## File Format
//! ```text
//! ┌───────────┬─────────────┬────────────────┬───────────────────┬──────────────┐
//! │ Magic (4) │ Version (2) │ Header len (4) │ Header (bincode)  │ Bitmap bytes │
//! └───────────┴─────────────┴────────────────┴───────────────────┴──────────────┘
//! ```
//! The header carries the chunk index, bit count, set-bit count and a CRC32
//! of the bitmap bytes. Integers outside the header are little-endian.

mod chunk;

pub use chunk::ChunkSnapshot;

/// Magic bytes identifying a snapshot file
pub const MAGIC: &[u8; 4] = b"CBSN";

/// Snapshot format version
pub const VERSION: u16 = 1;

/// Magic + version + header length
pub const PREAMBLE_SIZE: usize = 10;
