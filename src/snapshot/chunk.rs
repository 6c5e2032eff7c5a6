//! Chunk snapshot
//!
//! One chunk's bitmap plus the metadata needed to validate it on load.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{MAGIC, PREAMBLE_SIZE, VERSION};
use crate::bitmap::{count_ones, BitPlane};
use crate::error::{Result, SyncError};
use crate::session::SyncSession;

/// Largest header we accept; real headers are a few dozen bytes
const MAX_HEADER_SIZE: u32 = 4096;

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotHeader {
    chunk_index: u32,
    bit_count: u32,
    checked_count: u32,
    byte_len: u64,
    crc32: u32,
}

/// Copy of one chunk's bits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSnapshot {
    pub chunk_index: u32,
    pub bit_count: u32,
    pub checked_count: u32,
    pub bytes: Vec<u8>,
}

impl ChunkSnapshot {
    /// Copy a plane's current contents
    pub fn from_plane(chunk_index: u32, plane: &BitPlane) -> Self {
        Self {
            chunk_index,
            bit_count: plane.bit_count(),
            checked_count: plane.checked_count(),
            bytes: plane.as_bytes().to_vec(),
        }
    }

    /// Copy the session's active chunk; fails until its snapshot arrived
    pub fn capture(session: &SyncSession) -> Result<Self> {
        if !session.is_chunk_loaded() {
            return Err(SyncError::Snapshot(format!(
                "chunk {} has not been loaded yet",
                session.chunk_index()
            )));
        }
        Ok(Self::from_plane(session.chunk_index(), session.plane()))
    }

    /// Load the bits into a plane of the same size
    pub fn apply_to(&self, plane: &mut BitPlane) -> Result<()> {
        if plane.bit_count() != self.bit_count {
            return Err(SyncError::Snapshot(format!(
                "snapshot holds {} bits, plane holds {}",
                self.bit_count,
                plane.bit_count()
            )));
        }
        plane.full_state_update(&self.bytes)
    }

    /// Serialize to the file format
    pub fn encode(&self) -> Result<Vec<u8>> {
        let header = SnapshotHeader {
            chunk_index: self.chunk_index,
            bit_count: self.bit_count,
            checked_count: self.checked_count,
            byte_len: self.bytes.len() as u64,
            crc32: crc32fast::hash(&self.bytes),
        };
        let header_bytes = bincode::serialize(&header)?;

        let mut out = Vec::with_capacity(PREAMBLE_SIZE + header_bytes.len() + self.bytes.len());
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&VERSION.to_le_bytes());
        out.extend_from_slice(&(header_bytes.len() as u32).to_le_bytes());
        out.extend_from_slice(&header_bytes);
        out.extend_from_slice(&self.bytes);
        Ok(out)
    }

    /// Parse and validate the file format
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut reader = data;
        Self::read(&mut reader)
    }

    /// Write to a file, replacing it
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&self.encode()?)?;
        writer.flush()?;
        writer
            .into_inner()
            .map_err(|e| SyncError::Snapshot(format!("Failed to flush snapshot: {}", e)))?
            .sync_all()?;
        tracing::debug!(
            "Wrote snapshot of chunk {} to {}",
            self.chunk_index,
            path.display()
        );
        Ok(())
    }

    /// Read and validate a file
    pub fn read_from(path: &Path) -> Result<Self> {
        let mut reader = BufReader::new(File::open(path)?);
        Self::read(&mut reader)
    }

    /// Build a snapshot from a bare bitmap, as found in raw files
    ///
    /// `bytes` must hold exactly `ceil(bit_count / 8)` bytes. There is no
    /// checksum to verify; padding bits past `bit_count` are cleared.
    pub fn from_raw(chunk_index: u32, bit_count: u32, bytes: Vec<u8>) -> Result<Self> {
        let mut plane = BitPlane::new(bit_count);
        if bytes.len() != plane.byte_len() {
            return Err(SyncError::Snapshot(format!(
                "Raw bitmap of {} bytes does not fit {} bits",
                bytes.len(),
                bit_count
            )));
        }
        plane.full_state_update(&bytes)?;
        Ok(Self::from_plane(chunk_index, &plane))
    }

    /// Write only the bitmap bytes, with no header
    ///
    /// This is the `state-<chunk>.bin` layout the web client downloads.
    pub fn write_raw_to(&self, path: &Path) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        file.write_all(&self.bytes)?;
        file.sync_all()?;
        tracing::debug!(
            "Wrote raw bitmap of chunk {} to {}",
            self.chunk_index,
            path.display()
        );
        Ok(())
    }

    /// Read a raw bitmap file for a chunk of `bit_count` bits
    pub fn read_raw_from(path: &Path, chunk_index: u32, bit_count: u32) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_raw(chunk_index, bit_count, bytes)
    }

    fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let mut preamble = [0u8; PREAMBLE_SIZE];
        reader.read_exact(&mut preamble)?;

        if &preamble[0..4] != MAGIC {
            return Err(SyncError::Snapshot(format!(
                "Invalid snapshot magic: expected CBSN, got {:?}",
                &preamble[0..4]
            )));
        }

        let version = u16::from_le_bytes([preamble[4], preamble[5]]);
        if version != VERSION {
            return Err(SyncError::Snapshot(format!(
                "Unsupported snapshot version: {}",
                version
            )));
        }

        let header_len =
            u32::from_le_bytes([preamble[6], preamble[7], preamble[8], preamble[9]]);
        if header_len > MAX_HEADER_SIZE {
            return Err(SyncError::Snapshot(format!(
                "Snapshot header too large: {} bytes",
                header_len
            )));
        }

        let mut header_bytes = vec![0u8; header_len as usize];
        reader.read_exact(&mut header_bytes)?;
        let header: SnapshotHeader = bincode::deserialize(&header_bytes)?;

        let expected_len = (header.bit_count as u64).div_ceil(8);
        if header.byte_len != expected_len {
            return Err(SyncError::Snapshot(format!(
                "Bitmap length {} does not fit {} bits",
                header.byte_len, header.bit_count
            )));
        }

        let mut bytes = vec![0u8; header.byte_len as usize];
        reader.read_exact(&mut bytes)?;

        let crc = crc32fast::hash(&bytes);
        if crc != header.crc32 {
            return Err(SyncError::Snapshot(format!(
                "Checksum mismatch: expected {:08x}, got {:08x}",
                header.crc32, crc
            )));
        }

        let checked_count = count_ones(&bytes);
        if checked_count != header.checked_count {
            return Err(SyncError::Snapshot(format!(
                "Header claims {} set bits, bitmap has {}",
                header.checked_count, checked_count
            )));
        }

        Ok(Self {
            chunk_index: header.chunk_index,
            bit_count: header.bit_count,
            checked_count,
            bytes,
        })
    }
}
