//! BitPlane implementation
//!
//! Packed bytes plus a cached population count, with change subscribers.

use std::fmt;
use std::ops::Range;

use super::popcount::{count_ones, POPCOUNT_TABLE};
use crate::error::{Result, SyncError};

/// Handle returned by [`BitPlane::subscribe_to_changes`]
pub type SubscriptionId = u64;

/// Change notification; receives the half-open bit range that changed
pub type ChangeCallback = Box<dyn FnMut(Range<u32>) + Send>;

/// Packed bit storage for one chunk
pub struct BitPlane {
    /// Addressable bits, fixed at construction
    bit_count: u32,

    /// Packed storage, ceil(bit_count / 8) bytes
    bytes: Box<[u8]>,

    /// Cached number of set bits
    checked_count: u32,

    subscribers: Vec<(SubscriptionId, ChangeCallback)>,
    next_subscription_id: SubscriptionId,
}

impl BitPlane {
    /// Create a zeroed plane of `bit_count` bits
    pub fn new(bit_count: u32) -> Self {
        let byte_count = (bit_count as usize).div_ceil(8);
        Self {
            bit_count,
            bytes: vec![0u8; byte_count].into_boxed_slice(),
            checked_count: 0,
            subscribers: Vec::new(),
            next_subscription_id: 0,
        }
    }

    /// Read one bit
    pub fn get(&self, index: u32) -> Result<bool> {
        self.check_index(index)?;
        let byte = self.bytes[(index >> 3) as usize];
        Ok(byte & (1 << (index & 7)) != 0)
    }

    /// Write one bit, keeping the population count in step
    pub fn set(&mut self, index: u32, value: bool) -> Result<()> {
        self.check_index(index)?;
        let byte_index = (index >> 3) as usize;
        let mask = 1u8 << (index & 7);

        let old = self.bytes[byte_index];
        let new = if value { old | mask } else { old & !mask };
        if old == new {
            return Ok(());
        }

        self.checked_count -= POPCOUNT_TABLE[old as usize] as u32;
        self.bytes[byte_index] = new;
        self.checked_count += POPCOUNT_TABLE[new as usize] as u32;

        self.fire_change(byte_index, 1);
        Ok(())
    }

    /// Flip one bit and return its new value
    pub fn toggle(&mut self, index: u32) -> Result<bool> {
        let value = !self.get(index)?;
        self.set(index, value)?;
        Ok(value)
    }

    /// Replace the whole plane with an authoritative snapshot
    ///
    /// The count is recomputed by a full scan; the notification covers the
    /// whole plane.
    pub fn full_state_update(&mut self, buffer: &[u8]) -> Result<()> {
        if buffer.len() != self.bytes.len() {
            return Err(SyncError::LengthMismatch {
                expected: self.bytes.len(),
                actual: buffer.len(),
            });
        }

        self.bytes.copy_from_slice(buffer);
        let tail_mask = self.tail_mask();
        if let Some(last) = self.bytes.last_mut() {
            *last &= tail_mask;
        }
        self.checked_count = count_ones(&self.bytes);

        let len = self.bytes.len();
        self.fire_change(0, len);
        Ok(())
    }

    /// Overwrite `chunk.len()` bytes starting at `byte_offset`
    pub fn partial_state_update(&mut self, byte_offset: usize, chunk: &[u8]) -> Result<()> {
        let end = byte_offset
            .checked_add(chunk.len())
            .filter(|&end| end <= self.bytes.len())
            .ok_or(SyncError::RangeOutOfBounds {
                offset: byte_offset,
                len: chunk.len(),
                capacity: self.bytes.len(),
            })?;

        for (slot, &incoming) in self.bytes[byte_offset..end].iter_mut().zip(chunk) {
            self.checked_count -= POPCOUNT_TABLE[*slot as usize] as u32;
            *slot = incoming;
            self.checked_count += POPCOUNT_TABLE[incoming as usize] as u32;
        }
        if end == self.bytes.len() {
            let tail_mask = self.tail_mask();
            if let Some(last) = self.bytes.last_mut() {
                self.checked_count -= POPCOUNT_TABLE[*last as usize] as u32;
                *last &= tail_mask;
                self.checked_count += POPCOUNT_TABLE[*last as usize] as u32;
            }
        }

        self.fire_change(byte_offset, chunk.len());
        Ok(())
    }

    /// Zero every bit
    pub fn clear(&mut self) {
        self.bytes.fill(0);
        self.checked_count = 0;
        let len = self.bytes.len();
        self.fire_change(0, len);
    }

    /// Register a change callback
    pub fn subscribe_to_changes(&mut self, callback: ChangeCallback) -> SubscriptionId {
        let id = self.next_subscription_id;
        self.next_subscription_id += 1;
        self.subscribers.push((id, callback));
        id
    }

    /// Remove a change callback. Returns false if the id was unknown.
    pub fn unsubscribe_from_changes(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sub_id, _)| *sub_id != id);
        self.subscribers.len() != before
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn bit_count(&self) -> u32 {
        self.bit_count
    }

    /// Number of set bits
    pub fn checked_count(&self) -> u32 {
        self.checked_count
    }

    /// Raw packed bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn check_index(&self, index: u32) -> Result<()> {
        if index >= self.bit_count {
            return Err(SyncError::IndexOutOfRange {
                index,
                len: self.bit_count,
            });
        }
        Ok(())
    }

    /// Mask of the bits of the last byte that lie inside `bit_count`
    fn tail_mask(&self) -> u8 {
        match self.bit_count & 7 {
            0 => 0xFF,
            used => (1u8 << used) - 1,
        }
    }

    fn fire_change(&mut self, byte_offset: usize, byte_len: usize) {
        let start = (byte_offset as u64 * 8).min(self.bit_count as u64) as u32;
        let end = ((byte_offset + byte_len) as u64 * 8).min(self.bit_count as u64) as u32;
        for (_, callback) in self.subscribers.iter_mut() {
            callback(start..end);
        }
    }
}

impl fmt::Debug for BitPlane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BitPlane")
            .field("bit_count", &self.bit_count)
            .field("checked_count", &self.checked_count)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}
