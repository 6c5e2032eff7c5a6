//! Protocol codec
//!
//! Stateless encoding and decoding functions for the wire protocol.
//!
//! ## Wire Format
//! ```text
//! ┌──────────┬─────────────────────────────────────────┐
//! │ Type (1) │                Payload                  │
//! └──────────┴─────────────────────────────────────────┘
//! ```
//!
//! ### Payload by Message Type
//! - HELLO:                      major (2) + minor (2)
//! - STATS:                      current_clients (4)
//! - CHUNK_FULL_STATE_REQUEST:   chunk_index (2)
//! - CHUNK_FULL_STATE_RESPONSE:  chunk_index (2) + bitmap (rest of frame)
//! - PARTIAL_STATE_UPDATE:       offset (4) + chunk (rest of frame)
//! - TOGGLE_BIT:                 index (4)
//! - PARTIAL_STATE_SUBSCRIPTION: chunk_index (2)
//!
//! Fixed-size payloads may be followed by trailing bytes, which are ignored.

use bytes::{Buf, BufMut};

use super::{Decoded, Message, MessageType};
use crate::error::{Result, SyncError};

/// Type byte
pub const HEADER_SIZE: usize = 1;

// =============================================================================
// Encoding
// =============================================================================

/// Number of bytes `encode` produces for a message
pub fn encoded_len(message: &Message) -> usize {
    let payload = match message {
        Message::ChunkFullStateResponse { bitmap, .. } => 2 + bitmap.len(),
        Message::PartialStateUpdate { chunk, .. } => 4 + chunk.len(),
        other => other.message_type().min_payload_len(),
    };
    HEADER_SIZE + payload
}

/// Encode a message to bytes
///
/// Format: type (1) + payload
pub fn encode(message: &Message) -> Vec<u8> {
    let mut buf = Vec::with_capacity(encoded_len(message));
    buf.put_u8(message.message_type() as u8);

    match message {
        Message::Hello {
            version_major,
            version_minor,
        } => {
            buf.put_u16_le(*version_major);
            buf.put_u16_le(*version_minor);
        }
        Message::Stats { current_clients } => buf.put_u32_le(*current_clients),
        Message::ChunkFullStateRequest { chunk_index } => buf.put_u16_le(*chunk_index),
        Message::ChunkFullStateResponse {
            chunk_index,
            bitmap,
        } => {
            buf.put_u16_le(*chunk_index);
            buf.put_slice(bitmap);
        }
        Message::PartialStateUpdate { offset, chunk } => {
            buf.put_u32_le(*offset);
            buf.put_slice(chunk);
        }
        Message::ToggleBit { index } => buf.put_u32_le(*index),
        Message::PartialStateSubscription { chunk_index } => buf.put_u16_le(*chunk_index),
    }

    buf
}

// =============================================================================
// Decoding
// =============================================================================

/// Decode a frame
///
/// An unknown type byte is not an error and yields [`Decoded::Unrecognized`].
/// A known type with a short payload fails with `MalformedMessage`.
pub fn decode(bytes: &[u8]) -> Result<Decoded> {
    let Some((&type_byte, mut payload)) = bytes.split_first() else {
        return Err(SyncError::MalformedMessage("empty frame".to_string()));
    };

    let message_type = match MessageType::try_from(type_byte) {
        Ok(t) => t,
        Err(byte) => return Ok(Decoded::Unrecognized(byte)),
    };

    let required = message_type.min_payload_len();
    if payload.len() < required {
        return Err(SyncError::MalformedMessage(format!(
            "{:?}: expected at least {} payload bytes, got {}",
            message_type,
            required,
            payload.len()
        )));
    }

    // Lengths are checked above, the Buf getters cannot run past the end
    let message = match message_type {
        MessageType::Hello => Message::Hello {
            version_major: payload.get_u16_le(),
            version_minor: payload.get_u16_le(),
        },
        MessageType::Stats => Message::Stats {
            current_clients: payload.get_u32_le(),
        },
        MessageType::ChunkFullStateRequest => Message::ChunkFullStateRequest {
            chunk_index: payload.get_u16_le(),
        },
        MessageType::ChunkFullStateResponse => Message::ChunkFullStateResponse {
            chunk_index: payload.get_u16_le(),
            bitmap: payload.to_vec(),
        },
        MessageType::PartialStateUpdate => Message::PartialStateUpdate {
            offset: payload.get_u32_le(),
            chunk: payload.to_vec(),
        },
        MessageType::ToggleBit => Message::ToggleBit {
            index: payload.get_u32_le(),
        },
        MessageType::PartialStateSubscription => Message::PartialStateSubscription {
            chunk_index: payload.get_u16_le(),
        },
    };

    Ok(Decoded::Message(message))
}
