//! Protocol Module
//!
//! Defines the binary wire protocol spoken with the authority.
//!
//! ## Frame Format
//! ```text
//! ┌──────────┬─────────────────────────────────────────┐
//! │ Type (1) │   Payload (fixed or length-implied)     │
//! └──────────┴─────────────────────────────────────────┘
//! ```
//! All integers are little-endian, fixed width, no padding.
//!
//! ### Messages
//! - 0x00: HELLO                      (A→C) - version_major (2) + version_minor (2)
//! - 0x01: STATS                      (A→C) - current_clients (4)
//! - 0x10: CHUNK_FULL_STATE_REQUEST   (C→A) - chunk_index (2)
//! - 0x11: CHUNK_FULL_STATE_RESPONSE  (A→C) - chunk_index (2) + bitmap
//! - 0x12: PARTIAL_STATE_UPDATE       (A→C) - global byte offset (4) + bytes
//! - 0x13: TOGGLE_BIT                 (C→A) - global bit index (4)
//! - 0x14: PARTIAL_STATE_SUBSCRIPTION (C→A) - chunk_index (2)
//!
//! Unknown type bytes decode to [`Decoded::Unrecognized`] and are skipped.

mod codec;
mod message;

pub use codec::{decode, encode, encoded_len};
pub use message::{Decoded, Message, MessageType};

/// Protocol major version; a different major from the authority is fatal
pub const PROTOCOL_VERSION_MAJOR: u16 = 1;

/// Protocol minor version
pub const PROTOCOL_VERSION_MINOR: u16 = 0;
