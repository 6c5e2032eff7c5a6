//! Message definitions
//!
//! Typed protocol messages in both directions.

/// Message type discriminants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Hello = 0x00,
    Stats = 0x01,
    ChunkFullStateRequest = 0x10,
    ChunkFullStateResponse = 0x11,
    PartialStateUpdate = 0x12,
    ToggleBit = 0x13,
    PartialStateSubscription = 0x14,
}

impl MessageType {
    /// Sent by clients to the authority
    pub const fn is_client_message(&self) -> bool {
        matches!(
            self,
            MessageType::ChunkFullStateRequest
                | MessageType::ToggleBit
                | MessageType::PartialStateSubscription
        )
    }

    /// Sent by the authority to clients
    pub const fn is_server_message(&self) -> bool {
        !self.is_client_message()
    }

    /// Minimum payload length after the type byte
    pub const fn min_payload_len(&self) -> usize {
        match self {
            MessageType::Hello => 4,
            MessageType::Stats => 4,
            MessageType::ChunkFullStateRequest => 2,
            MessageType::ChunkFullStateResponse => 2,
            MessageType::PartialStateUpdate => 4,
            MessageType::ToggleBit => 4,
            MessageType::PartialStateSubscription => 2,
        }
    }
}

impl TryFrom<u8> for MessageType {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            0x00 => Ok(MessageType::Hello),
            0x01 => Ok(MessageType::Stats),
            0x10 => Ok(MessageType::ChunkFullStateRequest),
            0x11 => Ok(MessageType::ChunkFullStateResponse),
            0x12 => Ok(MessageType::PartialStateUpdate),
            0x13 => Ok(MessageType::ToggleBit),
            0x14 => Ok(MessageType::PartialStateSubscription),
            other => Err(other),
        }
    }
}

/// A parsed protocol message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Authority greeting, first frame on every connection
    Hello {
        version_major: u16,
        version_minor: u16,
    },

    /// Number of connected clients
    Stats { current_clients: u32 },

    /// Ask for the snapshot of one chunk
    ChunkFullStateRequest { chunk_index: u16 },

    /// Snapshot of one chunk
    ChunkFullStateResponse { chunk_index: u16, bitmap: Vec<u8> },

    /// Bytes changed at a global byte offset
    PartialStateUpdate { offset: u32, chunk: Vec<u8> },

    /// Flip one bit, global coordinates
    ToggleBit { index: u32 },

    /// Receive partial updates for one chunk
    PartialStateSubscription { chunk_index: u16 },
}

impl Message {
    /// Get the message type
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Hello { .. } => MessageType::Hello,
            Message::Stats { .. } => MessageType::Stats,
            Message::ChunkFullStateRequest { .. } => MessageType::ChunkFullStateRequest,
            Message::ChunkFullStateResponse { .. } => MessageType::ChunkFullStateResponse,
            Message::PartialStateUpdate { .. } => MessageType::PartialStateUpdate,
            Message::ToggleBit { .. } => MessageType::ToggleBit,
            Message::PartialStateSubscription { .. } => MessageType::PartialStateSubscription,
        }
    }
}

/// Result of decoding a frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A known message
    Message(Message),

    /// Leading byte is not a known type; carries the byte
    Unrecognized(u8),
}
