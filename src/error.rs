//! Error types for checkbox-sync
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using SyncError
pub type Result<T> = std::result::Result<T, SyncError>;

/// Unified error type for checkbox-sync operations
#[derive(Debug, Error)]
pub enum SyncError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Network Errors
    // -------------------------------------------------------------------------
    #[error("Transport error: {0}")]
    Transport(String),

    // -------------------------------------------------------------------------
    // Protocol Errors
    // -------------------------------------------------------------------------
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error(
        "Incompatible protocol version: expected major {expected}, authority speaks {actual_major}.{actual_minor}"
    )]
    VersionMismatch {
        expected: u16,
        actual_major: u16,
        actual_minor: u16,
    },

    // -------------------------------------------------------------------------
    // Bitmap Errors
    // -------------------------------------------------------------------------
    #[error("Bit index {index} out of range (bit count {len})")]
    IndexOutOfRange { index: u32, len: u32 },

    #[error("Buffer length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("Byte range {offset}+{len} exceeds plane of {capacity} bytes")]
    RangeOutOfBounds {
        offset: usize,
        len: usize,
        capacity: usize,
    },

    // -------------------------------------------------------------------------
    // Session Errors
    // -------------------------------------------------------------------------
    #[error("Chunk index {index} out of range (chunk count {count})")]
    ChunkOutOfRange { index: u32, count: u32 },

    #[error("Checkbox {index} is not in the active chunk {chunk_index}")]
    NotInActiveChunk { index: u32, chunk_index: u32 },

    #[error("Invalid input: {0}")]
    Validation(String),

    // -------------------------------------------------------------------------
    // Snapshot Errors
    // -------------------------------------------------------------------------
    #[error("Snapshot error: {0}")]
    Snapshot(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl SyncError {
    /// Whether the error should tear down the current connection and go
    /// through the regular reconnect path.
    pub fn is_connection_fault(&self) -> bool {
        matches!(
            self,
            SyncError::Io(_)
                | SyncError::Transport(_)
                | SyncError::MalformedMessage(_)
                | SyncError::LengthMismatch { .. }
                | SyncError::RangeOutOfBounds { .. }
        )
    }

    /// Whether the error means retrying cannot help.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SyncError::VersionMismatch { .. })
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SyncError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        SyncError::Transport(e.to_string())
    }
}

impl From<bincode::Error> for SyncError {
    fn from(e: bincode::Error) -> Self {
        SyncError::Serialization(e.to_string())
    }
}
