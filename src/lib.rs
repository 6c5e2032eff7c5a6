//! # checkbox-sync
//!
//! Client-side synchronization engine for a huge shared bitmap of checkboxes:
//! - Packed per-chunk bit storage with an incrementally maintained popcount
//! - Binary wire codec for the authority protocol
//! - Chunk subscription state machine with staleness filtering
//! - Fixed-interval reconnect over WebSocket
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Authority (WebSocket)                       │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ binary frames
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │              SyncClient / Connection                         │
//! │         (reconnect loop, frame pump)                         │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ decode / encode
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                   SyncSession                                │
//! │     (chunk subscription, staleness, optimistic toggles)      │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │  BitPlane   │          │ Observables │
//!   │ (one chunk) │          │ (counters)  │
//!   └─────────────┘          └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod bitmap;
pub mod protocol;
pub mod session;
pub mod network;
pub mod snapshot;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{SyncError, Result};
pub use config::Config;
pub use bitmap::{BitPlane, Geometry};
pub use session::{ConnectionState, SessionListener, SyncSession};
pub use network::{SessionHandle, SyncClient};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of checkbox-sync
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
