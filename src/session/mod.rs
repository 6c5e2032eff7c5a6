//! Session Module
//!
//! Client-side synchronization state machine for one active chunk.
//!
//! ## Responsibilities
//! - Connection lifecycle (Connecting → Open → Closed → Connecting ...)
//! - Protocol version check on every Hello
//! - Chunk subscription and snapshot requests, re-issued after each reconnect
//! - Staleness filtering of responses for chunks no longer active
//! - Optimistic local toggles
//!
//! ## I/O Model
//! The session does no I/O of its own. The driver feeds it transport events
//! (`on_connecting`, `on_open`, `on_frame`, `on_close`, `on_error`) and the
//! session writes outgoing frames into the [`FrameSink`] installed for the
//! current connection. This keeps every state transition synchronous and
//! lets tests drive the machine without sockets.

mod observable;
mod sync_session;

pub use observable::Observable;
pub use sync_session::{Incompatibility, SyncSession};

use std::fmt;

/// Transport connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Outgoing half of the current connection
pub trait FrameSink: Send {
    /// Queue one binary frame
    fn send_frame(&mut self, frame: Vec<u8>);

    /// Ask the transport to close the connection
    fn close(&mut self);
}

/// Notifications for the UI layer
///
/// All methods default to no-ops. They are called with the session locked
/// and must not call back into the session.
pub trait SessionListener: Send {
    /// A chunk started (`true`) or finished (`false`) loading
    fn loading_changed(&mut self, _loading: bool) {}

    /// The transport changed state
    fn connection_state_changed(&mut self, _state: ConnectionState) {}

    /// The authority speaks an incompatible protocol; reported once
    fn incompatible_version(&mut self, _major: u16, _minor: u16) {}
}

/// Listener that ignores every notification
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl SessionListener for NoopListener {}
