//! Network Module
//!
//! WebSocket transport and the reconnecting driver around [`SyncSession`].
//!
//! ## Architecture
//! - One driver task owns the socket and runs the reconnect loop
//! - The session sits behind a mutex shared with [`SessionHandle`]s
//! - Outgoing frames go through an unbounded channel to the socket writer
//! - The lock is only taken in synchronous sections, never across an await
//!
//! [`SyncSession`]: crate::session::SyncSession

mod client;
mod connection;

pub use client::{SessionHandle, SyncClient};
pub use connection::{ChannelSink, Connection, Outbound};
