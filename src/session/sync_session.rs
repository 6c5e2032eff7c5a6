//! SyncSession implementation
//!
//! Owns the active chunk's BitPlane and the current connection's sink.

use std::fmt;
use std::ops::Range;

use super::{ConnectionState, FrameSink, Observable, SessionListener};
use crate::bitmap::{BitPlane, Geometry, SubscriptionId};
use crate::config::Config;
use crate::error::{Result, SyncError};
use crate::protocol::{decode, encode, Decoded, Message};

type GoToCheckboxCallback = Box<dyn FnMut(u32) + Send>;

/// Version announced by an authority this client cannot talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Incompatibility {
    pub version_major: u16,
    pub version_minor: u16,
}

/// Client synchronization session
///
/// ## Invariants
/// - Exactly one BitPlane, sized to one chunk, always describing `chunk_index`
/// - At most one sink (connection) installed at a time
/// - Responses are applied only if their chunk identity matches the current
///   `chunk_index`, re-checked on every frame
/// - Once an incompatible Hello has been seen, nothing more is sent
pub struct SyncSession {
    geometry: Geometry,
    protocol_version_major: u16,

    /// Bits of the active chunk
    plane: BitPlane,

    /// Active chunk, in `[0, chunk_count)`
    chunk_index: u32,

    /// Whether the active chunk's snapshot arrived since the last switch
    chunk_loaded: bool,

    connection_state: ConnectionState,

    /// UI hint, -1 when none
    highlighted_index: i64,

    fatal: Option<Incompatibility>,

    /// Set by `stop`; the driver exits instead of reconnecting
    stopped: bool,

    /// Current connection slot
    sink: Option<Box<dyn FrameSink>>,

    listener: Box<dyn SessionListener>,
    go_to_checkbox: Option<GoToCheckboxCallback>,

    current_clients: Observable<u32>,
    checked_count: Observable<u32>,
}

impl SyncSession {
    /// Create a session in the `Connecting` state
    pub fn new(config: &Config, listener: Box<dyn SessionListener>) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            geometry: config.geometry,
            protocol_version_major: config.protocol_version_major,
            plane: BitPlane::new(config.geometry.chunk_size),
            chunk_index: config.initial_chunk_index,
            chunk_loaded: false,
            connection_state: ConnectionState::Connecting,
            highlighted_index: -1,
            fatal: None,
            stopped: false,
            sink: None,
            listener,
            go_to_checkbox: None,
            current_clients: Observable::new(0),
            checked_count: Observable::new(0),
        })
    }

    // =========================================================================
    // Transport events
    // =========================================================================

    /// A new connection attempt is starting
    pub fn on_connecting(&mut self) {
        self.set_connection_state(ConnectionState::Connecting);
    }

    /// The transport connected. Nothing is sent until the authority's Hello.
    pub fn on_open(&mut self, mut sink: Box<dyn FrameSink>) {
        if self.stopped {
            tracing::debug!("Session stopped, closing new connection");
            sink.close();
            return;
        }
        if let Some(mut previous) = self.sink.replace(sink) {
            tracing::debug!("Replacing live connection, closing the previous one");
            previous.close();
        }
        self.set_connection_state(ConnectionState::Open);
    }

    /// The transport closed. The driver reconnects after its fixed delay.
    pub fn on_close(&mut self) {
        self.sink = None;
        self.set_connection_state(ConnectionState::Closed);
    }

    /// Transport errors are only logged; the close event drives recovery
    pub fn on_error(&mut self, err: &dyn fmt::Display) {
        tracing::warn!("Transport error: {}", err);
    }

    /// Handle one binary frame from the authority
    ///
    /// Returns an error when the frame was malformed or announced an
    /// incompatible protocol; the connection has then already been asked to
    /// close.
    pub fn on_frame(&mut self, frame: &[u8]) -> Result<()> {
        if self.fatal.is_some() {
            return Ok(());
        }

        let message = match decode(frame) {
            Ok(Decoded::Message(message)) => message,
            Ok(Decoded::Unrecognized(byte)) => {
                tracing::trace!("Ignoring frame with unknown type 0x{:02x}", byte);
                return Ok(());
            }
            Err(e) => return Err(self.protocol_fault(e)),
        };

        tracing::trace!("Received {:?}", message.message_type());

        match message {
            Message::Hello {
                version_major,
                version_minor,
            } => self.handle_hello(version_major, version_minor),
            Message::Stats { current_clients } => {
                self.current_clients.set(current_clients);
                Ok(())
            }
            Message::ChunkFullStateResponse {
                chunk_index,
                bitmap,
            } => self.handle_full_state(chunk_index, &bitmap),
            Message::PartialStateUpdate { offset, chunk } => {
                self.handle_partial_update(offset, &chunk)
            }
            other => {
                tracing::debug!(
                    "Ignoring client-bound message {:?} from authority",
                    other.message_type()
                );
                Ok(())
            }
        }
    }

    // =========================================================================
    // Collaborator operations
    // =========================================================================

    /// Switch the active chunk and request its state
    ///
    /// Responses still in flight for the previous chunk are discarded when
    /// they arrive.
    pub fn set_chunk_index(&mut self, chunk_index: u32) -> Result<()> {
        if chunk_index >= self.geometry.chunk_count {
            return Err(SyncError::ChunkOutOfRange {
                index: chunk_index,
                count: self.geometry.chunk_count,
            });
        }

        tracing::debug!("Switching to chunk {}", chunk_index);
        self.chunk_index = chunk_index;
        self.chunk_loaded = false;
        self.plane.clear();
        self.sync_checked_count();
        self.listener.loading_changed(true);
        self.request_active_chunk();
        Ok(())
    }

    /// Toggle a checkbox of the active chunk
    ///
    /// The toggle is sent in global coordinates and applied locally right
    /// away; a later update from the authority corrects it if needed.
    /// Returns the new local value.
    pub fn toggle(&mut self, global_index: u32) -> Result<bool> {
        self.check_global_index(global_index as u64)?;

        let chunk_index = self.geometry.chunk_of(global_index);
        if chunk_index != self.chunk_index {
            return Err(SyncError::NotInActiveChunk {
                index: global_index,
                chunk_index: self.chunk_index,
            });
        }

        self.send(Message::ToggleBit {
            index: global_index,
        });

        let value = self.plane.toggle(self.geometry.local_index(global_index))?;
        self.sync_checked_count();
        Ok(value)
    }

    /// Read a checkbox; false for anything outside the active chunk
    pub fn is_checked(&self, global_index: u32) -> bool {
        if self.geometry.chunk_of(global_index) != self.chunk_index {
            return false;
        }
        self.plane
            .get(self.geometry.local_index(global_index))
            .unwrap_or(false)
    }

    /// Jump to a checkbox typed in by the user
    ///
    /// Validates the index, switches chunk when needed, highlights it and
    /// hands it to the go-to callback.
    pub fn go_to_checkbox(&mut self, index: u64) -> Result<()> {
        self.check_global_index(index)?;

        let global_index = index as u32;
        let chunk_index = self.geometry.chunk_of(global_index);
        if chunk_index != self.chunk_index {
            self.set_chunk_index(chunk_index)?;
        }

        self.highlighted_index = index as i64;
        if let Some(callback) = self.go_to_checkbox.as_mut() {
            callback(global_index);
        }
        Ok(())
    }

    /// Close the connection after the frames already queued and stop
    /// reconnecting
    pub fn stop(&mut self) {
        if !self.stopped {
            tracing::debug!("Stopping session");
        }
        self.stopped = true;
        self.close_connection();
    }

    /// Install the UI's go-to callback, replacing any previous one
    pub fn set_go_to_checkbox_callback(&mut self, callback: Option<GoToCheckboxCallback>) {
        self.go_to_checkbox = callback;
    }

    pub fn set_highlighted_index(&mut self, index: i64) {
        self.highlighted_index = index;
    }

    pub fn clear_highlight(&mut self) {
        self.highlighted_index = -1;
    }

    /// Register for bit range changes of the active chunk
    pub fn subscribe_to_changes(
        &mut self,
        callback: Box<dyn FnMut(Range<u32>) + Send>,
    ) -> SubscriptionId {
        self.plane.subscribe_to_changes(callback)
    }

    pub fn unsubscribe_from_changes(&mut self, id: SubscriptionId) -> bool {
        self.plane.unsubscribe_from_changes(id)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn chunk_index(&self) -> u32 {
        self.chunk_index
    }

    pub fn is_chunk_loaded(&self) -> bool {
        self.chunk_loaded
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection_state
    }

    pub fn highlighted_index(&self) -> i64 {
        self.highlighted_index
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    /// Read-only view of the active chunk's bits
    pub fn plane(&self) -> &BitPlane {
        &self.plane
    }

    /// Set when the authority announced an incompatible protocol
    pub fn incompatibility(&self) -> Option<Incompatibility> {
        self.fatal
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal.is_some()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Latest client count reported by the authority
    pub fn current_clients(&mut self) -> &mut Observable<u32> {
        &mut self.current_clients
    }

    /// Set bits in the active chunk
    pub fn checked_count(&mut self) -> &mut Observable<u32> {
        &mut self.checked_count
    }

    // =========================================================================
    // Message handlers
    // =========================================================================

    fn handle_hello(&mut self, version_major: u16, version_minor: u16) -> Result<()> {
        if version_major != self.protocol_version_major {
            tracing::error!(
                "Authority speaks protocol {}.{}, this client speaks {}",
                version_major, version_minor, self.protocol_version_major
            );
            self.close_connection();
            self.fatal = Some(Incompatibility {
                version_major,
                version_minor,
            });
            self.listener
                .incompatible_version(version_major, version_minor);
            return Err(SyncError::VersionMismatch {
                expected: self.protocol_version_major,
                actual_major: version_major,
                actual_minor: version_minor,
            });
        }

        tracing::debug!(
            "Authority hello, protocol {}.{}; resyncing chunk {}",
            version_major, version_minor, self.chunk_index
        );
        self.request_active_chunk();
        Ok(())
    }

    fn handle_full_state(&mut self, chunk_index: u16, bitmap: &[u8]) -> Result<()> {
        if chunk_index as u32 != self.chunk_index {
            tracing::trace!(
                "Discarding stale snapshot for chunk {} (active {})",
                chunk_index,
                self.chunk_index
            );
            return Ok(());
        }

        if let Err(e) = self.plane.full_state_update(bitmap) {
            return Err(self.protocol_fault(e));
        }

        self.chunk_loaded = true;
        self.sync_checked_count();
        self.listener.loading_changed(false);
        tracing::debug!(
            "Chunk {} loaded, {} checked",
            self.chunk_index,
            self.plane.checked_count()
        );
        Ok(())
    }

    fn handle_partial_update(&mut self, offset: u32, chunk: &[u8]) -> Result<()> {
        let affected_chunk = self.geometry.chunk_of_byte(offset);
        if affected_chunk != self.chunk_index {
            tracing::trace!(
                "Discarding update for chunk {} (active {})",
                affected_chunk,
                self.chunk_index
            );
            return Ok(());
        }

        let local_offset = self.geometry.local_byte_offset(offset) as usize;
        if let Err(e) = self.plane.partial_state_update(local_offset, chunk) {
            return Err(self.protocol_fault(e));
        }

        self.sync_checked_count();
        Ok(())
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn request_active_chunk(&mut self) {
        // chunk_count <= 65536 is enforced by Geometry::validate
        let chunk_index = self.chunk_index as u16;
        self.send(Message::PartialStateSubscription { chunk_index });
        self.send(Message::ChunkFullStateRequest { chunk_index });
    }

    fn send(&mut self, message: Message) {
        if self.fatal.is_some() {
            return;
        }
        match self.sink.as_mut() {
            Some(sink) => sink.send_frame(encode(&message)),
            None => tracing::trace!("Not connected, dropping {:?}", message.message_type()),
        }
    }

    fn close_connection(&mut self) {
        if let Some(mut sink) = self.sink.take() {
            sink.close();
        }
    }

    /// Log a misbehaving peer, drop the connection and hand the error back
    fn protocol_fault(&mut self, err: SyncError) -> SyncError {
        tracing::warn!("Protocol violation from authority: {}", err);
        self.close_connection();
        err
    }

    fn check_global_index(&self, index: u64) -> Result<()> {
        let size = self.geometry.bitmap_size();
        if index >= size {
            return Err(SyncError::Validation(format!(
                "Out of range. Must be between 0 and {}",
                size - 1
            )));
        }
        Ok(())
    }

    fn set_connection_state(&mut self, state: ConnectionState) {
        if self.connection_state == state {
            return;
        }
        tracing::debug!("Connection {} -> {}", self.connection_state, state);
        self.connection_state = state;
        self.listener.connection_state_changed(state);
    }

    fn sync_checked_count(&mut self) {
        let count = self.plane.checked_count();
        self.checked_count.set(count);
    }
}

impl fmt::Debug for SyncSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncSession")
            .field("chunk_index", &self.chunk_index)
            .field("chunk_loaded", &self.chunk_loaded)
            .field("connection_state", &self.connection_state)
            .field("highlighted_index", &self.highlighted_index)
            .field("fatal", &self.fatal)
            .field("stopped", &self.stopped)
            .field("plane", &self.plane)
            .finish()
    }
}
