//! Sync client driver
//!
//! Runs the reconnect loop around a shared [`SyncSession`].

use std::sync::Arc;

use parking_lot::Mutex;

use super::Connection;
use crate::config::Config;
use crate::error::{Result, SyncError};
use crate::session::{ConnectionState, SessionListener, SyncSession};

/// Reconnecting client for one session
///
/// ## Reconnect Policy
/// After every close, the driver waits `reconnect_delay` and connects again.
/// The delay never grows and there is no retry limit. A connect that does
/// not finish within `connect_timeout`, or a connection silent for two
/// `idle_timeout` intervals, counts as a close. The loop ends only on an
/// incompatible protocol version, or after [`SessionHandle::stop`].
pub struct SyncClient {
    config: Config,
    session: Arc<Mutex<SyncSession>>,
}

impl SyncClient {
    /// Create a client; nothing connects until [`SyncClient::run`]
    pub fn new(config: Config, listener: Box<dyn SessionListener>) -> Result<Self> {
        let session = SyncSession::new(&config, listener)?;
        Ok(Self {
            config,
            session: Arc::new(Mutex::new(session)),
        })
    }

    /// Handle for collaborators to read and drive the session
    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            session: Arc::clone(&self.session),
        }
    }

    /// Connect and keep reconnecting
    ///
    /// Returns `Err(VersionMismatch)` on an incompatible authority and
    /// `Ok(())` once the session was stopped.
    pub async fn run(&self) -> Result<()> {
        let mut attempt: u64 = 0;

        loop {
            if self.session.lock().is_stopped() {
                tracing::debug!("Session stopped, not reconnecting");
                return Ok(());
            }

            attempt += 1;
            self.session.lock().on_connecting();
            tracing::debug!(
                "Connecting to {} (attempt {})",
                self.config.server_url,
                attempt
            );

            match self.run_connection().await {
                Ok(()) => tracing::info!("Disconnected from {}", self.config.server_url),
                Err(e) if e.is_fatal() => tracing::error!("{}", e),
                Err(e) if e.is_connection_fault() => {
                    tracing::warn!("Connection to {} failed: {}", self.config.server_url, e)
                }
                Err(e) => tracing::warn!("Dropped connection to {}: {}", self.config.server_url, e),
            }

            let (incompatibility, stopped) = {
                let mut session = self.session.lock();
                session.on_close();
                (session.incompatibility(), session.is_stopped())
            };

            if let Some(found) = incompatibility {
                return Err(SyncError::VersionMismatch {
                    expected: self.config.protocol_version_major,
                    actual_major: found.version_major,
                    actual_minor: found.version_minor,
                });
            }
            if stopped {
                return Ok(());
            }

            tokio::time::sleep(self.config.reconnect_delay()).await;
        }
    }

    async fn run_connection(&self) -> Result<()> {
        let connection = Connection::open(
            &self.config.server_url,
            Arc::clone(&self.session),
            self.config.connect_timeout(),
            self.config.idle_timeout(),
        )
        .await?;
        connection.handle().await
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}

/// Cloneable access to a running session
///
/// Every call takes the session lock briefly. Outgoing frames are queued to
/// the driver, so these calls never wait on the network.
#[derive(Clone)]
pub struct SessionHandle {
    session: Arc<Mutex<SyncSession>>,
}

impl SessionHandle {
    pub fn toggle(&self, global_index: u32) -> Result<bool> {
        self.session.lock().toggle(global_index)
    }

    pub fn set_chunk_index(&self, chunk_index: u32) -> Result<()> {
        self.session.lock().set_chunk_index(chunk_index)
    }

    pub fn go_to_checkbox(&self, index: u64) -> Result<()> {
        self.session.lock().go_to_checkbox(index)
    }

    /// Flush queued frames, close the connection and end the driver loop
    pub fn stop(&self) {
        self.session.lock().stop();
    }

    pub fn is_checked(&self, global_index: u32) -> bool {
        self.session.lock().is_checked(global_index)
    }

    pub fn chunk_index(&self) -> u32 {
        self.session.lock().chunk_index()
    }

    pub fn is_chunk_loaded(&self) -> bool {
        self.session.lock().is_chunk_loaded()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.session.lock().connection_state()
    }

    pub fn current_clients(&self) -> u32 {
        self.session.lock().current_clients().get()
    }

    pub fn checked_count(&self) -> u32 {
        self.session.lock().checked_count().get()
    }

    /// Run a closure with the session locked
    ///
    /// For reads, subscriptions and snapshots. The closure must not block.
    pub fn with_session<R>(&self, f: impl FnOnce(&mut SyncSession) -> R) -> R {
        let mut session = self.session.lock();
        f(&mut *session)
    }
}
