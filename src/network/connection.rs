//! Connection Handler
//!
//! Pumps frames between one WebSocket connection and the session.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::{self, Message as WsMessage};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::error::{Result, SyncError};
use crate::session::{FrameSink, SyncSession};

/// Instruction for the socket writer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Send one binary frame
    Frame(Vec<u8>),

    /// Close the connection
    Close,
}

/// [`FrameSink`] feeding the writer side of a [`Connection`]
///
/// Sends never block; if the connection is already gone the frame is dropped,
/// matching what happens to frames sent while disconnected.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<Outbound>) -> Self {
        Self { tx }
    }
}

impl FrameSink for ChannelSink {
    fn send_frame(&mut self, frame: Vec<u8>) {
        let _ = self.tx.send(Outbound::Frame(frame));
    }

    fn close(&mut self) {
        let _ = self.tx.send(Outbound::Close);
    }
}

/// A single live connection to the authority
pub struct Connection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,

    /// Shared session, locked only in synchronous sections
    session: Arc<Mutex<SyncSession>>,

    /// Authority URL, for logging
    url: String,

    /// Silence before a ping, and again before giving up
    idle_timeout: Duration,
}

impl Connection {
    /// Open a WebSocket to the authority
    ///
    /// The TCP connect and the upgrade together must finish within
    /// `connect_timeout`.
    pub async fn open(
        url: &str,
        session: Arc<Mutex<SyncSession>>,
        connect_timeout: Duration,
        idle_timeout: Duration,
    ) -> Result<Self> {
        let (stream, _response) = tokio::time::timeout(connect_timeout, connect_async(url))
            .await
            .map_err(|_| {
                SyncError::Transport(format!(
                    "Timed out connecting to {} after {:?}",
                    url, connect_timeout
                ))
            })??;
        tracing::debug!("Connected to {}", url);

        Ok(Self {
            stream,
            session,
            url: url.to_string(),
            idle_timeout,
        })
    }

    /// Handle the connection until it closes
    ///
    /// Installs a [`ChannelSink`] in the session, then forwards queued
    /// frames to the socket and incoming binary frames to the session.
    /// Returns `Ok(())` on an orderly or peer-initiated close, and the error
    /// otherwise. The caller is responsible for calling `on_close`.
    ///
    /// After `idle_timeout` without any incoming frame the authority is
    /// pinged; if the next interval is silent too, the connection is dropped.
    pub async fn handle(self) -> Result<()> {
        let Connection {
            stream,
            session,
            url,
            idle_timeout,
        } = self;
        let (mut write, mut read) = stream.split();

        let (tx, mut rx) = mpsc::unbounded_channel();
        session.lock().on_open(Box::new(ChannelSink::new(tx)));

        let mut deadline = Instant::now() + idle_timeout;
        let mut ping_sent = false;

        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {
                    if ping_sent {
                        tracing::warn!(
                            "No traffic from {} for {:?}, dropping",
                            url,
                            idle_timeout * 2
                        );
                        return Err(SyncError::Transport(format!(
                            "Authority {} went silent",
                            url
                        )));
                    }
                    tracing::trace!("Pinging idle authority {}", url);
                    if let Err(e) = write.send(WsMessage::Ping(Vec::new())).await {
                        return Self::finish(&session, &url, e);
                    }
                    ping_sent = true;
                    deadline = Instant::now() + idle_timeout;
                }
                outbound = rx.recv() => match outbound {
                    Some(Outbound::Frame(frame)) => {
                        if let Err(e) = write.send(WsMessage::Binary(frame)).await {
                            return Self::finish(&session, &url, e);
                        }
                    }
                    Some(Outbound::Close) | None => {
                        tracing::debug!("Closing connection to {}", url);
                        let _ = write.send(WsMessage::Close(None)).await;
                        return Ok(());
                    }
                },
                incoming = read.next() => {
                    deadline = Instant::now() + idle_timeout;
                    ping_sent = false;
                    match incoming {
                        Some(Ok(WsMessage::Binary(data))) => {
                            let result = session.lock().on_frame(&data);
                            if let Err(e) = result {
                                let _ = write.send(WsMessage::Close(None)).await;
                                return Err(e);
                            }
                        }
                        Some(Ok(WsMessage::Close(frame))) => {
                            tracing::debug!("Authority {} closed the connection: {:?}", url, frame);
                            return Ok(());
                        }
                        Some(Ok(other)) => {
                            tracing::trace!("Ignoring non-binary frame ({} bytes)", other.len());
                        }
                        Some(Err(e)) => return Self::finish(&session, &url, e),
                        None => {
                            tracing::debug!("Connection to {} ended", url);
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    /// Sort transport errors into orderly closes and real failures
    fn finish(
        session: &Arc<Mutex<SyncSession>>,
        url: &str,
        err: tungstenite::Error,
    ) -> Result<()> {
        match err {
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                tracing::debug!("Connection to {} already closed", url);
                Ok(())
            }
            tungstenite::Error::Io(ref e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::ConnectionReset
                        | std::io::ErrorKind::ConnectionAborted
                        | std::io::ErrorKind::BrokenPipe
                        | std::io::ErrorKind::UnexpectedEof
                ) =>
            {
                tracing::debug!("Connection to {} dropped: {}", url, e);
                Ok(())
            }
            other => {
                session.lock().on_error(&other);
                Err(SyncError::from(other))
            }
        }
    }
}
