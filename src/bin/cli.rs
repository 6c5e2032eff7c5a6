//! checkbox-sync CLI
//!
//! Command-line observer for the shared checkbox bitmap.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use checkbox_sync::bitmap::Geometry;
use checkbox_sync::snapshot::ChunkSnapshot;
use checkbox_sync::{Config, ConnectionState, SessionListener, SyncClient, SyncError};
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing_subscriber::{fmt, EnvFilter};

/// checkbox-sync CLI
#[derive(Parser, Debug)]
#[command(name = "checkbox-sync")]
#[command(about = "Observe and toggle the shared checkbox bitmap")]
#[command(version)]
struct Args {
    /// Authority WebSocket URL (overrides the config file)
    #[arg(short, long)]
    server: Option<String>,

    /// TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seconds to wait for a chunk to load
    #[arg(long, default_value = "30")]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Follow a chunk and log every change
    Watch {
        /// Chunk to follow
        #[arg(long, default_value = "0")]
        chunk: u32,
    },

    /// Toggle one checkbox by global index
    Toggle {
        /// Global checkbox index
        #[arg(short, long)]
        index: u64,
    },

    /// Save a chunk to a snapshot file
    Dump {
        /// Chunk to save
        #[arg(long)]
        chunk: u32,

        /// Output file, defaults to state-<chunk>.bin
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Write only the bitmap bytes, like the web client's download
        #[arg(long)]
        raw: bool,
    },

    /// Print the contents of a snapshot file
    Inspect {
        /// Snapshot file
        file: PathBuf,

        /// Read a headerless bitmap sized to one chunk
        #[arg(long)]
        raw: bool,

        /// Chunk a raw file belongs to
        #[arg(long, default_value = "0")]
        chunk: u32,
    },
}

/// Forwards session notifications to watch channels and the log
struct CliListener {
    loaded: watch::Sender<bool>,
}

impl SessionListener for CliListener {
    fn loading_changed(&mut self, loading: bool) {
        self.loaded.send_replace(!loading);
    }

    fn connection_state_changed(&mut self, state: ConnectionState) {
        match state {
            ConnectionState::Closed => tracing::warn!("Connection lost, reconnecting..."),
            other => tracing::info!("Connection {}", other),
        }
    }

    fn incompatible_version(&mut self, major: u16, minor: u16) {
        tracing::error!(
            "Authority speaks protocol {}.{}; please update checkbox-sync",
            major,
            minor
        );
    }
}

#[tokio::main]
async fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,checkbox_sync=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    let args = Args::parse();

    tracing::info!("checkbox-sync v{}", checkbox_sync::VERSION);

    if let Err(e) = run(args).await {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> checkbox_sync::Result<()> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(server) = &args.server {
        config.server_url = server.clone();
    }
    if let Commands::Inspect { file, raw, chunk } = &args.command {
        return inspect(file, *raw, *chunk, config.geometry);
    }

    let load_timeout = Duration::from_secs(args.timeout);
    let (loaded_tx, loaded_rx) = watch::channel(false);
    let client = Arc::new(SyncClient::new(
        config,
        Box::new(CliListener { loaded: loaded_tx }),
    )?);
    let handle = client.handle();
    tracing::info!("Authority: {}", client.config().server_url);

    let runner = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.run().await })
    };

    let wait_loaded = || {
        let mut rx = loaded_rx.clone();
        async move {
            match tokio::time::timeout(load_timeout, rx.wait_for(|loaded| *loaded)).await {
                Ok(Ok(_)) => Ok(()),
                Ok(Err(_)) => Err(SyncError::Transport("session stopped".to_string())),
                Err(_) => Err(SyncError::Transport("timed out waiting for chunk".to_string())),
            }
        }
    };

    match args.command {
        Commands::Watch { chunk } => {
            handle.set_chunk_index(chunk)?;
            handle.with_session(|session| {
                session.subscribe_to_changes(Box::new(|range| {
                    tracing::info!("Bits {}..{} changed", range.start, range.end);
                }));
                session.current_clients().subscribe(Box::new(|clients| {
                    tracing::info!("{} online", clients);
                }));
                session.checked_count().subscribe(Box::new(|checked| {
                    tracing::info!("{} checked on this page", checked);
                }));
            });

            let mut runner = runner;
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                outcome = &mut runner => return join_outcome(outcome),
            }

            tracing::info!("Received Ctrl+C, stopping");
            handle.stop();
            wait_runner(runner, load_timeout).await
        }
        Commands::Toggle { index } => {
            toggle(&handle, index, wait_loaded()).await?;
            // queued frames are written before the close frame
            handle.stop();
            wait_runner(runner, load_timeout).await
        }
        Commands::Dump { chunk, out, raw } => {
            handle.set_chunk_index(chunk)?;
            wait_loaded().await?;
            let snapshot = handle.with_session(|session| ChunkSnapshot::capture(session))?;
            handle.stop();
            let path = out.unwrap_or_else(|| PathBuf::from(format!("state-{}.bin", chunk)));
            if raw {
                snapshot.write_raw_to(&path)?;
            } else {
                snapshot.write_to(&path)?;
            }
            println!(
                "chunk {}: {} of {} checked, saved to {}",
                snapshot.chunk_index,
                snapshot.checked_count,
                snapshot.bit_count,
                path.display()
            );
            wait_runner(runner, load_timeout).await
        }
        Commands::Inspect { .. } => Ok(()),
    }
}

async fn toggle(
    handle: &checkbox_sync::SessionHandle,
    index: u64,
    loaded: impl std::future::Future<Output = checkbox_sync::Result<()>>,
) -> checkbox_sync::Result<()> {
    // validates the index and switches to its chunk
    handle.go_to_checkbox(index)?;
    if !handle.is_chunk_loaded() {
        loaded.await?;
    }

    let global_index = index as u32;
    let value = handle.toggle(global_index)?;
    let geometry = handle.with_session(|session| session.geometry());
    println!(
        "checkbox {} (chunk {}, bit {}) is now {}",
        index,
        geometry.chunk_of(global_index),
        geometry.local_index(global_index),
        if value { "checked" } else { "unchecked" }
    );
    Ok(())
}

/// Wait for the driver to close its connection after `stop`
async fn wait_runner(
    runner: tokio::task::JoinHandle<checkbox_sync::Result<()>>,
    limit: Duration,
) -> checkbox_sync::Result<()> {
    match tokio::time::timeout(limit, runner).await {
        Ok(outcome) => join_outcome(outcome),
        Err(_) => Err(SyncError::Transport(
            "timed out closing the connection".to_string(),
        )),
    }
}

fn join_outcome(
    outcome: std::result::Result<checkbox_sync::Result<()>, tokio::task::JoinError>,
) -> checkbox_sync::Result<()> {
    match outcome {
        Ok(result) => result,
        Err(e) => Err(SyncError::Transport(format!("driver task failed: {}", e))),
    }
}

fn inspect(file: &Path, raw: bool, chunk: u32, geometry: Geometry) -> checkbox_sync::Result<()> {
    let snapshot = if raw {
        ChunkSnapshot::read_raw_from(file, chunk, geometry.chunk_size)?
    } else {
        ChunkSnapshot::read_from(file)?
    };
    println!("chunk:   {}", snapshot.chunk_index);
    println!("bits:    {}", snapshot.bit_count);
    println!("checked: {}", snapshot.checked_count);
    Ok(())
}
