//! Chunk Snapshot Tests
//!
//! Tests verify:
//! - Write / read through a file
//! - Raw bitmap files without a header
//! - Corruption, bad magic and truncation are detected
//! - Applying a snapshot to a plane
//! - Capturing from a session only after its chunk loaded

use checkbox_sync::bitmap::{BitPlane, Geometry};
use checkbox_sync::protocol::{encode, Message};
use checkbox_sync::session::NoopListener;
use checkbox_sync::snapshot::{ChunkSnapshot, PREAMBLE_SIZE};
use checkbox_sync::{Config, SyncError, SyncSession};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn sample_snapshot() -> ChunkSnapshot {
    let mut plane = BitPlane::new(64);
    plane
        .full_state_update(&[0x01, 0x03, 0x07, 0x0F, 0x00, 0x00, 0xF0, 0xFF])
        .unwrap();
    ChunkSnapshot::from_plane(3, &plane)
}

fn assert_snapshot_error<T: std::fmt::Debug>(result: checkbox_sync::Result<T>) {
    assert!(
        matches!(result, Err(SyncError::Snapshot(_))),
        "expected snapshot error, got {:?}",
        result
    );
}

// =============================================================================
// File Tests
// =============================================================================

#[test]
fn test_write_and_read_back() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("chunk-3.bin");
    let snapshot = sample_snapshot();

    snapshot.write_to(&path).unwrap();
    let loaded = ChunkSnapshot::read_from(&path).unwrap();

    assert_eq!(loaded, snapshot);
    assert_eq!(loaded.checked_count, 1 + 2 + 3 + 4 + 4 + 8);
}

#[test]
fn test_write_replaces_existing_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("chunk.bin");
    std::fs::write(&path, vec![0xEE; 4096]).unwrap();

    let snapshot = sample_snapshot();
    snapshot.write_to(&path).unwrap();

    assert_eq!(ChunkSnapshot::read_from(&path).unwrap(), snapshot);
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = TempDir::new().unwrap();
    let result = ChunkSnapshot::read_from(&dir.path().join("absent.bin"));
    assert!(matches!(result, Err(SyncError::Io(_))));
}

#[test]
fn test_raw_file_holds_only_the_bitmap() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state-3.bin");
    let snapshot = sample_snapshot();

    snapshot.write_raw_to(&path).unwrap();

    assert_eq!(std::fs::read(&path).unwrap(), snapshot.bytes);
    let loaded = ChunkSnapshot::read_raw_from(&path, 3, 64).unwrap();
    assert_eq!(loaded, snapshot);
}

#[test]
fn test_raw_file_of_wrong_size_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state-0.bin");
    std::fs::write(&path, vec![0xFF; 7]).unwrap();

    assert_snapshot_error(ChunkSnapshot::read_raw_from(&path, 0, 64));
}

#[test]
fn test_raw_bitmap_padding_is_cleared() {
    let snapshot = ChunkSnapshot::from_raw(1, 12, vec![0xFF, 0xFF]).unwrap();
    assert_eq!(snapshot.bytes, vec![0xFF, 0x0F]);
    assert_eq!(snapshot.checked_count, 12);
}

// =============================================================================
// Corruption Tests
// =============================================================================

#[test]
fn test_flipped_bitmap_byte_is_detected() {
    let mut bytes = sample_snapshot().encode().unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0x10;
    assert_snapshot_error(ChunkSnapshot::decode(&bytes));
}

#[test]
fn test_bad_magic_is_rejected() {
    let mut bytes = sample_snapshot().encode().unwrap();
    bytes[0] = b'X';
    assert_snapshot_error(ChunkSnapshot::decode(&bytes));
}

#[test]
fn test_unknown_version_is_rejected() {
    let mut bytes = sample_snapshot().encode().unwrap();
    bytes[4] = 0x7F;
    assert_snapshot_error(ChunkSnapshot::decode(&bytes));
}

#[test]
fn test_oversized_header_is_rejected() {
    let mut bytes = sample_snapshot().encode().unwrap();
    bytes[6..10].copy_from_slice(&u32::MAX.to_le_bytes());
    assert_snapshot_error(ChunkSnapshot::decode(&bytes));
}

#[test]
fn test_truncated_file_is_rejected() {
    let bytes = sample_snapshot().encode().unwrap();
    assert!(ChunkSnapshot::decode(&bytes[..bytes.len() - 1]).is_err());
    assert!(ChunkSnapshot::decode(&bytes[..PREAMBLE_SIZE - 1]).is_err());
    assert!(ChunkSnapshot::decode(&[]).is_err());
}

// =============================================================================
// Plane Tests
// =============================================================================

#[test]
fn test_apply_to_plane() {
    let snapshot = sample_snapshot();
    let mut plane = BitPlane::new(64);
    plane.set(40, true).unwrap();

    snapshot.apply_to(&mut plane).unwrap();

    assert_eq!(plane.as_bytes(), snapshot.bytes.as_slice());
    assert_eq!(plane.checked_count(), snapshot.checked_count);
}

#[test]
fn test_apply_to_wrong_size_plane_fails() {
    let snapshot = sample_snapshot();
    let mut plane = BitPlane::new(128);
    assert_snapshot_error(snapshot.apply_to(&mut plane));
    assert_eq!(plane.checked_count(), 0);
}

// =============================================================================
// Session Capture Tests
// =============================================================================

#[test]
fn test_capture_requires_loaded_chunk() {
    let config = Config::builder()
        .geometry(Geometry::new(64, 4))
        .initial_chunk_index(1)
        .build();
    let mut session = SyncSession::new(&config, Box::new(NoopListener)).unwrap();

    assert_snapshot_error(ChunkSnapshot::capture(&session));

    let frame = encode(&Message::ChunkFullStateResponse {
        chunk_index: 1,
        bitmap: vec![0xAA; 8],
    });
    session.on_frame(&frame).unwrap();

    let snapshot = ChunkSnapshot::capture(&session).unwrap();
    assert_eq!(snapshot.chunk_index, 1);
    assert_eq!(snapshot.bit_count, 64);
    assert_eq!(snapshot.checked_count, 32);
}
