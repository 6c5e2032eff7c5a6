//! BitPlane Tests
//!
//! Tests verify:
//! - Bit get/set round trip and bounds checking
//! - Population count stays equal to the true popcount over any sequence
//!   of operations (property tests)
//! - Full and partial updates with their change ranges
//! - Subscribe / unsubscribe

use std::ops::Range;
use std::sync::Arc;

use checkbox_sync::bitmap::{count_ones, BitPlane};
use checkbox_sync::SyncError;
use parking_lot::Mutex;
use proptest::prelude::*;

// =============================================================================
// Helper Functions
// =============================================================================

/// Bits of the plane used by the property tests; not a multiple of 8, so
/// the padding bits of the last byte are exercised too
const PROP_BITS: u32 = 1020;
const PROP_BYTES: usize = 128;

#[derive(Debug, Clone)]
enum PlaneOp {
    Set(u32, bool),
    Full(Vec<u8>),
    Partial(usize, Vec<u8>),
}

fn arb_plane_op() -> impl Strategy<Value = PlaneOp> {
    prop_oneof![
        3 => (0..PROP_BITS, any::<bool>()).prop_map(|(index, value)| PlaneOp::Set(index, value)),
        1 => prop::collection::vec(any::<u8>(), PROP_BYTES).prop_map(PlaneOp::Full),
        2 => (0..=PROP_BYTES)
            .prop_flat_map(|offset| {
                (
                    Just(offset),
                    prop::collection::vec(any::<u8>(), 0..=PROP_BYTES - offset),
                )
            })
            .prop_map(|(offset, chunk)| PlaneOp::Partial(offset, chunk)),
    ]
}

fn record_changes(plane: &mut BitPlane) -> Arc<Mutex<Vec<Range<u32>>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    plane.subscribe_to_changes(Box::new(move |range| sink.lock().push(range)));
    seen
}

fn assert_count_consistent(plane: &BitPlane) {
    assert_eq!(plane.checked_count(), count_ones(plane.as_bytes()));
    assert!(plane.checked_count() <= plane.bit_count());
}

// =============================================================================
// Basic Operations Tests
// =============================================================================

#[test]
fn test_new_plane_is_empty() {
    let plane = BitPlane::new(64);
    assert_eq!(plane.bit_count(), 64);
    assert_eq!(plane.byte_len(), 8);
    assert_eq!(plane.checked_count(), 0);
    assert!(plane.as_bytes().iter().all(|&b| b == 0));
}

#[test]
fn test_byte_len_rounds_up() {
    assert_eq!(BitPlane::new(1).byte_len(), 1);
    assert_eq!(BitPlane::new(9).byte_len(), 2);
    assert_eq!(BitPlane::new(0).byte_len(), 0);
}

#[test]
fn test_set_get_round_trip() {
    let mut plane = BitPlane::new(100);
    for i in 0..100 {
        plane.set(i, true).unwrap();
        assert!(plane.get(i).unwrap());
        plane.set(i, false).unwrap();
        assert!(!plane.get(i).unwrap());
    }
}

#[test]
fn test_bit_layout_is_lsb_first() {
    let mut plane = BitPlane::new(16);
    plane.set(0, true).unwrap();
    plane.set(9, true).unwrap();
    assert_eq!(plane.as_bytes(), &[0b0000_0001, 0b0000_0010]);
}

#[test]
fn test_set_is_idempotent_for_count() {
    let mut plane = BitPlane::new(16);
    plane.set(3, true).unwrap();
    plane.set(3, true).unwrap();
    assert_eq!(plane.checked_count(), 1);
    plane.set(3, false).unwrap();
    plane.set(3, false).unwrap();
    assert_eq!(plane.checked_count(), 0);
}

#[test]
fn test_toggle_returns_new_value() {
    let mut plane = BitPlane::new(8);
    assert!(plane.toggle(5).unwrap());
    assert_eq!(plane.checked_count(), 1);
    assert!(!plane.toggle(5).unwrap());
    assert_eq!(plane.checked_count(), 0);
}

#[test]
fn test_out_of_range_index_fails() {
    let mut plane = BitPlane::new(10);
    assert!(matches!(
        plane.get(10),
        Err(SyncError::IndexOutOfRange { index: 10, len: 10 })
    ));
    assert!(plane.set(10, true).is_err());
    assert!(plane.toggle(u32::MAX).is_err());
    assert_eq!(plane.checked_count(), 0);
}

// =============================================================================
// Full State Update Tests
// =============================================================================

#[test]
fn test_full_update_all_ones() {
    let mut plane = BitPlane::new(64);
    let seen = record_changes(&mut plane);

    plane.full_state_update(&[0xFF; 8]).unwrap();

    assert_eq!(plane.checked_count(), 64);
    assert!(plane.get(63).unwrap());
    assert_eq!(*seen.lock(), vec![0..64]);
}

#[test]
fn test_full_update_wrong_length_is_rejected() {
    let mut plane = BitPlane::new(64);
    plane.set(1, true).unwrap();

    let result = plane.full_state_update(&[0xFF; 7]);
    assert!(matches!(
        result,
        Err(SyncError::LengthMismatch {
            expected: 8,
            actual: 7
        })
    ));

    // untouched
    assert_eq!(plane.checked_count(), 1);
    assert!(plane.get(1).unwrap());
}

#[test]
fn test_full_update_masks_bits_past_end() {
    let mut plane = BitPlane::new(10);
    plane.full_state_update(&[0xFF, 0xFF]).unwrap();
    assert_eq!(plane.checked_count(), 10);
    assert_count_consistent(&plane);
}

// =============================================================================
// Partial State Update Tests
// =============================================================================

#[test]
fn test_partial_update_touches_only_its_range() {
    let mut plane = BitPlane::new(64);
    plane.full_state_update(&[0x0F; 8]).unwrap();
    let seen = record_changes(&mut plane);

    plane.partial_state_update(2, &[0xFF, 0x00]).unwrap();

    assert_eq!(
        plane.as_bytes(),
        &[0x0F, 0x0F, 0xFF, 0x00, 0x0F, 0x0F, 0x0F, 0x0F]
    );
    assert_eq!(plane.checked_count(), 6 * 4 + 8);
    assert_eq!(*seen.lock(), vec![16..32]);
}

#[test]
fn test_partial_update_at_end() {
    let mut plane = BitPlane::new(32);
    plane.partial_state_update(3, &[0x81]).unwrap();
    assert!(plane.get(24).unwrap());
    assert!(plane.get(31).unwrap());
    assert_eq!(plane.checked_count(), 2);
}

#[test]
fn test_partial_update_out_of_bounds_is_rejected() {
    let mut plane = BitPlane::new(32);
    let seen = record_changes(&mut plane);

    assert!(matches!(
        plane.partial_state_update(3, &[1, 2]),
        Err(SyncError::RangeOutOfBounds {
            offset: 3,
            len: 2,
            capacity: 4
        })
    ));
    assert!(plane.partial_state_update(usize::MAX, &[1]).is_err());

    assert_eq!(plane.checked_count(), 0);
    assert!(seen.lock().is_empty());
}

#[test]
fn test_partial_update_empty_chunk() {
    let mut plane = BitPlane::new(32);
    let seen = record_changes(&mut plane);
    plane.partial_state_update(4, &[]).unwrap();
    assert_eq!(*seen.lock(), vec![32..32]);
}

// =============================================================================
// Invariant Tests
// =============================================================================

proptest! {
    #[test]
    fn test_popcount_invariant_over_any_operations(
        ops in prop::collection::vec(arb_plane_op(), 1..64)
    ) {
        let mut plane = BitPlane::new(PROP_BITS);
        prop_assert_eq!(plane.byte_len(), PROP_BYTES);

        for op in ops {
            match op {
                PlaneOp::Set(index, value) => {
                    plane.set(index, value).unwrap();
                    prop_assert_eq!(plane.get(index).unwrap(), value);
                }
                PlaneOp::Full(buffer) => plane.full_state_update(&buffer).unwrap(),
                PlaneOp::Partial(offset, chunk) => {
                    plane.partial_state_update(offset, &chunk).unwrap();
                    // the last byte keeps only its addressable bits
                    let unmasked = (offset + chunk.len()).min(PROP_BYTES - 1);
                    if offset < unmasked {
                        prop_assert_eq!(
                            &plane.as_bytes()[offset..unmasked],
                            &chunk[..unmasked - offset]
                        );
                    }
                }
            }
            prop_assert_eq!(plane.checked_count(), count_ones(plane.as_bytes()));
            prop_assert!(plane.checked_count() <= plane.bit_count());
        }
    }

    #[test]
    fn test_set_get_round_trip_for_any_index(
        (bit_count, index) in (1u32..4096).prop_flat_map(|n| (Just(n), 0..n)),
        value in any::<bool>()
    ) {
        let mut plane = BitPlane::new(bit_count);
        plane.set(index, value).unwrap();

        prop_assert_eq!(plane.get(index).unwrap(), value);
        prop_assert_eq!(plane.checked_count(), value as u32);
        prop_assert!(plane.get(bit_count).is_err());
    }
}

#[test]
fn test_clear_resets_everything() {
    let mut plane = BitPlane::new(64);
    plane.full_state_update(&[0xAA; 8]).unwrap();
    let seen = record_changes(&mut plane);

    plane.clear();

    assert_eq!(plane.checked_count(), 0);
    assert!(plane.as_bytes().iter().all(|&b| b == 0));
    assert_eq!(*seen.lock(), vec![0..64]);
}

// =============================================================================
// Subscription Tests
// =============================================================================

#[test]
fn test_set_notifies_containing_byte() {
    let mut plane = BitPlane::new(64);
    let seen = record_changes(&mut plane);

    plane.set(13, true).unwrap();
    // no change, no notification
    plane.set(13, true).unwrap();

    assert_eq!(*seen.lock(), vec![8..16]);
}

#[test]
fn test_unsubscribe_stops_notifications() {
    let mut plane = BitPlane::new(64);
    let first = Arc::new(Mutex::new(0u32));
    let second = Arc::new(Mutex::new(0u32));

    let sink = Arc::clone(&first);
    let first_id = plane.subscribe_to_changes(Box::new(move |_| *sink.lock() += 1));
    let sink = Arc::clone(&second);
    plane.subscribe_to_changes(Box::new(move |_| *sink.lock() += 1));
    assert_eq!(plane.subscriber_count(), 2);

    plane.set(0, true).unwrap();
    assert!(plane.unsubscribe_from_changes(first_id));
    assert!(!plane.unsubscribe_from_changes(first_id));
    plane.set(1, true).unwrap();

    assert_eq!(*first.lock(), 1);
    assert_eq!(*second.lock(), 2);
    assert_eq!(plane.subscriber_count(), 1);
}
