//! Tier-migration tests for the hybrid price-level store
//!
//! The near-touch array and the deep map partition the side's levels;
//! every migration between them must preserve aggregated volume exactly.

use replayer::errors::ReplayError;
use replayer::ladder::Ladder;
use replayer::Side;
use services_common::{Px, Qty};

const TICK: i64 = 1_000_000; // 0.01 at 8 decimal places
const DEPTH: usize = 5;

fn bid_ladder() -> Ladder {
    Ladder::new(Side::Bid, DEPTH, TICK)
}

fn ask_ladder() -> Ladder {
    Ladder::new(Side::Ask, DEPTH, TICK)
}

#[test]
fn test_new_best_bid_migrates_displaced_level_to_deep() {
    let mut ladder = bid_ladder();
    let base = 3_000_000_000_000;
    // Fill the whole window: base, base-1t, ..., base-4t
    for i in 0..DEPTH as i64 {
        ladder.add(base - i * TICK, 10 + i);
    }
    assert_eq!(ladder.level_count(), DEPTH);
    assert!(ladder.in_near_tier(base - 4 * TICK));

    // A better bid arrives one tick above: the deepest level must fall out
    // of the window into the deep map with unchanged volume
    ladder.add(base + TICK, 7);
    assert_eq!(
        ladder.best(),
        Some((Px::from_i64(base + TICK), Qty::from_i64(7)))
    );
    assert!(!ladder.in_near_tier(base - 4 * TICK));
    assert_eq!(ladder.volume_at(base - 4 * TICK), 14);
    assert_eq!(ladder.total_volume(), 7 + 10 + 11 + 12 + 13 + 14);
}

#[test]
fn test_best_removal_pulls_deep_level_back_into_window() {
    let mut ladder = ask_ladder();
    let base = 3_000_000_000_000;
    for i in 0..DEPTH as i64 {
        ladder.add(base + i * TICK, 10 + i);
    }
    // One level beyond the window
    ladder.add(base + 5 * TICK, 42);
    assert!(!ladder.in_near_tier(base + 5 * TICK));

    // Best empties; the window slides down one tick and the deep level
    // re-enters the array with its volume intact
    ladder.remove(base, 10).unwrap();
    assert_eq!(
        ladder.best(),
        Some((Px::from_i64(base + TICK), Qty::from_i64(11)))
    );
    assert!(ladder.in_near_tier(base + 5 * TICK));
    assert_eq!(ladder.volume_at(base + 5 * TICK), 42);
}

#[test]
fn test_zero_volume_level_is_removed_not_retained() {
    let mut ladder = bid_ladder();
    ladder.add(1_000_000_000, 5);
    ladder.add(999_000_000, 3);
    ladder.remove(999_000_000, 3).unwrap();
    assert_eq!(ladder.level_count(), 1);
    assert_eq!(ladder.volume_at(999_000_000), 0);

    // Same for a deep level
    ladder.add(1_000_000_000 - 20 * TICK, 9);
    ladder.remove(1_000_000_000 - 20 * TICK, 9).unwrap();
    assert_eq!(ladder.level_count(), 1);
}

#[test]
fn test_decrement_below_zero_is_fatal_not_clamped() {
    let mut ladder = bid_ladder();
    ladder.add(1_000_000_000, 5);
    let err = ladder.remove(1_000_000_000, 6).unwrap_err();
    match err {
        ReplayError::NegativeLevel { have, take, .. } => {
            assert_eq!(have.as_i64(), 5);
            assert_eq!(take.as_i64(), 6);
        }
        other => panic!("expected NegativeLevel, got {other:?}"),
    }
    // The failed decrement left the level untouched
    assert_eq!(ladder.volume_at(1_000_000_000), 5);

    // Removing from a price with no level at all is the same violation
    assert!(ladder.remove(999_000_000, 1).is_err());
}

#[test]
fn test_side_empties_completely() {
    let mut ladder = ask_ladder();
    ladder.add(2_000_000_000, 4);
    ladder.add(2_000_000_000 + 30 * TICK, 6);
    ladder.remove(2_000_000_000, 4).unwrap();
    ladder.remove(2_000_000_000 + 30 * TICK, 6).unwrap();
    assert!(ladder.is_empty());
    assert_eq!(ladder.best(), None);
    assert!(ladder.top_levels().is_empty());
}

#[test]
fn test_deep_view_sorted_on_demand() {
    let mut ladder = bid_ladder();
    let base = 1_000_000_000_000;
    ladder.add(base, 1);
    // Insert deep levels out of order
    for offset in [40, 10, 30, 20] {
        ladder.add(base - offset * TICK, offset);
    }
    let deep = ladder.deep_levels();
    let prices: Vec<i64> = deep.iter().map(|(px, _)| px.as_i64()).collect();
    assert_eq!(
        prices,
        vec![
            base - 10 * TICK,
            base - 20 * TICK,
            base - 30 * TICK,
            base - 40 * TICK
        ]
    );
}

#[test]
fn test_large_best_jump_rebases_entire_window() {
    let mut ladder = bid_ladder();
    let base = 1_000_000_000_000;
    ladder.add(base, 3);
    ladder.add(base - TICK, 4);
    // Best jumps far beyond the window width
    ladder.add(base + 100 * TICK, 8);
    assert_eq!(
        ladder.best(),
        Some((Px::from_i64(base + 100 * TICK), Qty::from_i64(8)))
    );
    // Old near levels migrated to deep, volumes unchanged
    assert_eq!(ladder.volume_at(base), 3);
    assert_eq!(ladder.volume_at(base - TICK), 4);
    assert!(!ladder.in_near_tier(base));
    assert_eq!(ladder.total_volume(), 15);
}
