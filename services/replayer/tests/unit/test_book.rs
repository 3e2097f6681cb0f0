//! Book state tests: the canonical add/update/cancel lifecycle and the
//! outbound view boundary

use crate::assertions::assert_conserved;
use crate::utils::{add, cancel, update};
use replayer::{Batch, BookConfig, EngineState, Replayer, Side};
use services_common::{Px, Qty, Symbol, Ts};

fn live_engine() -> Replayer {
    let mut engine = Replayer::new(Symbol::new(1), BookConfig::default());
    engine
        .apply_event(&replayer::DeltaEvent::snapshot_begin(0, Ts::from_nanos(0)))
        .unwrap();
    engine
        .apply_event(&replayer::DeltaEvent::snapshot_end(0, Ts::from_nanos(0)))
        .unwrap();
    assert_eq!(engine.state(), EngineState::Live);
    engine
}

#[test]
fn test_add_update_cancel_lifecycle() {
    let mut engine = live_engine();
    let price = 3_000_000_000_000;

    engine
        .apply_batch(&Batch {
            events: vec![add(1, 1, Side::Bid, price, 50_000_000)],
        })
        .unwrap();
    assert_eq!(
        engine.book().best_bid(),
        Some((Px::from_i64(price), Qty::from_i64(50_000_000)))
    );
    assert_conserved(engine.book());

    engine
        .apply_batch(&Batch {
            events: vec![update(2, 1, Side::Bid, price, 30_000_000)],
        })
        .unwrap();
    assert_eq!(
        engine.book().best_bid(),
        Some((Px::from_i64(price), Qty::from_i64(30_000_000)))
    );
    assert_conserved(engine.book());

    engine
        .apply_batch(&Batch {
            events: vec![cancel(3, 1, Side::Bid)],
        })
        .unwrap();
    assert_eq!(engine.book().best_bid(), None);
    assert_eq!(engine.book().level_volume(Side::Bid, price), 0);
    assert_eq!(engine.book().order_count(), 0);
    assert_conserved(engine.book());
}

#[test]
fn test_update_migrates_order_between_prices() {
    let mut engine = live_engine();
    let tick = BookConfig::default().tick_size;
    let base = 3_000_000_000_000;

    engine
        .apply_batch(&Batch {
            events: vec![
                add(1, 1, Side::Ask, base, 10_000_000),
                add(2, 2, Side::Ask, base, 20_000_000),
            ],
        })
        .unwrap();
    assert_eq!(engine.book().level_volume(Side::Ask, base), 30_000_000);

    // Order 1 re-prices one tick away; both levels stay consistent
    engine
        .apply_batch(&Batch {
            events: vec![update(3, 1, Side::Ask, base + tick, 10_000_000)],
        })
        .unwrap();
    assert_eq!(engine.book().level_volume(Side::Ask, base), 20_000_000);
    assert_eq!(engine.book().level_volume(Side::Ask, base + tick), 10_000_000);
    assert_conserved(engine.book());
}

#[test]
fn test_watermarks_track_applied_batches() {
    let mut engine = live_engine();
    engine
        .apply_batch(&Batch {
            events: vec![
                add(5, 1, Side::Bid, 1_000_000_000, 100),
                add(6, 2, Side::Ask, 2_000_000_000, 100),
            ],
        })
        .unwrap();
    assert_eq!(engine.book().applied_through(), 6);
    assert_eq!(engine.book().expected_next(), 7);
}

#[test]
fn test_view_converts_to_decimal_at_boundary() {
    let mut engine = live_engine();
    engine
        .apply_batch(&Batch {
            events: vec![
                add(1, 1, Side::Bid, 3_000_000_000_000, 50_000_000),
                add(2, 2, Side::Ask, 3_000_100_000_000, 25_000_000),
            ],
        })
        .unwrap();
    let view = engine.book().view();
    let bid = view.best_bid.unwrap();
    assert!((bid.price - 30_000.0).abs() < 1e-9);
    assert!((bid.size - 0.5).abs() < 1e-9);
    let ask = view.best_ask.unwrap();
    assert!((ask.price - 30_001.0).abs() < 1e-9);
    assert!((ask.size - 0.25).abs() < 1e-9);
    assert!((view.spread.unwrap() - 1.0).abs() < 1e-9);
    assert_eq!(view.applied_through, 2);
}

#[test]
fn test_deep_view_spans_both_tiers_sorted() {
    let mut engine = live_engine();
    let cfg = BookConfig::default();
    let base = 1_000_000_000_000;
    let mut events = Vec::new();
    // More levels than the near-touch window holds
    for i in 0..(cfg.top_depth as i64 + 5) {
        events.push(add(
            (i + 1) as u64,
            (i + 1) as u64,
            Side::Bid,
            base - i * cfg.tick_size,
            100 + i,
        ));
    }
    engine.apply_batch(&Batch { events }).unwrap();

    let deep = engine.book().deep_view(Side::Bid);
    assert_eq!(deep.len(), cfg.top_depth + 5);
    // Strictly descending prices for the bid side
    for pair in deep.windows(2) {
        assert!(pair[0].price > pair[1].price);
    }
    assert_conserved(engine.book());
}
