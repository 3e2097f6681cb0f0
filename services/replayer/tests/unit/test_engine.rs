//! Engine state machine tests: snapshot rebuild, batch atomicity and
//! idempotent replay

use crate::assertions::{assert_books_equal, assert_conserved};
use crate::utils::{add, cancel, empty_snapshot, snapshot_of, update};
use replayer::{Batch, BookConfig, DeltaEvent, EngineState, Replayer, Side};
use services_common::{Px, Qty, Symbol, Ts};

fn engine() -> Replayer {
    Replayer::new(Symbol::new(7), BookConfig::default())
}

fn bootstrap(engine: &mut Replayer, end: u64) {
    for event in empty_snapshot(end) {
        engine.apply_event(&event).unwrap();
    }
    assert_eq!(engine.state(), EngineState::Live);
}

#[test]
fn test_snapshot_rebuild_replaces_state_atomically() {
    let mut engine = engine();
    bootstrap(&mut engine, 0);
    engine
        .apply_batch(&Batch {
            events: vec![
                add(1, 1, Side::Bid, 1_000_000_000, 500),
                add(2, 2, Side::Ask, 2_000_000_000, 300),
            ],
        })
        .unwrap();
    assert_eq!(engine.book().order_count(), 2);

    // A mid-stream snapshot discards the old book wholesale
    let snapshot = snapshot_of(&[(9, Side::Bid, 1_500_000_000, 250)], 10);
    for event in &snapshot {
        engine.apply_event(event).unwrap();
    }
    assert_eq!(engine.state(), EngineState::Live);
    assert_eq!(engine.book().order_count(), 1);
    assert_eq!(engine.book().expected_next(), 11);
    assert_eq!(
        engine.book().best_bid(),
        Some((Px::from_i64(1_500_000_000), Qty::from_i64(250)))
    );
    assert_conserved(engine.book());
}

#[test]
fn test_old_state_untouched_until_snapshot_end() {
    let mut engine = engine();
    bootstrap(&mut engine, 0);
    engine
        .apply_batch(&Batch {
            events: vec![add(1, 1, Side::Bid, 1_000_000_000, 500)],
        })
        .unwrap();

    engine
        .apply_event(&DeltaEvent::snapshot_begin(5, Ts::from_nanos(5)))
        .unwrap();
    engine
        .apply_event(&add(6, 2, Side::Bid, 2_000_000_000, 100))
        .unwrap();
    // Between the markers the live book still serves the old state
    assert_eq!(engine.book().order_count(), 1);
    assert_eq!(
        engine.book().best_bid(),
        Some((Px::from_i64(1_000_000_000), Qty::from_i64(500)))
    );

    engine
        .apply_event(&DeltaEvent::snapshot_end(7, Ts::from_nanos(7)))
        .unwrap();
    assert_eq!(engine.book().order_count(), 1);
    assert_eq!(
        engine.book().best_bid(),
        Some((Px::from_i64(2_000_000_000), Qty::from_i64(100)))
    );
}

#[test]
fn test_unknown_orders_skipped_and_counted() {
    let mut engine = engine();
    bootstrap(&mut engine, 0);
    engine
        .apply_batch(&Batch {
            events: vec![
                update(1, 99, Side::Bid, 1_000_000_000, 500),
                cancel(2, 98, Side::Ask),
                add(3, 1, Side::Bid, 1_000_000_000, 500),
            ],
        })
        .unwrap();
    assert_eq!(engine.state(), EngineState::Live);
    assert_eq!(engine.counters().unknown_orders, 2);
    assert_eq!(engine.book().order_count(), 1);
    assert_conserved(engine.book());
}

#[test]
fn test_replaying_the_same_stream_is_idempotent() {
    use replayer::{Sequencer, SequencerConfig};
    use std::time::Instant;

    let stream: Vec<DeltaEvent> = vec![
        add(1, 1, Side::Bid, 1_000_000_000, 500),
        add(2, 2, Side::Ask, 2_000_000_000, 300),
        update(3, 1, Side::Bid, 1_001_000_000, 400),
        add(4, 3, Side::Bid, 999_000_000, 200),
        cancel(5, 2, Side::Ask),
    ];

    let mut reference = engine();
    bootstrap(&mut reference, 0);
    reference
        .apply_batch(&Batch {
            events: stream.clone(),
        })
        .unwrap();

    // Same stream twice through the sequencer: the second pass sits below
    // the watermark and every event is discarded as a duplicate
    let mut seq = Sequencer::new(SequencerConfig::default());
    let mut engine = self::engine();
    bootstrap(&mut engine, 0);
    let now = Instant::now();
    for _pass in 0..2 {
        for event in &stream {
            seq.offer(*event, now).unwrap();
        }
    }
    seq.poll(now + SequencerConfig::default().max_batch_wait).unwrap();
    while let Some(batch) = seq.next_batch() {
        engine.apply_batch(&batch).unwrap();
    }

    assert_eq!(seq.counters().duplicates, stream.len() as u64);
    assert_books_equal(reference.book(), engine.book());
    assert_conserved(engine.book());
}

#[test]
fn test_transient_anomalies_do_not_reject_batch() {
    let mut engine = engine();
    for event in snapshot_of(&[(1, Side::Bid, 1_000_000_000, 500)], 10) {
        engine.apply_event(&event).unwrap();
    }

    // A duplicated cancel resolves the second occurrence as unknown, which
    // is counted and skipped; the rest of the batch still commits
    engine
        .apply_batch(&Batch {
            events: vec![
                update(11, 1, Side::Bid, 1_000_000_000, 200),
                cancel(12, 1, Side::Bid),
                cancel(13, 1, Side::Bid),
            ],
        })
        .unwrap();
    assert_eq!(engine.state(), EngineState::Live);
    assert_eq!(engine.counters().unknown_orders, 1);
    assert_eq!(engine.book().applied_through(), 13);
    assert_eq!(engine.book().order_count(), 0);
    assert_conserved(engine.book());
}
