//! End-to-end pipeline tests: bootstrap, live streaming, gap recovery and
//! health exposure

use crate::assertions::{assert_books_equal, assert_conserved};
use crate::feeds::ScriptedFeed;
use crate::utils::{add, empty_snapshot, init_tracing, snapshot_of, update};
use replayer::{
    BookConfig, CheckpointConfig, EngineState, Pipeline, RecoveryConfig, ReplayerConfig,
    SequencerConfig, Side,
};
use services_common::Symbol;
use std::time::{Duration, Instant};

fn test_config(dir: &std::path::Path) -> ReplayerConfig {
    ReplayerConfig {
        book: BookConfig::default(),
        sequencer: SequencerConfig {
            lookahead_window: 10,
            hold_timeout: Duration::from_millis(50),
            max_batch_events: 1,
            max_batch_wait: Duration::from_millis(1),
        },
        checkpoint: CheckpointConfig {
            dir: dir.to_path_buf(),
            event_interval: 1,
            time_interval: Duration::from_secs(3600),
        },
        recovery: RecoveryConfig {
            max_retries: 2,
            retry_delay: Duration::from_millis(1),
            max_retry_delay: Duration::from_millis(2),
        },
    }
}

#[test]
fn test_bootstrap_from_snapshot_then_stream() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let feed = ScriptedFeed::snapshot_only(vec![snapshot_of(
        &[(1, Side::Bid, 3_000_000_000_000, 50_000_000)],
        99,
    )]);
    let mut pipeline = Pipeline::new(Symbol::new(1), test_config(dir.path()), feed).unwrap();

    let report = pipeline.bootstrap().unwrap();
    assert!(report.used_snapshot);
    assert!(!report.used_checkpoint);
    assert_eq!(report.resumed_at, 100);

    let now = Instant::now();
    pipeline
        .ingest(add(100, 2, Side::Ask, 3_001_000_000_000, 25_000_000), now)
        .unwrap();
    pipeline
        .ingest(update(101, 1, Side::Bid, 3_000_000_000_000, 30_000_000), now)
        .unwrap();

    let view = pipeline.view();
    assert!((view.best_bid.unwrap().size - 0.3).abs() < 1e-9);
    assert!((view.best_ask.unwrap().price - 30_010.0).abs() < 1e-9);
    assert_eq!(view.applied_through, 101);
    assert_conserved(pipeline.book());

    let health = pipeline.health();
    let snapshot = *health.read();
    assert_eq!(snapshot.state, EngineState::Live);
    assert_eq!(snapshot.last_applied, 101);
    assert_eq!(snapshot.expected_next, 102);
    pipeline.close();
}

#[test]
fn test_gap_recovery_equals_uninterrupted_stream() {
    init_tracing();
    // Sequences 100..=110 with 105 missing; after a snapshot
    // covering through 110 the book equals the uninterrupted replay
    let events: Vec<_> = (0..=10u64)
        .map(|i| {
            let side = if i % 2 == 0 { Side::Bid } else { Side::Ask };
            let price = match side {
                Side::Bid => 3_000_000_000_000 - (i as i64 / 2) * 1_000_000,
                Side::Ask => 3_000_100_000_000 + (i as i64 / 2) * 1_000_000,
            };
            add(100 + i, i + 1, side, price, (10 + i as i64) * 1_000_000)
        })
        .collect();

    // Reference pipeline sees every event
    let ref_dir = tempfile::tempdir().unwrap();
    let ref_feed = ScriptedFeed::snapshot_only(vec![empty_snapshot(99)]);
    let mut reference =
        Pipeline::new(Symbol::new(2), test_config(ref_dir.path()), ref_feed).unwrap();
    reference.bootstrap().unwrap();
    let now = Instant::now();
    for event in &events {
        reference.ingest(*event, now).unwrap();
    }

    // The snapshot the feed serves on recovery mirrors the reference book
    let resting: Vec<(u64, Side, i64, i64)> = reference
        .book()
        .orders()
        .map(|(id, rec)| (id, rec.side, rec.price.as_i64(), rec.size.as_i64()))
        .collect();
    let recovery_snapshot = snapshot_of(&resting, 110);

    let dir = tempfile::tempdir().unwrap();
    let feed =
        ScriptedFeed::snapshot_only(vec![empty_snapshot(99), recovery_snapshot]);
    let mut pipeline = Pipeline::new(Symbol::new(2), test_config(dir.path()), feed).unwrap();
    pipeline.bootstrap().unwrap();

    for event in &events {
        if event.sequence == 105 {
            continue; // the hole
        }
        pipeline.ingest(*event, now).unwrap();
    }
    // Events 106..=110 sit in the reorder buffer; the hold timeout expires
    // and the pipeline recovers through the snapshot
    pipeline.poll(now + Duration::from_millis(60)).unwrap();

    assert_eq!(pipeline.health().read().gaps, 1);
    assert_books_equal(reference.book(), pipeline.book());
    assert_conserved(pipeline.book());
    pipeline.close();
    reference.close();
}

#[test]
fn test_checkpoint_resume_recovery() {
    let dir = tempfile::tempdir().unwrap();
    let mut feed = ScriptedFeed::resumable();
    feed.snapshots.push_back(empty_snapshot(99));
    let mut pipeline = Pipeline::new(Symbol::new(4), test_config(dir.path()), feed).unwrap();
    pipeline.bootstrap().unwrap();

    let now = Instant::now();
    for seq in 100..=104 {
        pipeline
            .ingest(
                add(seq, seq, Side::Bid, 3_000_000_000_000 - seq as i64, 1_000_000),
                now,
            )
            .unwrap();
    }
    let pre_gap_hash = pipeline.book().state_hash();

    // Wait until the background writer has a checkpoint covering 104
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        pipeline.poll(Instant::now()).unwrap();
        if pipeline.health().read().last_checkpoint >= 104 {
            break;
        }
        assert!(Instant::now() < deadline, "checkpoint writer never caught up");
        std::thread::sleep(Duration::from_millis(5));
    }

    // An event far beyond the look-ahead window declares a gap; the feed
    // honors an incremental resume from the checkpoint
    pipeline
        .ingest(add(500, 999, Side::Ask, 3_100_000_000_000, 1_000_000), now)
        .unwrap();

    let health = *pipeline.health().read();
    assert_eq!(health.state, EngineState::Live);
    assert_eq!(health.gaps, 1);
    assert_eq!(pipeline.book().state_hash(), pre_gap_hash);
    assert_eq!(pipeline.book().applied_through(), 104);

    // The stream replays from the resume point as requested
    pipeline
        .ingest(add(105, 105, Side::Ask, 3_100_000_000_000, 2_000_000), now)
        .unwrap();
    assert_eq!(pipeline.book().applied_through(), 105);
    assert_conserved(pipeline.book());
    pipeline.close();
}

#[test]
fn test_feed_failure_surfaces_after_bounded_retries() {
    let dir = tempfile::tempdir().unwrap();
    let feed = ScriptedFeed {
        allow_resume: false,
        fail_first: 10, // more failures than the retry budget
        ..ScriptedFeed::default()
    };
    let mut pipeline = Pipeline::new(Symbol::new(5), test_config(dir.path()), feed).unwrap();

    let err = pipeline.bootstrap().unwrap_err();
    assert!(format!("{err:#}").contains("feed unavailable"));
    assert_eq!(pipeline.health().read().state, EngineState::Halted);
}

#[test]
fn test_duplicate_events_counted_in_health() {
    let dir = tempfile::tempdir().unwrap();
    let feed = ScriptedFeed::snapshot_only(vec![empty_snapshot(0)]);
    let mut pipeline = Pipeline::new(Symbol::new(6), test_config(dir.path()), feed).unwrap();
    pipeline.bootstrap().unwrap();

    let now = Instant::now();
    let event = add(1, 1, Side::Bid, 1_000_000_000, 100);
    pipeline.ingest(event, now).unwrap();
    pipeline.ingest(event, now).unwrap();
    pipeline.ingest(event, now).unwrap();

    let health = *pipeline.health().read();
    assert_eq!(health.duplicates, 2);
    assert_eq!(health.last_applied, 1);
    pipeline.close();
}
