//! The replay engine state machine
//!
//! Consumes validated micro-batches and applies them transactionally to the
//! book. Three states:
//! - `Live`: normal streaming application through the pending queue
//! - `SnapshotRebuild`: the old state is abandoned and a fresh one is
//!   accumulated from snapshot-body events until the end marker installs it
//! - `Halted`: a fatal consistency violation was observed; every mutation is
//!   refused until recovery resets the engine

use crate::book::{BookState, OrderRecord};
use crate::config::BookConfig;
use crate::errors::ReplayError;
use crate::events::{Batch, DeltaEvent, EventKind};
use crate::pending::PendingQueue;
use services_common::Symbol;
use tracing::{debug, info, warn};

/// Replay engine lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Normal streaming application
    Live,
    /// Discarding old state, ingesting a fresh full snapshot
    SnapshotRebuild,
    /// Fatal inconsistency observed; refuses mutation until reset
    Halted,
}

/// Anomaly and throughput counters for one engine
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineCounters {
    /// Batches committed
    pub batches_applied: u64,
    /// Events committed (markers excluded)
    pub events_applied: u64,
    /// ADDs ignored because the order already existed
    pub duplicate_adds: u64,
    /// UPDATE/CANCELs skipped because the order was never seen
    pub unknown_orders: u64,
    /// Snapshot rebuilds started
    pub snapshot_rebuilds: u64,
    /// Batches rejected wholesale on a fatal violation
    pub rejected_batches: u64,
    /// Events inside snapshot framing that were not ADDs, plus deltas that
    /// arrived before the bootstrap snapshot
    pub framing_anomalies: u64,
}

/// The per-instrument replay engine
#[derive(Debug)]
pub struct Replayer {
    symbol: Symbol,
    cfg: BookConfig,
    state: EngineState,
    book: BookState,
    /// Fresh state accumulated between snapshot markers; the live book is
    /// untouched until the end marker installs this
    rebuild: Option<BookState>,
    /// Reused across batches so the staging maps stop allocating once they
    /// have seen the working set
    pending: PendingQueue,
    counters: EngineCounters,
}

impl Replayer {
    /// Create an engine awaiting its bootstrap snapshot
    #[must_use]
    pub fn new(symbol: Symbol, cfg: BookConfig) -> Self {
        Self {
            symbol,
            cfg,
            state: EngineState::SnapshotRebuild,
            book: BookState::new(symbol, &cfg),
            rebuild: None,
            pending: PendingQueue::new(),
            counters: EngineCounters::default(),
        }
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Whether the engine refuses mutation
    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.state == EngineState::Halted
    }

    /// The live book
    #[must_use]
    pub fn book(&self) -> &BookState {
        &self.book
    }

    /// Engine counters
    #[must_use]
    pub fn counters(&self) -> EngineCounters {
        self.counters
    }

    /// Apply one validated micro-batch
    ///
    /// Commits atomically: either every event in the batch takes effect or
    /// none does. A fatal violation rejects the batch, halts the engine and
    /// returns the error for the pipeline to escalate into recovery.
    pub fn apply_batch(&mut self, batch: &Batch) -> Result<(), ReplayError> {
        if self.state == EngineState::Halted {
            return Err(ReplayError::Halted);
        }
        if batch.is_empty() {
            return Ok(());
        }
        if batch.is_marker() {
            self.apply_marker(&batch.events[0]);
            return Ok(());
        }
        match self.state {
            EngineState::SnapshotRebuild => {
                for event in &batch.events {
                    self.apply_rebuild_event(event);
                }
                Ok(())
            }
            EngineState::Live => self.apply_live(batch),
            EngineState::Halted => Err(ReplayError::Halted),
        }
    }

    /// Apply a single event; used by recovery when driving a snapshot
    /// without the sequencer in the loop
    pub fn apply_event(&mut self, event: &DeltaEvent) -> Result<(), ReplayError> {
        if self.state == EngineState::Halted {
            return Err(ReplayError::Halted);
        }
        if event.is_marker() {
            self.apply_marker(event);
            return Ok(());
        }
        match self.state {
            EngineState::SnapshotRebuild => {
                self.apply_rebuild_event(event);
                Ok(())
            }
            _ => {
                let batch = Batch {
                    events: vec![*event],
                };
                self.apply_live(&batch)
            }
        }
    }

    /// Install a recovered book and go live (checkpoint-based recovery)
    pub fn install(&mut self, book: BookState) {
        info!(
            symbol = %self.symbol,
            applied_through = book.applied_through(),
            "installing recovered book state"
        );
        self.book = book;
        self.rebuild = None;
        self.state = EngineState::Live;
    }

    /// External reset out of `Halted`: back to awaiting a snapshot, book
    /// preserved until the rebuild replaces it
    pub fn reset(&mut self) {
        info!(symbol = %self.symbol, "engine reset; awaiting snapshot rebuild");
        self.rebuild = None;
        self.state = EngineState::SnapshotRebuild;
    }

    /// Force the halted state (used when a collaborator detects corruption)
    pub fn halt(&mut self) {
        warn!(symbol = %self.symbol, "engine halted");
        self.state = EngineState::Halted;
    }

    fn apply_live(&mut self, batch: &Batch) -> Result<(), ReplayError> {
        self.pending.reset();
        for event in &batch.events {
            if event.is_marker() {
                // The sequencer frames markers into their own batches; one
                // slipping through means the contract upstream broke
                self.counters.framing_anomalies += 1;
                continue;
            }
            if let Err(err) = self.pending.stage(&self.book, event) {
                self.counters.duplicate_adds += self.pending.duplicate_adds;
                self.counters.unknown_orders += self.pending.unknown_orders;
                self.counters.rejected_batches += 1;
                self.pending.reset();
                self.state = EngineState::Halted;
                warn!(
                    symbol = %self.symbol,
                    sequence = event.sequence,
                    %err,
                    "fatal consistency violation; batch rejected, engine halted"
                );
                return Err(err);
            }
        }
        let staged = self.pending.staged();
        self.counters.duplicate_adds += self.pending.duplicate_adds;
        self.counters.unknown_orders += self.pending.unknown_orders;
        if let Err(err) = self.pending.commit(&mut self.book) {
            // Staging validated every decrement, so a commit failure means
            // the book itself is corrupt
            self.counters.rejected_batches += 1;
            self.pending.reset();
            self.state = EngineState::Halted;
            warn!(symbol = %self.symbol, %err, "commit failed; engine halted");
            return Err(err);
        }
        if let Some(last) = batch.last_sequence() {
            self.book.set_applied_through(last);
        }
        self.counters.batches_applied += 1;
        self.counters.events_applied += staged;
        Ok(())
    }

    fn apply_marker(&mut self, event: &DeltaEvent) {
        match event.kind {
            EventKind::SnapshotBegin => {
                info!(
                    symbol = %self.symbol,
                    sequence = event.sequence,
                    "snapshot begin; rebuilding book from scratch"
                );
                self.rebuild = Some(BookState::new(self.symbol, &self.cfg));
                self.state = EngineState::SnapshotRebuild;
                self.counters.snapshot_rebuilds += 1;
            }
            EventKind::SnapshotEnd => match self.rebuild.take() {
                Some(mut fresh) => {
                    fresh.set_applied_through(event.sequence);
                    debug!(
                        symbol = %self.symbol,
                        sequence = event.sequence,
                        orders = fresh.order_count(),
                        "snapshot end; installing rebuilt book"
                    );
                    self.book = fresh;
                    self.state = EngineState::Live;
                }
                None => {
                    warn!(
                        symbol = %self.symbol,
                        sequence = event.sequence,
                        "snapshot end without begin; ignored"
                    );
                    self.counters.framing_anomalies += 1;
                }
            },
            _ => {}
        }
    }

    /// Snapshot bodies are ADD-only; anything else is a framing anomaly.
    /// Deltas that arrive before the bootstrap snapshot have no state to
    /// apply against and are skipped the same way.
    fn apply_rebuild_event(&mut self, event: &DeltaEvent) {
        let Some(fresh) = self.rebuild.as_mut() else {
            self.counters.framing_anomalies += 1;
            return;
        };
        if event.kind != EventKind::Add {
            warn!(
                symbol = %self.symbol,
                sequence = event.sequence,
                kind = ?event.kind,
                "non-ADD event inside snapshot framing; skipped"
            );
            self.counters.framing_anomalies += 1;
            return;
        }
        if fresh.order(event.order_id).is_some() {
            self.counters.duplicate_adds += 1;
            return;
        }
        fresh.insert_order(
            event.order_id,
            OrderRecord {
                side: event.side,
                price: event.price,
                size: event.size,
                ts: event.event_time,
            },
        );
        fresh
            .ladder_mut(event.side)
            .add(event.price.as_i64(), event.size.as_i64());
        self.counters.events_applied += 1;
    }
}
