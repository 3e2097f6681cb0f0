//! Per-instrument pipeline composition
//!
//! Wires sequencer -> engine -> checkpoint trigger into the strict
//! sequential pipeline that owns one book. The pipeline is logically
//! single-threaded; the checkpoint writer is the only other execution
//! context and it only ever sees owned copies. Gap and fatal-consistency
//! signals escalate into the recovery coordinator in-line, so the pipeline
//! is self-healing for everything short of a dead feed.

use crate::book::{BookState, BookView};
use crate::checkpoint::{CheckpointManager, CheckpointStore};
use crate::config::ReplayerConfig;
use crate::engine::{EngineState, Replayer};
use crate::errors::SequenceGap;
use crate::events::DeltaEvent;
use crate::metrics::{MetricsSnapshot, ReplayMetrics};
use crate::recovery::{FeedSource, RecoveryCoordinator, RecoveryReport};
use crate::sequencer::Sequencer;
use anyhow::{Context, Result};
use parking_lot::RwLock;
use services_common::Symbol;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Externally visible pipeline health
#[derive(Debug, Clone, Copy)]
pub struct PipelineHealth {
    /// Engine lifecycle state
    pub state: EngineState,
    /// Highest sequence applied to the book
    pub last_applied: u64,
    /// Next sequence the stream owes
    pub expected_next: u64,
    /// Sequence of the last durable checkpoint
    pub last_checkpoint: u64,
    /// Failed checkpoint writes so far
    pub checkpoint_failures: u64,
    /// Duplicate events discarded by the sequencer
    pub duplicates: u64,
    /// Duplicate ADDs ignored by the engine
    pub duplicate_adds: u64,
    /// Unknown-order UPDATE/CANCELs skipped by the engine
    pub unknown_orders: u64,
    /// Sequence gaps declared
    pub gaps: u64,
}

impl Default for PipelineHealth {
    fn default() -> Self {
        Self {
            state: EngineState::SnapshotRebuild,
            last_applied: 0,
            expected_next: 0,
            last_checkpoint: 0,
            checkpoint_failures: 0,
            duplicates: 0,
            duplicate_adds: 0,
            unknown_orders: 0,
            gaps: 0,
        }
    }
}

/// Shared read-mostly handle external monitors poll
pub type HealthHandle = Arc<RwLock<PipelineHealth>>;

/// One instrument's complete replay pipeline
pub struct Pipeline<F: FeedSource> {
    symbol: Symbol,
    sequencer: Sequencer,
    engine: Replayer,
    checkpoints: CheckpointManager,
    store: CheckpointStore,
    recovery: RecoveryCoordinator,
    feed: F,
    metrics: ReplayMetrics,
    health: HealthHandle,
}

impl<F: FeedSource> Pipeline<F> {
    /// Build a pipeline; the engine starts awaiting its bootstrap snapshot
    pub fn new(symbol: Symbol, cfg: ReplayerConfig, feed: F) -> Result<Self> {
        let store = CheckpointStore::new(&cfg.checkpoint.dir)
            .context("opening checkpoint store")?;
        let checkpoints = CheckpointManager::new(symbol, cfg.checkpoint.clone())?;
        Ok(Self {
            symbol,
            sequencer: Sequencer::new(cfg.sequencer.clone()),
            engine: Replayer::new(symbol, cfg.book),
            checkpoints,
            store,
            recovery: RecoveryCoordinator::new(cfg.recovery.clone()),
            feed,
            metrics: ReplayMetrics::new(),
            health: Arc::new(RwLock::new(PipelineHealth::default())),
        })
    }

    /// Run startup recovery: restore the newest checkpoint or bootstrap
    /// from a full snapshot
    pub fn bootstrap(&mut self) -> Result<RecoveryReport> {
        let report = self.run_recovery(Instant::now())?;
        info!(symbol = %self.symbol, resumed_at = report.resumed_at, "pipeline bootstrapped");
        Ok(report)
    }

    /// Offer one raw feed event to the pipeline
    pub fn ingest(&mut self, event: DeltaEvent, now: Instant) -> Result<()> {
        if let Err(gap) = self.sequencer.offer(event, now) {
            self.on_gap(gap, now)?;
            return Ok(());
        }
        self.drain(now)
    }

    /// Advance time-driven state: batch-wait expiry and reorder hold
    /// timeout
    pub fn poll(&mut self, now: Instant) -> Result<()> {
        if let Err(gap) = self.sequencer.poll(now) {
            self.on_gap(gap, now)?;
            return Ok(());
        }
        self.drain(now)
    }

    /// The live book (read-only)
    #[must_use]
    pub fn book(&self) -> &BookState {
        self.engine.book()
    }

    /// Read-only top-of-book view for downstream consumers
    #[must_use]
    pub fn view(&self) -> BookView {
        self.engine.book().view()
    }

    /// Shared health handle for external monitoring
    #[must_use]
    pub fn health(&self) -> HealthHandle {
        Arc::clone(&self.health)
    }

    /// Metrics snapshot
    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Clean shutdown: final checkpoint, then drain the writer
    pub fn close(self) {
        info!(symbol = %self.symbol, "pipeline shutting down");
        self.checkpoints.close(self.engine.book());
    }

    /// Deliver every completed batch to the engine, checkpointing and
    /// escalating to recovery as needed
    fn drain(&mut self, now: Instant) -> Result<()> {
        while let Some(batch) = self.sequencer.next_batch() {
            let started = Instant::now();
            match self.engine.apply_batch(&batch) {
                Ok(()) => {
                    self.metrics
                        .record_batch(batch.len(), started.elapsed().as_nanos() as u64);
                    self.checkpoints.on_applied(self.engine.book(), now);
                }
                Err(err) => {
                    error!(
                        symbol = %self.symbol,
                        first = batch.first_sequence().unwrap_or(0),
                        %err,
                        "fatal consistency violation; entering recovery"
                    );
                    self.run_recovery(now)?;
                    break;
                }
            }
        }
        self.publish_health();
        Ok(())
    }

    /// Gap path: admitted in-order batches stay deliverable and are applied
    /// before the rebuild so the checkpoint baseline is as fresh as possible
    fn on_gap(&mut self, gap: SequenceGap, now: Instant) -> Result<()> {
        warn!(
            symbol = %self.symbol,
            expected = gap.expected,
            observed = gap.observed,
            discarded = gap.discarded,
            "sequence gap declared; entering recovery"
        );
        while let Some(batch) = self.sequencer.next_batch() {
            if self.engine.apply_batch(&batch).is_err() {
                break;
            }
            self.checkpoints.on_applied(self.engine.book(), now);
        }
        self.run_recovery(now)?;
        self.publish_health();
        Ok(())
    }

    fn run_recovery(&mut self, now: Instant) -> Result<RecoveryReport> {
        let report = self.recovery.recover(
            &mut self.engine,
            &mut self.sequencer,
            &self.store,
            &mut self.feed,
            now,
        );
        match &report {
            Ok(rep) => {
                // Events the sequencer buffered during recovery were already
                // re-admitted by its reset; deliver them before new input
                self.drain(now)?;
                info!(symbol = %self.symbol, resumed_at = rep.resumed_at, "recovery complete");
            }
            Err(err) => {
                // Operator-visible: the pipeline stays halted
                self.engine.halt();
                self.publish_health();
                error!(symbol = %self.symbol, "recovery failed: {err:#}");
            }
        }
        report
    }

    fn publish_health(&self) {
        let engine_counters = self.engine.counters();
        let seq_counters = self.sequencer.counters();
        let mut health = self.health.write();
        *health = PipelineHealth {
            state: self.engine.state(),
            last_applied: self.engine.book().applied_through(),
            expected_next: self.sequencer.expected_next(),
            last_checkpoint: self.checkpoints.last_written(),
            checkpoint_failures: self.checkpoints.failures(),
            duplicates: seq_counters.duplicates,
            duplicate_adds: engine_counters.duplicate_adds,
            unknown_orders: engine_counters.unknown_orders,
            gaps: seq_counters.gaps,
        };
    }
}
