//! Recovery coordination: checkpoint restore and snapshot-driven rebuild
//!
//! Invoked on process startup and whenever the sequencer declares a gap or
//! the engine halts on a fatal violation. The protocol:
//! 1. load the newest checkpoint whose integrity check passes
//! 2. install it and ask the feed to resume one past its valid-through
//! 3. if the feed cannot resume incrementally (or no checkpoint existed),
//!    request a framed full snapshot and drive the engine through a rebuild
//! 4. re-baseline the sequencer, replaying anything it buffered meanwhile
//!
//! Upstream requests are retried with exponential backoff; exhaustion
//! surfaces an operator-visible fatal error instead of retrying forever.
//! Recovery is transactional at book granularity: a failed attempt leaves
//! the previous state (or the halted engine) untouched.

use crate::checkpoint::CheckpointStore;
use crate::config::RecoveryConfig;
use crate::engine::Replayer;
use crate::errors::RecoveryError;
use crate::events::DeltaEvent;
use crate::sequencer::Sequencer;
use anyhow::{Context, Result};
use std::time::Instant;
use tracing::{info, warn};

/// How the feed source can satisfy a resume request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeMode {
    /// The feed will stream deltas starting at the requested sequence
    Streaming,
    /// The feed cannot resume incrementally; a full snapshot is required
    SnapshotRequired,
}

/// External delta-feed collaborator
pub trait FeedSource {
    /// Ask the feed to stream deltas starting at `from_sequence`
    fn resume(&mut self, from_sequence: u64) -> Result<ResumeMode>;

    /// Request a full snapshot, delivered as `SnapshotBegin` / body /
    /// `SnapshotEnd` framed events
    fn request_snapshot(&mut self) -> Result<Vec<DeltaEvent>>;
}

/// Summary of one completed recovery
#[derive(Debug, Clone, Copy)]
pub struct RecoveryReport {
    /// Sequence number live streaming resumes at
    pub resumed_at: u64,
    /// Whether a checkpoint was restored
    pub used_checkpoint: bool,
    /// Whether a full snapshot rebuild was required
    pub used_snapshot: bool,
}

/// Drives the recovery protocol against an engine/sequencer pair
#[derive(Debug)]
pub struct RecoveryCoordinator {
    cfg: RecoveryConfig,
}

impl RecoveryCoordinator {
    /// Create a coordinator with the given retry policy
    #[must_use]
    pub fn new(cfg: RecoveryConfig) -> Self {
        Self { cfg }
    }

    /// Run the full recovery protocol
    pub fn recover<F: FeedSource>(
        &self,
        engine: &mut Replayer,
        sequencer: &mut Sequencer,
        store: &CheckpointStore,
        feed: &mut F,
        now: Instant,
    ) -> Result<RecoveryReport> {
        let symbol = engine.book().symbol();
        info!(%symbol, "recovery started");

        let checkpoint = store
            .load_latest(symbol)
            .context("locating latest checkpoint")?;
        let used_checkpoint = checkpoint.is_some();

        if let Some(record) = checkpoint {
            let resumed_at = record.valid_through + 1;
            let mode = self.with_backoff("resume", || feed.resume(resumed_at))?;
            if mode == ResumeMode::Streaming {
                // Only install once the feed has committed to the resume
                // point; a failed resume leaves the previous state alone
                engine.install(record.state);
                sequencer.reset(resumed_at, now);
                info!(%symbol, resumed_at, "recovered from checkpoint; live streaming resumed");
                return Ok(RecoveryReport {
                    resumed_at,
                    used_checkpoint: true,
                    used_snapshot: false,
                });
            }
            warn!(%symbol, "feed cannot resume incrementally; falling back to snapshot");
        }

        let events = self.with_backoff("snapshot", || feed.request_snapshot())?;
        engine.reset();
        for event in &events {
            engine
                .apply_event(event)
                .context("applying snapshot event during recovery")?;
        }
        let resumed_at = engine.book().expected_next();
        sequencer.reset(resumed_at, now);
        info!(%symbol, resumed_at, "recovered via snapshot rebuild");
        Ok(RecoveryReport {
            resumed_at,
            used_checkpoint,
            used_snapshot: true,
        })
    }

    /// Retry `op` with exponential backoff, bounded by the configured
    /// attempt budget
    fn with_backoff<T>(&self, what: &str, mut op: impl FnMut() -> Result<T>) -> Result<T> {
        let attempts = self.cfg.max_retries.max(1);
        let mut delay = self.cfg.retry_delay;
        let mut last = None;
        for attempt in 1..=attempts {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) => {
                    warn!(what, attempt, attempts, "feed request failed: {err:#}");
                    last = Some(err);
                    if attempt < attempts {
                        std::thread::sleep(delay);
                        delay = (delay * 2).min(self.cfg.max_retry_delay);
                    }
                }
            }
        }
        let last = last
            .map(|err| format!("{err:#}"))
            .unwrap_or_else(|| "unknown".to_string());
        Err(RecoveryError::FeedUnavailable { attempts, last }.into())
    }
}
