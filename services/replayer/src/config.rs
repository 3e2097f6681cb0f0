//! Replay pipeline configuration

use serde::{Deserialize, Serialize};
use services_common::constants::{
    DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY_MS, MAX_RETRY_DELAY_MS,
};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration for one instrument pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayerConfig {
    /// Book representation settings
    pub book: BookConfig,
    /// Sequencer ordering and batching settings
    pub sequencer: SequencerConfig,
    /// Checkpoint trigger and store settings
    pub checkpoint: CheckpointConfig,
    /// Recovery retry policy
    pub recovery: RecoveryConfig,
}

impl Default for ReplayerConfig {
    fn default() -> Self {
        Self {
            book: BookConfig::default(),
            sequencer: SequencerConfig::default(),
            checkpoint: CheckpointConfig::default(),
            recovery: RecoveryConfig::default(),
        }
    }
}

/// Book representation settings
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BookConfig {
    /// Number of near-touch levels kept in the contiguous array per side
    pub top_depth: usize,
    /// Price grid step in fixed-point ticks (distance-from-best indexing)
    pub tick_size: i64,
}

impl Default for BookConfig {
    fn default() -> Self {
        Self {
            top_depth: 20,
            tick_size: 1_000_000, // 0.01 at 8 decimal places
        }
    }
}

/// Sequencer ordering and batching settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequencerConfig {
    /// Maximum distance ahead of `expected_next` an event may be held
    pub lookahead_window: u64,
    /// How long the oldest held event may wait for its gap to close
    pub hold_timeout: Duration,
    /// Maximum events per micro-batch
    pub max_batch_events: usize,
    /// Maximum time an open micro-batch may wait before flushing
    pub max_batch_wait: Duration,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            lookahead_window: 512,
            hold_timeout: Duration::from_millis(500),
            max_batch_events: 256,
            max_batch_wait: Duration::from_millis(5),
        }
    }
}

/// Checkpoint trigger and store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// Directory for checkpoint records
    pub dir: PathBuf,
    /// Events applied between checkpoints
    pub event_interval: u64,
    /// Wall-clock interval between checkpoints
    pub time_interval: Duration,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("checkpoints"),
            event_interval: 100_000,
            time_interval: Duration::from_secs(30),
        }
    }
}

/// Recovery retry policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// Attempts per upstream request before surfacing a fatal error
    pub max_retries: u32,
    /// Base delay between retries (doubled each attempt)
    pub retry_delay: Duration,
    /// Cap on the backoff delay
    pub max_retry_delay: Duration,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
            max_retry_delay: Duration::from_millis(MAX_RETRY_DELAY_MS),
        }
    }
}
