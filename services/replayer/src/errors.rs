//! Error taxonomy for the replay pipeline
//!
//! Three broad classes cross this crate:
//! - transient admission anomalies (duplicate sequences, unknown orders) are
//!   counted and skipped, never surfaced as errors
//! - [`SequenceGap`] is a recovery signal, not a failure
//! - [`ReplayError`] variants are fatal consistency violations that halt the
//!   engine until recovery resets it

use crate::events::Side;
use services_common::{Px, Qty};
use thiserror::Error;

/// Fatal errors raised by the replay engine
#[derive(Debug, Error)]
pub enum ReplayError {
    /// A decrement would take a price level below zero volume. The level
    /// aggregate no longer matches the order index, so the book is corrupt.
    #[error("level volume would go negative: {side:?} {price} holds {have}, decrement {take}")]
    NegativeLevel {
        /// Side of the violating level
        side: Side,
        /// Price of the violating level
        price: Px,
        /// Volume currently resting at the level
        have: Qty,
        /// Volume the event tried to remove
        take: Qty,
    },

    /// The engine refused a mutation because it is halted
    #[error("engine is halted; recovery required before further mutation")]
    Halted,

    /// A checkpoint failed its structural-integrity check
    #[error("checkpoint integrity failure: {0}")]
    CorruptCheckpoint(String),
}

impl ReplayError {
    /// Whether this error mandates halting the pipeline and recovering
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::NegativeLevel { .. } | Self::Halted | Self::CorruptCheckpoint(_)
        )
    }
}

/// Recovery failures that require operator attention
#[derive(Debug, Error)]
pub enum RecoveryError {
    /// The upstream feed could not serve a resume or snapshot request
    /// within the bounded retry budget
    #[error("feed unavailable after {attempts} attempts: {last}")]
    FeedUnavailable {
        /// Number of attempts made
        attempts: u32,
        /// Message of the last failure
        last: String,
    },
}

/// A detected hole in the sequence stream
///
/// Not an error: the sequencer emits this to demand recovery, and the
/// pipeline self-heals through the recovery coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceGap {
    /// The sequence number the stream was expected to produce next
    pub expected: u64,
    /// The sequence number that revealed the hole (0 on hold-timeout)
    pub observed: u64,
    /// Events discarded from the reorder buffer
    pub discarded: usize,
}
