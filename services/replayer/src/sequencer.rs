//! Stream ordering, gap detection and micro-batching
//!
//! Enforces strictly increasing sequence numbers. Events ahead of
//! `expected_next` are held in a bounded reorder buffer and released in
//! order as the gap fills; a hole that outgrows the look-ahead window or
//! outlives the hold timeout is declared a sequence gap and recovery takes
//! over. Events behind the watermark are counted as duplicates and dropped,
//! never treated as errors.
//!
//! Admitted events are grouped into micro-batches bounded by a maximum
//! event count and a maximum wait time; batching amortizes per-event
//! overhead downstream and never reorders events. Snapshot framing markers
//! flush the open batch and always travel alone.

use crate::config::SequencerConfig;
use crate::errors::SequenceGap;
use crate::events::{Batch, DeltaEvent};
use std::collections::{BTreeMap, VecDeque};
use std::time::Instant;
use tracing::{debug, warn};

/// Admission and anomaly counters for one sequencer
#[derive(Debug, Clone, Copy, Default)]
pub struct SequencerCounters {
    /// Events admitted in order
    pub admitted: u64,
    /// Events discarded as duplicates (behind the watermark, or a second
    /// arrival for a held sequence number)
    pub duplicates: u64,
    /// Events that spent time in the reorder buffer before admission
    pub reordered: u64,
    /// Sequence gaps declared
    pub gaps: u64,
    /// Micro-batches emitted
    pub batches: u64,
}

/// An event parked in the reorder buffer
#[derive(Debug, Clone, Copy)]
struct Held {
    event: DeltaEvent,
    since: Instant,
}

/// Per-instrument stream sequencer
#[derive(Debug)]
pub struct Sequencer {
    cfg: SequencerConfig,
    /// Next sequence number owed by the stream; 0 means "adopt the first
    /// observed sequence as the baseline"
    expected_next: u64,
    hold: BTreeMap<u64, Held>,
    open: Vec<DeltaEvent>,
    opened_at: Option<Instant>,
    ready: VecDeque<Batch>,
    counters: SequencerCounters,
}

impl Sequencer {
    /// Create a sequencer that adopts the first observed sequence number
    #[must_use]
    pub fn new(cfg: SequencerConfig) -> Self {
        Self {
            cfg,
            expected_next: 0,
            hold: BTreeMap::new(),
            open: Vec::new(),
            opened_at: None,
            ready: VecDeque::new(),
            counters: SequencerCounters::default(),
        }
    }

    /// Next sequence number owed by the stream
    #[must_use]
    pub fn expected_next(&self) -> u64 {
        self.expected_next
    }

    /// Sequencer counters
    #[must_use]
    pub fn counters(&self) -> SequencerCounters {
        self.counters
    }

    /// Events currently parked in the reorder buffer
    #[must_use]
    pub fn held(&self) -> usize {
        self.hold.len()
    }

    /// Offer one raw event to the stream
    ///
    /// On a declared gap the reorder buffer is discarded and the caller must
    /// run recovery; the open batch and any ready batches are contiguous
    /// in-order events and stay deliverable.
    pub fn offer(&mut self, event: DeltaEvent, now: Instant) -> Result<(), SequenceGap> {
        if self.expected_next == 0 {
            self.expected_next = event.sequence;
        }
        if event.sequence < self.expected_next {
            self.counters.duplicates += 1;
            debug!(
                sequence = event.sequence,
                expected = self.expected_next,
                "duplicate or already-applied event discarded"
            );
            return Ok(());
        }
        if event.sequence == self.expected_next {
            self.admit(event, now);
            self.release_held(now);
            return Ok(());
        }
        let distance = event.sequence - self.expected_next;
        if distance > self.cfg.lookahead_window {
            return Err(self.declare_gap(event.sequence));
        }
        match self.hold.entry(event.sequence) {
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(Held { event, since: now });
                self.counters.reordered += 1;
            }
            std::collections::btree_map::Entry::Occupied(_) => {
                // Same-sequence tie-break: first arrival wins
                self.counters.duplicates += 1;
            }
        }
        Ok(())
    }

    /// Advance time-driven state: flush an overdue open batch and check the
    /// oldest held event against the hold timeout
    pub fn poll(&mut self, now: Instant) -> Result<(), SequenceGap> {
        if let Some(opened_at) = self.opened_at {
            if now.duration_since(opened_at) >= self.cfg.max_batch_wait {
                self.flush();
            }
        }
        if let Some((&sequence, held)) = self.hold.first_key_value() {
            if now.duration_since(held.since) >= self.cfg.hold_timeout {
                warn!(
                    expected = self.expected_next,
                    oldest_held = sequence,
                    "reorder hold timed out without the gap closing"
                );
                return Err(self.declare_gap(0));
            }
        }
        Ok(())
    }

    /// Take the next completed micro-batch, if any
    pub fn next_batch(&mut self) -> Option<Batch> {
        self.ready.pop_front()
    }

    /// Re-baseline after recovery
    ///
    /// Held events at or beyond the new watermark were buffered while
    /// recovery ran and are replayed in sequence order immediately; held
    /// events behind it are covered by the recovered state and dropped.
    pub fn reset(&mut self, expected_next: u64, now: Instant) {
        self.open.clear();
        self.opened_at = None;
        self.ready.clear();
        self.expected_next = expected_next;
        self.hold.retain(|&sequence, _| sequence >= expected_next);
        self.release_held(now);
    }

    fn declare_gap(&mut self, observed: u64) -> SequenceGap {
        let gap = SequenceGap {
            expected: self.expected_next,
            observed,
            discarded: self.hold.len(),
        };
        self.counters.gaps += 1;
        self.hold.clear();
        // Contiguous admitted events remain deliverable
        self.flush();
        gap
    }

    fn admit(&mut self, event: DeltaEvent, now: Instant) {
        self.expected_next = event.sequence + 1;
        self.counters.admitted += 1;
        if event.is_marker() {
            // Framing markers force a batch boundary and travel alone
            self.flush();
            self.ready.push_back(Batch {
                events: vec![event],
            });
            self.counters.batches += 1;
            return;
        }
        if self.open.is_empty() {
            self.opened_at = Some(now);
        }
        self.open.push(event);
        if self.open.len() >= self.cfg.max_batch_events {
            self.flush();
        }
    }

    fn release_held(&mut self, now: Instant) {
        while let Some(entry) = self.hold.first_entry() {
            if *entry.key() != self.expected_next {
                break;
            }
            let held = entry.remove();
            self.admit(held.event, now);
        }
    }

    fn flush(&mut self) {
        if self.open.is_empty() {
            self.opened_at = None;
            return;
        }
        let events = std::mem::take(&mut self.open);
        self.opened_at = None;
        self.ready.push_back(Batch { events });
        self.counters.batches += 1;
    }
}
