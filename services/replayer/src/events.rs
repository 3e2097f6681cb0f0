//! Inbound event types for book reconstruction
//!
//! Events are designed to be:
//! - Compact and `Copy` for cheap staging in the reorder buffer
//! - Deterministically ordered by sequence number
//! - Self-framing for snapshots (`SnapshotBegin`/`SnapshotEnd` markers)

use serde::{Deserialize, Serialize};
use services_common::{Px, Qty, Ts};

/// Side of an order or price level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Side {
    /// Buy side (bids)
    Bid = 0,
    /// Sell side (asks/offers)
    Ask = 1,
}

impl Side {
    /// Check if this is the bid side
    #[inline]
    #[must_use]
    pub fn is_bid(&self) -> bool {
        matches!(self, Side::Bid)
    }

    /// Get the opposite side
    #[inline]
    #[must_use]
    pub fn opposite(&self) -> Self {
        match self {
            Side::Bid => Side::Ask,
            Side::Ask => Side::Bid,
        }
    }
}

/// Kind of delta event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum EventKind {
    /// New order resting on the book
    Add = 0,
    /// Existing order re-priced and/or re-sized
    Update = 1,
    /// Order removed from the book
    Cancel = 2,
    /// Start of full-snapshot framing
    SnapshotBegin = 3,
    /// End of full-snapshot framing; its sequence is the snapshot's
    /// terminal sequence number
    SnapshotEnd = 4,
}

impl EventKind {
    /// Whether this kind is a snapshot framing marker
    #[inline]
    #[must_use]
    pub fn is_marker(&self) -> bool {
        matches!(self, EventKind::SnapshotBegin | EventKind::SnapshotEnd)
    }
}

/// A single incremental book update
///
/// `order_id` is 0 on framing markers; `side`, `price` and `size` are
/// ignored on markers and on `Cancel` (cancels resolve through the order
/// index, which is the sole source of truth for resting orders).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DeltaEvent {
    /// Stream sequence number
    pub sequence: u64,
    /// Kind of update
    pub kind: EventKind,
    /// Side of the affected order
    pub side: Side,
    /// Order identifier (0 on framing markers)
    pub order_id: u64,
    /// Order price (new price on `Update`)
    pub price: Px,
    /// Order size (new size on `Update`)
    pub size: Qty,
    /// Exchange timestamp
    pub event_time: Ts,
}

impl DeltaEvent {
    /// Build an `Add` event
    #[must_use]
    pub fn add(sequence: u64, order_id: u64, side: Side, price: Px, size: Qty, ts: Ts) -> Self {
        Self {
            sequence,
            kind: EventKind::Add,
            side,
            order_id,
            price,
            size,
            event_time: ts,
        }
    }

    /// Build an `Update` event carrying the new price and size
    #[must_use]
    pub fn update(sequence: u64, order_id: u64, side: Side, price: Px, size: Qty, ts: Ts) -> Self {
        Self {
            sequence,
            kind: EventKind::Update,
            side,
            order_id,
            price,
            size,
            event_time: ts,
        }
    }

    /// Build a `Cancel` event
    #[must_use]
    pub fn cancel(sequence: u64, order_id: u64, side: Side, ts: Ts) -> Self {
        Self {
            sequence,
            kind: EventKind::Cancel,
            side,
            order_id,
            price: Px::ZERO,
            size: Qty::ZERO,
            event_time: ts,
        }
    }

    /// Build a `SnapshotBegin` framing marker
    #[must_use]
    pub fn snapshot_begin(sequence: u64, ts: Ts) -> Self {
        Self {
            sequence,
            kind: EventKind::SnapshotBegin,
            side: Side::Bid,
            order_id: 0,
            price: Px::ZERO,
            size: Qty::ZERO,
            event_time: ts,
        }
    }

    /// Build a `SnapshotEnd` framing marker
    #[must_use]
    pub fn snapshot_end(sequence: u64, ts: Ts) -> Self {
        Self {
            sequence,
            kind: EventKind::SnapshotEnd,
            side: Side::Bid,
            order_id: 0,
            price: Px::ZERO,
            size: Qty::ZERO,
            event_time: ts,
        }
    }

    /// Whether this event is a snapshot framing marker
    #[inline]
    #[must_use]
    pub fn is_marker(&self) -> bool {
        self.kind.is_marker()
    }
}

/// A validated micro-batch emitted by the sequencer
///
/// Events are contiguous and strictly increasing in sequence number.
/// Framing markers always travel as single-event batches.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    /// Events in admission order
    pub events: Vec<DeltaEvent>,
}

impl Batch {
    /// Number of events in the batch
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the batch holds no events
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Sequence of the first event, if any
    #[must_use]
    pub fn first_sequence(&self) -> Option<u64> {
        self.events.first().map(|e| e.sequence)
    }

    /// Sequence of the last event, if any
    #[must_use]
    pub fn last_sequence(&self) -> Option<u64> {
        self.events.last().map(|e| e.sequence)
    }

    /// Whether this batch is a lone snapshot framing marker
    #[must_use]
    pub fn is_marker(&self) -> bool {
        self.events.len() == 1 && self.events[0].is_marker()
    }
}
