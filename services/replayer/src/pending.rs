//! Transactional staging buffer for batch application
//!
//! A batch is staged as an overlay on top of the live book: order changes
//! and net per-level volume deltas. Every decrement is validated against the
//! effective state (book + overlay) as it is staged, so by commit time the
//! whole batch is known-good and applies without partial effects. Discarding
//! the overlay discards the batch with no trace.

use crate::book::{BookState, OrderRecord};
use crate::errors::ReplayError;
use crate::events::{DeltaEvent, EventKind, Side};
use ahash::AHashMap;
use rustc_hash::FxHashMap;
use services_common::{Px, Qty};

/// Staged-but-uncommitted effects of one batch
#[derive(Debug, Default)]
pub struct PendingQueue {
    /// Order index overlay: `Some` = insert/replace, `None` = remove
    orders: AHashMap<u64, Option<OrderRecord>>,
    /// Net volume delta per (side, price) level
    levels: FxHashMap<(Side, i64), i64>,
    /// Events staged into this queue
    staged: u64,
    /// ADDs ignored because the order already existed
    pub duplicate_adds: u64,
    /// UPDATE/CANCELs skipped because the order was never seen
    pub unknown_orders: u64,
}

impl PendingQueue {
    /// Create an empty queue
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Events staged so far
    #[must_use]
    pub fn staged(&self) -> u64 {
        self.staged
    }

    /// Stage one event against `book` plus everything staged before it
    ///
    /// Transient anomalies (duplicate ADD, unknown order) are counted and
    /// skipped. A decrement that would take a level negative returns the
    /// fatal error and leaves the queue ready to be discarded wholesale.
    pub fn stage(&mut self, book: &BookState, event: &DeltaEvent) -> Result<(), ReplayError> {
        debug_assert!(!event.is_marker(), "framing markers are not book mutations");
        match event.kind {
            EventKind::Add => {
                if self.effective(book, event.order_id).is_some() {
                    self.duplicate_adds += 1;
                    return Ok(());
                }
                self.orders.insert(
                    event.order_id,
                    Some(OrderRecord {
                        side: event.side,
                        price: event.price,
                        size: event.size,
                        ts: event.event_time,
                    }),
                );
                self.credit(event.side, event.price.as_i64(), event.size.as_i64());
            }
            EventKind::Update => {
                let Some(old) = self.effective(book, event.order_id) else {
                    self.unknown_orders += 1;
                    return Ok(());
                };
                // Side never changes on update; the index is authoritative
                self.debit(book, old.side, old.price.as_i64(), old.size.as_i64())?;
                self.credit(old.side, event.price.as_i64(), event.size.as_i64());
                self.orders.insert(
                    event.order_id,
                    Some(OrderRecord {
                        side: old.side,
                        price: event.price,
                        size: event.size,
                        ts: event.event_time,
                    }),
                );
            }
            EventKind::Cancel => {
                let Some(old) = self.effective(book, event.order_id) else {
                    self.unknown_orders += 1;
                    return Ok(());
                };
                self.debit(book, old.side, old.price.as_i64(), old.size.as_i64())?;
                self.orders.insert(event.order_id, None);
            }
            EventKind::SnapshotBegin | EventKind::SnapshotEnd => return Ok(()),
        }
        self.staged += 1;
        Ok(())
    }

    /// Discard everything staged and zero the per-batch counters
    ///
    /// Capacity is retained, so a long-lived queue reused across batches
    /// stops allocating once it has seen its working set.
    pub fn reset(&mut self) {
        self.orders.clear();
        self.levels.clear();
        self.staged = 0;
        self.duplicate_adds = 0;
        self.unknown_orders = 0;
    }

    /// Apply every staged effect to `book`, leaving the queue empty
    ///
    /// Staging already proved each level stays non-negative, so this cannot
    /// observe a violation on its own; the error path is kept because the
    /// ladder refuses negative volume unconditionally.
    pub fn commit(&mut self, book: &mut BookState) -> Result<(), ReplayError> {
        for (order_id, change) in self.orders.drain() {
            match change {
                Some(record) => book.insert_order(order_id, record),
                None => book.remove_order(order_id),
            }
        }
        for ((side, price), delta) in self.levels.drain() {
            if delta > 0 {
                book.ladder_mut(side).add(price, delta);
            } else if delta < 0 {
                book.ladder_mut(side).remove(price, -delta)?;
            }
        }
        Ok(())
    }

    /// Resolve an order through the overlay, falling back to the live index
    fn effective(&self, book: &BookState, order_id: u64) -> Option<OrderRecord> {
        match self.orders.get(&order_id) {
            Some(change) => *change,
            None => book.order(order_id).copied(),
        }
    }

    fn credit(&mut self, side: Side, price: i64, volume: i64) {
        *self.levels.entry((side, price)).or_insert(0) += volume;
    }

    /// Subtract `volume` from the effective level, failing if the result
    /// would dip below zero at any point in the batch
    fn debit(
        &mut self,
        book: &BookState,
        side: Side,
        price: i64,
        volume: i64,
    ) -> Result<(), ReplayError> {
        let delta = self.levels.entry((side, price)).or_insert(0);
        let effective = book.level_volume(side, price) + *delta;
        if effective < volume {
            return Err(ReplayError::NegativeLevel {
                side,
                price: Px::from_i64(price),
                have: Qty::from_i64(effective),
                take: Qty::from_i64(volume),
            });
        }
        *delta -= volume;
        Ok(())
    }
}
