//! Per-instrument book state
//!
//! The order index is the sole source of truth for resting orders; the two
//! ladders hold the aggregated volume per price level. Invariant: for every
//! (side, price), ladder volume equals the sum of active index entries at
//! that price. The state is exclusively owned by its pipeline's engine and
//! only ever handed out as a clone (checkpointing) or a read-only view.

use crate::config::BookConfig;
use crate::events::Side;
use crate::ladder::Ladder;
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use services_common::{Px, Qty, Symbol, Ts};

/// An individual resting order as tracked by the order index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    /// Side of the order
    pub side: Side,
    /// Current price
    pub price: Px,
    /// Current remaining size
    pub size: Qty,
    /// Insertion timestamp
    pub ts: Ts,
}

/// Full reconstructed state for one instrument
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookState {
    symbol: Symbol,
    orders: AHashMap<u64, OrderRecord>,
    bids: Ladder,
    asks: Ladder,
    /// Next sequence number the stream owes this book
    expected_next: u64,
    /// Highest sequence number applied to this book
    applied_through: u64,
}

impl BookState {
    /// Create an empty book
    #[must_use]
    pub fn new(symbol: Symbol, cfg: &BookConfig) -> Self {
        Self {
            symbol,
            orders: AHashMap::new(),
            bids: Ladder::new(Side::Bid, cfg.top_depth, cfg.tick_size),
            asks: Ladder::new(Side::Ask, cfg.top_depth, cfg.tick_size),
            expected_next: 0,
            applied_through: 0,
        }
    }

    /// Instrument this book tracks
    #[must_use]
    pub fn symbol(&self) -> Symbol {
        self.symbol
    }

    /// Look up a resting order
    #[must_use]
    pub fn order(&self, order_id: u64) -> Option<&OrderRecord> {
        self.orders.get(&order_id)
    }

    /// Number of resting orders
    #[must_use]
    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    /// Iterate over all resting orders
    pub fn orders(&self) -> impl Iterator<Item = (u64, &OrderRecord)> {
        self.orders.iter().map(|(&id, rec)| (id, rec))
    }

    /// Ladder for one side
    #[must_use]
    pub fn ladder(&self, side: Side) -> &Ladder {
        match side {
            Side::Bid => &self.bids,
            Side::Ask => &self.asks,
        }
    }

    pub(crate) fn ladder_mut(&mut self, side: Side) -> &mut Ladder {
        match side {
            Side::Bid => &mut self.bids,
            Side::Ask => &mut self.asks,
        }
    }

    pub(crate) fn insert_order(&mut self, order_id: u64, record: OrderRecord) {
        self.orders.insert(order_id, record);
    }

    pub(crate) fn remove_order(&mut self, order_id: u64) {
        self.orders.remove(&order_id);
    }

    /// Aggregated volume at a (side, price) level, 0 if absent
    #[must_use]
    pub fn level_volume(&self, side: Side, price: i64) -> i64 {
        self.ladder(side).volume_at(price)
    }

    /// Best bid price and volume
    #[must_use]
    pub fn best_bid(&self) -> Option<(Px, Qty)> {
        self.bids.best()
    }

    /// Best ask price and volume
    #[must_use]
    pub fn best_ask(&self) -> Option<(Px, Qty)> {
        self.asks.best()
    }

    /// Spread in ticks, when both sides have depth
    #[must_use]
    pub fn spread(&self) -> Option<i64> {
        match (self.best_bid(), self.best_ask()) {
            (Some((bid, _)), Some((ask, _))) => Some(ask.as_i64() - bid.as_i64()),
            _ => None,
        }
    }

    /// Mid price in ticks, when both sides have depth
    #[must_use]
    pub fn mid(&self) -> Option<Px> {
        match (self.best_bid(), self.best_ask()) {
            (Some((bid, _)), Some((ask, _))) => {
                Some(Px::from_i64((bid.as_i64() + ask.as_i64()) / 2))
            }
            _ => None,
        }
    }

    /// Next sequence number the stream owes this book
    #[must_use]
    pub fn expected_next(&self) -> u64 {
        self.expected_next
    }

    pub(crate) fn set_expected_next(&mut self, seq: u64) {
        self.expected_next = seq;
    }

    /// Highest sequence number applied to this book
    #[must_use]
    pub fn applied_through(&self) -> u64 {
        self.applied_through
    }

    pub(crate) fn set_applied_through(&mut self, seq: u64) {
        self.applied_through = seq;
        self.expected_next = seq.saturating_add(1);
    }

    /// Deterministic digest of the full book for replay-equivalence checks
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hash = 0u64;
        for (price, vol) in self.bids.levels_sorted() {
            hash = hash.wrapping_mul(31).wrapping_add(price as u64);
            hash = hash.wrapping_mul(31).wrapping_add(vol as u64);
        }
        for (price, vol) in self.asks.levels_sorted() {
            hash = hash.wrapping_mul(31).wrapping_add(price as u64);
            hash = hash.wrapping_mul(31).wrapping_add(vol as u64);
        }
        let mut order_ids: Vec<u64> = self.orders.keys().copied().collect();
        order_ids.sort_unstable();
        for id in order_ids {
            if let Some(rec) = self.orders.get(&id) {
                hash = hash.wrapping_mul(31).wrapping_add(id);
                hash = hash.wrapping_mul(31).wrapping_add(rec.side as u64);
                hash = hash.wrapping_mul(31).wrapping_add(rec.price.as_i64() as u64);
                hash = hash.wrapping_mul(31).wrapping_add(rec.size.as_i64() as u64);
            }
        }
        hash
    }

    /// Read-only top-of-book view; decimal conversion happens here and
    /// nowhere deeper
    #[must_use]
    pub fn view(&self) -> BookView {
        let to_view = |(price, size): (Px, Qty)| LevelView {
            price: price.as_f64(),
            size: size.as_f64(),
        };
        BookView {
            symbol: self.symbol,
            best_bid: self.best_bid().map(to_view),
            best_ask: self.best_ask().map(to_view),
            spread: self.spread().map(|s| Px::from_i64(s).as_f64()),
            mid: self.mid().map(|m| m.as_f64()),
            bids: self.bids.top_levels().into_iter().map(to_view).collect(),
            asks: self.asks.top_levels().into_iter().map(to_view).collect(),
            applied_through: self.applied_through,
        }
    }

    /// Full-depth view of one side, sorted best-first on demand
    #[must_use]
    pub fn deep_view(&self, side: Side) -> Vec<LevelView> {
        self.ladder(side)
            .levels_sorted()
            .into_iter()
            .map(|(price, vol)| LevelView {
                price: Px::from_i64(price).as_f64(),
                size: Qty::from_i64(vol).as_f64(),
            })
            .collect()
    }
}

/// One price level at the output boundary
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LevelView {
    /// Price in decimal units
    pub price: f64,
    /// Aggregated size in decimal units
    pub size: f64,
}

/// Read-only snapshot handed to downstream consumers
#[derive(Debug, Clone, Serialize)]
pub struct BookView {
    /// Instrument
    pub symbol: Symbol,
    /// Best bid, if any
    pub best_bid: Option<LevelView>,
    /// Best ask, if any
    pub best_ask: Option<LevelView>,
    /// Spread in decimal units, when both sides have depth
    pub spread: Option<f64>,
    /// Mid price in decimal units, when both sides have depth
    pub mid: Option<f64>,
    /// Near-touch bid levels, best first
    pub bids: Vec<LevelView>,
    /// Near-touch ask levels, best first
    pub asks: Vec<LevelView>,
    /// Sequence number this view is valid through
    pub applied_through: u64,
}
