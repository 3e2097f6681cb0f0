//! Hybrid price-level store for one side of the book
//!
//! Near-touch levels live in a contiguous array indexed by tick-distance
//! from the best price, giving O(1) access on the hot path. Levels beyond
//! the window (or off the tick grid relative to the current best) live in an
//! unordered price -> volume map that is sorted only when a full-depth view
//! is requested. Moving a level between the two tiers is a pure
//! representation change: volumes are preserved exactly.

use crate::errors::ReplayError;
use crate::events::Side;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use services_common::{Px, Qty};

/// Aggregated resting volume for one side, split across the two tiers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ladder {
    side: Side,
    tick: i64,
    /// Volume per tick-distance slot; index 0 is the best price
    near: Vec<i64>,
    /// Price of slot 0; `None` iff the side is completely empty
    best: Option<i64>,
    /// Levels beyond the near-touch window, keyed by price
    deep: FxHashMap<i64, i64>,
}

impl Ladder {
    /// Create an empty ladder
    #[must_use]
    pub fn new(side: Side, top_depth: usize, tick_size: i64) -> Self {
        Self {
            side,
            tick: tick_size,
            near: vec![0; top_depth.max(1)],
            best: None,
            deep: FxHashMap::default(),
        }
    }

    /// Side this ladder aggregates
    #[must_use]
    pub fn side(&self) -> Side {
        self.side
    }

    /// Best price and its aggregated volume
    #[inline]
    #[must_use]
    pub fn best(&self) -> Option<(Px, Qty)> {
        self.best
            .map(|b| (Px::from_i64(b), Qty::from_i64(self.near[0])))
    }

    /// Whether the side holds no volume at all
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.best.is_none() && self.deep.is_empty()
    }

    /// Aggregated volume resting at `price`, 0 if no level exists
    #[must_use]
    pub fn volume_at(&self, price: i64) -> i64 {
        if let Some(best) = self.best {
            if !self.better(price, best) {
                if let Some(slot) = self.slot_of(best, price) {
                    return self.near[slot];
                }
            }
        }
        self.deep.get(&price).copied().unwrap_or(0)
    }

    /// Add `volume` to the level at `price`, creating it if absent
    pub fn add(&mut self, price: i64, volume: i64) {
        if volume == 0 {
            return;
        }
        match self.best {
            None => {
                self.rebase(Some(price));
                self.near[0] += volume;
            }
            Some(best) if self.better(price, best) => {
                self.rebase(Some(price));
                self.near[0] += volume;
            }
            Some(best) => {
                if let Some(slot) = self.slot_of(best, price) {
                    self.near[slot] += volume;
                } else {
                    *self.deep.entry(price).or_insert(0) += volume;
                }
            }
        }
    }

    /// Remove `volume` from the level at `price`, deleting the level when it
    /// reaches exactly zero
    ///
    /// A decrement past zero means the aggregate no longer matches the order
    /// index: the caller gets a fatal [`ReplayError::NegativeLevel`], never a
    /// clamped value.
    pub fn remove(&mut self, price: i64, volume: i64) -> Result<(), ReplayError> {
        if volume == 0 {
            return Ok(());
        }
        if let Some(best) = self.best {
            if !self.better(price, best) {
                if let Some(slot) = self.slot_of(best, price) {
                    if self.near[slot] < volume {
                        return Err(self.negative(price, self.near[slot], volume));
                    }
                    self.near[slot] -= volume;
                    if slot == 0 && self.near[0] == 0 {
                        self.promote_best();
                    }
                    return Ok(());
                }
            }
        }
        let have = match self.deep.get(&price) {
            Some(&have) => have,
            None => return Err(self.negative(price, 0, volume)),
        };
        if have < volume {
            return Err(self.negative(price, have, volume));
        }
        if have == volume {
            self.deep.remove(&price);
        } else if let Some(entry) = self.deep.get_mut(&price) {
            *entry = have - volume;
        }
        Ok(())
    }

    /// Drop every level on this side
    pub fn clear(&mut self) {
        self.near.fill(0);
        self.best = None;
        self.deep.clear();
    }

    /// Near-touch levels in best-first order, empty slots skipped
    #[must_use]
    pub fn top_levels(&self) -> Vec<(Px, Qty)> {
        let Some(best) = self.best else {
            return Vec::new();
        };
        self.near
            .iter()
            .enumerate()
            .filter(|&(_, &vol)| vol > 0)
            .map(|(slot, &vol)| (Px::from_i64(self.price_at(best, slot)), Qty::from_i64(vol)))
            .collect()
    }

    /// Deep-book levels sorted best-first; computed on demand, never
    /// maintained incrementally
    #[must_use]
    pub fn deep_levels(&self) -> Vec<(Px, Qty)> {
        let mut levels: Vec<(i64, i64)> = self
            .deep
            .iter()
            .map(|(&price, &vol)| (price, vol))
            .collect();
        match self.side {
            Side::Bid => levels.sort_by(|a, b| b.0.cmp(&a.0)),
            Side::Ask => levels.sort_by(|a, b| a.0.cmp(&b.0)),
        }
        levels
            .into_iter()
            .map(|(price, vol)| (Px::from_i64(price), Qty::from_i64(vol)))
            .collect()
    }

    /// Every level on this side, sorted best-first across both tiers
    #[must_use]
    pub fn levels_sorted(&self) -> Vec<(i64, i64)> {
        let mut levels: Vec<(i64, i64)> = self
            .deep
            .iter()
            .map(|(&price, &vol)| (price, vol))
            .collect();
        if let Some(best) = self.best {
            for (slot, &vol) in self.near.iter().enumerate() {
                if vol > 0 {
                    levels.push((self.price_at(best, slot), vol));
                }
            }
        }
        match self.side {
            Side::Bid => levels.sort_by(|a, b| b.0.cmp(&a.0)),
            Side::Ask => levels.sort_by(|a, b| a.0.cmp(&b.0)),
        }
        levels
    }

    /// Total volume across both tiers
    #[must_use]
    pub fn total_volume(&self) -> i64 {
        self.near.iter().sum::<i64>() + self.deep.values().sum::<i64>()
    }

    /// Number of non-empty levels across both tiers
    #[must_use]
    pub fn level_count(&self) -> usize {
        self.near.iter().filter(|&&v| v > 0).count() + self.deep.len()
    }

    /// Whether `price` currently sits in the near-touch array
    #[must_use]
    pub fn in_near_tier(&self, price: i64) -> bool {
        match self.best {
            Some(best) if !self.better(price, best) => {
                self.slot_of(best, price).is_some_and(|s| self.near[s] > 0)
            }
            _ => false,
        }
    }

    fn negative(&self, price: i64, have: i64, take: i64) -> ReplayError {
        ReplayError::NegativeLevel {
            side: self.side,
            price: Px::from_i64(price),
            have: Qty::from_i64(have),
            take: Qty::from_i64(take),
        }
    }

    /// Side-aware price comparison: is `a` closer to the touch than `b`
    #[inline]
    fn better(&self, a: i64, b: i64) -> bool {
        match self.side {
            Side::Bid => a > b,
            Side::Ask => a < b,
        }
    }

    #[inline]
    fn price_at(&self, best: i64, slot: usize) -> i64 {
        let offset = slot as i64 * self.tick;
        match self.side {
            Side::Bid => best - offset,
            Side::Ask => best + offset,
        }
    }

    /// Slot for `price` relative to `best`, `None` if beyond the window or
    /// off the tick grid
    #[inline]
    fn slot_of(&self, best: i64, price: i64) -> Option<usize> {
        let dist = match self.side {
            Side::Bid => best - price,
            Side::Ask => price - best,
        };
        if dist < 0 || dist % self.tick != 0 {
            return None;
        }
        let slot = (dist / self.tick) as usize;
        (slot < self.near.len()).then_some(slot)
    }

    /// Find the next best level after slot 0 emptied and re-anchor the array
    fn promote_best(&mut self) {
        let best = match self.best {
            Some(b) => b,
            None => return,
        };
        let near_candidate = (1..self.near.len())
            .find(|&slot| self.near[slot] > 0)
            .map(|slot| self.price_at(best, slot));
        let deep_candidate = match self.side {
            Side::Bid => self.deep.keys().copied().max(),
            Side::Ask => self.deep.keys().copied().min(),
        };
        let new_best = match (near_candidate, deep_candidate) {
            (Some(a), Some(b)) => Some(if self.better(a, b) { a } else { b }),
            (a, b) => a.or(b),
        };
        self.rebase(new_best);
    }

    /// Re-anchor the near-touch array at `new_best`, spilling displaced
    /// levels into the deep map and pulling newly-covered ones out of it.
    /// Volumes move between tiers unchanged.
    fn rebase(&mut self, new_best: Option<i64>) {
        if let Some(old_best) = self.best {
            for slot in 0..self.near.len() {
                let vol = std::mem::take(&mut self.near[slot]);
                if vol > 0 {
                    let price = self.price_at(old_best, slot);
                    *self.deep.entry(price).or_insert(0) += vol;
                }
            }
        }
        self.best = new_best;
        if let Some(best) = new_best {
            for slot in 0..self.near.len() {
                let price = self.price_at(best, slot);
                if let Some(vol) = self.deep.remove(&price) {
                    self.near[slot] = vol;
                }
            }
        }
    }
}
