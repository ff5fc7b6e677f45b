//! Ordered access to price levels for one (symbol, side) — spec.md §4.2.
//!
//! Grounded on `orderbook/book.rs`'s `bids`/`asks` fields: a
//! `crossbeam_skiplist::SkipMap<u128, Arc<PriceLevel>>` keeps levels sorted
//! by price automatically, so the matching sweep never needs to re-sort —
//! it just walks the skip map front-to-back (or back-to-front) as
//! `orderbook/matching.rs`'s `price_iter` does.

use std::sync::Arc;

use crossbeam_skiplist::SkipMap;

use crate::price_level::PriceLevel;
use crate::types::{Order, OrderId, Price, Side};

/// One side (Buy or Sell) of a single symbol's order book.
///
/// Iteration order is descending for `Buy` (best bid first) and ascending
/// for `Sell` (best ask first); `SkipMap` always stores ascending, so `Buy`
/// reads the map in reverse.
pub struct BookSide {
    side: Side,
    levels: SkipMap<u128, Arc<PriceLevel>>,
}

/// A (price, aggregate) pair returned by [`BookSide::depth`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelAggregate {
    /// The level's price.
    pub price: Price,
    /// Sum of remaining quantity resting at this price.
    pub total_quantity: crate::types::Quantity,
    /// Number of resting orders at this price.
    pub order_count: u64,
}

impl BookSide {
    /// An empty side.
    pub fn new(side: Side) -> Self {
        Self {
            side,
            levels: SkipMap::new(),
        }
    }

    /// The best price on this side (highest for Buy, lowest for Sell), if
    /// any level is non-empty.
    pub fn best_price(&self) -> Option<Price> {
        match self.side {
            Side::Buy => self.levels.back().map(|e| Price::from_ticks(*e.key() as i64)),
            Side::Sell => self.levels.front().map(|e| Price::from_ticks(*e.key() as i64)),
        }
    }

    /// Fetch (creating if absent) the level at `price`.
    fn level_or_insert(&self, price: Price) -> Arc<PriceLevel> {
        self.levels
            .get_or_insert_with(price.as_u128_key(), || Arc::new(PriceLevel::new()))
            .value()
            .clone()
    }

    /// Look up the level at `price`, if one currently exists.
    pub fn level_at(&self, price: Price) -> Option<Arc<PriceLevel>> {
        self.levels.get(&price.as_u128_key()).map(|e| e.value().clone())
    }

    /// Insert a resting order at its limit price, creating the level if
    /// needed. Returns the price the order now rests at.
    pub fn insert_order(&self, price: Price, order: Order) {
        let level = self.level_or_insert(price);
        level.append(order);
    }

    /// Remove a resting order from the level at `price`. Deletes the level
    /// from this side if it becomes empty (spec.md §3 PriceLevel invariant:
    /// "empty levels must not exist in the book side").
    pub fn remove_order(&self, price: Price, order_id: OrderId) -> Option<Order> {
        let entry = self.levels.get(&price.as_u128_key())?;
        let level = entry.value().clone();
        let removed = level.remove(order_id);
        if level.is_empty() {
            entry.remove();
        }
        removed
    }

    /// Drop the level at `price` from the index if it is empty. Called by
    /// the matcher after fully consuming a level during a sweep.
    pub fn prune_if_empty(&self, price: Price) {
        if let Some(entry) = self.levels.get(&price.as_u128_key()) {
            if entry.value().is_empty() {
                entry.remove();
            }
        }
    }

    /// Iterate levels from the best price outward, in matching priority
    /// order.
    pub fn iter_from_best(&self) -> Box<dyn Iterator<Item = (Price, Arc<PriceLevel>)> + '_> {
        match self.side {
            Side::Buy => Box::new(
                self.levels
                    .iter()
                    .rev()
                    .map(|e| (Price::from_ticks(*e.key() as i64), e.value().clone())),
            ),
            Side::Sell => Box::new(
                self.levels
                    .iter()
                    .map(|e| (Price::from_ticks(*e.key() as i64), e.value().clone())),
            ),
        }
    }

    /// The first `n` non-empty levels with their aggregates, best price
    /// first.
    pub fn depth(&self, n: usize) -> Vec<LevelAggregate> {
        self.iter_from_best()
            .filter(|(_, level)| !level.is_empty())
            .take(n)
            .map(|(price, level)| LevelAggregate {
                price,
                total_quantity: level.total_quantity(),
                order_count: level.order_count(),
            })
            .collect()
    }

    /// `true` if this side currently has no resting liquidity.
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}
