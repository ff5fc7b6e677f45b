//! FIFO queue of resting orders at one (symbol, side, price) — spec.md §4.1.
//!
//! Grounded on the hybrid design documented in the teacher crate's
//! crate-level docs ("Previous Bottleneck" / "New Implementation"): a
//! `DashMap` gives O(1) average-case lookup/removal by id. Arrival order is
//! tracked by a `crossbeam_skiplist::SkipMap<u64, OrderId>` keyed by each
//! order's engine-assigned sequence number (the same ordered-map building
//! block `book_side` uses for price levels) rather than a plain queue: a
//! `SkipMap` supports reading the front entry without removing it and
//! removing a specific key directly, so a stale id left behind by `remove`
//! is dropped in place instead of requiring a pop-then-repush rotation that
//! would reorder the orders still live behind it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_skiplist::SkipMap;
use dashmap::DashMap;

use crate::types::{Order, OrderId, Quantity};

/// A single price level: the set of resting orders at one (symbol, side,
/// price), FIFO-ordered by arrival.
///
/// Invariant (spec.md §3 PriceLevel): `total_quantity() == sum(remaining of
/// resting orders)` and `order_count() == ` number of live ids in the
/// level. Dead ids (cancelled/filled and not yet pruned from `arrival`) are
/// skipped lazily by `head()`/`pop_head()`.
pub struct PriceLevel {
    orders: DashMap<OrderId, Order>,
    arrival: SkipMap<u64, OrderId>,
    total_quantity: AtomicU64,
    order_count: AtomicU64,
}

impl PriceLevel {
    /// An empty price level.
    pub fn new() -> Self {
        Self {
            orders: DashMap::new(),
            arrival: SkipMap::new(),
            total_quantity: AtomicU64::new(0),
            order_count: AtomicU64::new(0),
        }
    }

    /// Append a resting order to the tail of this level.
    pub fn append(&self, order: Order) {
        let remaining = order.remaining().ticks();
        let id = order.id;
        let sequence = order.sequence;
        self.orders.insert(id, order);
        self.arrival.insert(sequence, id);
        self.total_quantity.fetch_add(remaining, Ordering::AcqRel);
        self.order_count.fetch_add(1, Ordering::AcqRel);
    }

    /// The earliest-arriving live order at this level, if any.
    ///
    /// Reads the front of `arrival` without removing it; a live head is
    /// returned untouched, never rotated to the back. Only a confirmed-dead
    /// entry at the front is pruned before continuing to look.
    pub fn head(&self) -> Option<Order> {
        loop {
            let entry = self.arrival.front()?;
            let id = *entry.value();
            if let Some(order) = self.orders.get(&id) {
                return Some(order.clone());
            }
            entry.remove();
        }
    }

    /// Remove and return the earliest-arriving live order.
    pub fn pop_head(&self) -> Option<Order> {
        loop {
            let entry = self.arrival.front()?;
            let id = *entry.value();
            entry.remove();
            if let Some((_, order)) = self.orders.remove(&id) {
                self.total_quantity
                    .fetch_sub(order.remaining().ticks(), Ordering::AcqRel);
                self.order_count.fetch_sub(1, Ordering::AcqRel);
                return Some(order);
            }
            // Stale id already removed by `remove`; keep looking.
        }
    }

    /// Update the resting copy of an order in place (e.g. after a partial
    /// fill) without disturbing its position in the arrival queue.
    pub fn update_remaining(&self, id: OrderId, new_order: Order) {
        if let Some(mut entry) = self.orders.get_mut(&id) {
            let before = entry.remaining().ticks();
            let after = new_order.remaining().ticks();
            *entry = new_order;
            if after >= before {
                self.total_quantity
                    .fetch_add(after - before, Ordering::AcqRel);
            } else {
                self.total_quantity
                    .fetch_sub(before - after, Ordering::AcqRel);
            }
        }
    }

    /// Remove a specific order by id, wherever it sits in the queue.
    ///
    /// O(log n) via the `DashMap` plus a direct `arrival` key removal keyed
    /// on the order's own sequence number — no tombstone is left behind.
    pub fn remove(&self, id: OrderId) -> Option<Order> {
        let (_, order) = self.orders.remove(&id)?;
        self.arrival.remove(&order.sequence);
        self.total_quantity
            .fetch_sub(order.remaining().ticks(), Ordering::AcqRel);
        self.order_count.fetch_sub(1, Ordering::AcqRel);
        Some(order)
    }

    /// Sum of `remaining()` across all live resting orders.
    pub fn total_quantity(&self) -> Quantity {
        Quantity::from_ticks(self.total_quantity.load(Ordering::Acquire))
    }

    /// Number of live resting orders.
    pub fn order_count(&self) -> u64 {
        self.order_count.load(Ordering::Acquire)
    }

    /// `true` once every resting order has been removed.
    pub fn is_empty(&self) -> bool {
        self.order_count() == 0
    }

    /// Snapshot of resting orders in arrival order, for `OrderBook::snapshot`
    /// and diagnostics. Does not mutate the level.
    pub fn orders_in_order(&self) -> Vec<Order> {
        self.arrival
            .iter()
            .filter_map(|entry| self.orders.get(entry.value()).map(|order| order.clone()))
            .collect()
    }
}

impl Default for PriceLevel {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience wrapper so callers can share a level across threads/levels of
/// a `BookSide` without an extra indirection at each call site.
pub type SharedPriceLevel = Arc<PriceLevel>;
