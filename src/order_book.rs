//! Per-symbol order book: both book sides plus the order index — spec.md §4.3.
//!
//! Grounded on `orderbook/book.rs`'s `OrderBook<T>` (the `bids`/`asks`/
//! `order_locations`/`user_orders` field quartet), narrowed to this crate's
//! concrete `Order` type instead of the teacher's generic `OrderType<T>`.

use std::sync::Arc;

use dashmap::DashMap;

use crate::book_side::BookSide;
use crate::error::EngineError;
use crate::types::{
    CancelOutcome, Order, OrderId, OrderStatus, Price, Quantity, Side, Symbol, UserId,
};

/// Where a live order currently rests.
#[derive(Debug, Clone, Copy)]
struct OrderLocation {
    side: Side,
    price: Price,
}

/// Mapping from order id to its resting location (spec.md §3 OrderIndex).
/// Enables O(1)-average cancel-by-id without scanning every level.
#[derive(Default)]
pub struct OrderIndex {
    locations: DashMap<OrderId, OrderLocation>,
    by_user: DashMap<UserId, Vec<OrderId>>,
}

impl OrderIndex {
    fn track(&self, order: &Order, price: Price) {
        self.locations.insert(
            order.id,
            OrderLocation {
                side: order.side,
                price,
            },
        );
        self.by_user.entry(order.user_id).or_default().push(order.id);
    }

    fn untrack(&self, id: OrderId, user_id: UserId) {
        self.locations.remove(&id);
        if let Some(mut ids) = self.by_user.get_mut(&user_id) {
            ids.retain(|existing| *existing != id);
        }
    }

    /// Order ids currently resting for `user_id`.
    pub fn orders_for_user(&self, user_id: UserId) -> Vec<OrderId> {
        self.by_user
            .get(&user_id)
            .map(|ids| ids.clone())
            .unwrap_or_default()
    }
}

/// The two-sided order book and order index for a single symbol.
pub struct OrderBook {
    symbol: Symbol,
    bids: BookSide,
    asks: BookSide,
    index: OrderIndex,
    /// Live order records, independent of resting location, so cancel/status
    /// lookups work uniformly whether or not the order currently rests.
    orders: DashMap<OrderId, Order>,
}

/// A snapshot of the order book's resting liquidity at a point in time
/// (spec.md §6 `GetOrderBookSnapshot`).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct OrderBookSnapshot {
    /// The symbol this snapshot describes.
    pub symbol: Symbol,
    /// Bid side levels, best price first.
    pub bids: Vec<crate::book_side::LevelAggregate>,
    /// Ask side levels, best price first.
    pub asks: Vec<crate::book_side::LevelAggregate>,
    /// The event sequence number this snapshot is consistent with
    /// (spec.md §4.6).
    pub sequence: u64,
    /// Epoch milliseconds when the snapshot was taken.
    pub timestamp: u64,
}

impl OrderBook {
    /// A fresh, empty order book for `symbol`.
    pub fn new(symbol: Symbol) -> Self {
        Self {
            symbol,
            bids: BookSide::new(Side::Buy),
            asks: BookSide::new(Side::Sell),
            index: OrderIndex::default(),
            orders: DashMap::new(),
        }
    }

    /// The symbol this book tracks.
    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    /// The side the matcher walks for a given incoming order side: asks for
    /// an incoming buy, bids for an incoming sell.
    pub fn opposite_side(&self, side: Side) -> &BookSide {
        match side {
            Side::Buy => &self.asks,
            Side::Sell => &self.bids,
        }
    }

    /// The side an order of `side` would rest on.
    pub fn own_side(&self, side: Side) -> &BookSide {
        match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        }
    }

    /// Best bid price, if any.
    pub fn best_bid(&self) -> Option<Price> {
        self.bids.best_price()
    }

    /// Best ask price, if any.
    pub fn best_ask(&self) -> Option<Price> {
        self.asks.best_price()
    }

    /// `true` if `best_bid < best_ask` or either side is empty — the
    /// no-crossed-book invariant (spec.md §8).
    pub fn is_crossed(&self) -> bool {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => bid >= ask,
            _ => false,
        }
    }

    /// Insert the (unfilled remainder of a) Limit order as a new maker at
    /// the tail of its price level, and record it in the order index.
    pub fn insert_limit(&self, order: Order) {
        let price = order
            .limit_price
            .expect("insert_limit requires a limit price");
        self.index.track(&order, price);
        self.orders.insert(order.id, order.clone());
        self.own_side(order.side).insert_order(price, order);
    }

    /// Fetch a live order record by id, resting or not.
    pub fn get_order(&self, id: OrderId) -> Option<Order> {
        self.orders.get(&id).map(|e| e.clone())
    }

    /// Replace the stored record for an order (e.g. after a fill updates its
    /// `filled_quantity`/`status`). Does not touch resting location.
    pub fn update_order_record(&self, order: Order) {
        self.orders.insert(order.id, order);
    }

    /// Remove an order's resting presence (level + index) without touching
    /// its stored record. Used once an order is fully filled or cancelled.
    pub fn retire_from_book(&self, id: OrderId, side: Side, price: Price) {
        self.own_side(side).remove_order(price, id);
        if let Some(loc) = self.index.locations.get(&id) {
            let user_id = self.orders.get(&id).map(|o| o.user_id);
            let loc = *loc;
            drop(loc);
            if let Some(user_id) = user_id {
                self.index.untrack(id, user_id);
            }
        }
    }

    /// Cancel a resting order on behalf of `user_id`.
    ///
    /// Errors per spec.md §4.3: `NotFound` if unknown, `NotOwned` if a
    /// different user submitted it, `AlreadyTerminal` if its status is
    /// already terminal. On success, transitions status to `Cancelled` and
    /// removes it from the book; the caller (the matching engine) is
    /// responsible for emitting the terminal `OrderChanged` event as part of
    /// the same atomic command.
    pub fn cancel(&self, id: OrderId, user_id: UserId) -> Result<CancelOutcome, EngineError> {
        let mut order = self
            .orders
            .get(&id)
            .map(|e| e.clone())
            .ok_or(EngineError::NotFound(id))?;

        if order.user_id != user_id {
            return Err(EngineError::NotOwned(id));
        }
        if order.status.is_terminal() {
            return Err(EngineError::AlreadyTerminal(id));
        }

        let price = order.limit_price;
        order.status = OrderStatus::Cancelled;
        order.updated_at = crate::types::current_time_millis();
        self.orders.insert(id, order.clone());

        if let Some(price) = price {
            self.own_side(order.side).remove_order(price, id);
        }
        self.index.untrack(id, user_id);

        Ok(CancelOutcome {
            status: OrderStatus::Cancelled,
        })
    }

    /// A resting-liquidity snapshot consistent with `sequence`.
    pub fn snapshot(&self, depth: usize, sequence: u64) -> OrderBookSnapshot {
        OrderBookSnapshot {
            symbol: self.symbol.clone(),
            bids: self.bids.depth(depth),
            asks: self.asks.depth(depth),
            sequence,
            timestamp: crate::types::current_time_millis(),
        }
    }

    /// Order ids resting for a given user (used by mass-cancel-on-disconnect
    /// style operations, if the adapter ever needs them).
    pub fn orders_for_user(&self, user_id: UserId) -> Vec<OrderId> {
        self.index.orders_for_user(user_id)
    }

    /// The best resting maker on `side`, with the price it rests at, without
    /// removing it. Used by the matcher to decide whether a sweep continues.
    pub fn peek_best(&self, side: Side) -> Option<(Price, Order)> {
        let (price, level) = self.own_side(side).iter_from_best().next()?;
        let order = level.head()?;
        Some((price, order))
    }

    /// Apply a fill of `fill_quantity` to the resting maker `maker_id` on
    /// `side` at `price`, keeping the level, the order record, and the order
    /// index in sync. Returns the updated maker record, or `None` if the
    /// maker is no longer tracked (should not happen for an id obtained from
    /// [`peek_best`] within the same single-writer command).
    pub fn apply_maker_fill(
        &self,
        maker_id: OrderId,
        side: Side,
        price: Price,
        fill_quantity: Quantity,
        now: u64,
    ) -> Option<Order> {
        let mut maker = self.orders.get(&maker_id)?.clone();
        maker.filled_quantity = maker.filled_quantity.saturating_add(fill_quantity);
        maker.updated_at = now;

        if maker.is_fully_filled() {
            maker.status = OrderStatus::Filled;
            self.own_side(side).remove_order(price, maker_id);
            self.index.untrack(maker_id, maker.user_id);
        } else {
            maker.status = OrderStatus::PartiallyFilled;
            if let Some(level) = self.own_side(side).level_at(price) {
                level.update_remaining(maker_id, maker.clone());
            }
        }

        self.orders.insert(maker_id, maker.clone());
        Some(maker)
    }

    /// Drop the level at `price` on `side` from the index if a sweep left it
    /// empty.
    pub fn prune_level(&self, side: Side, price: Price) {
        self.own_side(side).prune_if_empty(price);
    }
}

/// Shared handle to an [`OrderBook`], one per symbol, held by the matching
/// engine's per-symbol worker.
pub type SharedOrderBook = Arc<OrderBook>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OrderKind, Quantity};

    fn make_limit(id: u64, user: u64, side: Side, price: i64, qty: u64) -> Order {
        Order {
            id: OrderId(id),
            user_id: UserId(user),
            symbol: Symbol::from("BTC/USD"),
            side,
            kind: OrderKind::Limit,
            original_quantity: Quantity::from_ticks(qty),
            filled_quantity: Quantity::zero(),
            limit_price: Some(Price::from_ticks(price)),
            stop_price: None,
            status: OrderStatus::Pending,
            created_at: 0,
            updated_at: 0,
            sequence: id,
        }
    }

    #[test]
    fn insert_then_cancel_removes_from_book() {
        let book = OrderBook::new(Symbol::from("BTC/USD"));
        book.insert_limit(make_limit(7, 1, Side::Buy, 100, 10));
        assert_eq!(book.best_bid(), Some(Price::from_ticks(100)));

        let outcome = book.cancel(OrderId(7), UserId(1)).unwrap();
        assert_eq!(outcome.status, OrderStatus::Cancelled);
        assert_eq!(book.best_bid(), None);

        // Cancel scenario 4: repeated cancel is AlreadyTerminal.
        let err = book.cancel(OrderId(7), UserId(1)).unwrap_err();
        assert!(matches!(err, EngineError::AlreadyTerminal(OrderId(7))));
    }

    #[test]
    fn cancel_unknown_order_is_not_found() {
        let book = OrderBook::new(Symbol::from("BTC/USD"));
        let err = book.cancel(OrderId(99), UserId(1)).unwrap_err();
        assert!(matches!(err, EngineError::NotFound(OrderId(99))));
    }

    #[test]
    fn cancel_wrong_owner_is_not_owned() {
        let book = OrderBook::new(Symbol::from("BTC/USD"));
        book.insert_limit(make_limit(1, 1, Side::Buy, 100, 10));
        let err = book.cancel(OrderId(1), UserId(2)).unwrap_err();
        assert!(matches!(err, EngineError::NotOwned(OrderId(1))));
    }

    #[test]
    fn never_crossed_with_disjoint_sides() {
        let book = OrderBook::new(Symbol::from("BTC/USD"));
        book.insert_limit(make_limit(1, 1, Side::Buy, 100, 10));
        book.insert_limit(make_limit(2, 1, Side::Sell, 110, 10));
        assert!(!book.is_crossed());
    }
}
