//! The Submit matching sweep and the stop-order trigger table — spec.md §4.4,
//! §4.5.
//!
//! Grounded on `orderbook/matching.rs`'s price/time-priority walk (best
//! level outward, FIFO within a level, partial fills leave the maker
//! resting) generalized from the teacher's generic `OrderType<T>` matching
//! to this crate's concrete `Order`, plus a stop-order table the teacher
//! does not have: triggers are driven off the last trade price, converting
//! a triggered `Stop` to a `Market` order and feeding it back through the
//! same sweep (spec.md §4.5's cascade).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_skiplist::SkipMap;
use dashmap::DashMap;

use crate::order_book::OrderBook;
use crate::types::{Order, OrderId, OrderKind, OrderStatus, Price, Side, Trade, TradeId};

/// Generator for monotonically increasing [`TradeId`]s, one per symbol.
#[derive(Debug, Default)]
pub struct TradeIdGenerator(AtomicU64);

impl TradeIdGenerator {
    /// A generator that will hand out ids starting at 1.
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// A generator that resumes after `last_issued`, for rebuilding state
    /// from a durable-store replay.
    pub fn starting_at(last_issued: u64) -> Self {
        Self(AtomicU64::new(last_issued))
    }

    /// Allocate the next id.
    pub fn next(&self) -> TradeId {
        TradeId(self.0.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

/// The result of matching a single incoming order against the book: the
/// taker's final record, any trades it produced, and the resting makers it
/// touched.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    /// The incoming order's final record (resting, filled, or rejected).
    pub taker: Order,
    /// Trades produced by this order, in execution order.
    pub trades: Vec<Trade>,
    /// Updated records for every resting maker this order touched.
    pub maker_updates: Vec<Order>,
}

/// The full result of submitting one order, including any stop orders it
/// triggered transitively (spec.md §4.5 scenario 6).
#[derive(Debug, Clone)]
pub struct CascadeOutcome {
    /// The outcome of the originally submitted order.
    pub primary: ExecutionOutcome,
    /// Outcomes of stop orders triggered as a consequence, in trigger order.
    pub triggered: Vec<ExecutionOutcome>,
}

impl CascadeOutcome {
    /// All trades across the primary order and every triggered stop, in
    /// execution order.
    pub fn all_trades(&self) -> Vec<Trade> {
        let mut trades = self.primary.trades.clone();
        for outcome in &self.triggered {
            trades.extend(outcome.trades.clone());
        }
        trades
    }

    /// All order records touched (taker and maker sides) across the whole
    /// cascade, for the caller to persist and broadcast.
    pub fn all_order_updates(&self) -> Vec<Order> {
        let mut updates = vec![self.primary.taker.clone()];
        updates.extend(self.primary.maker_updates.clone());
        for outcome in &self.triggered {
            updates.push(outcome.taker.clone());
            updates.extend(outcome.maker_updates.clone());
        }
        updates
    }
}

/// Off-book table of pending Stop orders for one symbol, keyed by trigger
/// price. A buy stop triggers once the last trade price rises to or above
/// its `stop_price`; a sell stop triggers once it falls to or below.
#[derive(Default)]
pub struct StopTable {
    buy: SkipMap<u128, DashMap<OrderId, Order>>,
    sell: SkipMap<u128, DashMap<OrderId, Order>>,
    /// Index from order id to its parked (side, stop_price), so a cancel
    /// request (which only carries an id) can locate a parked stop without
    /// scanning every trigger-price bucket.
    locations: DashMap<OrderId, (Side, Price)>,
}

impl StopTable {
    /// An empty stop table.
    pub fn new() -> Self {
        Self {
            buy: SkipMap::new(),
            sell: SkipMap::new(),
            locations: DashMap::new(),
        }
    }

    fn table_for(&self, side: Side) -> &SkipMap<u128, DashMap<OrderId, Order>> {
        match side {
            Side::Buy => &self.buy,
            Side::Sell => &self.sell,
        }
    }

    /// Park a Stop order until its trigger price is crossed.
    pub fn insert(&self, order: Order) {
        let stop_price = order.stop_price.expect("stop order requires a stop_price");
        let price = stop_price.as_u128_key();
        self.locations.insert(order.id, (order.side, stop_price));
        self.table_for(order.side)
            .get_or_insert_with(price, DashMap::new)
            .value()
            .insert(order.id, order);
    }

    /// Remove a specific pending stop order, e.g. on cancel.
    pub fn remove(&self, side: Side, stop_price: Price, id: OrderId) -> Option<Order> {
        let entry = self.table_for(side).get(&stop_price.as_u128_key())?;
        let removed = entry.value().remove(&id).map(|(_, order)| order);
        if entry.value().is_empty() {
            entry.remove();
        }
        self.locations.remove(&id);
        removed
    }

    /// Find a parked stop order by id alone, for the cancel command surface
    /// (spec.md §4.3's `cancel` has no other way to address an off-book
    /// order). Returns the order unmodified; does not remove it.
    pub fn find(&self, id: OrderId) -> Option<Order> {
        let (side, price) = *self.locations.get(&id)?.value();
        self.table_for(side).get(&price.as_u128_key())?.value().get(&id).map(|e| e.clone())
    }

    /// Remove a parked stop order by id alone, for the cancel command
    /// surface. Returns the removed order, or `None` if no stop with this
    /// id is currently parked.
    pub fn remove_by_id(&self, id: OrderId) -> Option<Order> {
        let (side, price) = *self.locations.get(&id)?.value();
        self.remove(side, price, id)
    }

    /// Pop every stop order whose trigger condition `last_trade_price`
    /// satisfies, in ascending-price order for buys and descending-price
    /// order for sells (closest to the trade price first).
    pub fn take_triggered(&self, last_trade_price: Price) -> Vec<Order> {
        let key = last_trade_price.as_u128_key();
        let mut triggered = Vec::new();

        let mut drained_buy_keys = Vec::new();
        for entry in self.buy.iter() {
            if *entry.key() > key {
                break;
            }
            for item in entry.value().iter() {
                triggered.push(item.value().clone());
            }
            drained_buy_keys.push(*entry.key());
        }
        for key in drained_buy_keys {
            self.buy.remove(&key);
        }

        let mut drained_sell_keys = Vec::new();
        for entry in self.sell.iter().rev() {
            if *entry.key() < key {
                break;
            }
            for item in entry.value().iter() {
                triggered.push(item.value().clone());
            }
            drained_sell_keys.push(*entry.key());
        }
        for key in drained_sell_keys {
            self.sell.remove(&key);
        }

        triggered
    }
}

fn is_marketable(taker: &Order, level_price: Price) -> bool {
    match taker.kind {
        OrderKind::Market => true,
        OrderKind::Limit => match taker.side {
            Side::Buy => level_price <= taker.limit_price.expect("limit order requires price"),
            Side::Sell => level_price >= taker.limit_price.expect("limit order requires price"),
        },
        OrderKind::Stop => unreachable!("stop orders convert to Market before sweeping"),
    }
}

/// Walk the opposite side from best price outward, consuming liquidity at
/// FIFO arrival order within each level, until the taker is filled or no
/// further level is marketable (spec.md §4.4 steps 1-2).
fn sweep(
    taker: &mut Order,
    book: &OrderBook,
    trade_ids: &TradeIdGenerator,
    now: u64,
) -> (Vec<Trade>, Vec<Order>) {
    let mut trades = Vec::new();
    let mut maker_updates = Vec::new();
    let maker_side = taker.side.opposite();

    loop {
        if taker.remaining().is_zero() {
            break;
        }
        let Some((price, maker)) = book.peek_best(maker_side) else {
            break;
        };
        if !is_marketable(taker, price) {
            break;
        }

        let trade_qty = std::cmp::min(taker.remaining(), maker.remaining());
        taker.filled_quantity = taker.filled_quantity.saturating_add(trade_qty);
        taker.updated_at = now;

        let updated_maker = book
            .apply_maker_fill(maker.id, maker_side, price, trade_qty, now)
            .expect("maker observed via peek_best must still be tracked within this command");

        let (buy_order_id, sell_order_id) = match taker.side {
            Side::Buy => (taker.id, maker.id),
            Side::Sell => (maker.id, taker.id),
        };
        trades.push(Trade {
            id: trade_ids.next(),
            symbol: book.symbol().clone(),
            buy_order_id,
            sell_order_id,
            quantity: trade_qty,
            price,
            executed_at: now,
            maker_order_id: maker.id,
            taker_order_id: taker.id,
        });
        maker_updates.push(updated_maker);
        book.prune_level(maker_side, price);
    }

    (trades, maker_updates)
}

/// Match (and, for Limit orders with remainder, rest) one incoming order.
/// Stop orders are parked in `stops` rather than swept immediately
/// (spec.md §4.5).
pub fn submit(
    book: &OrderBook,
    stops: &StopTable,
    mut taker: Order,
    trade_ids: &TradeIdGenerator,
    now: u64,
) -> ExecutionOutcome {
    if taker.kind == OrderKind::Stop {
        taker.status = OrderStatus::Pending;
        stops.insert(taker.clone());
        return ExecutionOutcome {
            taker,
            trades: Vec::new(),
            maker_updates: Vec::new(),
        };
    }

    let (trades, maker_updates) = sweep(&mut taker, book, trade_ids, now);

    taker.status = if taker.is_fully_filled() {
        OrderStatus::Filled
    } else if !taker.filled_quantity.is_zero() {
        OrderStatus::PartiallyFilled
    } else if taker.kind == OrderKind::Market {
        OrderStatus::Rejected
    } else {
        OrderStatus::Pending
    };

    if taker.kind == OrderKind::Limit && !taker.is_fully_filled() {
        book.insert_limit(taker.clone());
    } else {
        book.update_order_record(taker.clone());
    }

    ExecutionOutcome {
        taker,
        trades,
        maker_updates,
    }
}

/// Submit an order and transitively trigger any Stop orders its trades
/// unblock, breadth-first in trigger order, until the cascade runs dry.
pub fn submit_with_cascade(
    book: &OrderBook,
    stops: &StopTable,
    order: Order,
    trade_ids: &TradeIdGenerator,
    now: u64,
) -> CascadeOutcome {
    let primary = submit(book, stops, order, trade_ids, now);

    let mut pending: VecDeque<Order> = VecDeque::new();
    if let Some(last_trade) = primary.trades.last() {
        pending.extend(stops.take_triggered(last_trade.price));
    }

    let mut triggered = Vec::new();
    while let Some(mut stop_order) = pending.pop_front() {
        stop_order.kind = OrderKind::Market;
        stop_order.status = OrderStatus::Pending;
        stop_order.updated_at = now;

        let outcome = submit(book, stops, stop_order, trade_ids, now);
        if let Some(last_trade) = outcome.trades.last() {
            pending.extend(stops.take_triggered(last_trade.price));
        }
        triggered.push(outcome);
    }

    CascadeOutcome { primary, triggered }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Quantity, Symbol, UserId};

    fn limit(id: u64, user: u64, side: Side, price: i64, qty: u64, seq: u64) -> Order {
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
            sequence: seq,
        }
    }

    fn market(id: u64, user: u64, side: Side, qty: u64, seq: u64) -> Order {
        Order {
            id: OrderId(id),
            user_id: UserId(user),
            symbol: Symbol::from("BTC/USD"),
            side,
            kind: OrderKind::Market,
            original_quantity: Quantity::from_ticks(qty),
            filled_quantity: Quantity::zero(),
            limit_price: None,
            stop_price: None,
            status: OrderStatus::Pending,
            created_at: 0,
            updated_at: 0,
            sequence: seq,
        }
    }

    #[test]
    fn crosses_at_best_bid() {
        let book = OrderBook::new(Symbol::from("BTC/USD"));
        let stops = StopTable::new();
        let trade_ids = TradeIdGenerator::new();

        book.insert_limit(limit(1, 1, Side::Buy, 100, 10, 1));
        let outcome = submit(&book, &stops, market(2, 2, Side::Sell, 10, 2), &trade_ids, 0);

        assert_eq!(outcome.trades.len(), 1);
        assert_eq!(outcome.trades[0].quantity, Quantity::from_ticks(10));
        assert_eq!(outcome.trades[0].price, Price::from_ticks(100));
        assert_eq!(outcome.taker.status, OrderStatus::Filled);
        assert!(book.best_bid().is_none());
    }

    #[test]
    fn limit_sweeps_two_levels_then_rests_remainder() {
        let book = OrderBook::new(Symbol::from("BTC/USD"));
        let stops = StopTable::new();
        let trade_ids = TradeIdGenerator::new();

        book.insert_limit(limit(1, 1, Side::Sell, 100, 5, 1));
        book.insert_limit(limit(2, 1, Side::Sell, 101, 5, 2));

        let outcome = submit(
            &book,
            &stops,
            limit(3, 2, Side::Buy, 101, 12, 3),
            &trade_ids,
            0,
        );

        assert_eq!(outcome.trades.len(), 2);
        assert_eq!(outcome.trades[0].price, Price::from_ticks(100));
        assert_eq!(outcome.trades[1].price, Price::from_ticks(101));
        assert_eq!(outcome.taker.status, OrderStatus::PartiallyFilled);
        assert_eq!(outcome.taker.remaining(), Quantity::from_ticks(2));
        assert_eq!(book.best_bid(), Some(Price::from_ticks(101)));
    }

    #[test]
    fn time_priority_fills_earliest_arrival_first() {
        let book = OrderBook::new(Symbol::from("BTC/USD"));
        let stops = StopTable::new();
        let trade_ids = TradeIdGenerator::new();

        book.insert_limit(limit(1, 1, Side::Sell, 100, 5, 1));
        book.insert_limit(limit(2, 2, Side::Sell, 100, 5, 2));

        let outcome = submit(
            &book,
            &stops,
            market(3, 3, Side::Buy, 5, 3),
            &trade_ids,
            0,
        );

        assert_eq!(outcome.trades.len(), 1);
        assert_eq!(outcome.trades[0].maker_order_id, OrderId(1));
    }

    #[test]
    fn market_order_with_no_liquidity_is_rejected() {
        let book = OrderBook::new(Symbol::from("BTC/USD"));
        let stops = StopTable::new();
        let trade_ids = TradeIdGenerator::new();

        let outcome = submit(&book, &stops, market(1, 1, Side::Buy, 10, 1), &trade_ids, 0);
        assert!(outcome.trades.is_empty());
        assert_eq!(outcome.taker.status, OrderStatus::Rejected);
    }

    #[test]
    fn stop_order_parks_until_triggered_then_cascades() {
        let book = OrderBook::new(Symbol::from("BTC/USD"));
        let stops = StopTable::new();
        let trade_ids = TradeIdGenerator::new();

        let mut buy_stop = market(1, 1, Side::Buy, 10, 1);
        buy_stop.kind = OrderKind::Stop;
        buy_stop.stop_price = Some(Price::from_ticks(105));
        let parked = submit(&book, &stops, buy_stop, &trade_ids, 0);
        assert_eq!(parked.taker.status, OrderStatus::Pending);
        assert!(book.best_bid().is_none());

        book.insert_limit(limit(2, 2, Side::Sell, 105, 20, 2));
        let cascade = submit_with_cascade(
            &book,
            &stops,
            limit(3, 3, Side::Buy, 105, 5, 3),
            &trade_ids,
            0,
        );

        assert_eq!(cascade.primary.trades.len(), 1);
        assert_eq!(cascade.triggered.len(), 1);
        assert_eq!(cascade.triggered[0].taker.id, OrderId(1));
        assert_eq!(cascade.triggered[0].trades.len(), 1);
    }

    #[test]
    fn stop_table_finds_and_removes_a_parked_order_by_id_alone() {
        let stops = StopTable::new();
        let mut buy_stop = market(1, 1, Side::Buy, 10, 1);
        buy_stop.kind = OrderKind::Stop;
        buy_stop.stop_price = Some(Price::from_ticks(105));
        stops.insert(buy_stop);

        assert!(stops.find(OrderId(1)).is_some());
        assert!(stops.find(OrderId(2)).is_none());

        let removed = stops.remove_by_id(OrderId(1)).unwrap();
        assert_eq!(removed.id, OrderId(1));
        assert!(stops.find(OrderId(1)).is_none());
        assert!(stops.remove_by_id(OrderId(1)).is_none());
    }
}
