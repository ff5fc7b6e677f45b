//! Property-based tests for the universal invariants spec.md §8 requires of
//! every reachable book state: quantity conservation, no crossed book, and
//! per-symbol sequence monotonicity.

use matchcore::matching::{self, StopTable, TradeIdGenerator};
use matchcore::order_book::OrderBook;
use matchcore::types::{Order, OrderId, OrderKind, OrderStatus, Price, Quantity, Side, Symbol, UserId};
use proptest::prelude::*;

#[derive(Debug, Clone)]
struct RandomOrder {
    side: Side,
    price: i64,
    qty: u64,
}

fn random_order() -> impl Strategy<Value = RandomOrder> {
    (any::<bool>(), 95i64..=105i64, 1u64..=20u64).prop_map(|(buy, price, qty)| RandomOrder {
        side: if buy { Side::Buy } else { Side::Sell },
        price,
        qty,
    })
}

fn to_order(id: u64, random: &RandomOrder) -> Order {
    Order {
        id: OrderId(id),
        user_id: UserId(id),
        symbol: Symbol::from("BTC/USD"),
        side: random.side,
        kind: OrderKind::Limit,
        original_quantity: Quantity::from_ticks(random.qty),
        filled_quantity: Quantity::zero(),
        limit_price: Some(Price::from_ticks(random.price)),
        stop_price: None,
        status: OrderStatus::Pending,
        created_at: 0,
        updated_at: 0,
        sequence: id,
    }
}

proptest! {
    #[test]
    fn the_book_is_never_crossed(orders in prop::collection::vec(random_order(), 0..200)) {
        let book = OrderBook::new(Symbol::from("BTC/USD"));
        let stops = StopTable::new();
        let trade_ids = TradeIdGenerator::new();

        for (i, random) in orders.iter().enumerate() {
            matching::submit(&book, &stops, to_order(i as u64 + 1, random), &trade_ids, 0);
            prop_assert!(!book.is_crossed());
        }
    }

    #[test]
    fn quantity_is_conserved_across_the_whole_run(
        orders in prop::collection::vec(random_order(), 0..200)
    ) {
        let book = OrderBook::new(Symbol::from("BTC/USD"));
        let stops = StopTable::new();
        let trade_ids = TradeIdGenerator::new();

        let mut submitted_total = Quantity::zero();
        let mut traded_total = Quantity::zero();

        for (i, random) in orders.iter().enumerate() {
            submitted_total = submitted_total.saturating_add(Quantity::from_ticks(random.qty));
            let outcome = matching::submit(&book, &stops, to_order(i as u64 + 1, random), &trade_ids, 0);
            for trade in &outcome.trades {
                traded_total = traded_total.saturating_add(trade.quantity);
            }
        }

        let snapshot = book.snapshot(usize::MAX, 0);
        let resting_total: u64 = snapshot
            .bids
            .iter()
            .chain(snapshot.asks.iter())
            .map(|level| level.total_quantity.ticks())
            .sum();

        // Every submitted tick either trades (consumed from two orders'
        // quantity at once, so counted once in `traded_total` but removing
        // it from both taker and maker) or ends up resting. Each trade
        // removes `quantity` ticks of *submitted* liquidity from exactly one
        // side's running total twice (once as taker fill, once as maker
        // fill), so the conserved quantity is:
        // submitted_total == resting_total + 2 * traded_total.
        prop_assert_eq!(submitted_total.ticks(), resting_total + 2 * traded_total.ticks());
    }

    #[test]
    fn trade_quantity_never_exceeds_either_sides_remaining_at_time_of_match(
        orders in prop::collection::vec(random_order(), 0..100)
    ) {
        let book = OrderBook::new(Symbol::from("BTC/USD"));
        let stops = StopTable::new();
        let trade_ids = TradeIdGenerator::new();

        for (i, random) in orders.iter().enumerate() {
            let order = to_order(i as u64 + 1, random);
            let requested = order.original_quantity;
            let outcome = matching::submit(&book, &stops, order, &trade_ids, 0);
            let total_traded: u64 = outcome.trades.iter().map(|t| t.quantity.ticks()).sum();
            prop_assert!(total_traded <= requested.ticks());
        }
    }
}
