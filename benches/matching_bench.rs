//! Matching engine throughput benchmarks, run directly against
//! `matching::submit` and `OrderBook` rather than through the async
//! `Engine`, so the numbers measure the sweep itself rather than channel
//! and task-scheduling overhead.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use matchcore::matching::{self, StopTable, TradeIdGenerator};
use matchcore::order_book::OrderBook;
use matchcore::types::{Order, OrderId, OrderKind, OrderStatus, Price, Quantity, Side, Symbol, UserId};

fn limit(id: u64, side: Side, price: i64, qty: u64) -> Order {
    Order {
        id: OrderId(id),
        user_id: UserId(id),
        symbol: Symbol::from("BENCH"),
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

fn market(id: u64, side: Side, qty: u64) -> Order {
    Order {
        id: OrderId(id),
        user_id: UserId(id),
        symbol: Symbol::from("BENCH"),
        side,
        kind: OrderKind::Market,
        original_quantity: Quantity::from_ticks(qty),
        filled_quantity: Quantity::zero(),
        limit_price: None,
        stop_price: None,
        status: OrderStatus::Pending,
        created_at: 0,
        updated_at: 0,
        sequence: id,
    }
}

/// Resting a stream of non-marketable limit orders, the common case of a
/// quiet book: each insert finds nothing to cross and pays only the
/// skip-list/index bookkeeping cost.
fn bench_resting_inserts(c: &mut Criterion) {
    let mut group = c.benchmark_group("resting inserts");

    for &count in &[1_000u64, 10_000, 100_000] {
        group.bench_with_input(BenchmarkId::new("insert_limit", count), &count, |b, &count| {
            b.iter_with_setup(
                || {
                    let book = OrderBook::new(Symbol::from("BENCH"));
                    let stops = StopTable::new();
                    let trade_ids = TradeIdGenerator::new();
                    (book, stops, trade_ids)
                },
                |(book, stops, trade_ids)| {
                    for i in 0..count {
                        // Alternate sides and spread prices so every order
                        // rests without crossing the opposite side.
                        let side = if i % 2 == 0 { Side::Buy } else { Side::Sell };
                        let price = if side == Side::Buy {
                            1_000 - (i % 500) as i64
                        } else {
                            1_500 + (i % 500) as i64
                        };
                        black_box(matching::submit(
                            &book,
                            &stops,
                            limit(i + 1, side, price, 10),
                            &trade_ids,
                            0,
                        ));
                    }
                },
            );
        });
    }

    group.finish();
}

/// A marketable limit order sweeping across an increasing number of resting
/// price levels on one side before (partially) resting the remainder.
fn bench_sweep_depth(c: &mut Criterion) {
    let mut group = c.benchmark_group("sweep across depth");

    for &levels in &[1u64, 10, 100, 1_000] {
        group.bench_with_input(BenchmarkId::new("limit_sweep", levels), &levels, |b, &levels| {
            b.iter_with_setup(
                || {
                    let book = OrderBook::new(Symbol::from("BENCH"));
                    let stops = StopTable::new();
                    let trade_ids = TradeIdGenerator::new();
                    for i in 0..levels {
                        let outcome = matching::submit(
                            &book,
                            &stops,
                            limit(i + 1, Side::Sell, 1_000 + i as i64, 10),
                            &trade_ids,
                            0,
                        );
                        assert_eq!(outcome.taker.status, OrderStatus::Pending);
                    }
                    (book, stops, trade_ids)
                },
                |(book, stops, trade_ids)| {
                    let sweeper = limit(levels + 1, Side::Buy, 1_000 + levels as i64, 10 * levels);
                    black_box(matching::submit(&book, &stops, sweeper, &trade_ids, 0));
                },
            );
        });
    }

    group.finish();
}

/// Market orders consuming one resting level each, the shape a liquidation
/// or a thin book produces under load.
fn bench_market_against_single_level(c: &mut Criterion) {
    let mut group = c.benchmark_group("market order throughput");

    group.bench_function("market_consumes_one_maker", |b| {
        b.iter_with_setup(
            || {
                let book = OrderBook::new(Symbol::from("BENCH"));
                let stops = StopTable::new();
                let trade_ids = TradeIdGenerator::new();
                let maker = limit(1, Side::Sell, 1_000, 10);
                matching::submit(&book, &stops, maker, &trade_ids, 0);
                (book, stops, trade_ids)
            },
            |(book, stops, trade_ids)| {
                black_box(matching::submit(&book, &stops, market(2, Side::Buy, 10), &trade_ids, 0));
            },
        );
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_resting_inserts,
    bench_sweep_depth,
    bench_market_against_single_level,
);
criterion_main!(benches);
