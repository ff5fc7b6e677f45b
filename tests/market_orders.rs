//! Market-order scenarios from spec.md §8: immediate execution against
//! resting liquidity, partial fills, and rejection when the book is empty.

use std::sync::Arc;

use matchcore::engine::{Engine, NewOrderRequest};
use matchcore::events::EventBus;
use matchcore::store::InMemoryStore;
use matchcore::types::{OrderKind, OrderStatus, Price, Quantity, Side, Symbol, UserId};

fn start_engine() -> Engine {
    Engine::start(
        vec![Symbol::from("BTC/USD")],
        Arc::new(InMemoryStore::new()),
        Arc::new(EventBus::new()),
        3,
    )
    .unwrap()
}

fn limit(user: u64, side: Side, qty: u64, price: i64) -> NewOrderRequest {
    NewOrderRequest {
        user_id: UserId(user),
        symbol: Symbol::from("BTC/USD"),
        side,
        kind: OrderKind::Limit,
        quantity: Quantity::from_ticks(qty),
        limit_price: Some(Price::from_ticks(price)),
        stop_price: None,
    }
}

fn market(user: u64, side: Side, qty: u64) -> NewOrderRequest {
    NewOrderRequest {
        user_id: UserId(user),
        symbol: Symbol::from("BTC/USD"),
        side,
        kind: OrderKind::Market,
        quantity: Quantity::from_ticks(qty),
        limit_price: None,
        stop_price: None,
    }
}

#[tokio::test]
async fn market_order_with_no_liquidity_is_rejected() {
    let engine = start_engine();
    let order = engine.submit(market(1, Side::Buy, 10)).await.unwrap();
    assert_eq!(order.status, OrderStatus::Rejected);
}

#[tokio::test]
async fn market_order_consumes_resting_liquidity_at_its_price() {
    let engine = start_engine();
    engine.submit(limit(1, Side::Sell, 10, 100)).await.unwrap();

    let taker = engine.submit(market(2, Side::Buy, 10)).await.unwrap();
    assert_eq!(taker.status, OrderStatus::Filled);

    let trades = engine
        .recent_trades(&Symbol::from("BTC/USD"), 10)
        .await
        .unwrap();
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].price, Price::from_ticks(100));
}

#[tokio::test]
async fn market_order_larger_than_liquidity_partially_fills() {
    let engine = start_engine();
    engine.submit(limit(1, Side::Sell, 5, 100)).await.unwrap();

    let taker = engine.submit(market(2, Side::Buy, 20)).await.unwrap();
    assert_eq!(taker.status, OrderStatus::PartiallyFilled);
    assert_eq!(taker.filled_quantity, Quantity::from_ticks(5));
}

#[tokio::test]
async fn market_order_never_rests_after_partial_fill() {
    let engine = start_engine();
    engine.submit(limit(1, Side::Sell, 5, 100)).await.unwrap();
    engine.submit(market(2, Side::Buy, 20)).await.unwrap();

    let snapshot = engine.snapshot(&Symbol::from("BTC/USD"), 5).await.unwrap();
    assert!(snapshot.bids.is_empty());
    assert!(snapshot.asks.is_empty());
}
