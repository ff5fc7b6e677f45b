//! End-to-end WebSocket subscription gateway tests (spec.md §4.6): the
//! snapshot-then-stream handoff, live fan-out, and the session command
//! protocol, driven over a real TCP listener with a `tokio-tungstenite`
//! client.

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use matchcore::adapter;
use matchcore::engine::{Engine, NewOrderRequest};
use matchcore::events::EventBus;
use matchcore::store::InMemoryStore;
use matchcore::types::{OrderKind, Price, Quantity, Side, Symbol, UserId};
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::Message;

async fn spawn_server() -> (String, Arc<Engine>) {
    let engine = Arc::new(
        Engine::start(
            vec![Symbol::from("BTC-USD")],
            Arc::new(InMemoryStore::new()),
            Arc::new(EventBus::new()),
            3,
        )
        .unwrap(),
    );
    let app = adapter::router(engine.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("ws://{addr}/symbols/BTC-USD/stream"), engine)
}

fn limit(user: u64, side: Side, qty: u64, price: i64) -> NewOrderRequest {
    NewOrderRequest {
        user_id: UserId(user),
        symbol: Symbol::from("BTC-USD"),
        side,
        kind: OrderKind::Limit,
        quantity: Quantity::from_ticks(qty),
        limit_price: Some(Price::from_ticks(price)),
        stop_price: None,
    }
}

#[tokio::test]
async fn a_new_subscriber_receives_a_snapshot_first() {
    let (url, engine) = spawn_server().await;
    engine.submit(limit(1, Side::Buy, 10, 100)).await.unwrap();

    let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    let first = ws.next().await.unwrap().unwrap();
    let Message::Text(text) = first else {
        panic!("expected a text frame");
    };
    let value: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["type"], "order_book_snapshot");
    assert_eq!(value["bids"][0]["price"], "100.00000000");
}

#[tokio::test]
async fn a_trade_after_connect_is_forwarded_to_the_subscriber() {
    let (url, engine) = spawn_server().await;
    engine.submit(limit(1, Side::Buy, 10, 100)).await.unwrap();

    let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    // Snapshot first.
    ws.next().await.unwrap().unwrap();

    engine.submit(limit(2, Side::Sell, 10, 100)).await.unwrap();

    let event = loop {
        let Message::Text(text) = ws.next().await.unwrap().unwrap() else {
            continue;
        };
        let value: Value = serde_json::from_str(&text).unwrap();
        if value["type"] == "trade_execution" {
            break value;
        }
    };
    assert_eq!(event["trade"]["price"], "100.00000000");
}

#[tokio::test]
async fn ping_is_answered_with_pong() {
    let (url, _engine) = spawn_server().await;
    let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    ws.next().await.unwrap().unwrap(); // snapshot

    ws.send(Message::Text(json!({"type": "ping"}).to_string()))
        .await
        .unwrap();

    let reply = loop {
        let Message::Text(text) = ws.next().await.unwrap().unwrap() else {
            continue;
        };
        let value: Value = serde_json::from_str(&text).unwrap();
        if value["type"] == "pong" {
            break value;
        }
    };
    assert_eq!(reply["type"], "pong");
}

#[tokio::test]
async fn get_recent_trades_replies_with_trade_history() {
    let (url, engine) = spawn_server().await;
    engine.submit(limit(1, Side::Buy, 10, 100)).await.unwrap();
    engine.submit(limit(2, Side::Sell, 10, 100)).await.unwrap();

    let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    ws.next().await.unwrap().unwrap(); // snapshot

    ws.send(Message::Text(
        json!({"type": "get_recent_trades", "limit": 10}).to_string(),
    ))
    .await
    .unwrap();

    let reply = loop {
        let Message::Text(text) = ws.next().await.unwrap().unwrap() else {
            continue;
        };
        let value: Value = serde_json::from_str(&text).unwrap();
        if value["type"] == "recent_trades" {
            break value;
        }
    };
    assert_eq!(reply["trades"].as_array().unwrap().len(), 1);
}
