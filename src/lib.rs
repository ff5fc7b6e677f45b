/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 2/10/25
******************************************************************************/

//! # matchcore
//!
//! The matching engine and live market-data fan-out core of a crypto-asset
//! limit-order exchange.
//!
//! ## Key Features
//!
//! - **Price-time priority matching**: FIFO at each price level, built on a
//!   [`dashmap::DashMap`] plus a [`crossbeam_skiplist::SkipMap`] arrival
//!   index keyed by sequence number, and a second `SkipMap` of price levels
//!   per side.
//! - **Fixed-point arithmetic**: price and quantity are 64-bit integer ticks
//!   end to end; decimal strings only appear at the serde boundary.
//! - **Single writer per symbol**: each symbol's book is owned by one
//!   dedicated `tokio` task, so the matching algorithm itself needs no
//!   locking — see [`engine`].
//! - **Atomic commands**: every submit or cancel is one [`store::ChangeSet`]
//!   applied to a [`store::DurableStore`] before any event is published.
//! - **Live fan-out**: order, trade, and book-change events stream out over
//!   a per-symbol broadcast channel ([`events`]), reachable over WebSocket
//!   with a gap-free snapshot-then-stream handoff ([`gateway`]).
//!
//! ## Module Map
//!
//! - [`types`] — shared value types: [`types::Price`], [`types::Quantity`],
//!   [`types::Order`], [`types::Trade`].
//! - [`error`] — [`error::EngineError`], the taxonomy surfaced by the
//!   command surface.
//! - [`price_level`], [`book_side`], [`order_book`] — the book itself.
//! - [`matching`] — the sweep algorithm and stop-order trigger table.
//! - [`engine`] — the per-symbol worker, retry/backoff, and command
//!   dispatch.
//! - [`events`] — the event bus and sequence generator.
//! - [`store`] — the durable-store contract, an in-memory default, and
//!   (behind the `journal` feature) a memory-mapped append-only journal.
//! - [`gateway`] — the WebSocket subscription protocol.
//! - [`adapter`] — the HTTP/WebSocket route layer.
//! - [`config`] — configuration loading (file, env, CLI flags).

pub mod adapter;
pub mod book_side;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod gateway;
pub mod matching;
pub mod order_book;
pub mod price_level;
pub mod store;
pub mod types;

pub use engine::{Engine, NewOrderRequest};
pub use error::EngineError;
pub use events::{Event, EventBus};
pub use order_book::{OrderBook, OrderBookSnapshot};
pub use store::{ChangeSet, DurableStore, InMemoryStore, StoreError};
pub use types::{
    CancelOutcome, Order, OrderId, OrderKind, OrderStatus, Price, Quantity, Side, Symbol, Trade,
    TradeId, UserId,
};
