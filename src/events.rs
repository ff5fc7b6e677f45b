//! Event bus: per-symbol monotone sequencing and at-least-once fan-out —
//! spec.md §4.6.
//!
//! The in-process default is a `tokio::sync::broadcast` channel per symbol,
//! mirroring the teacher's `orderbook::nats_book_change` publish-after-apply
//! pattern but without the network hop; the optional `nats` feature adds a
//! JetStream publisher grounded on the teacher's `orderbook/nats.rs` for
//! cross-process fan-out of the same events.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::order_book::OrderBookSnapshot;
use crate::types::{Order, Symbol, Trade};

/// Default channel capacity: deep enough that a lagging subscriber (spec.md
/// §4.6 "at-least-once, consumers must tolerate gaps and detect them via
/// sequence numbers") notices via `RecvError::Lagged` rather than blocking
/// the publisher.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 4096;

/// One unit of market data pushed to subscribers. Every variant carries the
/// symbol and the per-symbol sequence number it was assigned at publish
/// time, so a subscriber can detect gaps regardless of topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// An order's status, fill, or liquidity changed (topic `order_updates`).
    OrderChanged {
        /// Monotone per-symbol sequence number.
        sequence: u64,
        /// The affected order's current record.
        order: Order,
    },
    /// A trade executed (topic `trade_executions`).
    TradeExecuted {
        /// Monotone per-symbol sequence number.
        sequence: u64,
        /// The executed trade.
        trade: Trade,
    },
    /// A price level's aggregate quantity or order count changed (topic
    /// `book_changes`).
    BookChanged {
        /// Monotone per-symbol sequence number.
        sequence: u64,
        /// The symbol whose book changed.
        symbol: Symbol,
        /// Side of the affected level.
        side: crate::types::Side,
        /// The affected level's new aggregate, or `None` if the level is now
        /// empty and was removed from the book.
        level: Option<crate::book_side::LevelAggregate>,
    },
}

impl Event {
    /// The sequence number this event was published with.
    pub fn sequence(&self) -> u64 {
        match self {
            Event::OrderChanged { sequence, .. } => *sequence,
            Event::TradeExecuted { sequence, .. } => *sequence,
            Event::BookChanged { sequence, .. } => *sequence,
        }
    }
}

/// Per-symbol monotone sequence generator, shared by the matching engine and
/// the event bus so every published event carries a gap-free counter
/// (spec.md §4.6).
#[derive(Debug, Default)]
pub struct SequenceGenerator(AtomicU64);

impl SequenceGenerator {
    /// A generator starting at 1.
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// A generator whose next allocation is `last_issued + 1`, for resuming
    /// after a durable-store replay.
    pub fn starting_at(last_issued: u64) -> Self {
        Self(AtomicU64::new(last_issued))
    }

    /// Allocate the next sequence number.
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Atomically allocate `count` contiguous sequence numbers, returned as
    /// an inclusive range. Every event a single command publishes must draw
    /// its own number from here rather than sharing one, so that sequence
    /// numbers stay contiguous and strictly increasing per individual event
    /// (spec.md §8), not merely per command.
    pub fn reserve(&self, count: usize) -> std::ops::RangeInclusive<u64> {
        debug_assert!(count > 0, "reserve(0) would not advance the counter");
        let count = count as u64;
        let start = self.0.fetch_add(count, Ordering::Relaxed) + 1;
        start..=(start + count - 1)
    }

    /// The most recently allocated sequence number, or 0 if none yet.
    pub fn current(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// In-process, per-symbol event bus. One `broadcast::Sender` per symbol so a
/// slow subscriber on one symbol cannot starve another.
pub struct EventBus {
    channels: DashMap<Symbol, broadcast::Sender<Event>>,
    capacity: usize,
}

impl EventBus {
    /// A bus with the default channel capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// A bus whose per-symbol channels hold `capacity` buffered events.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            capacity,
        }
    }

    fn sender_for(&self, symbol: &Symbol) -> broadcast::Sender<Event> {
        self.channels
            .entry(symbol.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    /// Publish an event for `symbol`. A publish with no active subscribers
    /// is not an error (spec.md §4.6: fan-out, not a queue with delivery
    /// guarantees to specific consumers).
    pub fn publish(&self, symbol: &Symbol, event: Event) {
        let sender = self.sender_for(symbol);
        let _ = sender.send(event);
    }

    /// Subscribe to every event published for `symbol` from this point
    /// forward. Pair with a snapshot taken before or during subscription per
    /// the gateway's snapshot-then-stream handoff (spec.md §6).
    pub fn subscribe(&self, symbol: &Symbol) -> broadcast::Receiver<Event> {
        self.sender_for(symbol).subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// A consistent pairing of a book snapshot and the sequence it is valid as
/// of, handed to a new subscriber before it starts consuming the live
/// stream (spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotEnvelope {
    /// The resting-liquidity snapshot.
    pub snapshot: OrderBookSnapshot,
}

#[cfg(feature = "nats")]
pub mod nats_bridge {
    //! Cross-process fan-out over NATS JetStream, grounded on the teacher's
    //! `orderbook/nats.rs` / `orderbook/nats_book_change.rs` publishers:
    //! one subject per symbol, JSON payloads, fire-and-forget publish after
    //! the in-process broadcast (the durable store, not this bridge, is the
    //! durability boundary).

    use super::Event;
    use crate::types::Symbol;

    /// Publishes [`Event`]s to a NATS JetStream subject derived from the
    /// symbol, e.g. `matchcore.events.BTC-USD`.
    pub struct NatsPublisher {
        client: async_nats::Client,
        subject_prefix: String,
    }

    impl NatsPublisher {
        /// Connect to `nats_url` and build a publisher using
        /// `subject_prefix` (default `matchcore.events`).
        pub async fn connect(
            nats_url: &str,
            subject_prefix: impl Into<String>,
        ) -> Result<Self, async_nats::ConnectError> {
            let client = async_nats::connect(nats_url).await?;
            Ok(Self {
                client,
                subject_prefix: subject_prefix.into(),
            })
        }

        fn subject_for(&self, symbol: &Symbol) -> String {
            format!(
                "{}.{}",
                self.subject_prefix,
                symbol.as_str().replace('/', "-")
            )
        }

        /// Publish one event. Errors are logged by the caller; a publish
        /// failure here never blocks or rolls back the local command.
        pub async fn publish(
            &self,
            symbol: &Symbol,
            event: &Event,
        ) -> Result<(), async_nats::PublishError> {
            let payload = serde_json::to_vec(event).expect("Event always serializes");
            self.client
                .publish(self.subject_for(symbol), payload.into())
                .await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OrderId, OrderKind, OrderStatus, Price, Quantity, Side, UserId};

    fn sample_order() -> Order {
        Order {
            id: OrderId(1),
            user_id: UserId(1),
            symbol: Symbol::from("BTC/USD"),
            side: Side::Buy,
            kind: OrderKind::Limit,
            original_quantity: Quantity::from_ticks(10),
            filled_quantity: Quantity::zero(),
            limit_price: Some(Price::from_ticks(100)),
            stop_price: None,
            status: OrderStatus::Pending,
            created_at: 0,
            updated_at: 0,
            sequence: 1,
        }
    }

    #[test]
    fn sequence_generator_is_monotone_starting_at_one() {
        let seq = SequenceGenerator::new();
        assert_eq!(seq.next(), 1);
        assert_eq!(seq.next(), 2);
        assert_eq!(seq.current(), 2);
    }

    #[test]
    fn reserve_hands_out_contiguous_ranges() {
        let seq = SequenceGenerator::new();
        let first = seq.reserve(3);
        assert_eq!(first, 1..=3);
        let second = seq.reserve(2);
        assert_eq!(second, 4..=5);
        assert_eq!(seq.current(), 5);
    }

    #[test]
    fn starting_at_resumes_after_a_known_last_issued_value() {
        let seq = SequenceGenerator::starting_at(41);
        assert_eq!(seq.next(), 42);
    }

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus = EventBus::new();
        let symbol = Symbol::from("BTC/USD");
        let mut rx = bus.subscribe(&symbol);

        bus.publish(
            &symbol,
            Event::OrderChanged {
                sequence: 1,
                order: sample_order(),
            },
        );

        let received = rx.recv().await.unwrap();
        assert_eq!(received.sequence(), 1);
    }

    #[tokio::test]
    async fn distinct_symbols_do_not_cross_talk() {
        let bus = EventBus::new();
        let btc = Symbol::from("BTC/USD");
        let eth = Symbol::from("ETH/USD");
        let mut btc_rx = bus.subscribe(&btc);
        let mut eth_rx = bus.subscribe(&eth);

        bus.publish(
            &btc,
            Event::OrderChanged {
                sequence: 1,
                order: sample_order(),
            },
        );

        assert!(btc_rx.try_recv().is_ok());
        assert!(eth_rx.try_recv().is_err());
    }
}
