//! The matching engine: one single-writer worker per symbol, command
//! dispatch, and the retry/backoff wrapper around the durable store —
//! spec.md §5, §4.7.
//!
//! Grounded on the teacher's Sequencer (`orderbook/sequencer/mod.rs`): a
//! single task owns a symbol's book and processes commands one at a time
//! from a channel, so matching logic itself never has to be lock-free or
//! re-entrant — only the data structures it reads concurrently (snapshots,
//! depth queries) need to be. Generalized here to run one such worker per
//! symbol (spec.md §5's "independent symbols run on independent threads"),
//! each as its own `tokio` task rather than the teacher's single global
//! sequencer thread.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, trace_span, warn};

use crate::error::EngineError;
use crate::events::{Event, EventBus, SequenceGenerator};
use crate::matching::{self, StopTable, TradeIdGenerator};
use crate::order_book::{OrderBook, OrderBookSnapshot};
use crate::store::{ChangeSet, DurableStore};
use crate::types::{
    CancelOutcome, Order, OrderId, OrderIdGenerator, OrderKind, OrderStatus, Price, Quantity,
    Side, Symbol, Trade, UserId, current_time_millis,
};

/// A validated request to submit a new order, prior to id/sequence
/// assignment (spec.md §6 `SubmitOrder`).
#[derive(Debug, Clone)]
pub struct NewOrderRequest {
    /// Owning user/account.
    pub user_id: UserId,
    /// Trading symbol; must be configured on this engine.
    pub symbol: Symbol,
    /// Buy or sell.
    pub side: Side,
    /// Market, Limit, or Stop.
    pub kind: OrderKind,
    /// Quantity requested.
    pub quantity: Quantity,
    /// Required for Limit, optional otherwise.
    pub limit_price: Option<Price>,
    /// Required for Stop, otherwise absent.
    pub stop_price: Option<Price>,
}

/// Validate a [`NewOrderRequest`] against spec.md §4.1's shape invariants
/// before it is ever assigned an id. Pure; does not touch the book.
fn validate(request: &NewOrderRequest) -> Result<(), EngineError> {
    if request.quantity.is_zero() {
        return Err(EngineError::ValidationError {
            message: "quantity must be positive".into(),
        });
    }
    match request.kind {
        OrderKind::Market => {
            if request.limit_price.is_some() {
                return Err(EngineError::ValidationError {
                    message: "market orders must not carry a limit price".into(),
                });
            }
        }
        OrderKind::Limit => {
            if request.limit_price.is_none() {
                return Err(EngineError::ValidationError {
                    message: "limit orders require a limit price".into(),
                });
            }
        }
        OrderKind::Stop => {
            if request.stop_price.is_none() {
                return Err(EngineError::ValidationError {
                    message: "stop orders require a stop price".into(),
                });
            }
        }
    }
    Ok(())
}

enum WorkerMessage {
    Submit {
        order: Order,
        reply: oneshot::Sender<Result<Order, EngineError>>,
    },
    Cancel {
        order_id: OrderId,
        user_id: UserId,
        reply: oneshot::Sender<Result<CancelOutcome, EngineError>>,
    },
    Snapshot {
        depth: usize,
        reply: oneshot::Sender<OrderBookSnapshot>,
    },
    RecentTrades {
        limit: usize,
        reply: oneshot::Sender<Vec<crate::types::Trade>>,
    },
}

/// A live handle to a symbol's single-writer worker task.
struct SymbolHandle {
    tx: mpsc::UnboundedSender<WorkerMessage>,
}

/// Bound on how many recent trades a symbol keeps in memory for
/// `GetRecentTrades` (spec.md §6); older trades remain in the durable store
/// but are not served from this fast path.
const RECENT_TRADES_CAPACITY: usize = 1000;

struct SymbolWorker {
    symbol: Symbol,
    book: OrderBook,
    stops: StopTable,
    trade_ids: TradeIdGenerator,
    sequence: SequenceGenerator,
    halted: AtomicBool,
    store: Arc<dyn DurableStore>,
    events: Arc<EventBus>,
    retry_max_attempts: u32,
    recent_trades: std::sync::Mutex<std::collections::VecDeque<crate::types::Trade>>,
}

impl SymbolWorker {
    /// Build a worker for `symbol`, replaying every change-set the durable
    /// store already holds for it so a restart resumes from where the
    /// process left off rather than from an empty book (spec.md §1, §4.7).
    /// Returns the worker alongside the highest order id it observed during
    /// replay, so the caller can seed the engine-wide [`OrderIdGenerator`]
    /// past every id already in use.
    fn new(
        symbol: Symbol,
        store: Arc<dyn DurableStore>,
        events: Arc<EventBus>,
        retry_max_attempts: u32,
    ) -> Result<(Self, OrderId), EngineError> {
        let book = OrderBook::new(symbol.clone());
        let stops = StopTable::new();
        let change_sets = store.replay(&symbol, 1)?;

        let mut latest_orders: HashMap<OrderId, Order> = HashMap::new();
        let mut recent_trades =
            std::collections::VecDeque::with_capacity(RECENT_TRADES_CAPACITY);
        let mut max_order_id = 0u64;
        let mut max_trade_id = 0u64;
        for change_set in &change_sets {
            for order in &change_set.orders {
                max_order_id = max_order_id.max(order.id.0);
                latest_orders.insert(order.id, order.clone());
            }
            for trade in &change_set.trades {
                max_trade_id = max_trade_id.max(trade.id.0);
                if recent_trades.len() >= RECENT_TRADES_CAPACITY {
                    recent_trades.pop_front();
                }
                recent_trades.push_back(trade.clone());
            }
        }

        // Each order's latest recorded status decides where it lands: still
        // resting Limit orders go back on the book, parked Stop orders go
        // back in the trigger table, everything else is a historical record
        // only (a Market order never rests, a terminal order is done).
        for order in latest_orders.into_values() {
            match order.kind {
                OrderKind::Limit if !order.status.is_terminal() => book.insert_limit(order),
                OrderKind::Stop if order.status == OrderStatus::Pending => stops.insert(order),
                _ => book.update_order_record(order),
            }
        }

        let last_sequence = store.last_sequence(&symbol);
        let worker = Self {
            book,
            symbol,
            stops,
            trade_ids: TradeIdGenerator::starting_at(max_trade_id),
            sequence: SequenceGenerator::starting_at(last_sequence),
            halted: AtomicBool::new(false),
            store,
            events,
            retry_max_attempts,
            recent_trades: std::sync::Mutex::new(recent_trades),
        };
        Ok((worker, OrderId(max_order_id)))
    }

    fn record_trades(&self, trades: &[crate::types::Trade]) {
        let mut history = self.recent_trades.lock().expect("recent trades mutex poisoned");
        for trade in trades {
            if history.len() >= RECENT_TRADES_CAPACITY {
                history.pop_front();
            }
            history.push_back(trade.clone());
        }
    }

    fn recent_trades(&self, limit: usize) -> Vec<crate::types::Trade> {
        let history = self.recent_trades.lock().expect("recent trades mutex poisoned");
        history.iter().rev().take(limit).cloned().collect()
    }

    fn check_halted(&self) -> Result<(), EngineError> {
        if self.halted.load(Ordering::Acquire) {
            return Err(EngineError::InternalInvariantViolation {
                symbol: self.symbol.clone(),
                message: "matcher halted after a prior invariant violation".into(),
            });
        }
        Ok(())
    }

    /// Persist `change_set`, retrying transient failures with linear
    /// backoff up to `retry_max_attempts` times (spec.md §4.7). A `Corrupt`
    /// failure is never retried: it halts the worker immediately.
    fn persist_with_retry(&self, change_set: &ChangeSet) -> Result<(), EngineError> {
        let mut attempt = 0u32;
        loop {
            match self.store.apply(change_set) {
                Ok(()) => return Ok(()),
                Err(err @ crate::store::StoreError::Corrupt { .. }) => {
                    self.halted.store(true, Ordering::Release);
                    error!(symbol = %self.symbol, %err, "durable store corrupt, halting matcher");
                    return Err(err.into());
                }
                Err(err @ crate::store::StoreError::Transient { .. }) => {
                    attempt += 1;
                    if attempt >= self.retry_max_attempts {
                        error!(symbol = %self.symbol, %err, attempt, "exhausted retry budget against durable store");
                        return Err(err.into());
                    }
                    warn!(symbol = %self.symbol, %err, attempt, "retrying transient durable store failure");
                    std::thread::sleep(Duration::from_millis(10 * attempt as u64));
                }
            }
        }
    }

    /// Persist `orders`/`trades` as one atomic [`ChangeSet`], then publish
    /// each individual order/trade/book-change event with its own freshly
    /// reserved sequence number (spec.md §8: event sequence numbers are
    /// strictly increasing and contiguous per symbol, not merely per
    /// command). Returns the highest sequence number this command used,
    /// which doubles as the change-set's own persisted sequence.
    fn commit_and_publish(
        &self,
        orders: Vec<Order>,
        trades: Vec<Trade>,
        timestamp: u64,
    ) -> Result<u64, EngineError> {
        let levels = touched_levels(&orders);
        let event_count = orders.len() + trades.len() + levels.len();
        let sequences = self.sequence.reserve(event_count);
        let last_sequence = *sequences.end();

        let change_set = ChangeSet {
            symbol: self.symbol.clone(),
            sequence: last_sequence,
            timestamp,
            orders,
            trades,
        };

        self.persist_with_retry(&change_set)?;
        self.check_invariants()?;
        self.record_trades(&change_set.trades);

        let mut sequence_iter = sequences;
        for order in &change_set.orders {
            let sequence = sequence_iter
                .next()
                .expect("reserved one sequence number per order update");
            self.events.publish(
                &self.symbol,
                Event::OrderChanged {
                    sequence,
                    order: order.clone(),
                },
            );
        }
        for trade in &change_set.trades {
            let sequence = sequence_iter
                .next()
                .expect("reserved one sequence number per trade");
            self.events.publish(
                &self.symbol,
                Event::TradeExecuted {
                    sequence,
                    trade: trade.clone(),
                },
            );
        }
        for (side, price) in levels {
            let sequence = sequence_iter
                .next()
                .expect("reserved one sequence number per touched level");
            let level = self
                .book
                .own_side(side)
                .level_at(price)
                .map(|level| crate::book_side::LevelAggregate {
                    price,
                    total_quantity: level.total_quantity(),
                    order_count: level.order_count(),
                });
            self.events.publish(
                &self.symbol,
                Event::BookChanged {
                    sequence,
                    symbol: self.symbol.clone(),
                    side,
                    level,
                },
            );
        }

        Ok(last_sequence)
    }

    /// After applying a command, confirm the book is still well-formed
    /// (spec.md §8's no-crossed-book invariant). A violation halts the
    /// worker permanently; there is no automatic recovery.
    fn check_invariants(&self) -> Result<(), EngineError> {
        if self.book.is_crossed() {
            self.halted.store(true, Ordering::Release);
            let message = format!(
                "book crossed: best_bid={:?} best_ask={:?}",
                self.book.best_bid(),
                self.book.best_ask()
            );
            error!(symbol = %self.symbol, %message, "invariant violation, halting matcher");
            return Err(EngineError::InternalInvariantViolation {
                symbol: self.symbol.clone(),
                message,
            });
        }
        Ok(())
    }

    fn handle_submit(&self, order: Order) -> Result<Order, EngineError> {
        let _span = trace_span!("submit", symbol = %self.symbol, order_id = order.id.0, kind = ?order.kind).entered();
        self.check_halted()?;
        let now = current_time_millis();

        let cascade = matching::submit_with_cascade(
            &self.book,
            &self.stops,
            order,
            &self.trade_ids,
            now,
        );

        self.commit_and_publish(cascade.all_order_updates(), cascade.all_trades(), now)?;

        if cascade.primary.taker.status == OrderStatus::Rejected {
            info!(
                symbol = %self.symbol,
                order_id = cascade.primary.taker.id.0,
                reason = ?crate::types::RejectReason::NoLiquidity,
                "order rejected"
            );
        } else if cascade.primary.taker.status.is_terminal() {
            info!(
                symbol = %self.symbol,
                order_id = cascade.primary.taker.id.0,
                status = ?cascade.primary.taker.status,
                "order reached a terminal state"
            );
        }
        for triggered in &cascade.triggered {
            info!(
                symbol = %self.symbol,
                order_id = triggered.taker.id.0,
                "stop order triggered"
            );
        }

        Ok(cascade.primary.taker)
    }

    fn handle_cancel(&self, order_id: OrderId, user_id: UserId) -> Result<CancelOutcome, EngineError> {
        let _span = trace_span!("cancel", symbol = %self.symbol, order_id = order_id.0).entered();
        self.check_halted()?;

        match self.book.cancel(order_id, user_id) {
            Ok(outcome) => {
                let cancelled_order = self
                    .book
                    .get_order(order_id)
                    .expect("cancel just wrote this order's record");
                self.commit_cancel(order_id, cancelled_order)?;
                Ok(outcome)
            }
            // Not resting on the book: it may be a Stop order, still parked
            // off-book awaiting its trigger price (spec.md §4.5).
            Err(EngineError::NotFound(_)) => self.handle_cancel_stop(order_id, user_id),
            Err(err) => Err(err),
        }
    }

    /// Cancel a Stop order that has not yet triggered. Stop orders live
    /// solely in the [`StopTable`] until triggered, so they are addressed by
    /// id alone rather than through the book's order index.
    fn handle_cancel_stop(
        &self,
        order_id: OrderId,
        user_id: UserId,
    ) -> Result<CancelOutcome, EngineError> {
        let parked = self
            .stops
            .find(order_id)
            .ok_or(EngineError::NotFound(order_id))?;
        if parked.user_id != user_id {
            return Err(EngineError::NotOwned(order_id));
        }

        let mut cancelled = self
            .stops
            .remove_by_id(order_id)
            .expect("just confirmed this stop is parked");
        cancelled.status = OrderStatus::Cancelled;
        cancelled.updated_at = current_time_millis();

        self.commit_cancel(order_id, cancelled)?;
        Ok(CancelOutcome {
            status: OrderStatus::Cancelled,
        })
    }

    fn commit_cancel(&self, order_id: OrderId, cancelled_order: Order) -> Result<(), EngineError> {
        self.commit_and_publish(vec![cancelled_order], Vec::new(), current_time_millis())?;
        info!(symbol = %self.symbol, order_id = order_id.0, "order cancelled");
        Ok(())
    }

    fn handle_snapshot(&self, depth: usize) -> OrderBookSnapshot {
        self.book.snapshot(depth, self.sequence.current())
    }

    async fn run(self, mut rx: mpsc::UnboundedReceiver<WorkerMessage>) {
        while let Some(message) = rx.recv().await {
            match message {
                WorkerMessage::Submit { order, reply } => {
                    let _ = reply.send(self.handle_submit(order));
                }
                WorkerMessage::Cancel {
                    order_id,
                    user_id,
                    reply,
                } => {
                    let _ = reply.send(self.handle_cancel(order_id, user_id));
                }
                WorkerMessage::Snapshot { depth, reply } => {
                    let _ = reply.send(self.handle_snapshot(depth));
                }
                WorkerMessage::RecentTrades { limit, reply } => {
                    let _ = reply.send(self.recent_trades(limit));
                }
            }
        }
    }
}

fn touched_levels(orders: &[Order]) -> Vec<(Side, Price)> {
    let mut seen = HashSet::new();
    orders
        .iter()
        .filter_map(|order| order.limit_price.map(|price| (order.side, price)))
        .filter(|pair| seen.insert(*pair))
        .collect()
}

/// The multi-symbol matching engine: owns one [`SymbolWorker`] task per
/// configured symbol and the globally shared order-id sequence.
pub struct Engine {
    handles: DashMap<Symbol, SymbolHandle>,
    order_ids: OrderIdGenerator,
    events: Arc<EventBus>,
}

impl Engine {
    /// Spawn a worker for each of `symbols`, sharing `store` and `events`.
    /// Each worker replays its symbol's history from `store` before it
    /// starts serving commands, so a restart against a durable store
    /// resumes the book, stop table, and sequence numbering exactly where
    /// the previous process left off (spec.md §1, §4.7). Fails only if a
    /// symbol's replay itself fails (e.g. a corrupt journal).
    pub fn start(
        symbols: impl IntoIterator<Item = Symbol>,
        store: Arc<dyn DurableStore>,
        events: Arc<EventBus>,
        retry_max_attempts: u32,
    ) -> Result<Self, EngineError> {
        let handles = DashMap::new();
        let mut max_order_id = 0u64;
        for symbol in symbols {
            let (tx, rx) = mpsc::unbounded_channel();
            let (worker, worker_max_order_id) = SymbolWorker::new(
                symbol.clone(),
                store.clone(),
                events.clone(),
                retry_max_attempts,
            )?;
            max_order_id = max_order_id.max(worker_max_order_id.0);
            tokio::spawn(worker.run(rx));
            handles.insert(symbol, SymbolHandle { tx });
        }
        Ok(Self {
            handles,
            order_ids: OrderIdGenerator::starting_at(max_order_id),
            events,
        })
    }

    fn handle_for(&self, symbol: &Symbol) -> Result<SymbolHandle, EngineError> {
        self.handles
            .get(symbol)
            .map(|h| SymbolHandle { tx: h.tx.clone() })
            .ok_or_else(|| EngineError::UnknownSymbol(symbol.clone()))
    }

    /// Validate, assign an id, and submit a new order to its symbol's
    /// worker, awaiting the synchronous result of the command (spec.md §6
    /// `SubmitOrder`). Stops triggered as a side effect are not part of this
    /// reply; subscribe to the event bus to observe them.
    pub async fn submit(&self, request: NewOrderRequest) -> Result<Order, EngineError> {
        validate(&request)?;
        let symbol = request.symbol.clone();
        let handle = self.handle_for(&symbol)?;

        let id = self.order_ids.next();
        let now = current_time_millis();
        let order = Order {
            id,
            user_id: request.user_id,
            symbol: request.symbol,
            side: request.side,
            kind: request.kind,
            original_quantity: request.quantity,
            filled_quantity: Quantity::zero(),
            limit_price: request.limit_price,
            stop_price: request.stop_price,
            status: OrderStatus::Pending,
            created_at: now,
            updated_at: now,
            sequence: id.0,
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        handle
            .tx
            .send(WorkerMessage::Submit {
                order,
                reply: reply_tx,
            })
            .map_err(|_| EngineError::EngineUnavailable {
                symbol: symbol.clone(),
            })?;
        reply_rx
            .await
            .map_err(|_| EngineError::EngineUnavailable { symbol })?
    }

    /// Cancel a resting order (spec.md §6 `CancelOrder`).
    pub async fn cancel(
        &self,
        symbol: &Symbol,
        order_id: OrderId,
        user_id: UserId,
    ) -> Result<CancelOutcome, EngineError> {
        let handle = self.handle_for(symbol)?;
        let (reply_tx, reply_rx) = oneshot::channel();
        handle
            .tx
            .send(WorkerMessage::Cancel {
                order_id,
                user_id,
                reply: reply_tx,
            })
            .map_err(|_| EngineError::EngineUnavailable {
                symbol: symbol.clone(),
            })?;
        reply_rx
            .await
            .map_err(|_| EngineError::EngineUnavailable {
                symbol: symbol.clone(),
            })?
    }

    /// Fetch a resting-liquidity snapshot (spec.md §6 `GetOrderBookSnapshot`).
    pub async fn snapshot(
        &self,
        symbol: &Symbol,
        depth: usize,
    ) -> Result<OrderBookSnapshot, EngineError> {
        let handle = self.handle_for(symbol)?;
        let (reply_tx, reply_rx) = oneshot::channel();
        handle
            .tx
            .send(WorkerMessage::Snapshot {
                depth,
                reply: reply_tx,
            })
            .map_err(|_| EngineError::EngineUnavailable {
                symbol: symbol.clone(),
            })?;
        reply_rx.await.map_err(|_| EngineError::EngineUnavailable {
            symbol: symbol.clone(),
        })
    }

    /// The most recent trades for `symbol`, newest first, capped at
    /// `limit` (spec.md §6 `GetRecentTrades`).
    pub async fn recent_trades(
        &self,
        symbol: &Symbol,
        limit: usize,
    ) -> Result<Vec<crate::types::Trade>, EngineError> {
        let handle = self.handle_for(symbol)?;
        let (reply_tx, reply_rx) = oneshot::channel();
        handle
            .tx
            .send(WorkerMessage::RecentTrades {
                limit,
                reply: reply_tx,
            })
            .map_err(|_| EngineError::EngineUnavailable {
                symbol: symbol.clone(),
            })?;
        reply_rx.await.map_err(|_| EngineError::EngineUnavailable {
            symbol: symbol.clone(),
        })
    }

    /// Subscribe to the live event stream for `symbol` (spec.md §4.6, §6).
    /// Pair with [`Engine::snapshot`] using the gateway's snapshot-then-
    /// stream handoff so no update is missed or duplicated.
    pub fn subscribe(&self, symbol: &Symbol) -> tokio::sync::broadcast::Receiver<Event> {
        self.events.subscribe(symbol)
    }

    /// The symbols this engine was started with.
    pub fn symbols(&self) -> Vec<Symbol> {
        self.handles.iter().map(|e| e.key().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    fn request(symbol: &str, side: Side, kind: OrderKind, qty: u64, price: Option<i64>) -> NewOrderRequest {
        NewOrderRequest {
            user_id: UserId(1),
            symbol: Symbol::from(symbol),
            side,
            kind,
            quantity: Quantity::from_ticks(qty),
            limit_price: price.map(Price::from_ticks),
            stop_price: None,
        }
    }

    #[tokio::test]
    async fn submit_and_cross_produces_a_trade() {
        let engine = Engine::start(
            vec![Symbol::from("BTC/USD")],
            Arc::new(InMemoryStore::new()),
            Arc::new(EventBus::new()),
            3,
        )
        .unwrap();

        let resting = engine
            .submit(request("BTC/USD", Side::Buy, OrderKind::Limit, 10, Some(100)))
            .await
            .unwrap();
        assert_eq!(resting.status, OrderStatus::Pending);

        let taker = engine
            .submit(request("BTC/USD", Side::Sell, OrderKind::Market, 10, None))
            .await
            .unwrap();
        assert_eq!(taker.status, OrderStatus::Filled);

        let snapshot = engine.snapshot(&Symbol::from("BTC/USD"), 5).await.unwrap();
        assert!(snapshot.bids.is_empty());
    }

    #[tokio::test]
    async fn unknown_symbol_is_rejected() {
        let engine = Engine::start(
            vec![Symbol::from("BTC/USD")],
            Arc::new(InMemoryStore::new()),
            Arc::new(EventBus::new()),
            3,
        )
        .unwrap();
        let err = engine
            .submit(request("ETH/USD", Side::Buy, OrderKind::Limit, 10, Some(100)))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownSymbol(_)));
    }

    #[tokio::test]
    async fn cancel_after_submit_removes_order() {
        let engine = Engine::start(
            vec![Symbol::from("BTC/USD")],
            Arc::new(InMemoryStore::new()),
            Arc::new(EventBus::new()),
            3,
        )
        .unwrap();
        let order = engine
            .submit(request("BTC/USD", Side::Buy, OrderKind::Limit, 10, Some(100)))
            .await
            .unwrap();

        let outcome = engine
            .cancel(&Symbol::from("BTC/USD"), order.id, UserId(1))
            .await
            .unwrap();
        assert_eq!(outcome.status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn restart_replays_resting_orders_and_resumes_sequencing() {
        let symbol = Symbol::from("BTC/USD");
        let store: Arc<dyn crate::store::DurableStore> = Arc::new(InMemoryStore::new());

        let first_run = Engine::start(
            vec![symbol.clone()],
            store.clone(),
            Arc::new(EventBus::new()),
            3,
        )
        .unwrap();
        let resting = first_run
            .submit(request("BTC/USD", Side::Buy, OrderKind::Limit, 10, Some(100)))
            .await
            .unwrap();
        let before_restart_sequence = first_run.snapshot(&symbol, 5).await.unwrap().sequence;

        // Simulate a process restart: a fresh `Engine` against the same
        // durable store, with nothing carried over in memory.
        let second_run = Engine::start(vec![symbol.clone()], store, Arc::new(EventBus::new()), 3)
            .unwrap();

        let snapshot = second_run.snapshot(&symbol, 5).await.unwrap();
        assert_eq!(snapshot.bids.len(), 1);
        assert_eq!(snapshot.bids[0].total_quantity, Quantity::from_ticks(10));
        assert_eq!(snapshot.sequence, before_restart_sequence);

        // A fresh order must not collide with the id replayed from history.
        let next = second_run
            .submit(request("BTC/USD", Side::Sell, OrderKind::Market, 10, None))
            .await
            .unwrap();
        assert_ne!(next.id, resting.id);
        assert_eq!(next.status, OrderStatus::Filled);
    }
}
