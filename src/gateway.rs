//! Subscription gateway: the WebSocket session protocol, snapshot-then-
//! stream handoff, and heartbeat — spec.md §6.
//!
//! Grounded on `lukewaehner-HFT-Ledger`'s `exchange-service/src/websocket.rs`
//! (`tokio::select!` over a split socket, a broadcast receiver, and a ping
//! interval) generalized from its single trade/depth streams to this
//! crate's three event topics and an explicit snapshot-then-stream handoff:
//! a subscriber snapshots the book, subscribes to the live feed, and
//! discards any buffered event whose sequence number the snapshot already
//! reflects, so the combined stream has neither a gap nor a duplicate.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::engine::Engine;
use crate::events::Event;
use crate::order_book::OrderBookSnapshot;
use crate::types::{Symbol, Trade};

/// How often the gateway pings an idle connection.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Messages a subscriber may send (spec.md §6).
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    /// Liveness probe; answered with [`OutboundMessage::Pong`].
    Ping,
    /// Request a fresh resting-liquidity snapshot without resubscribing.
    GetOrderBook {
        /// Number of price levels per side to return.
        depth: usize,
    },
    /// Request recent trade history.
    GetRecentTrades {
        /// Maximum number of trades to return, newest first.
        limit: usize,
    },
}

/// Messages the gateway sends to a subscriber (spec.md §6).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// Reply to [`InboundMessage::Ping`].
    Pong,
    /// A resting-liquidity snapshot, sent on connect or on request.
    OrderBookSnapshot(OrderBookSnapshot),
    /// An order changed status or fill (topic `order_updates`).
    OrderUpdate {
        /// Per-symbol sequence number.
        sequence: u64,
        /// The changed order.
        order: crate::types::Order,
    },
    /// A trade executed (topic `trade_executions`).
    TradeExecution {
        /// Per-symbol sequence number.
        sequence: u64,
        /// The executed trade.
        trade: Trade,
    },
    /// A price level's aggregate changed (topic `book_changes`).
    BookChange {
        /// Per-symbol sequence number.
        sequence: u64,
        /// Side of the affected level.
        side: crate::types::Side,
        /// The level's new aggregate, or `None` if it is now empty.
        level: Option<crate::book_side::LevelAggregate>,
    },
    /// Recent trade history, newest first, in reply to
    /// [`InboundMessage::GetRecentTrades`].
    RecentTrades {
        /// The trades, newest first.
        trades: Vec<Trade>,
    },
    /// The request could not be served.
    Error {
        /// Human-readable description.
        message: String,
    },
}

fn to_outbound(event: Event) -> OutboundMessage {
    match event {
        Event::OrderChanged { sequence, order } => OutboundMessage::OrderUpdate { sequence, order },
        Event::TradeExecuted { sequence, trade } => {
            OutboundMessage::TradeExecution { sequence, trade }
        }
        Event::BookChanged {
            sequence,
            side,
            level,
            ..
        } => OutboundMessage::BookChange {
            sequence,
            side,
            level,
        },
    }
}

async fn send(socket: &mut WebSocket, message: &OutboundMessage) -> bool {
    let Ok(json) = serde_json::to_string(message) else {
        return true;
    };
    socket.send(Message::Text(json)).await.is_ok()
}

/// Drive one subscriber's WebSocket session for `symbol`: snapshot-then-
/// stream handoff, inbound command handling, and heartbeat pings, until the
/// client disconnects or a send fails.
pub async fn handle_session(mut socket: WebSocket, symbol: Symbol, engine: Arc<Engine>) {
    // Subscribe before snapshotting: any event published between the two
    // calls lands in the channel and is filtered below by sequence number,
    // rather than being missed entirely.
    let mut events: broadcast::Receiver<Event> = engine.subscribe(&symbol);

    let snapshot = match engine.snapshot(&symbol, 50).await {
        Ok(snapshot) => snapshot,
        Err(err) => {
            let _ = send(&mut socket, &OutboundMessage::Error {
                message: err.to_string(),
            })
            .await;
            return;
        }
    };
    let caught_up_to = snapshot.sequence;
    if !send(&mut socket, &OutboundMessage::OrderBookSnapshot(snapshot)).await {
        return;
    }

    let mut heartbeat = interval(HEARTBEAT_INTERVAL);

    loop {
        tokio::select! {
            inbound = socket.recv() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        let reply = match serde_json::from_str::<InboundMessage>(&text) {
                            Ok(InboundMessage::Ping) => Some(OutboundMessage::Pong),
                            Ok(InboundMessage::GetOrderBook { depth }) => {
                                match engine.snapshot(&symbol, depth).await {
                                    Ok(snap) => Some(OutboundMessage::OrderBookSnapshot(snap)),
                                    Err(err) => Some(OutboundMessage::Error { message: err.to_string() }),
                                }
                            }
                            Ok(InboundMessage::GetRecentTrades { limit }) => {
                                match engine.recent_trades(&symbol, limit).await {
                                    Ok(trades) => Some(OutboundMessage::RecentTrades { trades }),
                                    Err(err) => Some(OutboundMessage::Error { message: err.to_string() }),
                                }
                            }
                            Err(err) => Some(OutboundMessage::Error {
                                message: format!("malformed request: {err}"),
                            }),
                        };
                        if let Some(reply) = reply {
                            if !send(&mut socket, &reply).await {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!(%symbol, %err, "gateway session receive error");
                        break;
                    }
                }
            }

            event = events.recv() => {
                match event {
                    Ok(event) if event.sequence() > caught_up_to => {
                        if !send(&mut socket, &to_outbound(event)).await {
                            break;
                        }
                    }
                    Ok(_) => {
                        // Already covered by the initial snapshot; drop it.
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(%symbol, skipped, "gateway subscriber lagged, resubscribing via fresh snapshot");
                        let message = OutboundMessage::Error {
                            message: format!("lagged by {skipped} events; reconnect for a fresh snapshot"),
                        };
                        let _ = send(&mut socket, &message).await;
                        break;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }

            _ = heartbeat.tick() => {
                if socket.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
        }
    }

    debug!(%symbol, "gateway session ended");
}
