//! The inbound command surface as HTTP/WebSocket handlers — spec.md §6.
//!
//! Grounded on `lukewaehner-HFT-Ledger`'s `exchange-service/src/main.rs`
//! route table and `AppError`/`IntoResponse` pattern, retargeted from its
//! ad hoc `Exchange` to this crate's [`Engine`] and carrying
//! [`EngineError`]'s full taxonomy instead of three hand-picked variants.

use std::sync::Arc;

use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::engine::{Engine, NewOrderRequest};
use crate::error::EngineError;
use crate::gateway;
use crate::order_book::OrderBookSnapshot;
use crate::types::{OrderId, OrderKind, Price, Quantity, Side, Symbol, Trade, UserId};

/// Shared application state: every handler only needs the engine handle.
#[derive(Clone)]
pub struct AppState {
    engine: Arc<Engine>,
}

/// Build the full HTTP/WebSocket router for `engine` (spec.md §6).
pub fn router(engine: Arc<Engine>) -> Router {
    Router::new()
        .route("/symbols/:symbol/orders", post(submit_order))
        .route("/symbols/:symbol/orders/:order_id", delete(cancel_order))
        .route("/symbols/:symbol/orderbook", get(get_order_book))
        .route("/symbols/:symbol/trades", get(get_recent_trades))
        .route("/symbols/:symbol/stream", get(stream))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(AppState { engine })
}

#[derive(Debug, Deserialize)]
struct SubmitOrderRequest {
    user_id: u64,
    side: Side,
    kind: OrderKind,
    quantity: Quantity,
    #[serde(default)]
    limit_price: Option<Price>,
    #[serde(default)]
    stop_price: Option<Price>,
}

#[derive(Debug, Deserialize)]
struct DepthQuery {
    #[serde(default = "default_depth")]
    depth: usize,
}

fn default_depth() -> usize {
    20
}

#[derive(Debug, Deserialize)]
struct RecentTradesQuery {
    #[serde(default = "default_trade_limit")]
    limit: usize,
}

fn default_trade_limit() -> usize {
    50
}

#[derive(Debug, Serialize)]
struct RecentTradesResponse {
    trades: Vec<Trade>,
}

async fn submit_order(
    Path(symbol): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<SubmitOrderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let order = state
        .engine
        .submit(NewOrderRequest {
            user_id: UserId(request.user_id),
            symbol: Symbol::from(symbol),
            side: request.side,
            kind: request.kind,
            quantity: request.quantity,
            limit_price: request.limit_price,
            stop_price: request.stop_price,
        })
        .await?;
    Ok(Json(order))
}

async fn cancel_order(
    Path((symbol, order_id)): Path<(String, u64)>,
    Query(user): Query<CancelQuery>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state
        .engine
        .cancel(&Symbol::from(symbol), OrderId(order_id), UserId(user.user_id))
        .await?;
    Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
struct CancelQuery {
    user_id: u64,
}

async fn get_order_book(
    Path(symbol): Path<String>,
    Query(params): Query<DepthQuery>,
    State(state): State<AppState>,
) -> Result<Json<OrderBookSnapshot>, ApiError> {
    let snapshot = state
        .engine
        .snapshot(&Symbol::from(symbol), params.depth)
        .await?;
    Ok(Json(snapshot))
}

async fn get_recent_trades(
    Path(symbol): Path<String>,
    Query(params): Query<RecentTradesQuery>,
    State(state): State<AppState>,
) -> Result<Json<RecentTradesResponse>, ApiError> {
    let trades = state
        .engine
        .recent_trades(&Symbol::from(symbol), params.limit)
        .await?;
    Ok(Json(RecentTradesResponse { trades }))
}

async fn stream(
    Path(symbol): Path<String>,
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> Response {
    let symbol = Symbol::from(symbol);
    ws.on_upgrade(move |socket| gateway::handle_session(socket, symbol, state.engine))
}

/// HTTP-facing wrapper around [`EngineError`], mapping each variant to a
/// status code the way `lukewaehner-HFT-Ledger`'s `AppError` maps its own
/// three variants.
#[derive(Debug)]
struct ApiError(EngineError);

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            EngineError::ValidationError { .. } => StatusCode::BAD_REQUEST,
            EngineError::UnknownSymbol(_) => StatusCode::NOT_FOUND,
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::NotOwned(_) => StatusCode::FORBIDDEN,
            EngineError::AlreadyTerminal(_) => StatusCode::CONFLICT,
            EngineError::EngineUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            EngineError::InternalInvariantViolation { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({
            "error": self.0.to_string(),
            "code": status.as_u16(),
        }));
        (status, body).into_response()
    }
}
