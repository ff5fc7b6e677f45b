//! Error taxonomy surfaced by the matching core (spec.md §7).

use std::fmt;

use crate::types::{OrderId, Symbol};

/// Errors returned by the command surface (`adapter`, `engine`).
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum EngineError {
    /// Malformed input: non-positive quantity, missing required price,
    /// unknown enum variant, price/quantity not expressible in ticks.
    ValidationError {
        /// Human-readable description of what failed validation.
        message: String,
    },

    /// The symbol is not configured on this engine.
    UnknownSymbol(Symbol),

    /// Cancel target does not exist.
    NotFound(OrderId),

    /// Cancel target exists but belongs to a different user.
    NotOwned(OrderId),

    /// Cancel target is already in a terminal status.
    AlreadyTerminal(OrderId),

    /// The durable store failed transiently and the retry budget was
    /// exhausted.
    EngineUnavailable {
        /// Which symbol's engine could not complete the command.
        symbol: Symbol,
    },

    /// A mid-command invariant check failed (e.g. aggregate mismatch).
    /// Fatal: the symbol's matcher has paused and requires operator
    /// intervention.
    InternalInvariantViolation {
        /// Which symbol's matcher paused.
        symbol: Symbol,
        /// Description of the violated invariant.
        message: String,
    },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::ValidationError { message } => {
                write!(f, "validation error: {message}")
            }
            EngineError::UnknownSymbol(symbol) => write!(f, "unknown symbol: {symbol}"),
            EngineError::NotFound(id) => write!(f, "order not found: {id}"),
            EngineError::NotOwned(id) => write!(f, "order not owned by caller: {id}"),
            EngineError::AlreadyTerminal(id) => {
                write!(f, "order already in a terminal status: {id}")
            }
            EngineError::EngineUnavailable { symbol } => {
                write!(f, "engine unavailable for symbol {symbol} (retry budget exhausted)")
            }
            EngineError::InternalInvariantViolation { symbol, message } => {
                write!(f, "internal invariant violation on {symbol}: {message}")
            }
        }
    }
}

impl std::error::Error for EngineError {}

impl From<crate::store::StoreError> for EngineError {
    fn from(err: crate::store::StoreError) -> Self {
        match err {
            crate::store::StoreError::Transient { symbol, .. } => {
                EngineError::EngineUnavailable { symbol }
            }
            crate::store::StoreError::Corrupt { symbol, message } => {
                EngineError::InternalInvariantViolation { symbol, message }
            }
        }
    }
}
