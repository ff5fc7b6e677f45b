//! Shared value types for the matching core (spec.md §3).
//!
//! Price and quantity are fixed-point, scale 10⁻⁸, stored as 64-bit integer
//! ticks end-to-end inside the core. They only become decimal strings at the
//! serde boundary (SPEC_FULL.md §3.1), so no comparison or arithmetic in this
//! crate ever touches a float.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Number of fractional digits carried by [`Price`] and [`Quantity`].
pub const TICK_SCALE: u32 = 8;
const TICK_MULTIPLIER: i64 = 100_000_000; // 10^8

/// An opaque trading-symbol identifier (e.g. `"BTC/USD"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Symbol(pub String);

impl Symbol {
    /// Borrow the underlying string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Symbol(s.to_string())
    }
}

impl From<String> for Symbol {
    fn from(s: String) -> Self {
        Symbol(s)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotone, globally unique order identifier, assigned at submit time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Generator for monotonically increasing [`OrderId`]s, one per engine.
///
/// Mirrors the `next_order_id: AtomicU64` counter kept on the teacher's
/// `OrderBook<T>`.
#[derive(Debug, Default)]
pub struct OrderIdGenerator(AtomicU64);

impl OrderIdGenerator {
    /// Build a generator that will hand out ids starting at 1.
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Build a generator that resumes after `last_issued`, so ids assigned
    /// after a durable-store replay never collide with a previously
    /// persisted order.
    pub fn starting_at(last_issued: u64) -> Self {
        Self(AtomicU64::new(last_issued))
    }

    /// Allocate the next id.
    pub fn next(&self) -> OrderId {
        OrderId(self.0.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

/// Monotone per-symbol trade identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TradeId(pub u64);

impl fmt::Display for TradeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque user/account identifier (out-of-scope auth system owns issuance).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A fixed-point value with scale 10⁻⁸, stored as 64-bit integer ticks.
///
/// Shared tick representation for [`Price`] and [`Quantity`]; kept as a
/// distinct newtype per spec.md §3 so the two can never be confused at the
/// type level even though both wrap `i64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Price(pub i64);

impl Price {
    /// Construct from a raw tick count.
    pub fn from_ticks(ticks: i64) -> Self {
        Price(ticks)
    }

    /// The raw tick count.
    pub fn ticks(self) -> i64 {
        self.0
    }

    /// Key used for ordering within a [`crate::book_side::BookSide`]'s
    /// skip map, which only accepts unsigned keys.
    pub fn as_u128_key(self) -> u128 {
        // Prices are validated non-negative at the adapter boundary; this
        // cast is exact for all values that pass validation.
        self.0 as u128
    }

    /// Parse a decimal string with up to [`TICK_SCALE`] fractional digits
    /// into ticks. Rejects negative values and excess precision.
    pub fn parse_decimal(s: &str) -> Result<Self, DecimalParseError> {
        parse_fixed_point(s).map(Price)
    }

    /// Render as a decimal string with exactly [`TICK_SCALE`] fractional
    /// digits.
    pub fn to_decimal_string(self) -> String {
        format_fixed_point(self.0)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_decimal_string())
    }
}

impl Serialize for Price {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_decimal_string())
    }
}

impl<'de> Deserialize<'de> for Price {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Price::parse_decimal(&s).map_err(serde::de::Error::custom)
    }
}

/// A non-negative fixed-point quantity, scale 10⁻⁸, stored as 64-bit integer
/// ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Quantity(pub u64);

impl Quantity {
    /// Construct from a raw tick count.
    pub fn from_ticks(ticks: u64) -> Self {
        Quantity(ticks)
    }

    /// The raw tick count.
    pub fn ticks(self) -> u64 {
        self.0
    }

    /// Zero quantity.
    pub fn zero() -> Self {
        Quantity(0)
    }

    /// `true` if this quantity is zero.
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Saturating subtraction, used when walking down remaining quantity.
    pub fn saturating_sub(self, other: Quantity) -> Quantity {
        Quantity(self.0.saturating_sub(other.0))
    }

    /// Saturating addition, used when accumulating filled quantity.
    pub fn saturating_add(self, other: Quantity) -> Quantity {
        Quantity(self.0.saturating_add(other.0))
    }

    /// Parse a decimal string with up to [`TICK_SCALE`] fractional digits.
    pub fn parse_decimal(s: &str) -> Result<Self, DecimalParseError> {
        let ticks = parse_fixed_point(s)?;
        if ticks < 0 {
            return Err(DecimalParseError::Negative);
        }
        Ok(Quantity(ticks as u64))
    }

    /// Render as a decimal string with exactly [`TICK_SCALE`] fractional
    /// digits.
    pub fn to_decimal_string(self) -> String {
        format_fixed_point(self.0 as i64)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_decimal_string())
    }
}

impl Serialize for Quantity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_decimal_string())
    }
}

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Quantity::parse_decimal(&s).map_err(serde::de::Error::custom)
    }
}

/// Error parsing a decimal string into fixed-point ticks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecimalParseError {
    /// The string was not a valid decimal number.
    Malformed,
    /// More than [`TICK_SCALE`] fractional digits were supplied.
    TooManyFractionalDigits,
    /// A negative value was supplied where one is not allowed.
    Negative,
    /// The value overflows `i64` ticks.
    Overflow,
}

impl fmt::Display for DecimalParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecimalParseError::Malformed => write!(f, "malformed decimal string"),
            DecimalParseError::TooManyFractionalDigits => {
                write!(f, "more than {TICK_SCALE} fractional digits")
            }
            DecimalParseError::Negative => write!(f, "negative value not allowed"),
            DecimalParseError::Overflow => write!(f, "value overflows i64 ticks"),
        }
    }
}

impl std::error::Error for DecimalParseError {}

fn parse_fixed_point(s: &str) -> Result<i64, DecimalParseError> {
    let s = s.trim();
    let (sign, rest) = match s.strip_prefix('-') {
        Some(r) => (-1i64, r),
        None => (1i64, s),
    };
    let (int_part, frac_part) = match rest.split_once('.') {
        Some((i, f)) => (i, f),
        None => (rest, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(DecimalParseError::Malformed);
    }
    if frac_part.len() > TICK_SCALE as usize {
        return Err(DecimalParseError::TooManyFractionalDigits);
    }
    if !int_part.chars().all(|c| c.is_ascii_digit())
        || !frac_part.chars().all(|c| c.is_ascii_digit())
    {
        return Err(DecimalParseError::Malformed);
    }
    let int_val: i64 = if int_part.is_empty() {
        0
    } else {
        int_part.parse().map_err(|_| DecimalParseError::Overflow)?
    };
    let mut frac_padded = frac_part.to_string();
    while frac_padded.len() < TICK_SCALE as usize {
        frac_padded.push('0');
    }
    let frac_val: i64 = if frac_padded.is_empty() {
        0
    } else {
        frac_padded
            .parse()
            .map_err(|_| DecimalParseError::Overflow)?
    };
    let ticks = int_val
        .checked_mul(TICK_MULTIPLIER)
        .and_then(|v| v.checked_add(frac_val))
        .ok_or(DecimalParseError::Overflow)?;
    Ok(sign * ticks)
}

fn format_fixed_point(ticks: i64) -> String {
    let negative = ticks < 0;
    let magnitude = ticks.unsigned_abs();
    let int_part = magnitude / TICK_MULTIPLIER as u64;
    let frac_part = magnitude % TICK_MULTIPLIER as u64;
    let sign = if negative { "-" } else { "" };
    format!("{sign}{int_part}.{frac_part:0width$}", width = TICK_SCALE as usize)
}

/// Buy or sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Bid side.
    Buy,
    /// Ask side.
    Sell,
}

impl Side {
    /// The opposite side.
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

/// Order type (spec.md §3). A `Stop` order is held off-book until triggered
/// and converts to `Market` on trigger (see `matching::StopTable`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
    /// Executes immediately against resting liquidity; never rests.
    Market,
    /// Rests on the book if not fully filled on arrival.
    Limit,
    /// Held off-book until `stop_price` is crossed by the last trade price.
    Stop,
}

/// Lifecycle status of an order (spec.md §3). Legal transitions:
/// `Pending -> {PartiallyFilled, Filled, Cancelled, Rejected}`,
/// `PartiallyFilled -> {PartiallyFilled, Filled, Cancelled}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Accepted, no fills yet.
    Pending,
    /// Some but not all quantity filled.
    PartiallyFilled,
    /// Fully filled. Terminal.
    Filled,
    /// Cancelled by the owner. Terminal.
    Cancelled,
    /// Rejected at validation or for lack of liquidity. Terminal.
    Rejected,
}

impl OrderStatus {
    /// `true` for Filled, Cancelled, Rejected.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected
        )
    }
}

/// Why a Rejected order was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// A Market order found no resting counterparty.
    NoLiquidity,
    /// Failed adapter-side validation.
    Validation,
}

/// A resting or transient order (spec.md §3).
///
/// Invariants (enforced by `order_book`/`matching`, never by this struct
/// alone): `0 <= filled <= original`; `filled == original` iff `status ==
/// Filled`; `0 < filled < original` implies `status == PartiallyFilled`;
/// Limit and Stop orders carry a price, Market orders do not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Assigned at submit time, monotone per engine.
    pub id: OrderId,
    /// Owning user/account.
    pub user_id: UserId,
    /// Trading symbol.
    pub symbol: Symbol,
    /// Buy or sell.
    pub side: Side,
    /// Market, Limit, or Stop.
    pub kind: OrderKind,
    /// Quantity requested at submission.
    pub original_quantity: Quantity,
    /// Quantity executed so far.
    pub filled_quantity: Quantity,
    /// Limit price. Absent for Market orders (present for Limit and, as the
    /// resting limit price once triggered, for Stop).
    pub limit_price: Option<Price>,
    /// Trigger price. Present only for Stop orders.
    pub stop_price: Option<Price>,
    /// Current lifecycle status.
    pub status: OrderStatus,
    /// Epoch milliseconds at creation.
    pub created_at: u64,
    /// Epoch milliseconds at last mutation.
    pub updated_at: u64,
    /// Monotone per-symbol sequence assigned when the order first becomes
    /// known to the book (used as the intra-level arrival-order tiebreak).
    pub sequence: u64,
}

impl Order {
    /// Remaining (unfilled) quantity.
    pub fn remaining(&self) -> Quantity {
        self.original_quantity.saturating_sub(self.filled_quantity)
    }

    /// `true` once `filled_quantity == original_quantity`.
    pub fn is_fully_filled(&self) -> bool {
        self.filled_quantity >= self.original_quantity
    }
}

/// An executed trade (spec.md §3). Append-only; never mutated after
/// creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Monotone per-symbol trade identifier.
    pub id: TradeId,
    /// Trading symbol.
    pub symbol: Symbol,
    /// The order id on the buy side of this trade.
    pub buy_order_id: OrderId,
    /// The order id on the sell side of this trade.
    pub sell_order_id: OrderId,
    /// Quantity executed, always positive.
    pub quantity: Quantity,
    /// Execution price; equals the maker's limit price.
    pub price: Price,
    /// Epoch milliseconds at execution.
    pub executed_at: u64,
    /// The resting order matched.
    pub maker_order_id: OrderId,
    /// The incoming order that consumed maker liquidity.
    pub taker_order_id: OrderId,
}

/// Outcome of a successful cancel (spec.md §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelOutcome {
    /// The order's status after the cancel (always `Cancelled` on success).
    pub status: OrderStatus,
}

/// Current wall-clock time in epoch milliseconds.
///
/// Mirrors `utils::current_time_millis` in the teacher crate.
pub fn current_time_millis() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_formats_round_trip() {
        let p = Price::parse_decimal("50000.00000001").unwrap();
        assert_eq!(p.ticks(), 5_000_000_000_001);
        assert_eq!(p.to_decimal_string(), "50000.00000001");
    }

    #[test]
    fn parses_integer_without_fraction() {
        let p = Price::parse_decimal("100").unwrap();
        assert_eq!(p.ticks(), 100 * TICK_MULTIPLIER);
        assert_eq!(p.to_decimal_string(), "100.00000000");
    }

    #[test]
    fn rejects_excess_precision() {
        assert_eq!(
            Price::parse_decimal("1.123456789"),
            Err(DecimalParseError::TooManyFractionalDigits)
        );
    }

    #[test]
    fn rejects_negative_quantity() {
        assert_eq!(
            Quantity::parse_decimal("-1.0"),
            Err(DecimalParseError::Negative)
        );
    }

    #[test]
    fn order_id_generator_is_monotone_and_starts_at_one() {
        let gen = OrderIdGenerator::new();
        assert_eq!(gen.next(), OrderId(1));
        assert_eq!(gen.next(), OrderId(2));
        assert_eq!(gen.next(), OrderId(3));
    }

    #[test]
    fn remaining_quantity_accounts_for_fills() {
        let order = Order {
            id: OrderId(1),
            user_id: UserId(1),
            symbol: Symbol::from("BTC/USD"),
            side: Side::Buy,
            kind: OrderKind::Limit,
            original_quantity: Quantity::from_ticks(100),
            filled_quantity: Quantity::from_ticks(40),
            limit_price: Some(Price::from_ticks(1)),
            stop_price: None,
            status: OrderStatus::PartiallyFilled,
            created_at: 0,
            updated_at: 0,
            sequence: 1,
        };
        assert_eq!(order.remaining(), Quantity::from_ticks(60));
        assert!(!order.is_fully_filled());
    }
}
