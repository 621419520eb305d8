use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::exchange::ExchangeId;
use crate::values::{Price, Quantity, TimestampMs};

/// Latest 24h quote snapshot for one symbol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticker {
    pub exchange: ExchangeId,
    pub symbol: String,
    pub price: Price,
    /// Absolute 24h change
    pub change_24h: Decimal,
    /// Percent 24h change
    pub change_percent_24h: Decimal,
    pub volume_24h: Quantity,
    pub high_24h: Price,
    pub low_24h: Price,
    pub updated_at: TimestampMs,
}

/// Derive the absolute 24h change from the percent change.
///
/// `base = price / (1 + pct/100)`, `change = price - base`. A zero divisor
/// (`pct == -100`) or a zero base yields zero.
pub fn change_from_percent(price: Price, percent: Decimal) -> Decimal {
    let divisor = Decimal::ONE + percent / Decimal::ONE_HUNDRED;
    if divisor.is_zero() {
        return Decimal::ZERO;
    }
    match price.checked_div(divisor) {
        Some(base) if !base.is_zero() => price - base,
        _ => Decimal::ZERO,
    }
}
