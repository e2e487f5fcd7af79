pub mod fill;
pub mod position;
pub mod signal;
pub mod token;

pub use fill::{ExecutionResult, FillDeltas};
pub use position::{Position, PositionState, TakeProfitRung};
pub use signal::{Action, DataCompleteness, RiskReport, StopOverride, StrategySignal};
pub use token::TokenInfo;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Side
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn from_is_buy(is_buy: bool) -> Self {
        if is_buy {
            Side::Buy
        } else {
            Side::Sell
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// TradeEvent: core pipeline message
// ---------------------------------------------------------------------------

/// One observed trade on a bonding-curve token. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeEvent {
    /// Transaction signature; the persistence dedupe key.
    pub signature: String,
    pub mint: String,
    /// Price in SOL per token.
    pub price: Decimal,
    pub sol_amount: Decimal,
    pub side: Side,
    pub slot: u64,
    pub trader: String,
    pub timestamp: DateTime<Utc>,
}

impl fmt::Display for TradeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Trade: mint={} side={} sol={} price={} trader={}",
            prefix(&self.mint, 8),
            self.side,
            self.sol_amount,
            self.price,
            prefix(&self.trader, 8),
        )
    }
}

/// First `n` characters of `s`.
fn prefix(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((end, _)) => &s[..end],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trade_display_truncates_on_char_boundaries() {
        let trade = TradeEvent {
            signature: "sig".into(),
            mint: "ééééééééééé".into(),
            price: Decimal::ONE,
            sol_amount: Decimal::ONE,
            side: Side::Buy,
            slot: 1,
            trader: "trader".into(),
            timestamp: Utc::now(),
        };
        let shown = trade.to_string();
        assert!(shown.contains("mint=éééééééé "));
        assert!(shown.contains("trader=trader"));
    }
}
