use std::collections::HashSet;

use crate::models::{DataCompleteness, RiskReport, Side, TokenInfo, TradeEvent};

/// Inputs to a risk verdict.
#[derive(Debug, Clone, Copy)]
pub struct RiskContext<'a> {
    pub token: &'a TokenInfo,
    /// Most recent trades for the mint, oldest first.
    pub recent_trades: &'a [TradeEvent],
}

/// Produces a risk verdict for a mint. Pure; no I/O.
pub trait RiskCheck: Send + Sync {
    fn evaluate(&self, ctx: &RiskContext<'_>) -> RiskReport;
}

pub const REASON_FREEZE: &str = "Freeze authority present";
pub const REASON_MINT: &str = "Mint authority not revoked";
pub const REASON_SELL_PRESSURE: &str = "Sell pressure too high";
pub const REASON_FEW_TRADERS: &str = "Too few unique traders";

/// Minimum score for an entry to be allowed.
const ALLOW_SCORE: i32 = 60;

/// Heuristic scorer over token authorities and recent order flow.
///
/// Starts at 100 and deducts per finding. A live freeze authority always
/// denies, whatever the score.
#[derive(Debug, Clone, Default)]
pub struct RiskEngine;

impl RiskCheck for RiskEngine {
    fn evaluate(&self, ctx: &RiskContext<'_>) -> RiskReport {
        let mut reasons = Vec::new();
        let mut score: i32 = 100;
        let mut frozen = false;

        if ctx.token.freeze_authority.is_some() {
            reasons.push(REASON_FREEZE.to_string());
            score -= 50;
            frozen = true;
        }
        if ctx.token.mint_authority.is_some() {
            reasons.push(REASON_MINT.to_string());
            score -= 35;
        }

        let buys = ctx.recent_trades.iter().filter(|t| t.side == Side::Buy).count();
        let sells = ctx.recent_trades.len() - buys;
        if sells > buys * 2 {
            reasons.push(REASON_SELL_PRESSURE.to_string());
            score -= 20;
        }

        let unique: HashSet<&str> = ctx.recent_trades.iter().map(|t| t.trader.as_str()).collect();
        if unique.len() < 3 {
            reasons.push(REASON_FEW_TRADERS.to_string());
            score -= 15;
        }

        RiskReport {
            score: score.clamp(0, 100),
            allow: score >= ALLOW_SCORE && !frozen,
            reasons,
            data_completeness: DataCompleteness::Medium,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn trade(i: u64, side: Side, trader: &str) -> TradeEvent {
        TradeEvent {
            signature: format!("sig{i}"),
            mint: "mint".into(),
            price: Decimal::ZERO,
            sol_amount: Decimal::ONE,
            side,
            slot: i,
            trader: trader.into(),
            timestamp: Utc::now(),
        }
    }

    fn token() -> TokenInfo {
        TokenInfo::unknown("mint")
    }

    #[test]
    fn test_freeze_authority_denies() {
        let mut info = token();
        info.freeze_authority = Some("auth".into());
        let trades: Vec<_> = ["a", "b", "c"].iter().enumerate().map(|(i, t)| trade(i as u64, Side::Buy, t)).collect();
        let report = RiskEngine.evaluate(&RiskContext {
            token: &info,
            recent_trades: &trades,
        });
        assert!(!report.allow);
        assert_eq!(report.score, 50);
        assert_eq!(report.reasons, vec![REASON_FREEZE.to_string()]);
    }

    #[test]
    fn test_sell_pressure_and_few_traders() {
        let info = token();
        let trades = vec![
            trade(1, Side::Buy, "a"),
            trade(2, Side::Sell, "b"),
            trade(3, Side::Sell, "b"),
            trade(4, Side::Sell, "a"),
        ];
        let report = RiskEngine.evaluate(&RiskContext {
            token: &info,
            recent_trades: &trades,
        });
        // 100 − 20 − 15
        assert_eq!(report.score, 65);
        assert!(report.allow);
        assert_eq!(report.reasons.len(), 2);
    }

    #[test]
    fn test_mint_authority_with_thin_flow_denies() {
        let mut info = token();
        info.mint_authority = Some("auth".into());
        let report = RiskEngine.evaluate(&RiskContext {
            token: &info,
            recent_trades: &[],
        });
        // 100 − 35 − 15 = 50 < 60
        assert_eq!(report.score, 50);
        assert!(!report.allow);
    }

    #[test]
    fn test_score_floors_at_zero() {
        let mut info = token();
        info.freeze_authority = Some("f".into());
        info.mint_authority = Some("m".into());
        let trades = vec![trade(1, Side::Sell, "a")];
        let report = RiskEngine.evaluate(&RiskContext {
            token: &info,
            recent_trades: &trades,
        });
        assert_eq!(report.score, 0);
    }
}
