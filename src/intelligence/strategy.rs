use std::collections::HashSet;

use rust_decimal::Decimal;

use crate::models::{Action, Side, StopOverride, StrategySignal, TradeEvent};

/// Inputs to a strategy verdict.
#[derive(Debug, Clone, Copy)]
pub struct StrategyContext<'a> {
    /// Trade window for the mint, oldest first.
    pub trades: &'a [TradeEvent],
    /// Price window for the mint, oldest first.
    pub price_history: &'a [Decimal],
}

/// Produces an entry verdict for a mint. Pure; no I/O.
pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn evaluate(&self, ctx: &StrategyContext<'_>) -> StrategySignal;
}

fn stop_override(stop_loss_pct: Decimal) -> Option<StopOverride> {
    Some(StopOverride {
        stop_loss_pct: Some(stop_loss_pct),
        take_profits: None,
    })
}

// ---------------------------------------------------------------------------
// Launch momentum
// ---------------------------------------------------------------------------

/// Enters on fast early buying with positive net SOL flow from a spread of
/// traders.
#[derive(Debug, Clone, Default)]
pub struct LaunchMomentum;

impl LaunchMomentum {
    const WINDOW: usize = 20;
}

impl Strategy for LaunchMomentum {
    fn name(&self) -> &'static str {
        "launch-momentum"
    }

    fn evaluate(&self, ctx: &StrategyContext<'_>) -> StrategySignal {
        let window = &ctx.trades[ctx.trades.len().saturating_sub(Self::WINDOW)..];

        let mut buys = 0i64;
        let mut net_flow = Decimal::ZERO;
        for t in window {
            match t.side {
                Side::Buy => {
                    buys += 1;
                    net_flow += t.sol_amount;
                }
                Side::Sell => net_flow -= t.sol_amount,
            }
        }

        let span_ms = match (window.first(), window.last()) {
            (Some(first), Some(last)) => (last.timestamp - first.timestamp).num_milliseconds(),
            _ => 0,
        };
        // Buys per second over the window span.
        let velocity = Decimal::from(buys) / Decimal::from(span_ms.max(1)) * Decimal::from(1000);
        let unique: HashSet<&str> = window.iter().map(|t| t.trader.as_str()).collect();

        if window.len() < 5 || velocity < Decimal::ONE || net_flow <= Decimal::ZERO || unique.len() < 3 {
            return StrategySignal::skip(Decimal::new(2, 1), "Insufficient early momentum");
        }

        StrategySignal {
            action: Action::Enter,
            confidence: (velocity / Decimal::from(5)).min(Decimal::ONE),
            size_multiplier: Decimal::ONE + (net_flow / Decimal::from(5)).min(Decimal::new(5, 1)),
            suggested: stop_override(Decimal::new(25, 2)),
            rationale: "High early momentum with positive net flow".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Pullback reclaim
// ---------------------------------------------------------------------------

/// Enters when price dips at least 10% off a recent high and then recovers
/// to within 2% of it.
#[derive(Debug, Clone, Default)]
pub struct PullbackReclaim;

impl Strategy for PullbackReclaim {
    fn name(&self) -> &'static str {
        "pullback-reclaim"
    }

    fn evaluate(&self, ctx: &StrategyContext<'_>) -> StrategySignal {
        let history = ctx.price_history;
        if history.len() < 6 {
            return StrategySignal::skip(Decimal::new(1, 1), "Not enough price history");
        }

        let recent = &history[history.len() - 6..];
        let high = recent[..3].iter().copied().fold(Decimal::MIN, Decimal::max);
        let dip = recent[2..4].iter().copied().fold(Decimal::MAX, Decimal::min);
        let reclaim = recent[5];

        let dipped = dip < high * Decimal::new(9, 1);
        let reclaimed = reclaim > high * Decimal::new(98, 2);

        if dipped && reclaimed {
            return StrategySignal {
                action: Action::Enter,
                confidence: Decimal::new(65, 2),
                size_multiplier: Decimal::ONE,
                suggested: stop_override(Decimal::new(2, 1)),
                rationale: "Pullback followed by reclaim".into(),
            };
        }

        StrategySignal::skip(Decimal::new(15, 2), "No clean reclaim detected")
    }
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

/// Runs every strategy and merges the ones that want to enter: confidence
/// and size multiplier are averaged, rationales joined, and the first
/// suggestion wins.
pub struct StrategyEngine {
    strategies: Vec<Box<dyn Strategy>>,
}

impl StrategyEngine {
    pub fn new(strategies: Vec<Box<dyn Strategy>>) -> Self {
        Self { strategies }
    }
}

impl Default for StrategyEngine {
    fn default() -> Self {
        Self::new(vec![Box::new(LaunchMomentum), Box::new(PullbackReclaim)])
    }
}

impl Strategy for StrategyEngine {
    fn name(&self) -> &'static str {
        "engine"
    }

    fn evaluate(&self, ctx: &StrategyContext<'_>) -> StrategySignal {
        let enters: Vec<StrategySignal> = self
            .strategies
            .iter()
            .map(|s| {
                let signal = s.evaluate(ctx);
                tracing::debug!(
                    strategy = s.name(),
                    action = ?signal.action,
                    rationale = %signal.rationale,
                    "Strategy verdict"
                );
                signal
            })
            .filter(StrategySignal::is_enter)
            .collect();

        if enters.is_empty() {
            return StrategySignal::skip(Decimal::ZERO, "All strategies skipped");
        }

        let n = Decimal::from(enters.len() as i64);
        StrategySignal {
            action: Action::Enter,
            confidence: enters.iter().map(|s| s.confidence).sum::<Decimal>() / n,
            size_multiplier: enters.iter().map(|s| s.size_multiplier).sum::<Decimal>() / n,
            suggested: enters[0].suggested.clone(),
            rationale: enters
                .iter()
                .map(|s| s.rationale.as_str())
                .collect::<Vec<_>>()
                .join("; "),
        }
    }
}
